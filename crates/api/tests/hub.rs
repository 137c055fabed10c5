//! Tests for the push hub.
//!
//! These exercise [`Hub`] directly, without performing any HTTP upgrades:
//! admission, group membership, multicast delivery, liveness sweeping and
//! graceful shutdown.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::ws::Message as WsMessage;
use common::{drain_frames, next_frame, principal, test_hub, token};
use pulse_api::config::HubConfig;
use pulse_api::error::HubError;
use pulse_api::ws::DisconnectReason;
use pulse_core::{ConnectionState, MessageType, Notice, Scope, ServerFrame};

fn lead_update() -> Notice {
    Notice::new(MessageType::EntityUpdated)
        .with_entity("lead", 7)
        .with_data(serde_json::json!({"status": "qualified"}))
}

// ---------------------------------------------------------------------------
// Test: valid credentials open a connection and queue a welcome frame
// ---------------------------------------------------------------------------

#[tokio::test]
async fn on_connect_admits_and_welcomes() {
    let hub = test_hub(HubConfig::default());

    let mut admission = hub.on_connect(&token(1, None)).await.unwrap();

    assert_eq!(hub.connection_count().await, 1);
    assert_eq!(admission.principal.user_id, 1);
    assert_eq!(
        hub.connection_state(&admission.connection_id).await,
        Some(ConnectionState::Open)
    );

    let frame = next_frame(&mut admission.receiver).await;
    assert_matches!(
        frame,
        ServerFrame::Welcome { connection_id, heartbeat_interval_ms: 15_000 }
            if connection_id == admission.connection_id
    );
}

// ---------------------------------------------------------------------------
// Test: bad credentials are rejected and nothing is registered
// ---------------------------------------------------------------------------

#[tokio::test]
async fn on_connect_rejects_invalid_token() {
    let hub = test_hub(HubConfig::default());

    let result = hub.on_connect("garbage").await;

    assert_matches!(result, Err(HubError::Rejected(_)));
    assert_eq!(hub.connection_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: group multicast reaches members only, exactly once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn multicast_reaches_group_members_once() {
    let hub = test_hub(HubConfig::default());
    let mut member = hub.admit(principal(1, None)).await;
    let mut outsider = hub.admit(principal(2, None)).await;
    drain_frames(&mut member.receiver);
    drain_frames(&mut outsider.receiver);

    hub.join_group(&member.connection_id, "project-42").await.unwrap();
    // Joining twice must not double delivery.
    assert!(!hub.join_group(&member.connection_id, "project-42").await.unwrap());

    let report = hub
        .multicast(Scope::group("project-42"), lead_update())
        .await;

    assert_eq!(report.delivered, vec![member.connection_id.clone()]);
    assert!(report.failed.is_empty());

    let frames = drain_frames(&mut member.receiver);
    assert_eq!(frames.len(), 1);
    assert_matches!(&frames[0], ServerFrame::Message(msg) if msg.scope() == &Scope::group("project-42"));
    assert!(drain_frames(&mut outsider.receiver).is_empty());
}

// ---------------------------------------------------------------------------
// Test: overlapping scopes deliver one copy per connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn multicast_all_delivers_once_across_overlapping_groups() {
    let hub = test_hub(HubConfig::default());
    let mut both = hub.admit(principal(1, None)).await;
    let mut dashboard_only = hub.admit(principal(2, None)).await;
    hub.join_group(&both.connection_id, "project-42").await.unwrap();
    hub.join_group(&both.connection_id, "dashboard").await.unwrap();
    hub.join_group(&dashboard_only.connection_id, "dashboard").await.unwrap();
    drain_frames(&mut both.receiver);
    drain_frames(&mut dashboard_only.receiver);

    let report = hub
        .multicast_all(
            &[Scope::group("project-42"), Scope::group("dashboard")],
            lead_update(),
        )
        .await
        .unwrap();

    assert_eq!(report.delivered.len(), 2);
    let frames = drain_frames(&mut both.receiver);
    assert_matches!(
        &frames[..],
        [ServerFrame::Message(msg)] if msg.scope() == &Scope::group("project-42")
    );
    let frames = drain_frames(&mut dashboard_only.receiver);
    assert_matches!(
        &frames[..],
        [ServerFrame::Message(msg)]
            if msg.scope() == &Scope::group("dashboard")
                && msg.timestamp() == report.message.timestamp()
    );

    assert!(hub.multicast_all(&[], lead_update()).await.is_none());
}

// ---------------------------------------------------------------------------
// Test: one dead recipient does not block the others
// ---------------------------------------------------------------------------

#[tokio::test]
async fn multicast_isolates_dead_connections() {
    let hub = test_hub(HubConfig::default());
    let mut a = hub.admit(principal(1, None)).await;
    let b = hub.admit(principal(2, None)).await;
    let mut c = hub.admit(principal(3, None)).await;
    for conn in [&a, &b, &c] {
        hub.join_group(&conn.connection_id, "dashboard").await.unwrap();
    }
    drain_frames(&mut a.receiver);
    drain_frames(&mut c.receiver);

    // b's socket task is gone.
    let dead_id = b.connection_id.clone();
    drop(b);

    let report = hub.multicast(Scope::group("dashboard"), lead_update()).await;

    assert_eq!(report.delivered.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].connection_id, dead_id);
    assert_eq!(drain_frames(&mut a.receiver).len(), 1);
    assert_eq!(drain_frames(&mut c.receiver).len(), 1);

    // The dead connection is gone from the hub and from its groups.
    assert_eq!(hub.connection_count().await, 2);
    assert_eq!(hub.members("dashboard").await.len(), 2);
}

// ---------------------------------------------------------------------------
// Test: user scope reaches every connection of that user
// ---------------------------------------------------------------------------

#[tokio::test]
async fn multicast_to_user_reaches_all_their_connections() {
    let hub = test_hub(HubConfig::default());
    let mut tab1 = hub.admit(principal(5, None)).await;
    let mut tab2 = hub.admit(principal(5, None)).await;
    let mut other = hub.admit(principal(6, None)).await;
    for conn in [&mut tab1, &mut tab2, &mut other] {
        drain_frames(&mut conn.receiver);
    }

    let report = hub
        .multicast(Scope::User(5), Notice::new(MessageType::WorkflowCompleted))
        .await;

    assert_eq!(report.delivered.len(), 2);
    assert_eq!(drain_frames(&mut tab1.receiver).len(), 1);
    assert_eq!(drain_frames(&mut tab2.receiver).len(), 1);
    assert!(drain_frames(&mut other.receiver).is_empty());
}

// ---------------------------------------------------------------------------
// Test: multicast timestamps are strictly increasing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn multicast_stamps_monotonic_timestamps() {
    let hub = test_hub(HubConfig::default());

    let first = hub.multicast(Scope::group("empty"), lead_update()).await;
    let second = hub.multicast(Scope::group("empty"), lead_update()).await;

    assert!(second.message.timestamp() > first.message.timestamp());
    assert!(first.delivered.is_empty());
}

// ---------------------------------------------------------------------------
// Test: tenant groups are private to the tenant
// ---------------------------------------------------------------------------

#[tokio::test]
async fn join_foreign_tenant_group_is_forbidden() {
    let hub = test_hub(HubConfig::default());
    let conn = hub.admit(principal(1, Some(3))).await;

    assert!(hub.join_group(&conn.connection_id, "tenant-3").await.unwrap());
    assert_matches!(
        hub.join_group(&conn.connection_id, "tenant-4").await,
        Err(HubError::Forbidden(group)) if group == "tenant-4"
    );
    assert_eq!(hub.members("tenant-4").await.len(), 0);
}

// ---------------------------------------------------------------------------
// Test: leaving a group the connection never joined is a no-op
// ---------------------------------------------------------------------------

#[tokio::test]
async fn leave_unjoined_group_is_noop() {
    let hub = test_hub(HubConfig::default());
    let conn = hub.admit(principal(1, None)).await;

    assert!(!hub.leave_group(&conn.connection_id, "project-42").await.unwrap());
    assert_matches!(
        hub.leave_group("nonexistent", "project-42").await,
        Err(HubError::ConnectionNotFound(_))
    );
}

// ---------------------------------------------------------------------------
// Test: disconnect drops all memberships and is idempotent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disconnect_removes_memberships_idempotently() {
    let hub = test_hub(HubConfig::default());
    let conn = hub.admit(principal(1, None)).await;
    hub.join_group(&conn.connection_id, "dashboard").await.unwrap();
    hub.join_group(&conn.connection_id, "project-42").await.unwrap();
    assert_eq!(hub.group_count().await, 2);

    assert!(hub.on_disconnect(&conn.connection_id, DisconnectReason::ClientClosed).await);
    assert!(!hub.on_disconnect(&conn.connection_id, DisconnectReason::ClientClosed).await);

    assert_eq!(hub.connection_count().await, 0);
    assert_eq!(hub.group_count().await, 0);
    assert!(hub.groups_of(&conn.connection_id).await.is_empty());
    assert!(conn.cancel.is_cancelled());

    // A late join from a racing command finds the connection gone.
    assert_matches!(
        hub.join_group(&conn.connection_id, "dashboard").await,
        Err(HubError::ConnectionNotFound(_))
    );
}

// ---------------------------------------------------------------------------
// Test: silent connections degrade, then get closed by the sweep
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn sweep_degrades_then_closes_silent_connections() {
    let hub = test_hub(HubConfig {
        heartbeat_interval: Duration::from_secs(10),
        heartbeat_timeout: Duration::from_secs(30),
    });
    let silent = hub.admit(principal(1, None)).await;
    let chatty = hub.admit(principal(2, None)).await;

    tokio::time::advance(Duration::from_secs(15)).await;
    hub.touch(&chatty.connection_id).await;
    assert!(hub.sweep_stale().await.is_empty());
    assert_eq!(
        hub.connection_state(&silent.connection_id).await,
        Some(ConnectionState::Degraded)
    );
    assert_eq!(
        hub.connection_state(&chatty.connection_id).await,
        Some(ConnectionState::Open)
    );

    tokio::time::advance(Duration::from_secs(20)).await;
    hub.touch(&chatty.connection_id).await;
    let closed = hub.sweep_stale().await;

    assert_eq!(closed, vec![silent.connection_id.clone()]);
    assert_eq!(hub.connection_count().await, 1);
    assert!(silent.cancel.is_cancelled());
}

// ---------------------------------------------------------------------------
// Test: a degraded connection recovers when the peer is heard again
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn touch_restores_degraded_connection() {
    let hub = test_hub(HubConfig {
        heartbeat_interval: Duration::from_secs(10),
        heartbeat_timeout: Duration::from_secs(30),
    });
    let conn = hub.admit(principal(1, None)).await;

    tokio::time::advance(Duration::from_secs(12)).await;
    hub.sweep_stale().await;
    assert_eq!(
        hub.connection_state(&conn.connection_id).await,
        Some(ConnectionState::Degraded)
    );

    hub.touch(&conn.connection_id).await;
    assert_eq!(
        hub.connection_state(&conn.connection_id).await,
        Some(ConnectionState::Open)
    );
}

// ---------------------------------------------------------------------------
// Test: ping_all() queues a Ping frame for every connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_all_sends_ping() {
    let hub = test_hub(HubConfig::default());
    let mut conn = hub.admit(principal(1, None)).await;
    drain_frames(&mut conn.receiver);

    hub.ping_all().await;

    let msg = conn.receiver.recv().await.expect("should receive Ping");
    assert!(matches!(msg, WsMessage::Ping(_)), "Expected Ping, got: {msg:?}");
}

// ---------------------------------------------------------------------------
// Test: shutdown_all() sends Close and clears all connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let hub = test_hub(HubConfig::default());
    let mut conn1 = hub.admit(principal(1, None)).await;
    let mut conn2 = hub.admit(principal(2, None)).await;
    hub.join_group(&conn1.connection_id, "dashboard").await.unwrap();

    hub.shutdown_all().await;

    assert_eq!(hub.connection_count().await, 0);
    assert_eq!(hub.group_count().await, 0);

    for rx in [&mut conn1.receiver, &mut conn2.receiver] {
        let mut last = None;
        while let Some(msg) = rx.recv().await {
            last = Some(msg);
        }
        // Close is the final frame, and the channel is closed after it.
        assert_matches!(last, Some(WsMessage::Close(None)));
    }
}
