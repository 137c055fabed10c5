use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use pulse_core::protocol::Membership;
use pulse_core::{ClientCommand, CoreError, ServerFrame};
use serde::Deserialize;

use crate::auth::bearer_token;
use crate::error::{AppError, HubError};
use crate::state::AppState;
use crate::ws::hub::{Admission, DisconnectReason, Hub};

/// How long the sender task may keep flushing after the connection ended.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Browsers cannot set headers on a WebSocket handshake, so the token
    /// may also travel in the query string.
    pub access_token: Option<String>,
}

/// HTTP handler that authenticates and upgrades the connection to
/// WebSocket.
///
/// Credentials are checked before the upgrade so a refused client gets a
/// plain `401` response instead of an open socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = bearer_token(&headers)
        .map(str::to_string)
        .or(params.access_token)
    else {
        return AppError::Core(CoreError::Unauthorized("Missing access token".into()))
            .into_response();
    };

    let principal = match state.hub.authenticate(&token).await {
        Ok(principal) => principal,
        Err(e) => {
            tracing::info!(error = %e, "WebSocket connection refused");
            return AppError::from(e).into_response();
        }
    };

    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| async move {
        let admission = hub.admit(principal).await;
        handle_socket(socket, hub, admission).await;
    })
}

/// Serve a single admitted connection.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Spawns a sender task that forwards frames from the hub channel.
///   2. Processes inbound commands on the current task until the peer
///      leaves or the hub cancels the connection.
///   3. Removes the connection from the hub.
async fn handle_socket(socket: WebSocket, hub: Arc<Hub>, admission: Admission) {
    let Admission {
        connection_id: conn_id,
        mut receiver,
        cancel,
        ..
    } = admission;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel frames to the WebSocket sink. Ends once
    // the hub drops the connection and the channel is drained.
    let sender_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = receiver.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    // Receiver loop: process inbound frames.
    let reason = loop {
        tokio::select! {
            () = cancel.cancelled() => break None,
            next = stream.next() => match next {
                Some(Ok(Message::Text(text))) => {
                    hub.touch(&conn_id).await;
                    handle_command(&hub, &conn_id, text.as_str()).await;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    hub.touch(&conn_id).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    hub.touch(&conn_id).await;
                    reply(&hub, &conn_id, error_frame("UNSUPPORTED", "Binary frames are not supported")).await;
                }
                Some(Ok(Message::Close(_))) => break Some(DisconnectReason::ClientClosed),
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break Some(DisconnectReason::TransportError);
                }
                None => break Some(DisconnectReason::TransportError),
            }
        }
    };

    // A cancelled connection was already removed by the hub.
    if let Some(reason) = reason {
        hub.on_disconnect(&conn_id, reason).await;
    }
    if tokio::time::timeout(CLOSE_GRACE, &mut send_task).await.is_err() {
        send_task.abort();
    }
    tracing::debug!(conn_id = %conn_id, "WebSocket task finished");
}

/// Parse and execute one client command, replying on the same connection.
async fn handle_command(hub: &Hub, conn_id: &str, text: &str) {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            tracing::debug!(conn_id, error = %e, "Unparseable client frame");
            reply(hub, conn_id, error_frame("INVALID_COMMAND", &e.to_string())).await;
            return;
        }
    };

    let response = match command.membership() {
        Some(Membership::Join(group)) => match hub.join_group(conn_id, &group).await {
            Ok(_) => ServerFrame::Joined { group },
            Err(e) => hub_error_frame(&e),
        },
        Some(Membership::Leave(group)) => match hub.leave_group(conn_id, &group).await {
            Ok(_) => ServerFrame::Left { group },
            Err(e) => hub_error_frame(&e),
        },
        None => ServerFrame::Pong {
            timestamp: hub.clock().now(),
        },
    };
    reply(hub, conn_id, response).await;
}

async fn reply(hub: &Hub, conn_id: &str, frame: ServerFrame) {
    if let Err(e) = hub.send_frame(conn_id, &frame).await {
        tracing::debug!(conn_id, error = %e, "Reply not sent");
    }
}

fn error_frame(code: &str, message: &str) -> ServerFrame {
    ServerFrame::Error {
        code: code.to_string(),
        message: message.to_string(),
    }
}

fn hub_error_frame(err: &HubError) -> ServerFrame {
    error_frame(err.code(), &err.to_string())
}
