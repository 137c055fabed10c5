//! Duplex channel seam.
//!
//! The [`ConnectionManager`](crate::ConnectionManager) only needs to open a
//! channel, exchange text frames and close it. [`WsTransport`] does that
//! over tokio-tungstenite; tests substitute a scripted transport.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::ConnectError;

/// Opens channels to the hub.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a channel, presenting `token` as a bearer credential.
    async fn connect(&self, url: &str, token: Option<&str>)
        -> Result<Box<dyn Channel>, ConnectError>;
}

/// One open duplex channel carrying JSON text frames.
#[async_trait]
pub trait Channel: Send {
    async fn send(&mut self, text: String) -> Result<(), ConnectError>;

    /// Next text frame. `None` once the peer closed the channel.
    async fn recv(&mut self) -> Option<Result<String, ConnectError>>;

    async fn close(&mut self);
}

/// WebSocket transport.
#[derive(Debug, Default, Clone)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(
        &self,
        url: &str,
        token: Option<&str>,
    ) -> Result<Box<dyn Channel>, ConnectError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ConnectError::Protocol(format!("Invalid URL {url}: {e}")))?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ConnectError::Protocol(format!("Invalid token: {e}")))?;
            request.headers_mut().insert(header::AUTHORIZATION, value);
        }

        let (stream, _response) = connect_async(request).await.map_err(classify)?;
        tracing::debug!(url, "WebSocket connected");
        Ok(Box::new(WsChannel { stream }))
    }
}

/// Map a handshake failure onto the retry taxonomy.
fn classify(err: tungstenite::Error) -> ConnectError {
    match err {
        tungstenite::Error::Http(response)
            if matches!(
                response.status(),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            ) =>
        {
            ConnectError::Unauthorized
        }
        tungstenite::Error::Http(response) => {
            ConnectError::Transport(format!("Handshake refused with {}", response.status()))
        }
        other => ConnectError::Transport(other.to_string()),
    }
}

struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Channel for WsChannel {
    async fn send(&mut self, text: String) -> Result<(), ConnectError> {
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| ConnectError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ConnectError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(_)) => return None,
                // Control frames are answered by tungstenite itself.
                Ok(_) => continue,
                Err(e) => return Some(Err(ConnectError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "WebSocket close failed");
        }
    }
}
