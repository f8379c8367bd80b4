//! WebSocket client for the live event stream.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::ClientError;
use crate::objects::{WsClientMessage, WsServerMessage};

/// An authenticated connection to `GET /ws`.
pub struct EventStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}

impl EventStream {
    /// Connect to `{base_url}/ws?token={token}`.
    ///
    /// `base_url` uses the `ws://` or `wss://` scheme. A rejected credential
    /// surfaces as [`ClientError::WebSocket`] carrying the HTTP 401 response.
    pub async fn connect(base_url: &str, token: &str) -> Result<Self, ClientError> {
        let url = format!(
            "{}/ws?token={}",
            base_url.trim_end_matches('/'),
            urlencoding::encode(token)
        );
        let (socket, _response) = tokio_tungstenite::connect_async(url).await?;
        Ok(Self { socket })
    }

    /// Read the next server frame.
    ///
    /// Transport-level control frames are skipped. Returns `None` once the
    /// server closes the stream.
    pub async fn next_message(&mut self) -> Option<Result<WsServerMessage, ClientError>> {
        while let Some(frame) = self.socket.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str(&text).map_err(ClientError::from));
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
        None
    }

    /// Send a `{"type":"ping"}` keepalive.
    pub async fn ping(&mut self) -> Result<(), ClientError> {
        self.send_text(serde_json::to_string(&WsClientMessage::Ping)?)
            .await
    }

    /// Send an arbitrary text frame.
    pub async fn send_text(&mut self, text: String) -> Result<(), ClientError> {
        self.socket.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Close the connection with a normal close frame.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.socket.close(None).await?;
        Ok(())
    }
}
