use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::ConnectionError;

/// Opens connections to the chat server
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, ConnectionError>;
}

/// One established text channel
#[async_trait]
pub trait Connection: Send {
    async fn send_text(&mut self, text: String) -> Result<(), ConnectionError>;

    /// Next text frame, or `None` once the peer has closed the channel.
    ///
    /// Must be cancel-safe: it is polled inside `select!`.
    async fn recv_text(&mut self) -> Result<Option<String>, ConnectionError>;

    async fn close(&mut self);
}

/// WebSocket transport backed by tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, ConnectionError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| ConnectionError(format!("WebSocket connect to {url} failed: {e}")))?;
        log::info!("WebSocket connected to {url}");
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<(), ConnectionError> {
        self.stream
            .send(WsMessage::text(text))
            .await
            .map_err(|e| ConnectionError(format!("WebSocket send failed: {e}")))
    }

    async fn recv_text(&mut self) -> Result<Option<String>, ConnectionError> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                Some(Ok(WsMessage::Binary(bin))) => {
                    log::debug!("Ignoring binary frame: len={}", bin.len());
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    log::info!("WebSocket closed by server: {frame:?}");
                    return Ok(None);
                }
                // ping/pong are answered by tungstenite itself
                Some(Ok(_other)) => {}
                Some(Err(e)) => return Err(ConnectionError(format!("WebSocket error: {e}"))),
                None => return Ok(None),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            log::debug!("WebSocket close failed: {e}");
        }
    }
}
