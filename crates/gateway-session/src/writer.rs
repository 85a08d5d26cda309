//! Serialized write half of a gateway connection.

use async_trait::async_trait;
use futures::{SinkExt, stream::SplitSink};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream,
    tungstenite::{
        Message, Utf8Bytes,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};

use crate::SessionError;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Anything frames can be written to.
///
/// Both the frame reader and the heartbeat driver write through the same
/// implementation; implementations serialize the writes.
#[async_trait]
pub trait FrameWriter: Send + Sync {
    /// Send one text frame.
    async fn send_text(&self, text: String) -> Result<(), SessionError>;

    /// Send a close frame. Later sends fail with [`SessionError::Closed`].
    async fn close(&self, code: u16, reason: &'static str) -> Result<(), SessionError>;
}

/// Write half of a live WebSocket, shared behind a lock.
pub struct GatewayWriter {
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
}

impl GatewayWriter {
    pub(crate) fn new(sink: SplitSink<WsStream, Message>) -> Self {
        Self {
            sink: Mutex::new(Some(sink)),
        }
    }

    /// Flush and drop the sink without choosing a close code.
    ///
    /// Used after the peer already closed, so any pending close reply goes out.
    pub(crate) async fn finish(&self) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                tracing::debug!("Closing gateway sink: {e}");
            }
        }
    }
}

#[async_trait]
impl FrameWriter for GatewayWriter {
    async fn send_text(&self, text: String) -> Result<(), SessionError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(SessionError::Closed)?;
        sink.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&self, code: u16, reason: &'static str) -> Result<(), SessionError> {
        let Some(mut sink) = self.sink.lock().await.take() else {
            return Ok(());
        };
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Utf8Bytes::from_static(reason),
        };
        sink.send(Message::Close(Some(frame))).await?;
        Ok(())
    }
}
