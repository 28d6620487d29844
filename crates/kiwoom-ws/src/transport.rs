//! Outbound side of the transport.
//!
//! The session never touches the socket directly. It holds a
//! [`FrameSender`] that queues whole text frames; the connection driver
//! drains the queue into the socket between inbound frames.

use crate::error::{WsError, WsResult};
use tokio::sync::mpsc;
use tracing::debug;

/// Queue for outbound text frames. Safe to call from any thread.
pub trait FrameSender: Send + Sync {
    /// Queue one complete text frame. Never fragments.
    fn send_text(&self, text: String) -> WsResult<()>;

    /// Whether the receiving side is gone.
    fn is_closed(&self) -> bool;
}

/// Channel-backed [`FrameSender`] used by the connection driver.
///
/// Non-blocking: a full buffer is reported as a send failure instead of
/// stalling the caller (which may be the inbound frame handler).
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::Sender<String>,
}

impl ChannelSender {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }
}

impl FrameSender for ChannelSender {
    fn send_text(&self, text: String) -> WsResult<()> {
        self.tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                WsError::SendFailed("outbound buffer full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                WsError::SendFailed("channel closed".to_string())
            }
        })?;
        debug!("Frame queued for sending");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
