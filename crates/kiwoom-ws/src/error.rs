//! WebSocket error types.

use crate::session::SessionState;
use kiwoom_auth::AuthError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Cannot connect while session is {0}")]
    InvalidState(SessionState),

    #[error("Login token unavailable: {0}")]
    Auth(#[from] AuthError),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

pub type WsResult<T> = Result<T, WsError>;
