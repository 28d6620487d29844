//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Auth error: {0}")]
    Auth(#[from] kiwoom_auth::AuthError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<kiwoom_ws::WsError>),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] kiwoom_telemetry::TelemetryError),
}

pub type AppResult<T> = Result<T, AppError>;
