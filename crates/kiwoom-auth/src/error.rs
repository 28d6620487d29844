//! Token issuance error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Token endpoint returned HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Token endpoint returned no token: code={code:?}, msg={msg:?}")]
    MissingToken {
        code: Option<i64>,
        msg: Option<String>,
    },

    #[error("Invalid expires_dt: {0}")]
    InvalidExpiry(String),

    #[error("Issued token already expired at {0}")]
    AlreadyExpired(DateTime<Utc>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;
