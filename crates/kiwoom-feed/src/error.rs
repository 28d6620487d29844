//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Missing field {field} for {symbol}")]
    MissingField { symbol: String, field: &'static str },

    #[error("Invalid value for field {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type FeedResult<T> = Result<T, FeedError>;
