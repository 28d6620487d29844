//! Structured logging for the Kiwoom gateway.

pub mod error;
pub mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, LogFormat, DEFAULT_FILTER};
