//! Structured logging initialization.

use crate::error::{TelemetryError, TelemetryResult};
use serde::Deserialize;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_FILTER: &str = "info,kiwoom=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON when `RUST_ENV=production`, pretty otherwise.
    #[default]
    Auto,
    Json,
    Pretty,
}

impl LogFormat {
    /// Resolve `Auto` against the value of `RUST_ENV`.
    pub fn resolve(self, rust_env: Option<&str>) -> Self {
        match self {
            Self::Auto if rust_env == Some("production") => Self::Json,
            Self::Auto => Self::Pretty,
            other => other,
        }
    }
}

/// Build the env filter: `RUST_LOG` wins, then `configured`, then [`DEFAULT_FILTER`].
fn build_filter(configured: Option<&str>) -> TelemetryResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = configured.unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(directives).map_err(|e| TelemetryError::InvalidFilter {
        filter: directives.to_string(),
        reason: e.to_string(),
    })
}

/// Initialize structured logging.
///
/// Configures tracing with JSON output for production and
/// pretty output for development. Fails if a global subscriber is
/// already installed.
pub fn init_logging(filter: Option<&str>, format: LogFormat) -> TelemetryResult<()> {
    let env_filter = build_filter(filter)?;
    let rust_env = std::env::var("RUST_ENV").ok();

    let result = match format.resolve(rust_env.as_deref()) {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_names(true),
            )
            .try_init(),
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
