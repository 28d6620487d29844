//! Kiwoom real-time market-data gateway.
//!
//! Wires the token authority, the streaming session and the trade decoder
//! together and runs one connection cycle:
//! - issue or reuse an access token and log in
//! - register the configured symbols once authenticated
//! - decode `0B` trades onto a broadcast channel

pub mod app;
pub mod config;
pub mod error;

pub use app::{Application, GatewaySession};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
