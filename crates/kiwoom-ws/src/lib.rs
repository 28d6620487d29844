//! Streaming session client for the Kiwoom real-time WebSocket feed.
//!
//! Provides:
//! - LOGIN handshake using a shared token authority
//! - PING echo keep-alive
//! - REG / REMOVE subscription payloads
//! - Frame classification and routing of data frames to a decoder and sink

pub mod classifier;
pub mod connection;
pub mod error;
pub mod message;
pub mod session;
pub mod transport;

pub use classifier::{classify, FrameKind};
pub use connection::{SessionConfig, DEFAULT_WS_URL};
pub use error::{WsError, WsResult};
pub use message::{
    build_register, build_unregister, login_frame, SubscriptionOp, SubscriptionRequest, GROUP_NO,
    REALTIME_TRADE,
};
pub use session::{
    FrameDecoder, FrameOutcome, QuoteSink, SessionState, SessionStats, StreamingSession,
    TokenSource,
};
pub use transport::{ChannelSender, FrameSender};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
