//! Real-time quote decoding for the Kiwoom gateway.
//!
//! Turns authenticated `REAL` frames carrying `0B` (trade) entries into
//! typed [`Quote`]s and hands them to a broadcast channel.

pub mod error;
pub mod parser;
pub mod quote;
pub mod sink;

pub use error::{FeedError, FeedResult};
pub use parser::{ParseStats, RealDataParser};
pub use quote::Quote;
pub use sink::BroadcastSink;
