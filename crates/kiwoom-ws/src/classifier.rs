//! Inbound frame classification.
//!
//! Frames are matched by substring only. The upstream's control frames are
//! loosely typed, so no JSON structure is assumed here; only data frames are
//! handed to a full decoder.

const PING_MARKER: &str = r#""trnm":"PING""#;
const LOGIN_MARKER: &str = r#""trnm":"LOGIN""#;
const SUCCESS_MARKER: &str = r#""return_code":0"#;

/// Category of an inbound text frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Keep-alive; must be echoed back verbatim.
    Heartbeat,
    /// Response to the LOGIN frame.
    LoginResult { success: bool },
    /// Anything else (real-time data, REG/REMOVE acks).
    Data,
}

/// Classify a raw text frame. Total: every input maps to exactly one kind.
///
/// PING is checked before LOGIN.
pub fn classify(raw: &str) -> FrameKind {
    if raw.contains(PING_MARKER) {
        FrameKind::Heartbeat
    } else if raw.contains(LOGIN_MARKER) {
        FrameKind::LoginResult {
            success: raw.contains(SUCCESS_MARKER),
        }
    } else {
        FrameKind::Data
    }
}
