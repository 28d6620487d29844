//! Outbound WebSocket message types.
//!
//! Every payload is a fixed-shape struct so serialization cannot fail for
//! well-formed input. Field order follows declaration order and matches the
//! upstream's examples byte-for-byte.

use serde::Serialize;

/// Subscription group number. The gateway uses a single group.
pub const GROUP_NO: &str = "1";

/// Real-time trade (체결) channel type.
pub const REALTIME_TRADE: &str = "0B";

// ============================================================================
// LOGIN
// ============================================================================

/// Login request sent immediately after the socket opens.
#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    trnm: &'static str,
    token: &'a str,
}

/// Build the login frame: `{"trnm":"LOGIN","token":"<token>"}`.
pub fn login_frame(token: &str) -> String {
    to_wire(&LoginRequest {
        trnm: "LOGIN",
        token,
    })
}

// ============================================================================
// REG / REMOVE
// ============================================================================

/// Subscription operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionOp {
    /// `REG`: add items to the group.
    Register,
    /// `REMOVE`: drop items from the group.
    Unregister,
}

impl SubscriptionOp {
    fn trnm(self) -> &'static str {
        match self {
            Self::Register => "REG",
            Self::Unregister => "REMOVE",
        }
    }
}

/// Subscription request for a set of symbols and channel types.
///
/// Not retained after sending; the upstream owns the active subscription set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    op: SubscriptionOp,
    symbols: Vec<String>,
    channel_types: Vec<String>,
}

impl SubscriptionRequest {
    /// `REG` request for the given symbols on the real-time trade channel.
    pub fn register<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(SubscriptionOp::Register, symbols)
    }

    /// `REMOVE` request for the given symbols on the real-time trade channel.
    pub fn unregister<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(SubscriptionOp::Unregister, symbols)
    }

    fn new<I, S>(op: SubscriptionOp, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            op,
            symbols: dedup(symbols.into_iter().map(Into::into)),
            channel_types: vec![REALTIME_TRADE.to_string()],
        }
    }

    /// Replace the channel types (defaults to `0B`).
    pub fn with_channel_types<I, S>(mut self, channel_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channel_types = dedup(channel_types.into_iter().map(Into::into));
        self
    }

    pub fn op(&self) -> SubscriptionOp {
        self.op
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn channel_types(&self) -> &[String] {
        &self.channel_types
    }

    /// Serialize to the upstream wire format.
    ///
    /// `refresh` is only present on `REG`: `"1"` keeps existing items in the
    /// group instead of replacing them.
    pub fn to_wire(&self) -> String {
        let refresh = match self.op {
            SubscriptionOp::Register => Some("1"),
            SubscriptionOp::Unregister => None,
        };
        to_wire(&SubscriptionWire {
            trnm: self.op.trnm(),
            grp_no: GROUP_NO,
            refresh,
            data: [SubscriptionItem {
                item: &self.symbols,
                channel_types: &self.channel_types,
            }],
        })
    }
}

#[derive(Debug, Serialize)]
struct SubscriptionWire<'a> {
    trnm: &'static str,
    grp_no: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh: Option<&'static str>,
    data: [SubscriptionItem<'a>; 1],
}

#[derive(Debug, Serialize)]
struct SubscriptionItem<'a> {
    item: &'a [String],
    #[serde(rename = "type")]
    channel_types: &'a [String],
}

/// `REG` payload for one symbol on the real-time trade channel.
pub fn build_register(symbol: &str) -> String {
    SubscriptionRequest::register([symbol]).to_wire()
}

/// `REMOVE` payload for one symbol on the real-time trade channel.
pub fn build_unregister(symbol: &str) -> String {
    SubscriptionRequest::unregister([symbol]).to_wire()
}

fn dedup(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

fn to_wire<T: Serialize>(message: &T) -> String {
    // Only string fields and fixed arrays: a failure here is a bug, not input.
    serde_json::to_string(message).expect("fixed-shape WS message must serialize")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_login_frame_exact() {
        assert_eq!(login_frame("abc"), r#"{"trnm":"LOGIN","token":"abc"}"#);
    }

    #[test]
    fn test_login_frame_escapes_token() {
        let frame = login_frame(r#"a"b\c"#);
        let parsed: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["token"], r#"a"b\c"#);
    }

    #[test]
    fn test_register_exact() {
        assert_eq!(
            build_register("005930"),
            r#"{"trnm":"REG","grp_no":"1","refresh":"1","data":[{"item":["005930"],"type":["0B"]}]}"#
        );
    }

    #[test]
    fn test_unregister_exact() {
        assert_eq!(
            build_unregister("005930"),
            r#"{"trnm":"REMOVE","grp_no":"1","data":[{"item":["005930"],"type":["0B"]}]}"#
        );
    }

    #[test]
    fn test_register_parses_back() {
        let parsed: Value = serde_json::from_str(&build_register("005930")).unwrap();
        assert_eq!(parsed["data"][0]["item"], serde_json::json!(["005930"]));
        assert_eq!(parsed["data"][0]["type"], serde_json::json!(["0B"]));
        assert_eq!(parsed["refresh"], "1");
    }

    #[test]
    fn test_unregister_has_no_refresh() {
        let parsed: Value = serde_json::from_str(&build_unregister("005930")).unwrap();
        assert!(parsed.get("refresh").is_none());
        assert_eq!(parsed["trnm"], "REMOVE");
        assert_eq!(parsed["grp_no"], "1");
    }

    #[test]
    fn test_register_is_idempotent() {
        assert_eq!(build_register("000660"), build_register("000660"));
    }

    #[test]
    fn test_request_dedups_preserving_order() {
        let req = SubscriptionRequest::register(["000660", "005930", "000660"])
            .with_channel_types(["0B", "0D", "0B"]);
        assert_eq!(req.symbols(), ["000660", "005930"]);
        assert_eq!(req.channel_types(), ["0B", "0D"]);
        assert_eq!(req.op(), SubscriptionOp::Register);
        assert_eq!(
            req.to_wire(),
            r#"{"trnm":"REG","grp_no":"1","refresh":"1","data":[{"item":["000660","005930"],"type":["0B","0D"]}]}"#
        );
    }
}
