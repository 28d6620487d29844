//! Trade quote.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// One executed trade from the `0B` real-time channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    /// Stock code (e.g. `005930`).
    pub symbol: String,
    /// Last trade price. Always non-negative.
    pub price: Decimal,
    /// Change versus the previous close (signed).
    pub change: Decimal,
    /// Change rate in percent (signed).
    pub change_rate: Decimal,
    /// Trade volume: positive for buyer-initiated, negative for seller-initiated.
    pub volume: i64,
    /// Cumulative session volume.
    pub acc_volume: u64,
    /// Exchange trade time, `HHMMSS`.
    pub trade_time: String,
    pub best_ask: Option<Decimal>,
    pub best_bid: Option<Decimal>,
    /// Local receive time.
    pub received_at: DateTime<Utc>,
}

impl Quote {
    /// Buyer-initiated trade.
    pub fn is_buy(&self) -> bool {
        self.volume > 0
    }

    /// Spread between best ask and best bid, when both are known.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_ask, self.best_bid) {
            (Some(ask), Some(bid)) => Some(ask - bid),
            _ => None,
        }
    }
}
