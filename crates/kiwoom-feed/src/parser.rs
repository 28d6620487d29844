//! Real-time frame parsing.
//!
//! Format: `{"trnm":"REAL","data":[{"type":"0B","item":"005930","values":{"10":"-60700",...}}]}`
//!
//! Values are strings. Price fields carry a direction sign that is not part
//! of the price itself, so prices are taken as absolute values; change,
//! change rate and trade volume keep their sign.

use crate::error::{FeedError, FeedResult};
use crate::quote::Quote;
use chrono::{DateTime, Utc};
use kiwoom_ws::{FrameDecoder, REALTIME_TRADE};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

const REAL_TRNM: &str = "REAL";

const FID_PRICE: &str = "10";
const FID_CHANGE: &str = "11";
const FID_CHANGE_RATE: &str = "12";
const FID_ACC_VOLUME: &str = "13";
const FID_VOLUME: &str = "15";
const FID_TRADE_TIME: &str = "20";
const FID_BEST_ASK: &str = "27";
const FID_BEST_BID: &str = "28";

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    trnm: Option<String>,
    #[serde(default)]
    data: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    item: String,
    #[serde(default)]
    values: HashMap<String, String>,
}

/// Parse statistics.
#[derive(Debug, Default)]
pub struct ParseStats {
    /// Entries turned into quotes.
    pub decoded_count: AtomicU64,
    /// `0B` entries dropped for missing or malformed fields.
    pub invalid_count: AtomicU64,
    /// Frames that were not valid JSON.
    pub malformed_frames: AtomicU64,
}

impl ParseStats {
    pub fn decoded(&self) -> u64 {
        self.decoded_count.load(Ordering::Relaxed)
    }

    pub fn invalid(&self) -> u64 {
        self.invalid_count.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed_frames.load(Ordering::Relaxed)
    }
}

/// Decoder for `0B` real-time trade frames.
#[derive(Debug, Default)]
pub struct RealDataParser {
    stats: ParseStats,
}

impl RealDataParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    /// Parse one frame, stamping quotes with the current time.
    pub fn parse(&self, raw: &str) -> FeedResult<Vec<Quote>> {
        self.parse_at(raw, Utc::now())
    }

    /// Parse one frame.
    ///
    /// Frames other than `REAL` (e.g. REG acks) and entries of other types
    /// yield nothing. A bad `0B` entry is skipped without affecting its
    /// siblings. Only unparseable JSON is an error.
    pub fn parse_at(&self, raw: &str, received_at: DateTime<Utc>) -> FeedResult<Vec<Quote>> {
        let frame: RawFrame = serde_json::from_str(raw).map_err(|e| {
            self.stats.malformed_frames.fetch_add(1, Ordering::Relaxed);
            e
        })?;

        if frame.trnm.as_deref() != Some(REAL_TRNM) {
            return Ok(Vec::new());
        }

        let mut quotes = Vec::with_capacity(frame.data.len());
        for entry in frame.data {
            if entry.kind != REALTIME_TRADE {
                debug!(kind = %entry.kind, item = %entry.item, "Skipping non-trade entry");
                continue;
            }
            match parse_trade(&entry, received_at) {
                Ok(quote) => {
                    self.stats.decoded_count.fetch_add(1, Ordering::Relaxed);
                    quotes.push(quote);
                }
                Err(e) => {
                    self.stats.invalid_count.fetch_add(1, Ordering::Relaxed);
                    warn!(item = %entry.item, error = %e, "Dropping malformed trade entry");
                }
            }
        }
        Ok(quotes)
    }
}

impl FrameDecoder for RealDataParser {
    type Output = Vec<Quote>;

    fn decode(&self, raw: &str) -> Option<Vec<Quote>> {
        match self.parse(raw) {
            Ok(quotes) if !quotes.is_empty() => Some(quotes),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Failed to parse data frame");
                None
            }
        }
    }
}

fn parse_trade(entry: &RawEntry, received_at: DateTime<Utc>) -> FeedResult<Quote> {
    if entry.item.is_empty() {
        return Err(FeedError::MissingField {
            symbol: String::new(),
            field: "item",
        });
    }
    let values = &entry.values;
    let price = values
        .get(FID_PRICE)
        .ok_or_else(|| FeedError::MissingField {
            symbol: entry.item.clone(),
            field: FID_PRICE,
        })
        .and_then(|v| parse_decimal(FID_PRICE, v))?
        .abs();

    Ok(Quote {
        symbol: entry.item.clone(),
        price,
        change: optional_decimal(values, FID_CHANGE)?.unwrap_or_default(),
        change_rate: optional_decimal(values, FID_CHANGE_RATE)?.unwrap_or_default(),
        volume: optional_int::<i64>(values, FID_VOLUME)?.unwrap_or_default(),
        acc_volume: optional_int::<u64>(values, FID_ACC_VOLUME)?.unwrap_or_default(),
        trade_time: values.get(FID_TRADE_TIME).cloned().unwrap_or_default(),
        best_ask: optional_decimal(values, FID_BEST_ASK)?.map(|d| d.abs()),
        best_bid: optional_decimal(values, FID_BEST_BID)?.map(|d| d.abs()),
        received_at,
    })
}

fn strip_plus(value: &str) -> &str {
    let trimmed = value.trim();
    trimmed.strip_prefix('+').unwrap_or(trimmed)
}

fn parse_decimal(field: &'static str, value: &str) -> FeedResult<Decimal> {
    Decimal::from_str(strip_plus(value)).map_err(|_| FeedError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

fn optional_decimal(
    values: &HashMap<String, String>,
    field: &'static str,
) -> FeedResult<Option<Decimal>> {
    match values.get(field).map(|v| v.trim()) {
        None | Some("") => Ok(None),
        Some(v) => parse_decimal(field, v).map(Some),
    }
}

fn optional_int<T: FromStr>(
    values: &HashMap<String, String>,
    field: &'static str,
) -> FeedResult<Option<T>> {
    match values.get(field).map(|v| v.trim()) {
        None | Some("") => Ok(None),
        Some(v) => strip_plus(v)
            .parse::<T>()
            .map(Some)
            .map_err(|_| FeedError::InvalidValue {
                field,
                value: v.to_string(),
            }),
    }
}
