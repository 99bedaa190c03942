//! Market data records shared by the live and historical paths

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Quote and trade sizes arrive in round lots
pub const LOT_SIZE: i64 = 100;

/// Bar interval in milliseconds (1 minute)
pub const BAR_INTERVAL_MS: i64 = 60_000;

/// A fixed-interval OHLCV candle with VWAP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar start time
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub vwap: f64,
    /// Number of trades aggregated into the bar
    pub trades: u64,
}

/// Top-of-book quote, sizes already scaled to shares
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub bid_price: Decimal,
    pub bid_size: Decimal,
    pub ask_price: Decimal,
    pub ask_size: Decimal,
    pub sequence: u64,
    pub tape: u8,
}

impl Quote {
    /// Build a quote from lot-denominated sizes.
    ///
    /// `None` when a size does not fit a decimal once scaled to shares.
    pub fn from_lots(
        timestamp: DateTime<Utc>,
        bid_price: Decimal,
        bid_lots: Decimal,
        ask_price: Decimal,
        ask_lots: Decimal,
    ) -> Option<Self> {
        let lot = Decimal::from(LOT_SIZE);
        Some(Self {
            timestamp,
            bid_price,
            bid_size: bid_lots.checked_mul(lot)?,
            ask_price,
            ask_size: ask_lots.checked_mul(lot)?,
            sequence: 0,
            tape: 0,
        })
    }

    pub fn with_sequence(mut self, sequence: u64, tape: u8) -> Self {
        self.sequence = sequence;
        self.tape = tape;
        self
    }
}

/// A single executed trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePrint {
    pub price: f64,
    /// Size in shares
    pub size: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Numeric exchange id as reported by the feed
    pub exchange: u8,
}

impl TradePrint {
    /// Single-letter exchange code ('A' for id 1, 'B' for id 2, ...)
    pub fn exchange_code(&self) -> char {
        char::from(64u8.saturating_add(self.exchange))
    }
}

/// Convert a finite float from the wire into a decimal.
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if value.is_finite() {
        Decimal::from_f64(value)
    } else {
        None
    }
}

pub fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

/// Nanosecond source ticks truncated to millisecond resolution.
pub fn nanos_to_datetime(ns: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ns.div_euclid(1_000_000))
}
