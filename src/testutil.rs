//! Synthetic market data for unit tests

use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::market::{millis_to_datetime, Bar, Quote};

pub const T0: i64 = 1_700_000_000_000;

/// `n` one-minute bars oscillating around 100 with a slight drift
pub fn bars(n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.7).sin() * 2.0 + i as f64 * 0.05;
            Bar {
                time: millis_to_datetime(T0 + i as i64 * 60_000).unwrap(),
                open: close - 0.1,
                high: close + 0.4,
                low: close - 0.3,
                close,
                volume: 10_000.0 + ((i * 37) % 11) as f64 * 500.0,
                vwap: close - 0.05,
                trades: 120,
            }
        })
        .collect()
}

/// Two quotes inside every bar's trailing window, at t-10s and t-30s.
///
/// The earlier quote bids 300 shares and the later one 200, both one cent
/// either side of the close; asks are always 100 shares.
pub fn quotes(bars: &[Bar]) -> Vec<Quote> {
    bars.iter()
        .flat_map(|bar| {
            let mid = Decimal::from_f64_retain(bar.close)
                .unwrap_or(dec!(100))
                .round_dp(2);
            [(10_000i64, 200i64), (30_000, 300)]
                .into_iter()
                .enumerate()
                .map(move |(k, (offset, bid_size))| Quote {
                    timestamp: bar.time - Duration::milliseconds(offset),
                    bid_price: mid - dec!(0.01),
                    bid_size: Decimal::from(bid_size),
                    ask_price: mid + dec!(0.01),
                    ask_size: dec!(100),
                    sequence: k as u64,
                    tape: 1,
                })
        })
        .collect()
}
