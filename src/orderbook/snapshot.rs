//! Order book feature snapshot

use serde::{Deserialize, Serialize};

/// Derived top-of-book metrics, recomputed per query
///
/// When a side is empty its best price and size default to 1 so the ratios stay
/// finite. Such values are low confidence; check [`OrderBookFeatures::is_two_sided`]
/// before relying on spread, mid price or pressure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookFeatures {
    /// Best ask minus best bid
    pub spread: f64,

    /// Average of best bid and best ask
    pub mid_price: f64,

    /// (bid_depth - ask_depth) / (bid_depth + ask_depth), in [-1, 1]
    pub depth_imbalance: f64,

    /// Best bid size / best ask size
    pub pressure: f64,

    /// Total bid size across all levels
    pub bid_depth: f64,

    /// Total ask size across all levels
    pub ask_depth: f64,

    pub bid_levels: usize,
    pub ask_levels: usize,
}

impl OrderBookFeatures {
    /// Snapshot of a book with no levels on either side
    pub fn empty() -> Self {
        Self {
            spread: 0.0,
            mid_price: 1.0,
            depth_imbalance: 0.0,
            pressure: 1.0,
            bid_depth: 0.0,
            ask_depth: 0.0,
            bid_levels: 0,
            ask_levels: 0,
        }
    }

    /// Both sides have at least one level
    pub fn is_two_sided(&self) -> bool {
        self.bid_levels > 0 && self.ask_levels > 0
    }

    pub fn is_empty(&self) -> bool {
        self.bid_levels == 0 && self.ask_levels == 0
    }
}

impl Default for OrderBookFeatures {
    fn default() -> Self {
        Self::empty()
    }
}
