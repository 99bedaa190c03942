//! Order book module
//!
//! Reconstructs per-symbol price-level books from top-of-book quote updates.

mod book;
mod snapshot;
mod store;

pub use book::OrderBook;
pub use snapshot::OrderBookFeatures;
pub use store::{OrderBookStore, DEFAULT_DEPTH};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

/// A single aggregated level in the order book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Materialized order book view for publishing and health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookState {
    pub symbol: String,
    /// Last quote time in milliseconds since the epoch
    pub last_update_ms: Option<i64>,
    /// Set after a reconnect until the next quote for this symbol arrives
    pub stale: bool,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub features: OrderBookFeatures,
}
