//! Core order book implementation
//!
//! Uses BTreeMap for efficient sorted price level management.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use super::{OrderBookFeatures, OrderBookState, PriceLevel, Side};
use crate::market::Quote;

/// Order book for a single symbol
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: String,
    /// Bids sorted by price descending (highest first)
    bids: BTreeMap<Reverse<Decimal>, Decimal>,
    /// Asks sorted by price ascending (lowest first)
    asks: BTreeMap<Decimal, Decimal>,
    /// Maximum depth levels to maintain per side
    max_depth: usize,
    /// Timestamp of the last applied quote
    last_update: Option<DateTime<Utc>>,
    /// Number of quotes applied
    updates: u64,
    stale: bool,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new(symbol: &str, max_depth: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            max_depth: max_depth.max(1),
            last_update: None,
            updates: 0,
            stale: false,
        }
    }

    /// Build a book by replaying quotes in order
    pub fn from_quotes<'a>(
        symbol: &str,
        quotes: impl IntoIterator<Item = &'a Quote>,
        max_depth: usize,
    ) -> Self {
        let mut book = Self::new(symbol, max_depth);
        for quote in quotes {
            book.apply_quote(quote);
        }
        book
    }

    /// Apply both sides of a quote.
    ///
    /// A non-positive size removes the level at that price. A new level on one
    /// side removes any level on the other side it would cross.
    pub fn apply_quote(&mut self, quote: &Quote) {
        self.update_side(Side::Bid, quote.bid_price, quote.bid_size);
        self.update_side(Side::Ask, quote.ask_price, quote.ask_size);

        self.last_update = Some(match self.last_update {
            Some(prev) if prev > quote.timestamp => prev,
            _ => quote.timestamp,
        });
        self.updates += 1;
        self.stale = false;
        self.trim_depth();
    }

    /// Update a single price level
    fn update_side(&mut self, side: Side, price: Decimal, size: Decimal) {
        if price <= Decimal::ZERO {
            return;
        }

        match side {
            Side::Bid => {
                if size <= Decimal::ZERO {
                    self.bids.remove(&Reverse(price));
                } else {
                    while let Some((&ask, _)) = self.asks.first_key_value() {
                        if ask > price {
                            break;
                        }
                        self.asks.pop_first();
                    }
                    self.bids.insert(Reverse(price), size);
                }
            }
            Side::Ask => {
                if size <= Decimal::ZERO {
                    self.asks.remove(&price);
                } else {
                    while let Some((&Reverse(bid), _)) = self.bids.first_key_value() {
                        if bid < price {
                            break;
                        }
                        self.bids.pop_first();
                    }
                    self.asks.insert(price, size);
                }
            }
        }
    }

    /// Trim the book to max depth
    fn trim_depth(&mut self) {
        while self.bids.len() > self.max_depth {
            self.bids.pop_last();
        }
        while self.asks.len() > self.max_depth {
            self.asks.pop_last();
        }
    }

    /// Get best bid (price, size)
    pub fn best_bid(&self) -> Option<(Decimal, Decimal)> {
        self.bids.first_key_value().map(|(Reverse(p), s)| (*p, *s))
    }

    /// Get best ask (price, size)
    pub fn best_ask(&self) -> Option<(Decimal, Decimal)> {
        self.asks.first_key_value().map(|(p, s)| (*p, *s))
    }

    /// Levels of one side, best first
    pub fn sorted_levels(&self, side: Side) -> Vec<PriceLevel> {
        match side {
            Side::Bid => self
                .bids
                .iter()
                .map(|(Reverse(p), s)| PriceLevel {
                    price: *p,
                    size: *s,
                })
                .collect(),
            Side::Ask => self
                .asks
                .iter()
                .map(|(p, s)| PriceLevel {
                    price: *p,
                    size: *s,
                })
                .collect(),
        }
    }

    /// Total bid size, saturating at `Decimal::MAX`
    pub fn bid_depth(&self) -> Decimal {
        self.bids
            .values()
            .fold(Decimal::ZERO, |acc, size| acc.saturating_add(*size))
    }

    /// Total ask size, saturating at `Decimal::MAX`
    pub fn ask_depth(&self) -> Decimal {
        self.asks
            .values()
            .fold(Decimal::ZERO, |acc, size| acc.saturating_add(*size))
    }

    /// Compute spread, mid price, depth imbalance and pressure
    pub fn features(&self) -> OrderBookFeatures {
        if self.bids.is_empty() && self.asks.is_empty() {
            return OrderBookFeatures::empty();
        }

        let (bid_price, bid_size) = self.best_bid().unwrap_or((Decimal::ONE, Decimal::ONE));
        let (ask_price, ask_size) = self.best_ask().unwrap_or((Decimal::ONE, Decimal::ONE));

        let bid_depth = self.bid_depth();
        let ask_depth = self.ask_depth();
        let depth_imbalance = match bid_depth.checked_add(ask_depth) {
            Some(total) if total > Decimal::ZERO => {
                checked_ratio(bid_depth - ask_depth, total, 0.0)
            }
            Some(_) => 0.0,
            None => float_ratio(
                to_f64(bid_depth) - to_f64(ask_depth),
                to_f64(bid_depth) + to_f64(ask_depth),
                0.0,
            ),
        };
        let mid_price = match bid_price.checked_add(ask_price) {
            Some(sum) => to_f64(sum / Decimal::from(2)),
            None => (to_f64(bid_price) + to_f64(ask_price)) / 2.0,
        };

        OrderBookFeatures {
            spread: to_f64(ask_price - bid_price),
            mid_price,
            depth_imbalance,
            pressure: checked_ratio(bid_size, ask_size, 1.0),
            bid_depth: to_f64(bid_depth),
            ask_depth: to_f64(ask_depth),
            bid_levels: self.bids.len(),
            ask_levels: self.asks.len(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn update_count(&self) -> u64 {
        self.updates
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Flag the book as possibly out of date without discarding its levels
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Get current state for publishing
    pub fn state(&self) -> OrderBookState {
        OrderBookState {
            symbol: self.symbol.clone(),
            last_update_ms: self.last_update.map(|t| t.timestamp_millis()),
            stale: self.stale,
            bids: self.sorted_levels(Side::Bid),
            asks: self.sorted_levels(Side::Ask),
            features: self.features(),
        }
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// `num / den` in decimal, in floating point when the quotient overflows
fn checked_ratio(num: Decimal, den: Decimal, fallback: f64) -> f64 {
    match num.checked_div(den) {
        Some(ratio) => to_f64(ratio),
        None => float_ratio(to_f64(num), to_f64(den), fallback),
    }
}

fn float_ratio(num: f64, den: f64, fallback: f64) -> f64 {
    let ratio = num / den;
    if ratio.is_finite() {
        ratio
    } else {
        fallback
    }
}
