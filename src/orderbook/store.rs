//! Order book store
//!
//! Owns the books for every symbol seen on the feed.

use std::collections::HashMap;

use super::{OrderBook, OrderBookFeatures, OrderBookState, PriceLevel, Side};
use crate::market::Quote;

/// Default per-side level cap
pub const DEFAULT_DEPTH: usize = 50;

/// Manages order books for multiple symbols
#[derive(Debug)]
pub struct OrderBookStore {
    books: HashMap<String, OrderBook>,
    max_depth: usize,
}

impl Default for OrderBookStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBookStore {
    /// Create a new order book store
    pub fn new() -> Self {
        Self::with_depth(DEFAULT_DEPTH)
    }

    /// Create with custom depth
    pub fn with_depth(max_depth: usize) -> Self {
        Self {
            books: HashMap::new(),
            max_depth,
        }
    }

    /// Apply a quote to the symbol's book, creating the book on first sight
    pub fn apply_quote(&mut self, symbol: &str, quote: &Quote) {
        let max_depth = self.max_depth;
        self.books
            .entry(symbol.to_string())
            .or_insert_with(|| OrderBook::new(symbol, max_depth))
            .apply_quote(quote);
    }

    /// Current features for a symbol; an unknown symbol reads as an empty book
    pub fn snapshot(&self, symbol: &str) -> OrderBookFeatures {
        self.books
            .get(symbol)
            .map(|book| book.features())
            .unwrap_or_else(OrderBookFeatures::empty)
    }

    /// Levels of one side for a symbol, best first
    pub fn sorted_levels(&self, symbol: &str, side: Side) -> Vec<PriceLevel> {
        self.books
            .get(symbol)
            .map(|book| book.sorted_levels(side))
            .unwrap_or_default()
    }

    pub fn book(&self, symbol: &str) -> Option<&OrderBook> {
        self.books.get(symbol)
    }

    /// Get the state of a specific book
    pub fn get_state(&self, symbol: &str) -> Option<OrderBookState> {
        self.books.get(symbol).map(|book| book.state())
    }

    /// Get states of all books
    pub fn get_all_states(&self) -> Vec<OrderBookState> {
        self.books.values().map(|book| book.state()).collect()
    }

    /// Keep every level but flag all books as stale, e.g. after a reconnect
    pub fn mark_all_stale(&mut self) {
        for book in self.books.values_mut() {
            book.mark_stale();
        }
    }

    /// Get list of symbols being tracked
    pub fn symbols(&self) -> Vec<String> {
        self.books.keys().cloned().collect()
    }

    /// Check if a symbol exists
    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.books.contains_key(symbol)
    }
}
