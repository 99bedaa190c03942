//! Bounded per-symbol trade history

use std::collections::{HashMap, VecDeque};

use crate::market::TradePrint;

/// Trades kept per symbol
pub const TRADE_HISTORY_CAPACITY: usize = 10;

/// Most recent trades per symbol, oldest dropped first
#[derive(Debug)]
pub struct TradeHistory {
    trades: HashMap<String, VecDeque<TradePrint>>,
    capacity: usize,
}

impl Default for TradeHistory {
    fn default() -> Self {
        Self::new(TRADE_HISTORY_CAPACITY)
    }
}

impl TradeHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            trades: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, symbol: &str, trade: TradePrint) {
        let capacity = self.capacity;
        let history = self
            .trades
            .entry(symbol.to_string())
            .or_insert_with(|| VecDeque::with_capacity(capacity));
        if history.len() == capacity {
            history.pop_front();
        }
        history.push_back(trade);
    }

    /// Trades for a symbol, oldest first
    pub fn recent(&self, symbol: &str) -> Vec<TradePrint> {
        self.trades
            .get(symbol)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn last(&self, symbol: &str) -> Option<&TradePrint> {
        self.trades.get(symbol).and_then(|h| h.back())
    }

    /// Sum of sizes over the retained trades
    pub fn recent_volume(&self, symbol: &str) -> f64 {
        self.trades
            .get(symbol)
            .map(|h| h.iter().map(|t| t.size).sum())
            .unwrap_or(0.0)
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.trades.get(symbol).map_or(0, VecDeque::len)
    }
}
