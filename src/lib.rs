//! Market Features - streaming order books to model-ready feature sequences
//!
//! This crate maintains live per-symbol order books from a quote/trade feed and
//! turns bars plus book state into fixed-dimension feature vectors, forward-return
//! labels and lookback sequences, identically for historical and live data.

use std::sync::Arc;
use tokio::sync::RwLock;

pub mod config;
pub mod error;
pub mod features;
pub mod historical;
pub mod market;
pub mod orderbook;
pub mod parser;
pub mod pipeline;
pub mod publisher;
pub mod telemetry;
pub mod trades;
pub mod websocket;

#[cfg(test)]
mod testutil;

pub use config::{Config, SessionConfig};
pub use error::{PipelineError, Result};
pub use features::{
    FeatureConfig, FeatureEngine, FeatureName, FeatureVector, Label, LabelConfig, Labeler,
    SequenceBatch, SequenceBuilder, TemporalAligner, LOOKBACK,
};
pub use historical::{HistoricalSource, PolygonClient};
pub use market::{Bar, Quote, TradePrint};
pub use orderbook::{OrderBook, OrderBookFeatures, OrderBookState, OrderBookStore};
pub use parser::{ParsedFrame, StreamEvent};
pub use pipeline::{BatchPipeline, LiveFeatureWorker, LiveFrame};
pub use publisher::Publisher;
pub use telemetry::PipelineMetrics;
pub use trades::TradeHistory;
pub use websocket::{SessionState, SessionStatus, StreamSession, WebSocketConnector};

/// Application state shared across components
pub struct AppState {
    pub store: Arc<RwLock<OrderBookStore>>,
    pub trades: Arc<RwLock<TradeHistory>>,
    pub publisher: Arc<Publisher>,
    pub config: Arc<Config>,
    pub status: Arc<SessionStatus>,
    pub metrics: Arc<PipelineMetrics>,
}
