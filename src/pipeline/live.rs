//! Live feature worker
//!
//! Consumes minute bars from the stream session and computes the newest feature
//! vector against the current book snapshot of the same symbol.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::features::{FeatureEngine, FeatureVector};
use crate::market::Bar;
use crate::orderbook::OrderBookStore;
use crate::telemetry::PipelineMetrics;
use crate::websocket::BarEvent;

/// Bars retained per symbol for indicator history
pub const BAR_HISTORY: usize = 500;

/// Newest features for one symbol, plus the model window once it is full
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveFrame {
    pub symbol: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    pub features: FeatureVector,
    pub window_ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<Vec<FeatureVector>>,
}

#[derive(Debug, Default)]
struct SymbolState {
    bars: VecDeque<Bar>,
    vectors: VecDeque<FeatureVector>,
}

pub struct LiveFeatureWorker {
    engine: FeatureEngine,
    store: Arc<RwLock<OrderBookStore>>,
    lookback: usize,
    symbols: HashMap<String, SymbolState>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl LiveFeatureWorker {
    pub fn new(engine: FeatureEngine, store: Arc<RwLock<OrderBookStore>>, lookback: usize) -> Self {
        Self {
            engine,
            store,
            lookback: lookback.max(1),
            symbols: HashMap::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Process bars until the session drops its sender or the consumer goes away
    pub async fn run(
        mut self,
        mut bars: mpsc::Receiver<BarEvent>,
        frames: mpsc::Sender<LiveFrame>,
    ) {
        info!(lookback = self.lookback, "Live feature worker started");
        while let Some(event) = bars.recv().await {
            match self.on_bar(event).await {
                Ok(Some(frame)) => {
                    if frames.send(frame).await.is_err() {
                        warn!("Frame consumer closed, stopping live worker");
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Live feature computation failed"),
            }
        }
        info!("Bar stream closed, live worker exiting");
    }

    /// Record a bar and compute its frame; `None` while history is still short
    pub async fn on_bar(&mut self, event: BarEvent) -> Result<Option<LiveFrame>> {
        let BarEvent { symbol, bar } = event;
        let time = bar.time;
        let state = self.symbols.entry(symbol.clone()).or_default();

        let min_bars = self.engine.config().min_bars;

        match state.bars.back().map(|last| last.time) {
            Some(last) if time < last => {
                debug!(symbol = %symbol, "Ignoring out-of-order bar");
                return Ok(None);
            }
            // A corrected aggregate for the same minute replaces the previous one
            Some(last) if time == last => {
                if state.bars.len() >= min_bars {
                    state.vectors.pop_back();
                }
                state.bars.pop_back();
            }
            _ => {}
        }
        if state.bars.len() == BAR_HISTORY {
            state.bars.pop_front();
        }
        state.bars.push_back(bar);

        if state.bars.len() < min_bars {
            debug!(
                symbol = %symbol,
                bars = state.bars.len(),
                need = min_bars,
                "Warming up"
            );
            return Ok(None);
        }

        let book = self.store.read().await.snapshot(&symbol);
        let features = self.engine.compute_live(state.bars.make_contiguous(), &book)?;

        if state.vectors.len() == self.lookback {
            state.vectors.pop_front();
        }
        state.vectors.push_back(features);
        let window_ready = state.vectors.len() == self.lookback;

        if let Some(metrics) = &self.metrics {
            metrics.feature_vectors.inc();
            if window_ready {
                metrics.sequences_emitted.inc();
            }
        }

        Ok(Some(LiveFrame {
            symbol,
            time,
            features,
            window_ready,
            window: window_ready.then(|| state.vectors.iter().copied().collect()),
        }))
    }
}
