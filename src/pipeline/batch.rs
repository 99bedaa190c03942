//! Historical batch pipeline

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::features::{
    FeatureConfig, FeatureEngine, LabelConfig, Labeler, SequenceBatch, SequenceBuilder,
};
use crate::historical::HistoricalSource;
use crate::market::{Bar, Quote};
use crate::telemetry::PipelineMetrics;

/// Fetch → align → features → labels → sequences, one symbol at a time
pub struct BatchPipeline<S> {
    source: Arc<S>,
    engine: FeatureEngine,
    labeler: Labeler,
    builder: SequenceBuilder,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl<S> Clone for BatchPipeline<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            engine: self.engine.clone(),
            labeler: self.labeler.clone(),
            builder: self.builder,
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: HistoricalSource + 'static> BatchPipeline<S> {
    pub fn new(
        source: Arc<S>,
        features: FeatureConfig,
        labels: LabelConfig,
        lookback: usize,
    ) -> Self {
        Self {
            source,
            engine: FeatureEngine::new(features),
            labeler: Labeler::new(labels),
            builder: SequenceBuilder::new(lookback),
            metrics: None,
        }
    }

    pub fn from_config(source: Arc<S>, config: &Config) -> Self {
        Self::new(
            source,
            config.features.clone(),
            config.labels.clone(),
            config.lookback,
        )
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build every sequence for one symbol over `[start, end]`
    pub async fn build(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SequenceBatch> {
        let (bars, quotes) = tokio::join!(
            self.source.fetch_bars(symbol, start, end),
            self.source.fetch_quotes(symbol, start, end),
        );
        let (bars, quotes) = (bars?, quotes?);
        info!(
            symbol = %symbol,
            bars = bars.len(),
            quotes = quotes.len(),
            "Historical data loaded"
        );

        let engine = self.engine.clone();
        let labeler = self.labeler.clone();
        let builder = self.builder;
        let owned_symbol = symbol.to_string();
        let vector_count = bars.len();
        let batch = tokio::task::spawn_blocking(move || {
            build_sequences(&engine, &labeler, &builder, &owned_symbol, &bars, &quotes)
        })
        .await??;

        if let Some(metrics) = &self.metrics {
            metrics.feature_vectors.inc_by(vector_count as u64);
            metrics.sequences_emitted.inc_by(batch.len() as u64);
        }
        info!(symbol = %symbol, sequences = batch.len(), "Sequences built");
        Ok(batch)
    }

    /// Build several symbols concurrently; results come back in completion order
    pub async fn build_many(
        &self,
        symbols: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<(String, Result<SequenceBatch>)> {
        let mut tasks = JoinSet::new();
        for symbol in symbols {
            let pipeline = self.clone();
            let symbol = symbol.clone();
            tasks.spawn(async move {
                let result = pipeline.build(&symbol, start, end).await;
                (symbol, result)
            });
        }

        let mut results = Vec::with_capacity(symbols.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((symbol, result)) => {
                    if let Err(e) = &result {
                        warn!(symbol = %symbol, error = %e, "Batch build failed");
                    }
                    results.push((symbol, result));
                }
                Err(e) => warn!(error = %e, "Batch task panicked"),
            }
        }
        results
    }
}

/// CPU-bound part of the batch pipeline
pub fn build_sequences(
    engine: &FeatureEngine,
    labeler: &Labeler,
    builder: &SequenceBuilder,
    symbol: &str,
    bars: &[Bar],
    quotes: &[Quote],
) -> Result<SequenceBatch> {
    let features = engine.compute_batch(bars, quotes)?;
    let labels = labeler.labels(bars);
    let sequences = builder.build(&features, &labels)?;
    Ok(SequenceBatch::from_sequences(symbol, sequences))
}
