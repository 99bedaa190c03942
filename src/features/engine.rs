//! Feature engine
//!
//! Computes the 10-dimension feature vector per bar. Batch mode derives each
//! bar's book from the quotes in its trailing window; live mode takes the store's
//! current snapshot. Both feed the same per-bar function.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::aligner::TemporalAligner;
use super::fallback;
use super::indicators::{IndicatorParams, IndicatorSeries};
use super::FeatureVector;
use crate::error::{PipelineError, Result};
use crate::market::{Bar, Quote, BAR_INTERVAL_MS};
use crate::orderbook::{OrderBook, OrderBookFeatures, DEFAULT_DEPTH};

/// Feature engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Bars required before any vector is produced
    pub min_bars: usize,

    /// Quotes required for batch computation
    pub min_quotes: usize,

    /// Trailing quote window per bar in milliseconds
    pub quote_window_ms: i64,

    /// Level cap of the per-window books
    pub book_depth: usize,

    pub indicators: IndicatorParams,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            min_bars: 30,
            min_quotes: 30,
            quote_window_ms: BAR_INTERVAL_MS,
            book_depth: DEFAULT_DEPTH,
            indicators: IndicatorParams::default(),
        }
    }
}

/// Bar + book → feature vector
#[derive(Debug, Clone)]
pub struct FeatureEngine {
    config: FeatureConfig,
    aligner: TemporalAligner,
}

impl FeatureEngine {
    pub fn new(config: FeatureConfig) -> Self {
        let aligner = TemporalAligner::new(config.quote_window_ms);
        Self { config, aligner }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// One vector per bar, each bar's book rebuilt from its quote window
    pub fn compute_batch(&self, bars: &[Bar], quotes: &[Quote]) -> Result<Vec<FeatureVector>> {
        self.require_bars(bars)?;
        if quotes.len() < self.config.min_quotes {
            return Err(PipelineError::InsufficientData {
                what: "quotes",
                got: quotes.len(),
                need: self.config.min_quotes,
            });
        }

        let aligned = self.aligner.align(bars, quotes);
        let books: Vec<OrderBookFeatures> = aligned
            .iter()
            .map(|(_, window)| {
                OrderBook::from_quotes("", window, self.config.book_depth).features()
            })
            .collect();

        self.compute_with_books(bars, &books)
    }

    /// One vector per bar from caller-supplied book snapshots (`books[i]` for `bars[i]`)
    pub fn compute_with_books(
        &self,
        bars: &[Bar],
        books: &[OrderBookFeatures],
    ) -> Result<Vec<FeatureVector>> {
        self.require_bars(bars)?;
        if books.len() != bars.len() {
            return Err(PipelineError::SnapshotMismatch {
                bars: bars.len(),
                books: books.len(),
            });
        }

        let series = IndicatorSeries::compute(bars, &self.config.indicators);
        let vectors: Vec<FeatureVector> = bars
            .iter()
            .zip(books)
            .enumerate()
            .map(|(i, (bar, book))| feature_vector(bar, &series, i, book))
            .collect();

        debug!(bars = bars.len(), "Computed feature vectors");
        Ok(vectors)
    }

    /// Vector for the newest bar using a live book snapshot
    pub fn compute_live(&self, bars: &[Bar], book: &OrderBookFeatures) -> Result<FeatureVector> {
        self.require_bars(bars)?;
        let series = IndicatorSeries::compute(bars, &self.config.indicators);
        let last = bars.len() - 1;
        Ok(feature_vector(&bars[last], &series, last, book))
    }

    fn require_bars(&self, bars: &[Bar]) -> Result<()> {
        let need = self.config.min_bars.max(1);
        if bars.len() < need {
            return Err(PipelineError::InsufficientData {
                what: "bars",
                got: bars.len(),
                need,
            });
        }
        Ok(())
    }
}

/// The only place fallback values are applied
fn feature_vector(
    bar: &Bar,
    series: &IndicatorSeries,
    i: usize,
    book: &OrderBookFeatures,
) -> FeatureVector {
    let vwap = if bar.vwap.is_finite() && bar.vwap > 0.0 {
        bar.vwap
    } else {
        bar.close
    };
    let two_sided = book.is_two_sided();

    let atr = series.atr[i];
    let atr_normalized = match atr {
        Some(a) => fallback::ratio_or(a, vwap, fallback::ATR / 100.0) * 100.0,
        None => fallback::ATR,
    };
    let raw_atr = atr.unwrap_or(fallback::ATR);

    FeatureVector {
        vwap_ratio: fallback::ratio_or(bar.close, vwap, fallback::VWAP_RATIO),
        rsi3: series.rsi[i].map_or(fallback::RSI, |v| fallback::finite_or(v, fallback::RSI)),
        macd_hist: series.macd_hist[i]
            .map_or(fallback::MACD_HIST, |v| fallback::finite_or(v, fallback::MACD_HIST)),
        volume_z: series.volume_z[i]
            .map_or(fallback::VOLUME_Z, |v| fallback::finite_or(v, fallback::VOLUME_Z)),
        order_book_spread: if two_sided {
            fallback::ratio_or(book.spread, vwap, fallback::ORDER_BOOK_SPREAD)
        } else {
            fallback::ORDER_BOOK_SPREAD
        },
        depth_imbalance: if book.is_empty() {
            fallback::DEPTH_IMBALANCE
        } else {
            fallback::finite_or(book.depth_imbalance, fallback::DEPTH_IMBALANCE)
        },
        pressure_ratio: if two_sided {
            fallback::finite_or(book.pressure, fallback::PRESSURE_RATIO)
        } else {
            fallback::PRESSURE_RATIO
        },
        mid_price_ratio: if two_sided {
            fallback::ratio_or(bar.close, book.mid_price, fallback::MID_PRICE_RATIO)
        } else {
            fallback::MID_PRICE_RATIO
        },
        atr: fallback::round4(atr_normalized),
        volatility: fallback::volatility(bar.high - bar.low, raw_atr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::OrderBookStore;
    use crate::testutil::{bars as make_bars, quotes as make_quotes};

    fn engine() -> FeatureEngine {
        FeatureEngine::new(FeatureConfig::default())
    }

    #[test]
    fn test_insufficient_bars_fails() {
        let bars = make_bars(10);
        let quotes = make_quotes(&bars);
        let err = engine().compute_batch(&bars, &quotes).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientData { what: "bars", got: 10, need: 30 }
        ));
    }

    #[test]
    fn test_insufficient_quotes_fails() {
        let bars = make_bars(40);
        let quotes: Vec<Quote> = make_quotes(&bars).into_iter().take(5).collect();
        let err = engine().compute_batch(&bars, &quotes).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { what: "quotes", .. }));
    }

    #[test]
    fn test_batch_vectors_are_finite_with_fallbacks() {
        let bars = make_bars(40);
        let quotes = make_quotes(&bars);
        let vectors = engine().compute_batch(&bars, &quotes).unwrap();

        assert_eq!(vectors.len(), 40);
        assert!(vectors.iter().all(FeatureVector::is_finite));

        // Warm-up fallbacks
        assert_eq!(vectors[0].rsi3, 50.0);
        assert_eq!(vectors[0].macd_hist, 0.0);
        assert_eq!(vectors[0].volume_z, 0.0);
        assert_eq!(vectors[0].atr, 0.01);
        assert_eq!(vectors[4].atr, 0.01);
        assert_ne!(vectors[5].atr, 0.01);
        assert_ne!(vectors[30].macd_hist, 0.0);

        // Window book: bid 300 at t-30s replaced by bid 200 at t-10s, ask 100
        let v = vectors[10];
        assert!((v.pressure_ratio - 2.0).abs() < 1e-12);
        assert!((v.depth_imbalance - 1.0 / 3.0).abs() < 1e-12);
        assert!(v.volatility >= 0.1 && v.volatility <= 10.0);
    }

    #[test]
    fn test_empty_window_uses_book_fallbacks() {
        let bars = make_bars(30);
        let far_quotes: Vec<Quote> = make_quotes(&bars)
            .into_iter()
            .map(|mut q| {
                q.timestamp = q.timestamp - chrono::Duration::days(1);
                q
            })
            .collect();

        let vectors = engine().compute_batch(&bars, &far_quotes).unwrap();
        let v = vectors[20];
        assert_eq!(v.order_book_spread, fallback::ORDER_BOOK_SPREAD);
        assert_eq!(v.depth_imbalance, fallback::DEPTH_IMBALANCE);
        assert_eq!(v.pressure_ratio, fallback::PRESSURE_RATIO);
        assert_eq!(v.mid_price_ratio, fallback::MID_PRICE_RATIO);
    }

    #[test]
    fn test_book_count_must_match_bars() {
        let bars = make_bars(40);
        let books = vec![OrderBookFeatures::empty(); 39];
        let err = engine().compute_with_books(&bars, &books).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::SnapshotMismatch { bars: 40, books: 39 }
        ));
    }

    #[test]
    fn test_zero_vwap_defaults_to_close() {
        let mut bars = make_bars(30);
        bars[29].vwap = 0.0;
        let vector = engine()
            .compute_live(&bars, &OrderBookFeatures::empty())
            .unwrap();
        assert_eq!(vector.vwap_ratio, 1.0);
    }

    #[test]
    fn test_batch_and_live_are_bit_identical() {
        let bars = make_bars(45);
        let quotes = make_quotes(&bars);
        let engine = engine();
        let batch = engine.compute_batch(&bars, &quotes).unwrap();

        let last = bars.last().unwrap();
        let mut live_quotes: Vec<&Quote> = quotes
            .iter()
            .filter(|q| {
                q.timestamp > last.time - chrono::Duration::milliseconds(60_000)
                    && q.timestamp <= last.time
            })
            .collect();
        live_quotes.sort_by_key(|q| q.timestamp);

        let mut store = OrderBookStore::with_depth(engine.config().book_depth);
        for q in live_quotes {
            store.apply_quote("SPY", q);
        }
        let live = engine.compute_live(&bars, &store.snapshot("SPY")).unwrap();

        let batch_bits = batch.last().unwrap().to_array().map(f64::to_bits);
        let live_bits = live.to_array().map(f64::to_bits);
        assert_eq!(batch_bits, live_bits);
    }

    #[test]
    fn test_configurable_minimums() {
        let config = FeatureConfig {
            min_bars: 1,
            min_quotes: 0,
            ..FeatureConfig::default()
        };
        let bars = make_bars(1);
        let vectors = FeatureEngine::new(config).compute_batch(&bars, &[]).unwrap();
        assert_eq!(vectors.len(), 1);
        assert!(vectors[0].is_finite());
    }
}
