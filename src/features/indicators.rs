//! Technical indicators
//!
//! Each indicator is an incremental state machine fed one bar at a time. The
//! batch path folds the whole series through the same state machines, so a
//! streaming consumer reproduces the identical numeric series bar for bar.

use serde::{Deserialize, Serialize};

use super::stats::{mean, stddev, STDDEV_FLOOR};
use crate::market::Bar;

/// Indicator periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub volume_window: usize,
    pub atr_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: 3,
            macd_fast: 3,
            macd_slow: 10,
            macd_signal: 16,
            volume_window: 20,
            atr_period: 5,
        }
    }
}

/// Exponential moving average seeded with the SMA of the first `window` samples.
///
/// After the seed, value = α·x + (1−α)·prev with α = 2/(window+1).
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    window: usize,
    sum: f64,
    count: usize,
    value: Option<f64>,
}

impl Ema {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            alpha: 2.0 / (window as f64 + 1.0),
            window,
            sum: 0.0,
            count: 0,
            value: None,
        }
    }

    /// Feed one sample; `None` until `window` samples have been seen
    pub fn update(&mut self, x: f64) -> Option<f64> {
        let next = match self.value {
            Some(prev) => self.alpha * x + (1.0 - self.alpha) * prev,
            None => {
                self.sum += x;
                self.count += 1;
                if self.count < self.window {
                    return None;
                }
                self.sum / self.window as f64
            }
        };
        self.value = Some(next);
        self.value
    }

    pub fn is_warm(&self) -> bool {
        self.value.is_some()
    }
}

/// RSI with Wilder smoothing of average gain and loss
#[derive(Debug, Clone)]
pub struct Rsi {
    window: usize,
    prev_close: Option<f64>,
    avg_gain: f64,
    avg_loss: f64,
    count: usize,
    value: Option<f64>,
}

impl Rsi {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            prev_close: None,
            avg_gain: 0.0,
            avg_loss: 0.0,
            count: 0,
            value: None,
        }
    }

    /// Feed one close; `None` until `window` price changes have been seen.
    /// Non-finite closes are skipped.
    pub fn update(&mut self, close: f64) -> Option<f64> {
        if !close.is_finite() {
            return self.value;
        }
        let Some(prev) = self.prev_close.replace(close) else {
            return None;
        };

        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        let w = self.window as f64;

        self.count += 1;
        if self.count < self.window {
            self.avg_gain += gain;
            self.avg_loss += loss;
            return None;
        }
        if self.count == self.window {
            self.avg_gain = (self.avg_gain + gain) / w;
            self.avg_loss = (self.avg_loss + loss) / w;
        } else {
            self.avg_gain = (self.avg_gain * (w - 1.0) + gain) / w;
            self.avg_loss = (self.avg_loss * (w - 1.0) + loss) / w;
        }

        let rsi = if self.avg_loss == 0.0 {
            if self.avg_gain == 0.0 {
                50.0
            } else {
                100.0
            }
        } else {
            let rs = self.avg_gain / self.avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        };
        self.value = Some(rsi);
        self.value
    }
}

/// MACD histogram = MACD line − signal line
///
/// The MACD line exists once both EMAs are seeded. The signal EMA is fed MACD
/// line values only, so the histogram first appears `signal - 1` bars later.
#[derive(Debug, Clone)]
pub struct Macd {
    ema_fast: Ema,
    ema_slow: Ema,
    ema_signal: Ema,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            ema_fast: Ema::new(fast),
            ema_slow: Ema::new(slow),
            ema_signal: Ema::new(signal),
        }
    }

    pub fn update(&mut self, close: f64) -> Option<f64> {
        let fast = self.ema_fast.update(close);
        let slow = self.ema_slow.update(close);
        let line = fast? - slow?;
        let signal = self.ema_signal.update(line)?;
        Some(line - signal)
    }
}

/// Average True Range with Wilder smoothing
#[derive(Debug, Clone)]
pub struct Atr {
    window: usize,
    prev_close: Option<f64>,
    sum: f64,
    count: usize,
    value: f64,
}

impl Atr {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            prev_close: None,
            sum: 0.0,
            count: 0,
            value: 0.0,
        }
    }

    /// Feed one bar; `None` until `window` true ranges have been seen.
    ///
    /// The first bar has no previous close and so no true range.
    pub fn update(&mut self, high: f64, low: f64, close: f64) -> Option<f64> {
        let prev = self.prev_close.replace(close)?;
        let tr = (high - low)
            .max((high - prev).abs())
            .max((low - prev).abs());
        self.count += 1;

        let w = self.window as f64;
        if self.count < self.window {
            self.sum += tr;
            return None;
        }
        if self.count == self.window {
            self.value = (self.sum + tr) / w;
        } else {
            self.value = (self.value * (w - 1.0) + tr) / w;
        }
        Some(self.value)
    }
}

/// Z-score of the latest volume against a trailing window
///
/// `None` before the window fills or when the window's volume is flat.
pub fn volume_zscore(window: &[f64]) -> Option<f64> {
    let latest = *window.last()?;
    let sd = stddev(window);
    if sd < STDDEV_FLOOR {
        return None;
    }
    Some((latest - mean(window)) / sd)
}

/// All indicator series for one bar sequence, index-aligned with the bars
#[derive(Debug, Clone, Default)]
pub struct IndicatorSeries {
    pub rsi: Vec<Option<f64>>,
    pub macd_hist: Vec<Option<f64>>,
    pub volume_z: Vec<Option<f64>>,
    pub atr: Vec<Option<f64>>,
}

impl IndicatorSeries {
    /// Compute every series in one pass over the bars
    pub fn compute(bars: &[Bar], params: &IndicatorParams) -> Self {
        let mut rsi = Rsi::new(params.rsi_period);
        let mut macd = Macd::new(params.macd_fast, params.macd_slow, params.macd_signal);
        let mut atr = Atr::new(params.atr_period);
        let volume_window = params.volume_window.max(2);
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

        let mut series = IndicatorSeries {
            rsi: Vec::with_capacity(bars.len()),
            macd_hist: Vec::with_capacity(bars.len()),
            volume_z: Vec::with_capacity(bars.len()),
            atr: Vec::with_capacity(bars.len()),
        };

        for (i, bar) in bars.iter().enumerate() {
            series.rsi.push(rsi.update(bar.close));
            series.macd_hist.push(macd.update(bar.close));
            series.atr.push(atr.update(bar.high, bar.low, bar.close));
            series.volume_z.push(if i + 1 >= volume_window {
                volume_zscore(&volumes[i + 1 - volume_window..=i])
            } else {
                None
            });
        }
        series
    }

    pub fn len(&self) -> usize {
        self.rsi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rsi.is_empty()
    }
}
