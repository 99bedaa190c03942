//! Forward-return labels

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::market::Bar;

/// Three-class direction of the forward return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Label {
    Down = 0,
    Flat = 1,
    Up = 2,
}

impl From<Label> for u8 {
    fn from(label: Label) -> Self {
        label as u8
    }
}

impl TryFrom<u8> for Label {
    type Error = PipelineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Label::Down),
            1 => Ok(Label::Flat),
            2 => Ok(Label::Up),
            other => Err(PipelineError::ParseError(format!("invalid label {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Bars ahead used for the forward return
    pub horizon: usize,

    /// Returns strictly above this are `Up`
    pub up_threshold: f64,

    /// Returns strictly below this are `Down`
    pub down_threshold: f64,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            horizon: 3,
            up_threshold: 0.005,
            down_threshold: -0.003,
        }
    }
}

/// Labels every bar from the close `horizon` bars ahead.
///
/// Bars without a bar `horizon` steps ahead (the tail of the series) are `Flat`.
#[derive(Debug, Clone, Default)]
pub struct Labeler {
    config: LabelConfig,
}

impl Labeler {
    pub fn new(config: LabelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LabelConfig {
        &self.config
    }

    /// Classify a single forward return
    pub fn classify(&self, forward_return: f64) -> Label {
        if forward_return > self.config.up_threshold {
            Label::Up
        } else if forward_return < self.config.down_threshold {
            Label::Down
        } else {
            Label::Flat
        }
    }

    pub fn label_at(&self, bars: &[Bar], i: usize) -> Label {
        let Some(future) = bars.get(i + self.config.horizon) else {
            return Label::Flat;
        };
        let now = bars[i].close;
        if !(now.is_finite() && now > 0.0 && future.close.is_finite()) {
            return Label::Flat;
        }
        self.classify((future.close - now) / now)
    }

    /// One label per bar
    pub fn labels(&self, bars: &[Bar]) -> Vec<Label> {
        (0..bars.len()).map(|i| self.label_at(bars, i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::millis_to_datetime;

    fn bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                time: millis_to_datetime(1_700_000_000_000 + i as i64 * 60_000).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1_000.0,
                vwap: close,
                trades: 5,
            })
            .collect()
    }

    #[test]
    fn test_forward_return_classes() {
        let labeler = Labeler::default();
        let up = bars(&[100.0, 100.0, 100.0, 100.6]);
        let down = bars(&[100.0, 100.0, 100.0, 99.6]);
        let flat = bars(&[100.0, 100.0, 100.0, 100.2]);

        assert_eq!(labeler.label_at(&up, 0), Label::Up);
        assert_eq!(labeler.label_at(&down, 0), Label::Down);
        assert_eq!(labeler.label_at(&flat, 0), Label::Flat);
    }

    #[test]
    fn test_thresholds_are_strict() {
        let labeler = Labeler::default();
        assert_eq!(labeler.classify(0.005), Label::Flat);
        assert_eq!(labeler.classify(-0.003), Label::Flat);
        assert_eq!(labeler.classify(0.0051), Label::Up);
        assert_eq!(labeler.classify(-0.0031), Label::Down);
    }

    #[test]
    fn test_trailing_bars_are_flat() {
        let labeler = Labeler::default();
        let series = bars(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
        let labels = labeler.labels(&series);

        assert_eq!(labels.len(), 6);
        // Leading bars use the generic rule
        assert_eq!(&labels[..3], &[Label::Up, Label::Up, Label::Up]);
        assert_eq!(&labels[3..], &[Label::Flat, Label::Flat, Label::Flat]);
    }

    #[test]
    fn test_label_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Label::Up).unwrap(), "2");
        let label: Label = serde_json::from_str("0").unwrap();
        assert_eq!(label, Label::Down);
        assert!(serde_json::from_str::<Label>("3").is_err());
    }
}
