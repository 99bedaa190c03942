//! Lookback sequences for model input

use serde::{Deserialize, Serialize};

use super::{FeatureVector, Label};
use crate::error::{PipelineError, Result};

/// Feature vectors per sequence
pub const LOOKBACK: usize = 60;

/// A borrowed window of `lookback` vectors and the label of the bar after it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sequence<'a> {
    pub x: &'a [FeatureVector],
    pub y: Label,
}

impl Sequence<'_> {
    pub fn to_record(&self) -> SequenceRecord {
        SequenceRecord {
            x: self.x.to_vec(),
            y: self.y,
        }
    }
}

/// Owned sequence, serialized as `{ "x": [[f64; 10]; lookback], "y": u8 }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub x: Vec<FeatureVector>,
    pub y: Label,
}

/// All sequences built for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceBatch {
    pub symbol: String,
    pub sequences: Vec<SequenceRecord>,
}

impl SequenceBatch {
    pub fn from_sequences(symbol: impl Into<String>, sequences: Sequences<'_>) -> Self {
        Self {
            symbol: symbol.into(),
            sequences: sequences.map(|s| s.to_record()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SequenceBuilder {
    lookback: usize,
}

impl Default for SequenceBuilder {
    fn default() -> Self {
        Self::new(LOOKBACK)
    }
}

impl SequenceBuilder {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback: lookback.max(1),
        }
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// Windows `features[i - lookback..i]` labelled `labels[i]` for every
    /// `i` in `lookback..len`. Nothing is copied until the caller asks.
    pub fn build<'a>(
        &self,
        features: &'a [FeatureVector],
        labels: &'a [Label],
    ) -> Result<Sequences<'a>> {
        if features.len() != labels.len() {
            return Err(PipelineError::LengthMismatch {
                features: features.len(),
                labels: labels.len(),
            });
        }
        Ok(Sequences {
            features,
            labels,
            lookback: self.lookback,
            next: self.lookback,
        })
    }
}

/// Lazy iterator over sequences; clone it to restart from the beginning
#[derive(Debug, Clone)]
pub struct Sequences<'a> {
    features: &'a [FeatureVector],
    labels: &'a [Label],
    lookback: usize,
    next: usize,
}

impl<'a> Sequences<'a> {
    /// Fresh iterator over the same inputs
    pub fn restart(&self) -> Self {
        Self {
            next: self.lookback,
            ..self.clone()
        }
    }
}

impl<'a> Iterator for Sequences<'a> {
    type Item = Sequence<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let i = self.next;
        if i >= self.features.len() {
            return None;
        }
        self.next += 1;
        Some(Sequence {
            x: &self.features[i - self.lookback..i],
            y: self.labels[i],
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.features.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Sequences<'_> {}
