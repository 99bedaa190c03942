//! Feature and label generation
//!
//! Turns aligned bars and quotes into fixed-order feature vectors, forward-return
//! labels and fixed-length lookback sequences for the downstream model.

mod aligner;
mod engine;
pub mod fallback;
pub mod indicators;
mod labels;
mod sequence;
pub mod stats;

pub use aligner::{AlignedSeries, TemporalAligner};
pub use engine::{FeatureConfig, FeatureEngine};
pub use labels::{Label, LabelConfig, Labeler};
pub use sequence::{Sequence, SequenceBatch, SequenceBuilder, SequenceRecord, Sequences, LOOKBACK};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of features per vector
pub const FEATURE_COUNT: usize = 10;

/// Stable feature enumeration. Reordering is a breaking change for consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureName {
    VwapRatio,
    Rsi3,
    MacdHist,
    VolumeZ,
    OrderBookSpread,
    DepthImbalance,
    PressureRatio,
    MidPriceRatio,
    Atr,
    Volatility,
}

impl FeatureName {
    pub const ALL: [FeatureName; FEATURE_COUNT] = [
        FeatureName::VwapRatio,
        FeatureName::Rsi3,
        FeatureName::MacdHist,
        FeatureName::VolumeZ,
        FeatureName::OrderBookSpread,
        FeatureName::DepthImbalance,
        FeatureName::PressureRatio,
        FeatureName::MidPriceRatio,
        FeatureName::Atr,
        FeatureName::Volatility,
    ];

    /// Position in the serialized vector
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureName::VwapRatio => "vwapRatio",
            FeatureName::Rsi3 => "rsi3",
            FeatureName::MacdHist => "macdHist",
            FeatureName::VolumeZ => "volumeZ",
            FeatureName::OrderBookSpread => "orderBookSpread",
            FeatureName::DepthImbalance => "depthImbalance",
            FeatureName::PressureRatio => "pressureRatio",
            FeatureName::MidPriceRatio => "midPriceRatio",
            FeatureName::Atr => "atr",
            FeatureName::Volatility => "volatility",
        }
    }
}

/// One bar's features
///
/// Serialized as a plain array in [`FeatureName::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub vwap_ratio: f64,
    pub rsi3: f64,
    pub macd_hist: f64,
    pub volume_z: f64,
    pub order_book_spread: f64,
    pub depth_imbalance: f64,
    pub pressure_ratio: f64,
    pub mid_price_ratio: f64,
    pub atr: f64,
    pub volatility: f64,
}

impl FeatureVector {
    pub fn get(&self, name: FeatureName) -> f64 {
        self.to_array()[name.index()]
    }

    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.vwap_ratio,
            self.rsi3,
            self.macd_hist,
            self.volume_z,
            self.order_book_spread,
            self.depth_imbalance,
            self.pressure_ratio,
            self.mid_price_ratio,
            self.atr,
            self.volatility,
        ]
    }

    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        let [
            vwap_ratio,
            rsi3,
            macd_hist,
            volume_z,
            order_book_spread,
            depth_imbalance,
            pressure_ratio,
            mid_price_ratio,
            atr,
            volatility,
        ] = values;
        Self {
            vwap_ratio,
            rsi3,
            macd_hist,
            volume_z,
            order_book_spread,
            depth_imbalance,
            pressure_ratio,
            mid_price_ratio,
            atr,
            volatility,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_array().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FeatureVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        <[f64; FEATURE_COUNT]>::deserialize(deserializer).map(Self::from_array)
    }
}
