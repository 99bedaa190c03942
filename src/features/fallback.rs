//! Fallback values for undefined features
//!
//! Every degenerate case in feature computation resolves to one of these
//! constants, so a vector never carries NaN or infinity.

/// Close / VWAP when neither is usable
pub const VWAP_RATIO: f64 = 1.0;

/// RSI before enough closes are available
pub const RSI: f64 = 50.0;

/// MACD histogram before the signal line is defined
pub const MACD_HIST: f64 = 0.0;

/// Volume z-score with short history or flat volume
pub const VOLUME_Z: f64 = 0.0;

/// Spread / VWAP when the window has no two-sided book
pub const ORDER_BOOK_SPREAD: f64 = 0.01;

/// Depth imbalance of an empty window
pub const DEPTH_IMBALANCE: f64 = 0.0;

/// Best bid size / best ask size when either side is empty
pub const PRESSURE_RATIO: f64 = 1.0;

/// Close / mid price when the mid price is unavailable
pub const MID_PRICE_RATIO: f64 = 1.0;

/// ATR (raw and normalized) before the first full period
pub const ATR: f64 = 0.01;

pub const VOLATILITY_MIN: f64 = 0.1;
pub const VOLATILITY_MAX: f64 = 10.0;

/// `value` if finite, otherwise `fallback`
pub fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// `num / den`, or `fallback` when the denominator is zero or the result is not finite
pub fn ratio_or(num: f64, den: f64, fallback: f64) -> f64 {
    if den == 0.0 || !den.is_finite() {
        return fallback;
    }
    finite_or(num / den, fallback)
}

/// (high - low) / ATR clamped to [0.1, 10]
pub fn volatility(range: f64, atr: f64) -> f64 {
    let raw = range / atr;
    if raw.is_nan() {
        VOLATILITY_MIN
    } else {
        raw.clamp(VOLATILITY_MIN, VOLATILITY_MAX)
    }
}

/// Round to 4 decimal places
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
