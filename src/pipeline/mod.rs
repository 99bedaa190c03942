//! Pipelines from market data to model input
//!
//! `batch` turns a historical range into labelled sequences; `live` turns the
//! stream's minute bars and book snapshots into feature frames.

mod batch;
mod live;

pub use batch::{build_sequences, BatchPipeline};
pub use live::{LiveFeatureWorker, LiveFrame, BAR_HISTORY};
