//! Error types for the market feature pipeline

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Insufficient {what}: {got} provided, need at least {need}")]
    InsufficientData {
        what: &'static str,
        got: usize,
        need: usize,
    },

    #[error("Feature/label length mismatch: {features} features, {labels} labels")]
    LengthMismatch { features: usize, labels: usize },

    #[error("Bar/book length mismatch: {bars} bars, {books} book snapshots")]
    SnapshotMismatch { bars: usize, books: usize },

    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),

    #[error("No message received for {silent_ms}ms")]
    StaleConnection { silent_ms: u64 },

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("Historical data error: {0}")]
    HistoricalData(String),

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Worker task failed: {0}")]
    WorkerFailed(String),
}

impl PipelineError {
    /// Transport failures are recovered by reconnecting, never surfaced as fatal.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            PipelineError::WebSocketConnection(_)
                | PipelineError::AuthenticationRejected(_)
                | PipelineError::StaleConnection { .. }
                | PipelineError::ConnectionTimeout
        )
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::HistoricalData(err.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::IpcError(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for PipelineError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        PipelineError::WorkerFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
