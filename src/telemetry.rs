//! Prometheus metrics for the session and the pipelines

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Counters and gauges on a private registry
#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Registry,
    pub stream_messages: IntCounter,
    pub quotes_applied: IntCounter,
    pub trades_recorded: IntCounter,
    pub dropped_records: IntCounter,
    pub unknown_events: IntCounter,
    pub reconnects: IntCounter,
    pub feature_vectors: IntCounter,
    pub sequences_emitted: IntCounter,
    pub session_state: IntGauge,
}

impl PipelineMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let stream_messages = counter("stream_messages_total", "Inbound stream frames")?;
        let quotes_applied = counter("quotes_applied_total", "Quotes applied to order books")?;
        let trades_recorded = counter("trades_recorded_total", "Trades recorded")?;
        let dropped_records =
            counter("dropped_records_total", "Malformed packets or records dropped")?;
        let unknown_events = counter("unknown_events_total", "Packets with an unhandled event tag")?;
        let reconnects = counter("reconnects_total", "Stream reconnect attempts")?;
        let feature_vectors = counter("feature_vectors_total", "Feature vectors computed")?;
        let sequences_emitted = counter("sequences_emitted_total", "Model sequences emitted")?;

        let session_state = IntGauge::new(
            "session_state",
            "Stream session state (0 disconnected .. 5 reconnecting)",
        )?;
        registry.register(Box::new(session_state.clone()))?;

        Ok(Self {
            registry,
            stream_messages,
            quotes_applied,
            trades_recorded,
            dropped_records,
            unknown_events,
            reconnects,
            feature_vectors,
            sequences_emitted,
            session_state,
        })
    }

    /// Prometheus text exposition of every metric
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
