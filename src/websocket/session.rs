//! Stream session state machine
//!
//! `Disconnected → Connecting → Authenticating → Subscribed → Live`, and on any
//! transport failure or a silent feed `→ Reconnecting → Connecting`. Frames are
//! handled strictly in arrival order on the session task.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, trace, warn};

use super::heartbeat::{HeartbeatMonitor, ReconnectPolicy};
use super::{Connection, Connector, SessionState, SessionStatus, TransportEvent};
use crate::config::SessionConfig;
use crate::error::{PipelineError, Result};
use crate::market::Bar;
use crate::orderbook::OrderBookStore;
use crate::parser::{ControlFrame, ParsedFrame, StatusKind, StreamEvent};
use crate::telemetry::PipelineMetrics;
use crate::trades::TradeHistory;

/// Minute bar forwarded to the live pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct BarEvent {
    pub symbol: String,
    pub bar: Bar,
}

/// Owns the feed connection and keeps the shared market state current
pub struct StreamSession<C: Connector> {
    connector: C,
    config: SessionConfig,
    policy: ReconnectPolicy,
    store: Arc<RwLock<OrderBookStore>>,
    trades: Arc<RwLock<TradeHistory>>,
    status: Arc<SessionStatus>,
    metrics: Arc<PipelineMetrics>,
    bars: Option<mpsc::Sender<BarEvent>>,
    consecutive_failures: u32,
}

impl<C: Connector> StreamSession<C> {
    pub fn new(connector: C, config: SessionConfig, metrics: Arc<PipelineMetrics>) -> Self {
        let policy = ReconnectPolicy::new(config.reconnect_delay, config.max_backoff);
        Self {
            connector,
            config,
            policy,
            store: Arc::new(RwLock::new(OrderBookStore::new())),
            trades: Arc::new(RwLock::new(TradeHistory::default())),
            status: Arc::new(SessionStatus::new()),
            metrics,
            bars: None,
            consecutive_failures: 0,
        }
    }

    pub fn with_store(mut self, store: Arc<RwLock<OrderBookStore>>) -> Self {
        self.store = store;
        self
    }

    pub fn with_trades(mut self, trades: Arc<RwLock<TradeHistory>>) -> Self {
        self.trades = trades;
        self
    }

    pub fn with_status(mut self, status: Arc<SessionStatus>) -> Self {
        self.status = status;
        self
    }

    /// Forward minute bars to a consumer
    pub fn with_bar_sink(mut self, bars: mpsc::Sender<BarEvent>) -> Self {
        self.bars = Some(bars);
        self
    }

    pub fn store(&self) -> Arc<RwLock<OrderBookStore>> {
        self.store.clone()
    }

    pub fn trades(&self) -> Arc<RwLock<TradeHistory>> {
        self.trades.clone()
    }

    pub fn status(&self) -> Arc<SessionStatus> {
        self.status.clone()
    }

    /// Run forever, reconnecting on every transport failure
    pub async fn run(&mut self) {
        info!(
            symbols = ?self.config.symbols,
            channels = ?self.config.channels,
            "Starting stream session"
        );

        loop {
            let reason = match self.run_connection().await {
                Ok(()) => PipelineError::WebSocketConnection("Session ended".to_string()),
                Err(e) => e,
            };
            if reason.is_transport() {
                warn!(error = %reason, "Stream connection lost");
            } else {
                error!(error = %reason, "Stream session error");
            }
            self.reconnect().await;
        }
    }

    async fn reconnect(&mut self) {
        self.set_state(SessionState::Reconnecting);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let attempts = self.status.record_reconnect();
        self.metrics.reconnects.inc();

        // Books stay usable but are flagged until their next quote
        self.store.write().await.mark_all_stale();

        let delay = self.policy.delay(self.consecutive_failures);
        warn!(
            attempt = attempts,
            consecutive_failures = self.consecutive_failures,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting..."
        );
        sleep(delay).await;
    }

    /// One connection from open to failure
    async fn run_connection(&mut self) -> Result<()> {
        self.set_state(SessionState::Connecting);
        let connection_id = self.status.next_connection();

        let mut conn = timeout(
            self.config.connect_timeout,
            self.connector.connect(&self.config.ws_endpoint),
        )
        .await
        .map_err(|_| PipelineError::ConnectionTimeout)??;
        self.status.touch();

        self.set_state(SessionState::Authenticating);
        conn.send(ControlFrame::Auth(self.config.api_key.clone()).to_json()?)?;
        timeout(self.config.connect_timeout, self.await_auth(&mut conn))
            .await
            .map_err(|_| PipelineError::ConnectionTimeout)??;
        info!(connection_id, "Authenticated");

        // The feed drops subscriptions sent too soon after auth
        sleep(self.config.subscribe_delay).await;
        let subscriptions = self.config.subscriptions();
        conn.send(ControlFrame::subscribe(&subscriptions).to_json()?)?;
        self.set_state(SessionState::Subscribed);
        info!(
            connection_id,
            count = subscriptions.len(),
            "Subscription sent"
        );

        let status = self.status.clone();
        let mut heartbeat =
            HeartbeatMonitor::new(self.config.heartbeat_interval, self.config.stale_after);
        loop {
            tokio::select! {
                event = conn.recv() => match event {
                    TransportEvent::Frame(raw) => self.handle_frame(&raw).await?,
                    TransportEvent::Closed(reason) => {
                        return Err(PipelineError::WebSocketConnection(reason));
                    }
                },
                silence = heartbeat.tick(&status) => {
                    if let Some(silence) = silence {
                        warn!(
                            connection_id,
                            silent_ms = silence.as_millis() as u64,
                            "No message received within heartbeat window"
                        );
                        return Err(PipelineError::StaleConnection {
                            silent_ms: silence.as_millis() as u64,
                        });
                    }
                }
            }
        }
    }

    /// Read frames until the feed accepts or rejects the credential.
    /// Data arriving before that is discarded.
    async fn await_auth(&self, conn: &mut Connection) -> Result<()> {
        loop {
            let raw = match conn.recv().await {
                TransportEvent::Frame(raw) => raw,
                TransportEvent::Closed(reason) => {
                    return Err(PipelineError::WebSocketConnection(reason));
                }
            };
            self.status.touch();
            self.metrics.stream_messages.inc();

            let frame = match ParsedFrame::parse(&raw) {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(error = %e, "Unparsable frame during authentication");
                    self.metrics.dropped_records.inc();
                    continue;
                }
            };
            for event in frame.events {
                match event {
                    StreamEvent::Status(status) => match status.kind() {
                        StatusKind::AuthSuccess => return Ok(()),
                        StatusKind::AuthFailed => {
                            return Err(PipelineError::AuthenticationRejected(status.message));
                        }
                        _ => debug!(status = %status.status, message = %status.message, "Status"),
                    },
                    other => trace!(event = ?other, "Ignoring event before authentication"),
                }
            }
        }
    }

    async fn handle_frame(&mut self, raw: &str) -> Result<()> {
        self.status.touch();
        self.metrics.stream_messages.inc();

        let frame = match ParsedFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "Dropping unparsable frame");
                self.metrics.dropped_records.inc();
                return Ok(());
            }
        };
        self.metrics.dropped_records.inc_by(frame.dropped as u64);

        for event in frame.events {
            match event {
                StreamEvent::Quote { symbol, quote } => {
                    self.store.write().await.apply_quote(&symbol, &quote);
                    self.metrics.quotes_applied.inc();
                    self.go_live();
                }
                StreamEvent::Trade { symbol, trade } => {
                    trace!(
                        symbol = %symbol,
                        price = trade.price,
                        size = trade.size,
                        "Trade received"
                    );
                    self.trades.write().await.record(&symbol, trade);
                    self.metrics.trades_recorded.inc();
                    self.go_live();
                }
                StreamEvent::Bar { symbol, bar } => {
                    if let Some(tx) = &self.bars {
                        if let Err(e) = tx.try_send(BarEvent { symbol, bar }) {
                            warn!(error = %e, "Bar consumer not keeping up, dropping bar");
                            self.metrics.dropped_records.inc();
                        }
                    }
                    self.go_live();
                }
                StreamEvent::Status(status) => match status.kind() {
                    StatusKind::Success => {
                        debug!(message = %status.message, "Subscription acknowledged");
                        self.go_live();
                    }
                    StatusKind::AuthFailed => {
                        return Err(PipelineError::AuthenticationRejected(status.message));
                    }
                    _ => debug!(status = %status.status, message = %status.message, "Status"),
                },
                StreamEvent::Unknown(tag) => {
                    warn!(ev = %tag, "Unknown event type");
                    self.metrics.unknown_events.inc();
                }
            }
        }
        Ok(())
    }

    fn go_live(&mut self) {
        if self.status.state() == SessionState::Subscribed {
            self.set_state(SessionState::Live);
            self.consecutive_failures = 0;
            info!(connection_id = self.status.connection_id(), "Stream live");
        }
    }

    fn set_state(&self, state: SessionState) {
        self.status.set_state(state);
        self.metrics.session_state.set(state as i64);
    }
}
