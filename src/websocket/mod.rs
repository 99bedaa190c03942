//! Stream session: transport, heartbeat and the connection state machine

mod client;
mod heartbeat;
mod session;

pub use client::WebSocketConnector;
pub use heartbeat::{HeartbeatMonitor, ReconnectPolicy};
pub use session::{BarEvent, StreamSession};

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{PipelineError, Result};

/// What a transport hands the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame
    Frame(String),
    /// The transport is gone; carries the reason
    Closed(String),
}

/// One open duplex connection.
///
/// Frames are read from `inbound` and written to `outbound`; dropping the
/// connection aborts its I/O tasks and closes the socket.
pub struct Connection {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::Receiver<TransportEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::Receiver<TransportEvent>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            tasks: Vec::new(),
        }
    }

    /// Tie background I/O tasks to the connection's lifetime
    pub fn with_tasks(mut self, tasks: Vec<JoinHandle<()>>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn send(&self, text: String) -> Result<()> {
        self.outbound
            .send(text)
            .map_err(|_| PipelineError::WebSocketConnection("Outbound channel closed".to_string()))
    }

    /// Next event; a vanished transport reads as `Closed`
    pub async fn recv(&mut self) -> TransportEvent {
        self.inbound
            .recv()
            .await
            .unwrap_or_else(|| TransportEvent::Closed("Transport dropped".to_string()))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Opens connections to the market-data feed
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Connection>;
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    Connecting = 1,
    Authenticating = 2,
    Subscribed = 3,
    Live = 4,
    Reconnecting = 5,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Connecting,
            2 => SessionState::Authenticating,
            3 => SessionState::Subscribed,
            4 => SessionState::Live,
            5 => SessionState::Reconnecting,
            _ => SessionState::Disconnected,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Subscribed => "subscribed",
            SessionState::Live => "live",
            SessionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Lock-free view of the session, shared with the health endpoint
#[derive(Debug)]
pub struct SessionStatus {
    epoch: Instant,
    state: AtomicU8,
    connection_id: AtomicU64,
    reconnect_attempts: AtomicU32,
    last_message_ms: AtomicU64,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStatus {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            state: AtomicU8::new(SessionState::Disconnected as u8),
            connection_id: AtomicU64::new(0),
            reconnect_attempts: AtomicU32::new(0),
            last_message_ms: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id.load(Ordering::Acquire)
    }

    /// Allocate the id of a new connection
    pub fn next_connection(&self) -> u64 {
        self.connection_id.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Total reconnects since start; never reset
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Acquire)
    }

    pub fn record_reconnect(&self) -> u32 {
        self.reconnect_attempts.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Note inbound activity
    pub fn touch(&self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.last_message_ms.store(now, Ordering::Release);
    }

    /// Time since the last inbound message (or since start)
    pub fn silence(&self) -> std::time::Duration {
        let now = self.epoch.elapsed().as_millis() as u64;
        let last = self.last_message_ms.load(Ordering::Acquire);
        std::time::Duration::from_millis(now.saturating_sub(last))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            connection_id: self.connection_id(),
            reconnect_attempts: self.reconnect_attempts(),
            silent_ms: self.silence().as_millis() as u64,
        }
    }
}

/// Serializable copy of [`SessionStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub connection_id: u64,
    pub reconnect_attempts: u32,
    pub silent_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_state_round_trips_through_atomic() {
        let status = SessionStatus::new();
        assert_eq!(status.state(), SessionState::Disconnected);
        for state in [
            SessionState::Connecting,
            SessionState::Authenticating,
            SessionState::Subscribed,
            SessionState::Live,
            SessionState::Reconnecting,
        ] {
            status.set_state(state);
            assert_eq!(status.state(), state);
        }
    }

    #[test]
    fn test_counters_are_monotonic() {
        let status = SessionStatus::new();
        assert_eq!(status.next_connection(), 1);
        assert_eq!(status.next_connection(), 2);
        assert_eq!(status.record_reconnect(), 1);
        assert_eq!(status.reconnect_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_tracks_last_touch() {
        let status = SessionStatus::new();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(status.silence(), Duration::from_secs(10));

        status.touch();
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(status.silence(), Duration::from_millis(1500));
        assert_eq!(status.snapshot().silent_ms, 1500);
    }

    #[tokio::test]
    async fn test_connection_reports_closed_when_transport_drops() {
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::channel(4);
        let mut conn = Connection::new(out_tx, in_rx);

        in_tx.send(TransportEvent::Frame("[]".to_string())).await.unwrap();
        drop(in_tx);

        assert_eq!(conn.recv().await, TransportEvent::Frame("[]".to_string()));
        assert!(matches!(conn.recv().await, TransportEvent::Closed(_)));
    }
}
