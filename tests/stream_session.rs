//! Stream session behaviour against a scripted in-process feed

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use market_features::websocket::{Connection, Connector, TransportEvent};
use market_features::{PipelineMetrics, Result, SessionConfig, SessionState, StreamSession};

/// Answers control frames the way the feed does, then stays silent
#[derive(Clone)]
struct ScriptedFeed {
    connects: Arc<AtomicUsize>,
    auth_reply: &'static str,
    after_subscribe: Vec<&'static str>,
}

impl ScriptedFeed {
    fn new(auth_reply: &'static str) -> Self {
        Self {
            connects: Arc::new(AtomicUsize::new(0)),
            auth_reply,
            after_subscribe: Vec::new(),
        }
    }

    fn then_send(mut self, frame: &'static str) -> Self {
        self.after_subscribe.push(frame);
        self
    }
}

#[async_trait]
impl Connector for ScriptedFeed {
    async fn connect(&self, _endpoint: &str) -> Result<Connection> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::channel(64);
        let auth_reply = self.auth_reply;
        let after_subscribe = self.after_subscribe.clone();

        let server = tokio::spawn(async move {
            let _ = in_tx
                .send(TransportEvent::Frame(
                    r#"[{"ev":"status","status":"connected","message":"Connected Successfully"}]"#
                        .to_string(),
                ))
                .await;

            while let Some(text) = out_rx.recv().await {
                let control: serde_json::Value = serde_json::from_str(&text).unwrap();
                match control["action"].as_str() {
                    Some("auth") => {
                        let _ = in_tx.send(TransportEvent::Frame(auth_reply.to_string())).await;
                    }
                    Some("subscribe") => {
                        let _ = in_tx
                            .send(TransportEvent::Frame(
                                r#"[{"ev":"status","status":"success","message":"subscribed"}]"#
                                    .to_string(),
                            ))
                            .await;
                        for frame in &after_subscribe {
                            let _ = in_tx.send(TransportEvent::Frame(frame.to_string())).await;
                        }
                    }
                    _ => {}
                }
            }
        });

        Ok(Connection::new(out_tx, in_rx).with_tasks(vec![server]))
    }
}

const AUTH_OK: &str = r#"[{"ev":"status","status":"auth_success","message":"authenticated"}]"#;
const AUTH_FAILED: &str = r#"[{"ev":"status","status":"auth_failed","message":"authentication failed"}]"#;

fn session_config() -> SessionConfig {
    SessionConfig {
        api_key: "test-key".to_string(),
        ws_endpoint: "ws://feed.invalid".to_string(),
        symbols: vec!["SPY".to_string()],
        ..SessionConfig::default()
    }
}

fn metrics() -> Arc<PipelineMetrics> {
    Arc::new(PipelineMetrics::new().unwrap())
}

#[tokio::test(start_paused = true)]
async fn test_silent_feed_reconnects_once_after_stale_window() {
    let feed = ScriptedFeed::new(AUTH_OK);
    let connects = feed.connects.clone();
    let metrics = metrics();
    let mut session = StreamSession::new(feed, session_config(), metrics.clone());
    let status = session.status();
    tokio::spawn(async move { session.run().await });

    // Subscribed at 1.5s, still within the 30s window at 31s
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(status.state(), SessionState::Live);
    assert_eq!(status.reconnect_attempts(), 0);
    assert_eq!(connects.load(Ordering::SeqCst), 1);

    // Stale check fires on the next heartbeat, then one backoff step
    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(status.reconnect_attempts(), 1);
    assert_eq!(metrics.reconnects.get(), 1);
    assert_eq!(connects.load(Ordering::SeqCst), 2);
    assert_eq!(status.connection_id(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_credential_backs_off_exponentially() {
    let feed = ScriptedFeed::new(AUTH_FAILED);
    let connects = feed.connects.clone();
    let mut session = StreamSession::new(feed, session_config(), metrics());
    let status = session.status();
    tokio::spawn(async move { session.run().await });

    // Attempts at 0s, 1s and 3s; the next one waits until 7s
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(connects.load(Ordering::SeqCst), 3);
    assert_eq!(status.reconnect_attempts(), 3);
    assert_eq!(status.state(), SessionState::Reconnecting);
}

#[tokio::test(start_paused = true)]
async fn test_quotes_trades_and_bars_are_dispatched() {
    let feed = ScriptedFeed::new(AUTH_OK)
        .then_send(
            r#"[{"ev":"Q","sym":"spy","bp":100.0,"bs":2,"ap":100.02,"as":3,"t":1700000000000},
                {"ev":"T","sym":"SPY","p":100.01,"s":1,"t":1700000000100},
                {"ev":"XQ","sym":"SPY"},
                {"ev":"Q","sym":"SPY"}]"#,
        )
        .then_send(
            r#"[{"ev":"AM","sym":"SPY","o":100.0,"h":100.1,"l":99.9,"c":100.05,"v":12000,"vw":100.02,"s":1699999980000,"n":40}]"#,
        );
    let metrics = metrics();
    let (bar_tx, mut bar_rx) = mpsc::channel(8);
    let mut session =
        StreamSession::new(feed, session_config(), metrics.clone()).with_bar_sink(bar_tx);
    let status = session.status();
    let store = session.store();
    let trades = session.trades();
    tokio::spawn(async move { session.run().await });

    let event = bar_rx.recv().await.unwrap();
    assert_eq!(event.symbol, "SPY");
    assert_eq!(event.bar.close, 100.05);
    assert_eq!(event.bar.time.timestamp_millis(), 1_699_999_980_000);

    assert_eq!(status.state(), SessionState::Live);

    let book = store.read().await.snapshot("SPY");
    assert!((book.spread - 0.02).abs() < 1e-9);
    assert_eq!(book.bid_depth, 200.0);
    assert_eq!(book.ask_depth, 300.0);

    let trades = trades.read().await;
    assert_eq!(trades.last("SPY").map(|t| t.price), Some(100.01));

    assert_eq!(metrics.quotes_applied.get(), 1);
    assert_eq!(metrics.trades_recorded.get(), 1);
    assert_eq!(metrics.unknown_events.get(), 1);
    assert_eq!(metrics.dropped_records.get(), 1);
}
