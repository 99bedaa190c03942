//! Market Features - feature service
//!
//! Keeps live order books from the quote/trade feed, computes feature frames on
//! every minute bar and publishes them to the model over IPC. With
//! `batch <from> <to>` (dates as YYYY-MM-DD) it instead builds labelled training
//! sequences from historical data and publishes one batch per symbol.

use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{mpsc, RwLock};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use market_features::{
    AppState, BatchPipeline, Config, FeatureEngine, LiveFeatureWorker, OrderBookStore,
    PipelineMetrics, PolygonClient, Publisher, SessionState, SessionStatus, StreamSession,
    TradeHistory, WebSocketConnector,
};

/// Bars and frames buffered between the session, the worker and the publisher
const CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting market feature service");

    let config = Arc::new(Config::load()?);
    info!(
        symbols = ?config.session.symbols,
        lookback = config.lookback,
        "Configuration loaded"
    );

    let metrics = Arc::new(PipelineMetrics::new()?);
    let publisher = Arc::new(Publisher::new(&config.ipc_socket_path).await);

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("batch") {
        return run_batch(&config, metrics, publisher, &args[1..]).await;
    }

    let store = Arc::new(RwLock::new(OrderBookStore::with_depth(
        config.features.book_depth,
    )));
    let trades = Arc::new(RwLock::new(TradeHistory::default()));
    let status = Arc::new(SessionStatus::new());

    let state = Arc::new(AppState {
        store: store.clone(),
        trades: trades.clone(),
        publisher: publisher.clone(),
        config: config.clone(),
        status: status.clone(),
        metrics: metrics.clone(),
    });

    // Start health check server
    let health_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state).await {
            warn!(error = %e, "Health server error");
        }
    });

    // Live features: session → bars → worker → frames → publisher
    let (bar_tx, bar_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (frame_tx, mut frame_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let worker = LiveFeatureWorker::new(
        FeatureEngine::new(config.features.clone()),
        store.clone(),
        config.lookback,
    )
    .with_metrics(metrics.clone());
    tokio::spawn(worker.run(bar_rx, frame_tx));

    let frame_publisher = publisher.clone();
    tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if let Err(e) = frame_publisher.publish(&frame).await {
                warn!(error = %e, symbol = %frame.symbol, "Failed to publish frame");
            }
        }
    });

    let mut session = StreamSession::new(WebSocketConnector, config.session.clone(), metrics)
        .with_store(store)
        .with_trades(trades)
        .with_status(status)
        .with_bar_sink(bar_tx);

    tokio::select! {
        _ = session.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received");
        }
    }

    Ok(())
}

async fn run_batch(
    config: &Config,
    metrics: Arc<PipelineMetrics>,
    publisher: Arc<Publisher>,
    args: &[String],
) -> anyhow::Result<()> {
    let (start, end) = match args {
        [from, to] => (parse_day(from)?, parse_day(to)?),
        _ => anyhow::bail!("usage: market-features batch <from YYYY-MM-DD> <to YYYY-MM-DD>"),
    };
    let end = end + chrono::Duration::days(1) - chrono::Duration::milliseconds(1);

    let source = Arc::new(PolygonClient::new(
        &config.rest_endpoint,
        &config.session.api_key,
    ));
    let pipeline = BatchPipeline::from_config(source, config).with_metrics(metrics);

    for (symbol, result) in pipeline
        .build_many(&config.session.symbols, start, end)
        .await
    {
        match result {
            Ok(batch) => {
                info!(symbol = %symbol, sequences = batch.len(), "Publishing sequence batch");
                publisher.publish(&batch).await?;
            }
            Err(e) => warn!(symbol = %symbol, error = %e, "Skipping symbol"),
        }
    }
    Ok(())
}

fn parse_day(value: &str) -> anyhow::Result<DateTime<Utc>> {
    let day = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid date {}", value))?;
    day.and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
        .context("invalid start of day")
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(state: Arc<AppState>) -> anyhow::Result<()> {
    use std::net::SocketAddr;

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.health_port));
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let session = state.status.snapshot();
    let health = if session.state == SessionState::Live {
        "healthy"
    } else {
        "degraded"
    };

    let trades = state.trades.read().await;
    let books: Vec<serde_json::Value> = state
        .store
        .read()
        .await
        .get_all_states()
        .into_iter()
        .map(|book| {
            serde_json::json!({
                "stale": book.stale,
                "last_update_ms": book.last_update_ms,
                "spread": book.features.spread,
                "depth_imbalance": book.features.depth_imbalance,
                "last_trade": trades.last(&book.symbol).map(|t| t.price),
                "recent_volume": trades.recent_volume(&book.symbol),
                "symbol": book.symbol,
            })
        })
        .collect();
    drop(trades);
    let ipc_connected = state.publisher.is_connected().await;

    Json(serde_json::json!({
        "status": health,
        "component": "market-features",
        "session": session,
        "books": books,
        "ipc_connected": ipc_connected,
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<String, (StatusCode, String)> {
    state
        .metrics
        .encode()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
