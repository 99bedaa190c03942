//! Configuration for the feature service
//!
//! Everything comes from environment variables (a `.env` file is honoured) and
//! every key has a default, so an empty environment yields a runnable config.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::features::{FeatureConfig, LabelConfig, LOOKBACK};
use crate::parser::{Channel, Subscription};

/// Stream session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Credential sent in the auth frame
    #[serde(skip_serializing, default)]
    pub api_key: String,

    pub ws_endpoint: String,

    pub symbols: Vec<String>,

    pub channels: Vec<Channel>,

    /// Settle delay between auth success and the subscribe frame
    pub subscribe_delay: Duration,

    /// Heartbeat tick
    pub heartbeat_interval: Duration,

    /// Silence after which the connection is considered dead
    pub stale_after: Duration,

    /// Backoff base
    pub reconnect_delay: Duration,

    /// Backoff cap
    pub max_backoff: Duration,

    /// Upper bound on connect and auth handshakes
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            ws_endpoint: "wss://socket.polygon.io/stocks".to_string(),
            symbols: vec!["SPY".to_string()],
            channels: vec![Channel::Quotes, Channel::Trades, Channel::MinuteBars],
            subscribe_delay: Duration::from_millis(1500),
            heartbeat_interval: Duration::from_secs(5),
            stale_after: Duration::from_secs(30),
            reconnect_delay: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(60_000),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    /// Every (symbol, channel) pair to subscribe to
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.symbols
            .iter()
            .flat_map(|symbol| {
                self.channels
                    .iter()
                    .map(move |&channel| Subscription::new(symbol, channel))
            })
            .collect()
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub session: SessionConfig,

    pub features: FeatureConfig,

    pub labels: LabelConfig,

    /// Feature vectors per model sequence
    pub lookback: usize,

    /// Historical REST endpoint
    pub rest_endpoint: String,

    /// Unix socket of the downstream consumer
    pub ipc_socket_path: String,

    /// Port of the health and metrics server
    pub health_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            features: FeatureConfig::default(),
            labels: LabelConfig::default(),
            lookback: LOOKBACK,
            rest_endpoint: "https://api.polygon.io".to_string(),
            ipc_socket_path: "/tmp/market-features.sock".to_string(),
            health_port: 9090,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable numbers keep their default
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let symbols: Vec<String> = get("SYMBOLS", "SPY")
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            anyhow::bail!("SYMBOLS must name at least one ticker");
        }

        let channels = get("CHANNELS", "Q,T,AM")
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Channel::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map_err(anyhow::Error::msg)?;

        let session = SessionConfig {
            api_key: get("POLYGON_API_KEY", ""),
            ws_endpoint: get("WS_ENDPOINT", &defaults.session.ws_endpoint),
            symbols,
            channels,
            subscribe_delay: Duration::from_millis(parse_or(&lookup, "SUBSCRIBE_DELAY_MS", 1500)),
            heartbeat_interval: Duration::from_secs(parse_or(&lookup, "HEARTBEAT_INTERVAL_SECS", 5)),
            stale_after: Duration::from_secs(parse_or(&lookup, "STALE_AFTER_SECS", 30)),
            reconnect_delay: Duration::from_millis(parse_or(&lookup, "RECONNECT_DELAY_MS", 1000)),
            max_backoff: Duration::from_millis(parse_or(&lookup, "MAX_BACKOFF_MS", 60_000)),
            connect_timeout: defaults.session.connect_timeout,
        };

        let features = FeatureConfig {
            min_bars: parse_or(&lookup, "MIN_BARS", defaults.features.min_bars),
            min_quotes: parse_or(&lookup, "MIN_QUOTES", defaults.features.min_quotes),
            book_depth: parse_or(&lookup, "DEPTH_LEVELS", defaults.features.book_depth),
            ..defaults.features
        };

        Ok(Self {
            session,
            features,
            labels: defaults.labels,
            lookback: parse_or(&lookup, "LOOKBACK", LOOKBACK).max(1),
            rest_endpoint: get("REST_ENDPOINT", &defaults.rest_endpoint),
            ipc_socket_path: get("IPC_SOCKET_PATH", &defaults.ipc_socket_path),
            health_port: parse_or(&lookup, "HEALTH_PORT", defaults.health_port),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
