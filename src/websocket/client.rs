//! WebSocket transport for the market-data feed
//!
//! Splits the socket into a reader and a writer task bridged to channels, so the
//! session only sees text frames and a close notification.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, trace, warn};

use super::{Connection, Connector, TransportEvent};
use crate::error::{PipelineError, Result};

/// Inbound frames buffered between the reader task and the session
const INBOUND_BUFFER: usize = 1024;

/// Connects with `tokio-tungstenite`
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Connection> {
        info!(url = %endpoint, "Connecting to market-data WebSocket");

        let (ws_stream, response) = connect_async(endpoint).await.map_err(|e| {
            PipelineError::WebSocketConnection(format!("Failed to connect: {}", e))
        })?;
        info!(status = ?response.status(), "WebSocket connected");

        let (mut sink, mut stream) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::channel(INBOUND_BUFFER);

        // Pongs are queued through the writer so the sink has a single owner
        let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let writer = tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    text = out_rx.recv() => match text {
                        Some(text) => Message::Text(text),
                        None => break,
                    },
                    payload = pong_rx.recv() => match payload {
                        Some(payload) => Message::Pong(payload),
                        None => break,
                    },
                };
                if let Err(e) = sink.send(message).await {
                    warn!(error = %e, "Failed to write to WebSocket");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = tokio::spawn(async move {
            let reason = loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        trace!(len = text.len(), "Received text message");
                        if in_tx.send(TransportEvent::Frame(text)).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let text = String::from_utf8_lossy(&data).to_string();
                        if in_tx.send(TransportEvent::Frame(text)).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        debug!("Received ping, sending pong");
                        let _ = pong_tx.send(data);
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        warn!(frame = ?frame, "Received close frame");
                        break "Connection closed".to_string();
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        break e.to_string();
                    }
                    None => {
                        warn!("WebSocket stream ended");
                        break "Stream ended".to_string();
                    }
                }
            };
            let _ = in_tx.send(TransportEvent::Closed(reason)).await;
        });

        Ok(Connection::new(out_tx, in_rx).with_tasks(vec![writer, reader]))
    }
}
