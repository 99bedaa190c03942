//! Publisher module for IPC communication
//!
//! Publishes feature frames and sequence batches to the downstream model over a
//! Unix socket. Each message is a 4-byte big-endian length followed by a
//! MessagePack body.

use std::path::Path;

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// Length-prefix every message
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Bytes> {
    let body = rmp_serde::to_vec_named(message)?;
    let len = u32::try_from(body.len()).map_err(|_| {
        PipelineError::SerializationError(format!("message of {} bytes too large", body.len()))
    })?;

    let mut frame = BytesMut::with_capacity(4 + body.len());
    frame.put_u32(len);
    frame.extend_from_slice(&body);
    Ok(frame.freeze())
}

/// Publisher for sending messages via Unix socket
pub struct Publisher {
    socket_path: String,
    stream: Mutex<Option<UnixStream>>,
}

impl Publisher {
    /// Create a new publisher; the consumer does not have to be up yet
    pub async fn new(socket_path: &str) -> Self {
        let publisher = Self {
            socket_path: socket_path.to_string(),
            stream: Mutex::new(None),
        };

        {
            let mut guard = publisher.stream.lock().await;
            match publisher.connect().await {
                Ok(stream) => *guard = Some(stream),
                Err(e) => warn!(error = %e, "Initial IPC connection failed, will retry on publish"),
            }
        }

        publisher
    }

    async fn connect(&self) -> Result<UnixStream> {
        let path = Path::new(&self.socket_path);

        if !path.exists() {
            return Err(PipelineError::IpcError(format!(
                "Socket path does not exist: {}",
                self.socket_path
            )));
        }

        let stream = UnixStream::connect(path).await.map_err(|e| {
            PipelineError::IpcError(format!("Failed to connect to {}: {}", self.socket_path, e))
        })?;

        info!(path = %self.socket_path, "Connected to IPC socket");
        Ok(stream)
    }

    pub async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    /// Publish one message.
    ///
    /// Only a serialization failure is an error; socket problems are logged and
    /// the message is dropped.
    pub async fn publish<T: Serialize>(&self, message: &T) -> Result<()> {
        let frame = encode_frame(message)?;

        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            match self.connect().await {
                Ok(stream) => *guard = Some(stream),
                Err(e) => {
                    debug!(error = %e, "Failed to reconnect to IPC socket");
                    return Ok(());
                }
            }
        }

        if let Some(stream) = guard.as_mut() {
            match stream.write_all(&frame).await {
                Ok(()) => debug!(bytes = frame.len(), "Published message"),
                Err(e) => {
                    warn!(error = %e, "Failed to write to IPC socket");
                    *guard = None;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureVector;
    use crate::market::millis_to_datetime;
    use crate::pipeline::LiveFrame;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;
    use tokio_test::assert_ok;

    fn frame() -> LiveFrame {
        LiveFrame {
            symbol: "SPY".to_string(),
            time: millis_to_datetime(1_700_000_000_000).unwrap(),
            features: FeatureVector::from_array([1.0, 50.0, 0.0, 0.0, 0.01, 0.0, 1.0, 1.0, 0.01, 0.1]),
            window_ready: false,
            window: None,
        }
    }

    #[test]
    fn test_encode_frame_prefixes_length() {
        let bytes = encode_frame(&frame()).unwrap();
        let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(len, bytes.len() - 4);

        let decoded: LiveFrame = rmp_serde::from_slice(&bytes[4..]).unwrap();
        assert_eq!(decoded, frame());
    }

    #[tokio::test]
    async fn test_publish_without_consumer_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.sock");
        let publisher = Publisher::new(path.to_str().unwrap()).await;

        assert!(!publisher.is_connected().await);
        assert_ok!(publisher.publish(&frame()).await);
    }

    #[tokio::test]
    async fn test_publish_reaches_late_consumer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.sock");
        let publisher = Publisher::new(path.to_str().unwrap()).await;
        assert!(!publisher.is_connected().await);

        // Consumer comes up after the publisher
        let listener = UnixListener::bind(&path).unwrap();
        assert_ok!(publisher.publish(&frame()).await);
        assert!(publisher.is_connected().await);

        let (mut socket, _) = listener.accept().await.unwrap();
        let len = socket.read_u32().await.unwrap() as usize;
        let mut body = vec![0u8; len];
        socket.read_exact(&mut body).await.unwrap();

        let decoded: LiveFrame = rmp_serde::from_slice(&body).unwrap();
        assert_eq!(decoded.symbol, "SPY");
        assert_eq!(decoded.features, frame().features);
    }
}
