//! Unix socket server for receiving capture messages

use crate::config::ServerConfig;
use crate::error::DispatchError;
use crate::messaging::MessageRouter;
use crate::payload::{DispatchResponse, MessageEnvelope};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

/// Capture server that listens on a Unix socket.
///
/// Each line is a JSON [`MessageEnvelope`]; each gets one JSON
/// [`DispatchResponse`] line back. Connections are served concurrently.
pub struct CaptureServer {
    config: ServerConfig,
    router: Arc<MessageRouter>,
}

impl CaptureServer {
    pub fn new(config: ServerConfig, router: Arc<MessageRouter>) -> Self {
        Self { config, router }
    }

    /// Bind the socket and serve until the task is dropped
    pub async fn run(&self) -> std::io::Result<()> {
        // Remove existing socket file if present
        if self.config.socket_path.exists() {
            std::fs::remove_file(&self.config.socket_path)?;
        }

        let listener = UnixListener::bind(&self.config.socket_path)?;
        info!("Capture server listening on {:?}", self.config.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let router = Arc::clone(&self.router);
                    let limit = self.config.max_message_bytes;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, router, limit).await {
                            error!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }
}

/// Serve one client until it closes the connection.
///
/// A line longer than `limit` bytes (not counting the newline) is answered with `rejected` and the
/// connection is closed, since the rest of that line is never read.
async fn handle_connection(
    stream: UnixStream,
    router: Arc<MessageRouter>,
    limit: u64,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let read = (&mut reader).take(limit + 1).read_line(&mut line).await?;
        if read == 0 {
            break;
        }

        let oversized = read as u64 > limit && !line.ends_with('\n');
        let response = if oversized {
            warn!("Dropping connection after a message over {} bytes", limit);
            DispatchResponse::rejected(&format!("Message exceeds {} bytes", limit))
        } else if line.trim().is_empty() {
            continue;
        } else {
            process_line(&router, &line).await
        };

        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        if oversized {
            break;
        }
    }

    Ok(())
}

/// Parse and dispatch one envelope
pub async fn process_line(router: &MessageRouter, line: &str) -> DispatchResponse {
    let envelope = match serde_json::from_str::<MessageEnvelope>(line) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Failed to parse envelope: {}", e);
            return DispatchResponse::rejected(&format!("Parse error: {}", e));
        }
    };

    debug!("Received message on {} from tab {}", envelope.channel, envelope.sender.tab.id);

    match router.dispatch(envelope).await {
        Ok(()) => DispatchResponse::ok(),
        Err(e @ (DispatchError::UnknownChannel(_) | DispatchError::Schema { .. })) => {
            DispatchResponse::rejected(&e.to_string())
        }
        Err(e @ DispatchError::Handler { .. }) => {
            error!("Capture failed: {}", e);
            DispatchResponse::error(&e.to_string())
        }
    }
}
