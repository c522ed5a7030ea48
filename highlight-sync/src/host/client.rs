// Client side of the background socket
// Used by the CLI and by page hosts running out of process

use crate::background::protocol::{
    deserialize_message, serialize_message, ExtensionRequest, ExtensionResponse,
    MAX_RESPONSE_FRAME_SIZE,
};
use crate::page::port::BackgroundPort;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use log::info;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Long enough for a screenshot plus a slow API round trip
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

const DAEMON_NAME: &str = "highlight-syncd";

/// Daemon binary installed next to the current executable
pub fn resolve_daemon_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe.parent()?.join(DAEMON_NAME);
    candidate.is_file().then_some(candidate)
}

/// [`BackgroundPort`] over the daemon's Unix socket, one connection per request
#[derive(Debug, Clone)]
pub struct SocketPort {
    socket_path: PathBuf,
    /// Daemon to spawn when nothing is listening
    autostart: Option<PathBuf>,
    timeout: Duration,
}

impl SocketPort {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            autostart: None,
            timeout: RESPONSE_TIMEOUT,
        }
    }

    pub fn with_autostart(mut self, daemon_path: Option<PathBuf>) -> Self {
        self.autostart = daemon_path;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    async fn connect(&self) -> Result<UnixStream> {
        if let Ok(stream) = UnixStream::connect(&self.socket_path).await {
            return Ok(stream);
        }

        let Some(daemon_path) = &self.autostart else {
            bail!(
                "Background daemon is not running (no socket at {})",
                self.socket_path.display()
            );
        };

        info!("Daemon not running, starting {}", daemon_path.display());
        Command::new(daemon_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start daemon at {}", daemon_path.display()))?;

        // Wait for the socket to appear (up to 2 seconds)
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Ok(stream) = UnixStream::connect(&self.socket_path).await {
                return Ok(stream);
            }
        }

        Err(anyhow!(
            "Daemon did not start within 2 seconds (socket not found at: {})",
            self.socket_path.display()
        ))
    }

    async fn exchange(
        &self,
        mut stream: UnixStream,
        request: &ExtensionRequest,
    ) -> Result<ExtensionResponse> {
        let (reader, mut writer) = stream.split();
        writer.write_all(&serialize_message(request)?).await?;
        writer.flush().await?;

        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            bail!("Daemon closed connection unexpectedly");
        }
        if line.len() > MAX_RESPONSE_FRAME_SIZE {
            bail!(
                "Response frame too large: {} bytes (max {})",
                line.len(),
                MAX_RESPONSE_FRAME_SIZE
            );
        }

        deserialize_message(line.as_bytes())
            .with_context(|| format!("Failed to parse daemon response: {}", line.trim()))
    }
}

#[async_trait]
impl BackgroundPort for SocketPort {
    async fn send(&self, request: ExtensionRequest) -> Result<ExtensionResponse> {
        let stream = self.connect().await?;
        tokio::time::timeout(self.timeout, self.exchange(stream, &request))
            .await
            .map_err(|_| anyhow!("Timed out waiting for {} response", request.action()))?
    }
}
