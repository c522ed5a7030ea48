// Socket server for the background process
// One NDJSON request per line in, one response per line out

use super::config::HostConfig;
use crate::background::api::{HighlightApi, HttpApi};
use crate::background::auth::{Authenticator, EnvTokenAuthenticator};
use crate::background::persistence::{JsonFileStore, KeyValueStore};
use crate::background::protocol::{
    deserialize_message, serialize_message, ExtensionRequest, ExtensionResponse,
    MAX_REQUEST_FRAME_SIZE,
};
use crate::background::queue::SyncQueue;
use crate::background::router::MessageRouter;
use crate::background::scheduler::RetryScheduler;
use crate::background::screenshot::{CommandCapture, ScreenshotCapturer, TabCapture};
use crate::clock::SystemClock;
use anyhow::Result;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

/// Wired-up background components sharing one store
pub struct Background {
    pub router: Arc<MessageRouter>,
    pub scheduler: Arc<RetryScheduler>,
}

impl Background {
    pub fn assemble(
        config: &HostConfig,
        api: Arc<dyn HighlightApi>,
        capture: Arc<dyn TabCapture>,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(config.store_file()));
        let queue = Arc::new(SyncQueue::new(
            Arc::clone(&store),
            Arc::clone(&api),
            Arc::new(SystemClock),
            config.queue_limits,
        ));
        let scheduler = Arc::new(RetryScheduler::new(queue, config.drain_interval));
        let router = Arc::new(MessageRouter::new(
            store,
            api,
            Arc::clone(&scheduler),
            ScreenshotCapturer::new(capture).with_quality(config.jpeg_quality),
            auth,
        ));
        Self { router, scheduler }
    }

    /// Production wiring: HTTP API, capture command and env-provided sign-in
    pub fn from_config(config: &HostConfig) -> Result<Self> {
        Ok(Self::assemble(
            config,
            Arc::new(HttpApi::new()?),
            Arc::new(CommandCapture::new(config.capture_command.clone())),
            Arc::new(EnvTokenAuthenticator::default()),
        ))
    }
}

/// Serve one connection until the client hangs up
///
/// Every frame gets exactly one response line. A frame larger than
/// `MAX_REQUEST_FRAME_SIZE` is answered with an error, then the connection
/// is closed.
pub async fn handle_client(router: Arc<MessageRouter>, mut stream: UnixStream) -> Result<()> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut frame = Vec::new();

    loop {
        frame.clear();
        let read = match (&mut reader)
            .take(MAX_REQUEST_FRAME_SIZE as u64 + 1)
            .read_until(b'\n', &mut frame)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                warn!("Error reading from client: {}", e);
                break;
            }
        };
        if read == 0 {
            break;
        }

        let oversized = frame.len() > MAX_REQUEST_FRAME_SIZE;
        let response = if oversized {
            ExtensionResponse::error(format!(
                "Request frame too large: more than {} bytes",
                MAX_REQUEST_FRAME_SIZE
            ))
        } else {
            match deserialize_message::<ExtensionRequest>(&frame) {
                Ok(request) => router.handle(request).await,
                Err(e) => ExtensionResponse::error(format!("Failed to parse request: {}", e)),
            }
        };

        let bytes = serialize_message(&response)?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;

        if oversized {
            warn!("Closing connection after oversized frame");
            break;
        }
    }

    Ok(())
}

/// Accept connections until cancelled
pub async fn serve(
    listener: UnixListener,
    router: Arc<MessageRouter>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        debug!("Client connected");
                        let router = Arc::clone(&router);
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(router, stream).await {
                                error!("Client error: {:#}", e);
                            }
                        });
                    }
                    Err(e) => error!("Accept error: {}", e),
                }
            }

            _ = cancel_token.cancelled() => {
                info!("Server shutting down");
                break;
            }
        }
    }
}
