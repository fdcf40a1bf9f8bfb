//! Streaming model download with byte-level progress

use crate::error::FetchError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Largest model payload accepted (2 GiB).
pub const MAX_MODEL_SIZE: u64 = 2 * 1024 * 1024 * 1024;

const MAX_PATH_LEN: usize = 2048;

/// Progress of one download. `bytes_total` is `None` when the server did not
/// declare a size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub bytes_loaded: u64,
    pub bytes_total: Option<u64>,
}

impl DownloadProgress {
    /// Percentage in [0, 100], or `None` when the total is unknown.
    pub fn percent(&self) -> Option<f64> {
        match self.bytes_total {
            Some(total) if total > 0 => {
                Some((self.bytes_loaded as f64 / total as f64 * 100.0).min(100.0))
            }
            _ => None,
        }
    }
}

/// Receives progress after each received chunk.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: DownloadProgress);
}

impl<F> ProgressObserver for F
where
    F: Fn(DownloadProgress) + Send + Sync,
{
    fn on_progress(&self, progress: DownloadProgress) {
        self(progress)
    }
}

/// Observer that ignores progress.
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _progress: DownloadProgress) {}
}

/// Forwards progress to another task.
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<DownloadProgress>,
}

impl ChannelObserver {
    pub fn new(sender: mpsc::UnboundedSender<DownloadProgress>) -> Self {
        Self { sender }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DownloadProgress>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_progress(&self, progress: DownloadProgress) {
        // Receiver gone means nobody is watching any more.
        let _ = self.sender.send(progress);
    }
}

/// Fetches a model payload. Single attempt; callers retry by calling again.
#[async_trait]
pub trait ModelFetcher: Send + Sync {
    async fn fetch(&self, path: &str, observer: &dyn ProgressObserver) -> Result<Bytes, FetchError>;
}

/// Drain a chunk stream into one buffer, reporting progress after every chunk.
///
/// The buffer is sized from the bytes actually received, never from
/// `declared_total`, which may be absent or wrong.
pub async fn collect_chunks<S, E>(
    path: &str,
    stream: S,
    declared_total: Option<u64>,
    observer: &dyn ProgressObserver,
) -> Result<Bytes, FetchError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut loaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::Stream {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        loaded += chunk.len() as u64;
        if loaded > MAX_MODEL_SIZE {
            return Err(FetchError::TooLarge {
                path: path.to_string(),
                size: loaded,
                max: MAX_MODEL_SIZE,
            });
        }
        chunks.push(chunk);
        observer.on_progress(DownloadProgress {
            bytes_loaded: loaded,
            bytes_total: declared_total,
        });
    }

    let mut buffer = BytesMut::with_capacity(loaded as usize);
    for chunk in &chunks {
        buffer.extend_from_slice(chunk);
    }
    debug!("Assembled {} bytes from {} chunks for {}", loaded, chunks.len(), path);
    Ok(buffer.freeze())
}

/// HTTP(S) model fetcher backed by reqwest.
pub struct HttpModelFetcher {
    client: reqwest::Client,
    base_url: Option<reqwest::Url>,
}

impl HttpModelFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: None,
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: None,
        }
    }

    /// Resolve relative model paths against `base_url`.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, FetchError> {
        let url = reqwest::Url::parse(base_url).map_err(|e| FetchError::InvalidPath {
            path: base_url.to_string(),
            reason: e.to_string(),
        })?;
        self.base_url = Some(url);
        Ok(self)
    }

    /// Turn a model path into a request URL.
    pub fn resolve(&self, path: &str) -> Result<reqwest::Url, FetchError> {
        let invalid = |reason: String| FetchError::InvalidPath {
            path: path.to_string(),
            reason,
        };

        if path.trim().is_empty() {
            return Err(invalid("empty path".to_string()));
        }
        if path.len() > MAX_PATH_LEN {
            return Err(invalid(format!("longer than {} bytes", MAX_PATH_LEN)));
        }

        match reqwest::Url::parse(path) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(url),
                other => Err(invalid(format!("unsupported scheme {}", other))),
            },
            Err(_) => {
                let base = self
                    .base_url
                    .as_ref()
                    .ok_or_else(|| invalid("relative path without a base URL".to_string()))?;
                base.join(path).map_err(|e| invalid(e.to_string()))
            }
        }
    }
}

impl Default for HttpModelFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelFetcher for HttpModelFetcher {
    async fn fetch(&self, path: &str, observer: &dyn ProgressObserver) -> Result<Bytes, FetchError> {
        let url = self.resolve(path)?;
        info!("Fetching model {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network {
                path: path.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                reason: status.canonical_reason(),
            });
        }

        let declared_total = response.content_length();
        if let Some(total) = declared_total {
            if total > MAX_MODEL_SIZE {
                return Err(FetchError::TooLarge {
                    path: path.to_string(),
                    size: total,
                    max: MAX_MODEL_SIZE,
                });
            }
        }

        let bytes = collect_chunks(path, response.bytes_stream(), declared_total, observer).await?;
        info!("Fetched model {} ({} bytes)", path, bytes.len());
        Ok(bytes)
    }
}
