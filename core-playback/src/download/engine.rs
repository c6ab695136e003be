//! # Download Engine
//!
//! Streams one resolved stream into a temp file.
//!
//! The engine never leaves a partial file behind: a guard deletes the
//! destination on every exit except success, including cancellation and the
//! future being dropped mid-transfer.

use crate::config::DownloadConfig;
use crate::download::progress::TransferProgress;
use crate::error::DownloadError;
use crate::resolver::StreamHandle;
use bridge_traits::{HttpClient, HttpRequest, NetworkMonitor};
use core_async::fs::{create_dir_all, File};
use core_async::io::{AsyncReadExt, AsyncWriteExt};
use core_async::sync::CancellationToken;
use core_async::time::timeout;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

type Result<T> = std::result::Result<T, DownloadError>;

/// A verified file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Deletes the file at `path` on drop unless committed.
struct PartialFileGuard {
    path: PathBuf,
    committed: bool,
}

impl PartialFileGuard {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PartialFileGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed partial download"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove partial download"),
        }
    }
}

fn io_error(e: impl std::fmt::Display) -> DownloadError {
    DownloadError::Io(e.to_string())
}

/// Byte transfer with connectivity probe, cancellation and size checks.
pub struct DownloadEngine {
    http: Arc<dyn HttpClient>,
    network: Arc<dyn NetworkMonitor>,
    config: DownloadConfig,
}

impl DownloadEngine {
    pub fn new(
        http: Arc<dyn HttpClient>,
        network: Arc<dyn NetworkMonitor>,
        config: DownloadConfig,
    ) -> Self {
        Self {
            http,
            network,
            config,
        }
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Pre-flight connectivity check. A probe that outlives
    /// `probe_timeout` counts as offline.
    pub async fn probe(&self) -> Result<()> {
        match timeout(self.config.probe_timeout, self.network.is_connected()).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(DownloadError::NoConnectivity),
            Err(_) => {
                debug!(timeout = ?self.config.probe_timeout, "Connectivity probe timed out");
                Err(DownloadError::NoConnectivity)
            }
        }
    }

    /// Downloads `stream` into `destination`.
    ///
    /// `on_progress` is called after every chunk. The total is the
    /// response's content length, falling back to the provider's size.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::NoConnectivity`] if the probe fails
    /// - [`DownloadError::Cancelled`] if `cancel` fires
    /// - [`DownloadError::Io`] on transfer failure or a truncated body
    /// - [`DownloadError::TooSmall`] if fewer than `min_valid_bytes` arrived
    #[instrument(skip(self, stream, cancel, on_progress), fields(dest = %destination.display()))]
    pub async fn download<F>(
        &self,
        stream: &StreamHandle,
        destination: &Path,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<DownloadedFile>
    where
        F: FnMut(TransferProgress) + Send,
    {
        self.probe().await?;

        if let Some(parent) = destination.parent() {
            create_dir_all(parent).await.map_err(io_error)?;
        }
        let guard = PartialFileGuard::new(destination.to_path_buf());

        let mut body = core_async::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            opened = self.http.download_stream(HttpRequest::get(&stream.url)) => {
                opened.map_err(io_error)?
            }
        };

        let total_bytes = body.content_length.or(stream.size_bytes);
        debug!(total_bytes = ?total_bytes, "Transfer started");

        let mut file = File::create(destination).await.map_err(io_error)?;
        let mut buf = vec![0u8; self.config.chunk_size.max(1)];
        let mut downloaded_bytes = 0u64;

        loop {
            let read = core_async::select! {
                biased;
                _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                read = body.reader.read(&mut buf) => read.map_err(io_error)?,
            };
            if read == 0 {
                break;
            }

            file.write_all(&buf[..read]).await.map_err(io_error)?;
            downloaded_bytes += read as u64;
            on_progress(TransferProgress {
                downloaded_bytes,
                total_bytes,
            });
        }

        file.flush().await.map_err(io_error)?;
        file.sync_all().await.map_err(io_error)?;
        drop(file);

        if let Some(total) = total_bytes {
            if downloaded_bytes < total {
                return Err(DownloadError::Io(format!(
                    "truncated: received {} of {} bytes",
                    downloaded_bytes, total
                )));
            }
        }

        if downloaded_bytes < self.config.min_valid_bytes {
            return Err(DownloadError::TooSmall(downloaded_bytes));
        }

        guard.commit();
        debug!(size_bytes = downloaded_bytes, "Transfer complete");

        Ok(DownloadedFile {
            path: destination.to_path_buf(),
            size_bytes: downloaded_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::http::MockHttpClient;
    use bridge_traits::network::MockNetworkMonitor;
    use bridge_traits::{BridgeError, ByteStream, StreamKind};
    use bytes::Bytes;
    use futures::stream;
    use std::io;
    use tempfile::TempDir;
    use tokio_util::io::StreamReader;

    fn handle(size: Option<u64>) -> StreamHandle {
        StreamHandle {
            url: "https://cdn.example.com/audio.m4a".into(),
            container: "m4a".into(),
            codec: None,
            kind: StreamKind::AudioOnly,
            bitrate: 128_000,
            size_bytes: size,
        }
    }

    fn online() -> Arc<MockNetworkMonitor> {
        let mut network = MockNetworkMonitor::new();
        network.expect_is_connected().returning(|| true);
        Arc::new(network)
    }

    fn serving(chunks: Vec<Vec<u8>>, content_length: Option<u64>) -> Arc<MockHttpClient> {
        let mut http = MockHttpClient::new();
        http.expect_download_stream().returning(move |_| {
            let body = stream::iter(
                chunks
                    .clone()
                    .into_iter()
                    .map(|chunk| Ok::<_, io::Error>(Bytes::from(chunk))),
            );
            Ok(ByteStream::new(
                content_length,
                Box::new(StreamReader::new(body)),
            ))
        });
        Arc::new(http)
    }

    fn config() -> DownloadConfig {
        DownloadConfig::default()
            .with_chunk_size(1024)
            .with_min_valid_bytes(2048)
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_download_reports_every_chunk() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.m4a");
        let engine = DownloadEngine::new(serving(vec![vec![1; 1024]; 4], Some(4096)), online(), config());

        let mut reports = Vec::new();
        let file = engine
            .download(&handle(None), &dest, &CancellationToken::new(), |p| reports.push(p))
            .await
            .unwrap();

        assert_eq!(file.size_bytes, 4096);
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 4096);
        assert_eq!(reports.len(), 4);
        assert!(reports
            .windows(2)
            .all(|w| w[0].downloaded_bytes < w[1].downloaded_bytes));
        assert_eq!(reports.last().unwrap().fraction(), 1.0);
    }

    #[tokio::test]
    async fn test_total_falls_back_to_stream_size() {
        let dir = TempDir::new().unwrap();
        let engine = DownloadEngine::new(serving(vec![vec![1; 3000]], None), online(), config());

        let mut last = None;
        engine
            .download(
                &handle(Some(3000)),
                &dir.path().join("a.m4a"),
                &CancellationToken::new(),
                |p| last = Some(p),
            )
            .await
            .unwrap();

        assert_eq!(last.unwrap().total_bytes, Some(3000));
    }

    #[tokio::test]
    async fn test_too_small_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let engine = DownloadEngine::new(serving(vec![vec![1; 100]], None), online(), config());

        let err = engine
            .download(&handle(None), &dir.path().join("a.m4a"), &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();

        assert_eq!(err, DownloadError::TooSmall(100));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_truncated_body_is_io_error() {
        let dir = TempDir::new().unwrap();
        let engine = DownloadEngine::new(serving(vec![vec![1; 3000]], Some(8000)), online(), config());

        let err = engine
            .download(&handle(None), &dir.path().join("a.m4a"), &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Io(msg) if msg.starts_with("truncated")));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_offline_probe_fails_fast() {
        let dir = TempDir::new().unwrap();
        let mut network = MockNetworkMonitor::new();
        network.expect_is_connected().returning(|| false);
        let mut http = MockHttpClient::new();
        http.expect_download_stream().never();

        let engine = DownloadEngine::new(Arc::new(http), Arc::new(network), config());
        let err = engine
            .download(&handle(None), &dir.path().join("a.m4a"), &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();

        assert_eq!(err, DownloadError::NoConnectivity);
    }

    #[tokio::test]
    async fn test_http_failure_maps_to_io() {
        let dir = TempDir::new().unwrap();
        let mut http = MockHttpClient::new();
        http.expect_download_stream().returning(|_| {
            Err(BridgeError::Status {
                status: 403,
                message: "Forbidden".into(),
            })
        });

        let engine = DownloadEngine::new(Arc::new(http), online(), config());
        let err = engine
            .download(&handle(None), &dir.path().join("a.m4a"), &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Io(msg) if msg.contains("403")));
    }

    #[tokio::test]
    async fn test_pre_cancelled_token() {
        let dir = TempDir::new().unwrap();
        let engine = DownloadEngine::new(serving(vec![vec![1; 4096]], None), online(), config());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine
            .download(&handle(None), &dir.path().join("a.m4a"), &cancel, |_| {})
            .await
            .unwrap_err();

        assert_eq!(err, DownloadError::Cancelled);
        assert!(dir_is_empty(dir.path()));
    }
}
