// ClipCache - Video caching core for mobile
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Download coordinator
//!
//! Turns a remote video URL into a local file path, downloading at most once
//! per URL at a time.
//!
//! # Caching flow
//! 1. Cache hit at the deterministic path → return it
//! 2. A download for the same URL is in flight → await that one
//! 3. Otherwise register a new download, then:
//!    - ensure the cache directory exists
//!    - re-check the cache (a previous download may have just finished)
//!    - stream into `<hash>.<ext>.part`
//!    - wait for the part file to stabilize, rename it to the cache path
//! 4. The registry entry is removed when the download settles, whatever the
//!    outcome, so the next call can retry
//!
//! Downloads run in their own task. A caller that stops waiting does not
//! cancel the transfer other callers are sharing.

use crate::config::CoreConfig;
use crate::download::progress::{DownloadProgress, DownloadState, ProgressCallback};
use crate::download::stream::{Downloader, HttpDownloader};
use crate::error::{CacheError, Result};
use crate::file::fs::{DirEntryInfo, FileSystem, TokioFileSystem};
use crate::file::manager::FileManager;
use crate::file::paths::{cache_path, is_staging_file, staging_path};
use crate::file::promotion::{Promoter, StagedKind};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Outcome shared by every caller coalesced onto one download
type SharedOutcome = std::result::Result<PathBuf, Arc<CacheError>>;

/// A download other callers can join
type InFlightDownload = Shared<BoxFuture<'static, SharedOutcome>>;

/// Cache directory totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheUsage {
    pub files: u64,
    pub bytes: u64,
}

struct Inner {
    files: FileManager,
    promoter: Promoter,
    downloader: Arc<dyn Downloader>,
    cache_dir: PathBuf,
    default_extension: String,
    verify_stability: bool,
    progress: RwLock<Option<ProgressCallback>>,
    in_flight: Mutex<HashMap<String, InFlightDownload>>,
}

impl Inner {
    fn in_flight(&self) -> MutexGuard<'_, HashMap<String, InFlightDownload>> {
        // The map stays consistent even if a holder panicked
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn report_state(&self, url: &str, bytes: u64, state: DownloadState) {
        if let Some(callback) = self.progress_callback() {
            let mut progress = DownloadProgress::new(url.to_string(), bytes);
            progress.bytes_downloaded = bytes;
            progress.calculate_percentage();
            progress.state = state;
            callback(progress);
        }
    }

    fn progress_callback(&self) -> Option<ProgressCallback> {
        match self.progress.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Removes a URL from the in-flight map when the download task ends
///
/// Runs on drop so a panicking download still clears its entry.
struct InFlightGuard {
    inner: Arc<Inner>,
    url: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight().remove(&self.url);
        debug!(url = %self.url, "Download left in-flight registry");
    }
}

/// Coordinates cache lookups and downloads of remote videos
///
/// Cheap to clone; clones share the in-flight registry.
#[derive(Clone)]
pub struct DownloadCoordinator {
    inner: Arc<Inner>,
}

impl DownloadCoordinator {
    /// Coordinator over the real filesystem and an HTTP downloader
    pub fn new(config: &CoreConfig) -> Result<Self> {
        config.validate()?;
        let downloader = HttpDownloader::new(&config.download)?;
        Ok(Self::with_parts(
            config,
            Arc::new(TokioFileSystem::new()),
            Arc::new(downloader),
        ))
    }

    /// Coordinator over caller-supplied storage and transport
    pub fn with_parts(
        config: &CoreConfig,
        fs: Arc<dyn FileSystem>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        let promoter = Promoter::from_config(fs, config);
        Self {
            inner: Arc::new(Inner {
                files: promoter.files().clone(),
                promoter,
                downloader,
                cache_dir: config.cache_directory.clone(),
                default_extension: config.default_extension.clone(),
                verify_stability: config.download.verify_stability,
                progress: RwLock::new(None),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Receive progress for every download started by this coordinator
    pub fn set_progress_callback(&self, callback: Option<ProgressCallback>) {
        match self.inner.progress.write() {
            Ok(mut guard) => *guard = callback,
            Err(poisoned) => *poisoned.into_inner() = callback,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.inner.cache_dir
    }

    /// Deterministic cache path for a URL; does not touch the filesystem
    pub fn cache_path_for(&self, url: &str) -> PathBuf {
        cache_path(&self.inner.cache_dir, url, &self.inner.default_extension)
    }

    /// Local path of a cached URL, or `None`
    ///
    /// Never fails: an unusable cache directory or any I/O error is a miss.
    pub async fn get_cached_uri(&self, url: &str) -> Option<PathBuf> {
        if let Err(e) = self.inner.files.ensure_directory_exists(&self.inner.cache_dir).await {
            warn!(url, error = %e, "Cache directory unavailable, treating as miss");
            return None;
        }

        let path = self.cache_path_for(url);
        match self.inner.files.file_info(&path).await {
            Ok(info) if info.is_file() => Some(path),
            Ok(_) => None,
            Err(e) => {
                warn!(url, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    /// Local path for a URL, downloading it if needed
    ///
    /// Concurrent calls for the same URL share one download and receive the
    /// same path or the same error. Failures are wrapped in
    /// [`CacheError::DownloadFailed`] naming the URL; nothing is retried here.
    pub async fn start_caching(&self, url: &str) -> Result<PathBuf> {
        if let Some(path) = self.get_cached_uri(url).await {
            debug!(url, path = %path.display(), "Cache hit");
            return Ok(path);
        }

        let download = self.join_or_start(url);

        download
            .await
            .map_err(|source| CacheError::DownloadFailed {
                url: url.to_string(),
                source,
            })
    }

    /// Path to hand to the player: the cached file, or the remote URL
    ///
    /// Never fails; errors are logged and playback streams from `url`.
    pub async fn playable_uri(&self, url: &str) -> String {
        match self.start_caching(url).await {
            Ok(path) => path.to_string_lossy().into_owned(),
            Err(e) => {
                warn!(url, error = %e, "Caching unavailable, streaming from source");
                url.to_string()
            }
        }
    }

    /// Look up the in-flight download for `url` or register a new one
    ///
    /// Lookup and registration happen under one lock, so two callers can
    /// never both start a transfer. The lock is released before the task is
    /// spawned; a task that never runs still drops its guard and clears the
    /// entry.
    fn join_or_start(&self, url: &str) -> InFlightDownload {
        let mut in_flight = self.inner.in_flight();

        if let Some(existing) = in_flight.get(url) {
            debug!(url, "Joining in-flight download");
            return existing.clone();
        }

        let (result_tx, result_rx) = oneshot::channel::<SharedOutcome>();
        let download = async move {
            result_rx
                .await
                .unwrap_or_else(|_| Err(Arc::new(CacheError::Cancelled)))
        }
        .boxed()
        .shared();

        in_flight.insert(url.to_string(), download.clone());
        drop(in_flight);

        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
            url: url.to_string(),
        };
        let inner = Arc::clone(&self.inner);
        let owned_url = url.to_string();
        let destination = self.cache_path_for(url);

        tokio::spawn(async move {
            let guard = guard;

            let outcome = AssertUnwindSafe(fetch(&inner, &owned_url, &destination))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(CacheError::internal("Download task panicked")));

            if let Err(ref e) = outcome {
                warn!(url = %owned_url, error = %e, "Caching failed");
                inner.report_state(&owned_url, 0, DownloadState::Failed);
            }

            // Leave the registry before waking waiters so a retry starts fresh
            drop(guard);
            // Every caller may have stopped waiting
            let _ = result_tx.send(outcome.map_err(Arc::new));
        });

        info!(url, "Download started");
        download
    }

    /// Number of downloads currently in flight
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight().len()
    }

    /// Delete part files left by an earlier process
    ///
    /// Part files belonging to downloads in flight right now are kept.
    /// Returns the number of files deleted.
    pub async fn sweep_partial_downloads(&self) -> Result<usize> {
        let entries = self.list_cache().await?;
        let active: Vec<PathBuf> = self
            .inner
            .in_flight()
            .keys()
            .map(|url| staging_path(&self.cache_path_for(url)))
            .collect();

        let mut removed = 0;
        for entry in entries {
            if !is_staging_file(&entry.path) || active.contains(&entry.path) {
                continue;
            }
            self.inner.files.safe_delete(&entry.path).await?;
            removed += 1;
        }

        if removed > 0 {
            info!(removed, dir = %self.inner.cache_dir.display(), "Swept partial downloads");
        }
        Ok(removed)
    }

    /// Count and size of completed cache entries
    pub async fn cache_usage(&self) -> Result<CacheUsage> {
        let entries = self.list_cache().await?;
        Ok(entries
            .iter()
            .filter(|entry| !is_staging_file(&entry.path))
            .fold(CacheUsage::default(), |usage, entry| CacheUsage {
                files: usage.files + 1,
                bytes: usage.bytes + entry.size,
            }))
    }

    /// Delete every completed cache entry
    ///
    /// Part files are left alone; they belong to downloads that may still be
    /// running. Returns what was freed.
    pub async fn clear_cache(&self) -> Result<CacheUsage> {
        let entries = self.list_cache().await?;
        let mut freed = CacheUsage::default();

        for entry in entries.iter().filter(|entry| !is_staging_file(&entry.path)) {
            self.inner.files.safe_delete(&entry.path).await?;
            freed.files += 1;
            freed.bytes += entry.size;
        }

        info!(files = freed.files, bytes = freed.bytes, "Cache cleared");
        Ok(freed)
    }

    async fn list_cache(&self) -> Result<Vec<DirEntryInfo>> {
        let dir = &self.inner.cache_dir;
        self.inner.files.fs().list_files(dir).await.map_err(|e| {
            CacheError::FileIoError(format!("Failed to list {}: {}", dir.display(), e))
        })
    }
}

/// Body of a download task
async fn fetch(inner: &Inner, url: &str, destination: &Path) -> Result<PathBuf> {
    inner.files.ensure_directory_exists(&inner.cache_dir).await?;

    if inner.files.file_exists(destination).await {
        debug!(url, "Cache populated while waiting, skipping download");
        return Ok(destination.to_path_buf());
    }

    inner.report_state(url, 0, DownloadState::Queued);

    let staged = staging_path(destination);
    let bytes = match inner
        .downloader
        .download(url, &staged, inner.progress_callback())
        .await
    {
        Ok(bytes) => bytes,
        Err(e) => {
            inner.files.delete_quietly(&staged).await;
            return Err(e);
        }
    };

    let promoted = if inner.verify_stability {
        inner.report_state(url, bytes, DownloadState::Verifying);
        inner
            .promoter
            .promote_to(&staged, destination, StagedKind::Intermediate)
            .await?
    } else {
        inner
            .promoter
            .relocate(&staged, destination, StagedKind::Intermediate)
            .await?
    };

    inner.report_state(url, promoted.size, DownloadState::Completed);
    info!(url, path = %promoted.path.display(), size = promoted.size, "Video cached");
    Ok(promoted.path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DirectoryRetry, StabilityOptions};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    const VIDEO_URL: &str = "https://cdn.example.com/a/b/video.mp4?x=1";

    /// Writes a fixed body; can be held open or made to fail
    struct MockDownloader {
        calls: AtomicUsize,
        failures_left: AtomicUsize,
        gate: Option<Arc<Notify>>,
        body: Vec<u8>,
    }

    impl MockDownloader {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(0),
                gate: None,
                body: b"mock video bytes".to_vec(),
            })
        }

        fn failing(times: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(times),
                gate: None,
                body: b"mock video bytes".to_vec(),
            })
        }

        fn gated(gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(0),
                gate: Some(gate),
                body: b"mock video bytes".to_vec(),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Downloader for MockDownloader {
        async fn download(
            &self,
            url: &str,
            destination: &Path,
            _progress: Option<ProgressCallback>,
        ) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            // Leave a partial file behind to check cleanup
            tokio::fs::write(destination, &self.body[..4]).await?;

            if let Some(gate) = &self.gate {
                gate.notified().await;
            }

            let should_fail = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if should_fail {
                return Err(CacheError::UnexpectedStatusCode {
                    status_code: 503,
                    url: url.to_string(),
                });
            }

            tokio::fs::write(destination, &self.body).await?;
            Ok(self.body.len() as u64)
        }
    }

    fn test_config(root: &Path) -> CoreConfig {
        CoreConfig {
            stability: StabilityOptions {
                initial_delay_ms: 1,
                max_retries: 5,
                base_delay_ms: 1,
                allow_empty: false,
            },
            directory_retry: DirectoryRetry { attempts: 3, delay_ms: 1 },
            ..CoreConfig::with_root(root)
        }
    }

    fn coordinator(root: &Path, downloader: Arc<MockDownloader>) -> DownloadCoordinator {
        DownloadCoordinator::with_parts(
            &test_config(root),
            Arc::new(TokioFileSystem::new()),
            downloader,
        )
    }

    #[tokio::test]
    async fn test_sequential_calls_download_once() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = MockDownloader::new();
        let coordinator = coordinator(temp_dir.path(), downloader.clone());

        let first = coordinator.start_caching(VIDEO_URL).await.unwrap();
        let second = coordinator.start_caching(VIDEO_URL).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(downloader.calls(), 1);
        assert_eq!(tokio::fs::read(&first).await.unwrap(), b"mock video bytes");
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_download() {
        let temp_dir = TempDir::new().unwrap();
        let gate = Arc::new(Notify::new());
        let downloader = MockDownloader::gated(gate.clone());
        let coordinator = coordinator(temp_dir.path(), downloader.clone());

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.start_caching(VIDEO_URL).await })
            })
            .collect();

        // Let every caller reach the registry before the transfer finishes
        while downloader.calls() == 0 || coordinator.in_flight_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.notify_one();

        let mut paths = Vec::new();
        for caller in callers {
            paths.push(caller.await.unwrap().unwrap());
        }

        assert_eq!(downloader.calls(), 1);
        assert!(paths.iter().all(|p| *p == paths[0]));
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_clears_registry_and_allows_retry() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = MockDownloader::failing(1);
        let coordinator = coordinator(temp_dir.path(), downloader.clone());

        let err = coordinator.start_caching(VIDEO_URL).await.unwrap_err();
        match &err {
            CacheError::DownloadFailed { url, source } => {
                assert_eq!(url, VIDEO_URL);
                assert!(matches!(**source, CacheError::UnexpectedStatusCode { status_code: 503, .. }));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(coordinator.in_flight_count(), 0);

        // No partial file left behind
        let staged = staging_path(&coordinator.cache_path_for(VIDEO_URL));
        assert!(!staged.exists());
        assert!(coordinator.get_cached_uri(VIDEO_URL).await.is_none());

        let path = coordinator.start_caching(VIDEO_URL).await.unwrap();
        assert_eq!(downloader.calls(), 2);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_cached_path_is_deterministic_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = MockDownloader::new();

        let first = coordinator(temp_dir.path(), downloader.clone());
        let path = first.start_caching(VIDEO_URL).await.unwrap();

        let second = coordinator(temp_dir.path(), downloader.clone());
        assert_eq!(second.get_cached_uri(VIDEO_URL).await, Some(path.clone()));

        let expected = format!("{}.mp4", crate::file::paths::url_hash(VIDEO_URL));
        assert_eq!(path.file_name().unwrap().to_string_lossy(), expected);
        assert_eq!(path.parent().unwrap(), temp_dir.path().join("videos"));
    }

    #[tokio::test]
    async fn test_get_cached_uri_miss_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let coordinator = coordinator(temp_dir.path(), MockDownloader::new());

        assert!(coordinator.get_cached_uri(VIDEO_URL).await.is_none());
        assert!(temp_dir.path().join("videos").is_dir());
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_cancel_download() {
        let temp_dir = TempDir::new().unwrap();
        let gate = Arc::new(Notify::new());
        let downloader = MockDownloader::gated(gate.clone());
        let coordinator = coordinator(temp_dir.path(), downloader.clone());

        let abandoned = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.start_caching(VIDEO_URL).await })
        };
        while downloader.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        abandoned.abort();
        gate.notify_one();

        while coordinator.in_flight_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(coordinator.get_cached_uri(VIDEO_URL).await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let coordinator = coordinator(temp_dir.path(), MockDownloader::new());

        coordinator.start_caching(VIDEO_URL).await.unwrap();
        let orphan = staging_path(&coordinator.cache_path_for("https://cdn.example.com/old.mp4"));
        tokio::fs::write(&orphan, b"half").await.unwrap();

        let usage = coordinator.cache_usage().await.unwrap();
        assert_eq!(usage, CacheUsage { files: 1, bytes: 16 });

        assert_eq!(coordinator.sweep_partial_downloads().await.unwrap(), 1);
        assert!(!orphan.exists());

        let freed = coordinator.clear_cache().await.unwrap();
        assert_eq!(freed.files, 1);
        assert!(coordinator.get_cached_uri(VIDEO_URL).await.is_none());
    }

    #[tokio::test]
    async fn test_part_extension_url_is_a_regular_cache_entry() {
        let temp_dir = TempDir::new().unwrap();
        let coordinator = coordinator(temp_dir.path(), MockDownloader::new());
        let url = "https://cdn.example.com/videos/segment.part";

        let path = coordinator.start_caching(url).await.unwrap();

        assert_eq!(path.extension().unwrap(), "mp4");
        assert_eq!(
            coordinator.cache_usage().await.unwrap(),
            CacheUsage { files: 1, bytes: 16 }
        );
        assert_eq!(coordinator.sweep_partial_downloads().await.unwrap(), 0);
        assert_eq!(coordinator.get_cached_uri(url).await, Some(path));
    }

    #[tokio::test]
    async fn test_sweep_keeps_part_file_of_running_download() {
        let temp_dir = TempDir::new().unwrap();
        let gate = Arc::new(Notify::new());
        let downloader = MockDownloader::gated(gate.clone());
        let coordinator = coordinator(temp_dir.path(), downloader.clone());
        let staged = staging_path(&coordinator.cache_path_for(VIDEO_URL));

        let caller = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.start_caching(VIDEO_URL).await })
        };
        while !staged.exists() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let orphan = staging_path(&coordinator.cache_path_for("https://cdn.example.com/old.mp4"));
        tokio::fs::write(&orphan, b"half").await.unwrap();

        assert_eq!(coordinator.sweep_partial_downloads().await.unwrap(), 1);
        assert!(staged.exists());
        assert!(!orphan.exists());
        assert_eq!(coordinator.clear_cache().await.unwrap().files, 0);

        gate.notify_one();
        let path = caller.await.unwrap().unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"mock video bytes");
        assert_eq!(downloader.calls(), 1);
    }

    #[test]
    fn test_download_dropped_before_start_leaves_registry() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = MockDownloader::new();
        let coordinator = coordinator(temp_dir.path(), downloader.clone());

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let handle = runtime.handle().clone();
        runtime.shutdown_timeout(Duration::from_secs(1));

        // A shut-down runtime drops the task on this thread without polling it
        let download = {
            let _enter = handle.enter();
            coordinator.join_or_start(VIDEO_URL)
        };
        assert_eq!(coordinator.in_flight_count(), 0);

        let err = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(download)
            .unwrap_err();
        assert!(matches!(*err, CacheError::Cancelled));
        assert_eq!(downloader.calls(), 0);
    }

    #[tokio::test]
    async fn test_playable_uri_prefers_cached_file() {
        let temp_dir = TempDir::new().unwrap();
        let coordinator = coordinator(temp_dir.path(), MockDownloader::new());

        let uri = coordinator.playable_uri(VIDEO_URL).await;

        assert_eq!(PathBuf::from(&uri), coordinator.cache_path_for(VIDEO_URL));
        assert!(Path::new(&uri).is_file());
    }

    #[tokio::test]
    async fn test_playable_uri_streams_when_download_fails() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = MockDownloader::failing(1);
        let coordinator = coordinator(temp_dir.path(), downloader.clone());

        assert_eq!(coordinator.playable_uri(VIDEO_URL).await, VIDEO_URL);
        assert_eq!(downloader.calls(), 1);
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_playable_uri_streams_when_cache_directory_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        // A plain file where the cache directory belongs
        tokio::fs::write(temp_dir.path().join("videos"), b"not a dir").await.unwrap();
        let downloader = MockDownloader::new();
        let coordinator = coordinator(temp_dir.path(), downloader.clone());

        assert_eq!(coordinator.playable_uri(VIDEO_URL).await, VIDEO_URL);
        assert_eq!(downloader.calls(), 0);
    }

    #[tokio::test]
    async fn test_progress_reports_completion() {
        let temp_dir = TempDir::new().unwrap();
        let coordinator = coordinator(temp_dir.path(), MockDownloader::new());

        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = states.clone();
        coordinator.set_progress_callback(Some(Arc::new(move |p: DownloadProgress| {
            sink.lock().unwrap().push(p.state);
        })));

        coordinator.start_caching(VIDEO_URL).await.unwrap();

        let states = states.lock().unwrap();
        assert_eq!(states.first(), Some(&DownloadState::Queued));
        assert!(states.contains(&DownloadState::Verifying));
        assert_eq!(states.last(), Some(&DownloadState::Completed));
    }
}
