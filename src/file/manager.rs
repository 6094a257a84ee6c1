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


//! File operations shared by the cache and the promotion protocol
//!
//! # Key Operations
//! - Directory creation that survives a concurrent creator (bounded retry)
//! - Idempotent delete with retry
//! - Move followed by a destination check

use crate::config::DirectoryRetry;
use crate::error::{CacheError, Result};
use crate::file::fs::{FileInfo, FileSystem, TokioFileSystem};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Maximum retry attempts for move/delete
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Delay between move/delete attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// File manager for safe file operations
#[derive(Clone)]
pub struct FileManager {
    fs: Arc<dyn FileSystem>,
    directory_retry: DirectoryRetry,
}

impl std::fmt::Debug for FileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileManager")
            .field("directory_retry", &self.directory_retry)
            .finish_non_exhaustive()
    }
}

impl FileManager {
    /// Create a new file manager over the given filesystem
    pub fn new(fs: Arc<dyn FileSystem>, directory_retry: DirectoryRetry) -> Self {
        Self { fs, directory_retry }
    }

    /// File manager over the real filesystem with default retry budget
    pub fn local() -> Self {
        Self::new(Arc::new(TokioFileSystem::new()), DirectoryRetry::default())
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Ensure a directory exists
    ///
    /// # Algorithm
    /// 1. Already a directory → done
    /// 2. Create recursively (a concurrent creator makes this a no-op)
    /// 3. Re-check; if still not a directory, sleep and go again
    /// 4. After the retry budget, fail with `DirectoryUnavailable`
    pub async fn ensure_directory_exists(&self, path: &Path) -> Result<()> {
        let attempts = self.directory_retry.attempts.max(1);

        for attempt in 1..=attempts {
            if self.is_directory(path).await {
                return Ok(());
            }

            if let Err(e) = self.fs.create_dir_all(path).await {
                debug!(path = %path.display(), attempt, error = %e, "Directory creation failed");
            }

            if self.is_directory(path).await {
                return Ok(());
            }

            if attempt < attempts {
                sleep(self.directory_retry.delay()).await;
            }
        }

        warn!(path = %path.display(), attempts, "Directory still unavailable after retries");
        Err(CacheError::DirectoryUnavailable {
            path: path.to_path_buf(),
            attempts,
        })
    }

    async fn is_directory(&self, path: &Path) -> bool {
        matches!(self.fs.info(path).await, Ok(info) if info.is_directory())
    }

    /// Query a path, mapping platform errors
    pub async fn file_info(&self, path: &Path) -> Result<FileInfo> {
        self.fs.info(path).await.map_err(|e| {
            CacheError::FileIoError(format!("Failed to stat {}: {}", path.display(), e))
        })
    }

    /// Check if a regular file exists; any error counts as absent
    pub async fn file_exists(&self, path: &Path) -> bool {
        matches!(self.fs.info(path).await, Ok(info) if info.is_file())
    }

    /// Safe delete operation with retry
    ///
    /// A file that is already gone counts as deleted.
    pub async fn safe_delete(&self, path: &Path) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.fs.remove_file(path).await {
                Ok(()) => return Ok(()),
                Err(e) if attempts >= MAX_RETRY_ATTEMPTS => {
                    return Err(CacheError::FileIoError(format!(
                        "Failed to delete file after {} attempts: {}: {}",
                        MAX_RETRY_ATTEMPTS,
                        path.display(),
                        e
                    )));
                }
                Err(_) => {
                    sleep(RETRY_DELAY).await;
                    continue;
                }
            }
        }
    }

    /// Delete, logging instead of failing
    ///
    /// Used on cleanup paths where the primary error is already being reported.
    pub async fn delete_quietly(&self, path: &Path) {
        if let Err(e) = self.safe_delete(path).await {
            warn!(path = %path.display(), error = %e, "Failed to clean up file");
        }
    }

    /// Move a file and confirm it arrived
    ///
    /// The rename is retried like any transient I/O; a rename that reports
    /// success but leaves nothing at the destination is not, and fails with
    /// `PromotionFailed`. Returns the size found at the destination.
    pub async fn move_verified(&self, source: &Path, destination: &Path) -> Result<u64> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.fs.rename(source, destination).await {
                Ok(()) => break,
                Err(e) if attempts >= MAX_RETRY_ATTEMPTS => {
                    return Err(CacheError::FileIoError(format!(
                        "Failed to move file after {} attempts: {} -> {}: {}",
                        MAX_RETRY_ATTEMPTS,
                        source.display(),
                        destination.display(),
                        e
                    )));
                }
                Err(e) => {
                    debug!(
                        source = %source.display(),
                        destination = %destination.display(),
                        attempt = attempts,
                        error = %e,
                        "Move failed, retrying"
                    );
                    sleep(RETRY_DELAY).await;
                }
            }
        }

        match self.fs.info(destination).await {
            Ok(FileInfo::Existing { size, is_directory: false }) => Ok(size),
            Ok(_) => Err(CacheError::PromotionFailed {
                path: destination.to_path_buf(),
                reason: "no file at destination after move".to_string(),
            }),
            Err(e) => Err(CacheError::PromotionFailed {
                path: destination.to_path_buf(),
                reason: format!("destination check failed: {}", e),
            }),
        }
    }
}
