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


//! Moving verified files into durable storage
//!
//! # Promotion sequence
//! 1. Wait for the staged file to stabilize ([`StabilityChecker`])
//! 2. Ensure the destination directory exists (bounded retry)
//! 3. Move (not copy) the file to its destination
//! 4. Confirm a file is present at the destination; no retry if not
//!
//! If any step fails, an intermediate staged file (download part, compressor
//! output) is deleted so nothing piles up in cache storage. An original file
//! (the user's recording) is never deleted here: callers fall back to it.

use crate::config::CoreConfig;
use crate::error::{CacheError, Result};
use crate::file::fs::FileSystem;
use crate::file::manager::FileManager;
use crate::file::paths::{local_extension, unique_file_name};
use crate::file::stability::StabilityChecker;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Who owns the staged file if promotion fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedKind {
    /// Produced by the pipeline itself; delete on failure
    Intermediate,
    /// The user's content; keep on failure
    Original,
}

/// A file now living at its durable location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Outcome of [`Promoter::secure_or_fallback`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecuredFile {
    /// Path the caller should use from now on
    pub path: PathBuf,
    /// `false` when promotion failed and `path` is the original input
    pub promoted: bool,
}

/// Verify-then-move protocol shared by downloads, compression and capture
#[derive(Clone)]
pub struct Promoter {
    files: FileManager,
    checker: StabilityChecker,
    permanent_dir: PathBuf,
    default_extension: String,
}

impl Promoter {
    pub fn new(
        files: FileManager,
        checker: StabilityChecker,
        permanent_dir: PathBuf,
        default_extension: String,
    ) -> Self {
        Self {
            files,
            checker,
            permanent_dir,
            default_extension,
        }
    }

    /// Build from configuration over the given filesystem
    pub fn from_config(fs: Arc<dyn FileSystem>, config: &CoreConfig) -> Self {
        Self::new(
            FileManager::new(Arc::clone(&fs), config.directory_retry),
            StabilityChecker::new(fs, config.stability),
            config.permanent_directory.clone(),
            config.default_extension.clone(),
        )
    }

    pub fn files(&self) -> &FileManager {
        &self.files
    }

    pub fn checker(&self) -> &StabilityChecker {
        &self.checker
    }

    pub fn permanent_dir(&self) -> &Path {
        &self.permanent_dir
    }

    /// Stabilize a staged file and move it to a fresh name in permanent storage
    ///
    /// `prefix` names the file (`compressed`, `capture`, ...).
    pub async fn promote(&self, staged: &Path, kind: StagedKind, prefix: &str) -> Result<PromotedFile> {
        let extension = local_extension(staged, &self.default_extension);
        let destination = self.permanent_dir.join(unique_file_name(prefix, &extension));
        self.promote_to(staged, &destination, kind).await
    }

    /// Stabilize a staged file and move it to `destination`
    pub async fn promote_to(
        &self,
        staged: &Path,
        destination: &Path,
        kind: StagedKind,
    ) -> Result<PromotedFile> {
        match self.checker.promote_to_stable(staged).await {
            Some(_) => self.relocate(staged, destination, kind).await,
            None => {
                self.discard(staged, kind).await;
                Err(CacheError::StabilityTimeout {
                    path: staged.to_path_buf(),
                    attempts: self.checker.options().max_retries,
                })
            }
        }
    }

    /// Move an already-verified file to `destination`
    pub async fn relocate(
        &self,
        staged: &Path,
        destination: &Path,
        kind: StagedKind,
    ) -> Result<PromotedFile> {
        let result = self.try_relocate(staged, destination).await;

        match &result {
            Ok(promoted) => {
                info!(
                    from = %staged.display(),
                    to = %promoted.path.display(),
                    size = promoted.size,
                    "File promoted"
                );
            }
            Err(e) => {
                warn!(path = %staged.display(), error = %e, "Promotion failed");
                self.discard(staged, kind).await;
            }
        }

        result
    }

    async fn try_relocate(&self, staged: &Path, destination: &Path) -> Result<PromotedFile> {
        if let Some(parent) = destination.parent() {
            self.files.ensure_directory_exists(parent).await?;
        }

        let size = self.files.move_verified(staged, destination).await?;

        Ok(PromotedFile {
            path: destination.to_path_buf(),
            size,
        })
    }

    /// Promote the user's own file, or hand it back untouched
    ///
    /// Used for camera captures and picked files: losing the optimization is
    /// acceptable, losing the content is not.
    pub async fn secure_or_fallback(&self, original: &Path, prefix: &str) -> SecuredFile {
        match self.promote(original, StagedKind::Original, prefix).await {
            Ok(promoted) => SecuredFile {
                path: promoted.path,
                promoted: true,
            },
            Err(e) => {
                warn!(path = %original.display(), error = %e, "Keeping original file");
                SecuredFile {
                    path: original.to_path_buf(),
                    promoted: false,
                }
            }
        }
    }

    async fn discard(&self, staged: &Path, kind: StagedKind) {
        if kind == StagedKind::Intermediate {
            self.files.delete_quietly(staged).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{DirectoryRetry, StabilityOptions};
    use crate::file::fs::{DirEntryInfo, FileInfo, TokioFileSystem};
    use async_trait::async_trait;
    use std::io;
    use tempfile::TempDir;
    use tokio::fs;

    pub(crate) fn fast_stability() -> StabilityOptions {
        StabilityOptions {
            initial_delay_ms: 1,
            max_retries: 5,
            base_delay_ms: 1,
            allow_empty: false,
        }
    }

    /// Real filesystem whose moves always fail
    struct FailingRenameFs {
        inner: TokioFileSystem,
    }

    #[async_trait]
    impl FileSystem for FailingRenameFs {
        async fn info(&self, path: &Path) -> io::Result<FileInfo> {
            self.inner.info(path).await
        }

        async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
            self.inner.create_dir_all(path).await
        }

        async fn rename(&self, _from: &Path, _to: &Path) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only volume"))
        }

        async fn remove_file(&self, path: &Path) -> io::Result<()> {
            self.inner.remove_file(path).await
        }

        async fn list_files(&self, dir: &Path) -> io::Result<Vec<DirEntryInfo>> {
            self.inner.list_files(dir).await
        }
    }

    fn promoter(fs: Arc<dyn FileSystem>, permanent_dir: PathBuf) -> Promoter {
        Promoter::new(
            FileManager::new(Arc::clone(&fs), DirectoryRetry { attempts: 3, delay_ms: 1 }),
            StabilityChecker::new(fs, fast_stability()),
            permanent_dir,
            "mp4".to_string(),
        )
    }

    #[tokio::test]
    async fn test_promote_moves_into_permanent_storage() {
        let temp_dir = TempDir::new().unwrap();
        let staged = temp_dir.path().join("compressed-out.mp4");
        fs::write(&staged, b"compressed bytes").await.unwrap();

        let permanent = temp_dir.path().join("media");
        let promoter = promoter(Arc::new(TokioFileSystem::new()), permanent.clone());

        let promoted = promoter
            .promote(&staged, StagedKind::Intermediate, "compressed")
            .await
            .unwrap();

        assert!(!staged.exists());
        assert!(promoted.path.starts_with(&permanent));
        assert_eq!(promoted.size, 16);
        assert_eq!(promoted.path.extension().unwrap(), "mp4");
        assert!(promoted
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("compressed_"));
    }

    #[tokio::test]
    async fn test_failed_move_removes_intermediate_file() {
        let temp_dir = TempDir::new().unwrap();
        let staged = temp_dir.path().join("part.mp4");
        fs::write(&staged, b"verified but stuck").await.unwrap();

        let fs_impl = Arc::new(FailingRenameFs { inner: TokioFileSystem::new() });
        let promoter = promoter(fs_impl, temp_dir.path().join("media"));

        let result = promoter.promote(&staged, StagedKind::Intermediate, "compressed").await;

        assert!(result.is_err());
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn test_failed_move_keeps_original_and_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let recording = temp_dir.path().join("recording.mov");
        fs::write(&recording, b"camera output").await.unwrap();

        let fs_impl = Arc::new(FailingRenameFs { inner: TokioFileSystem::new() });
        let promoter = promoter(fs_impl, temp_dir.path().join("media"));

        let secured = promoter.secure_or_fallback(&recording, "capture").await;

        assert!(!secured.promoted);
        assert_eq!(secured.path, recording);
        assert!(recording.exists());
    }

    #[tokio::test]
    async fn test_missing_staged_file_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let promoter = promoter(Arc::new(TokioFileSystem::new()), temp_dir.path().join("media"));

        let err = promoter
            .promote(&temp_dir.path().join("never-written.mp4"), StagedKind::Intermediate, "x")
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::StabilityTimeout { attempts: 5, .. }));
    }

    #[tokio::test]
    async fn test_secure_capture_keeps_extension() {
        let temp_dir = TempDir::new().unwrap();
        let recording = temp_dir.path().join("recording.mov");
        fs::write(&recording, b"camera output").await.unwrap();

        let promoter = promoter(Arc::new(TokioFileSystem::new()), temp_dir.path().join("media"));
        let secured = promoter.secure_or_fallback(&recording, "capture").await;

        assert!(secured.promoted);
        assert_eq!(secured.path.extension().unwrap(), "mov");
        assert!(!recording.exists());
    }
}
