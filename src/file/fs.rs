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


//! Filesystem primitives
//!
//! Everything above this module talks to storage through [`FileSystem`], so
//! tests can script file sizes and failures without touching a disk.
//! Platform errors are returned as plain `io::Error`; callers treat them all
//! as "I/O failure".

use async_trait::async_trait;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

/// Result of querying a path
///
/// Size is only reachable on `Existing`, so a missing file can never be
/// mistaken for an empty one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FileInfo {
    Existing { size: u64, is_directory: bool },
    Missing,
}

impl FileInfo {
    pub fn exists(&self) -> bool {
        matches!(self, FileInfo::Existing { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self, FileInfo::Existing { is_directory: false, .. })
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, FileInfo::Existing { is_directory: true, .. })
    }

    /// Size of an existing regular file
    pub fn file_size(&self) -> Option<u64> {
        match self {
            FileInfo::Existing { size, is_directory: false } => Some(*size),
            _ => None,
        }
    }
}

/// A regular file found by [`FileSystem::list_files`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub path: PathBuf,
    pub size: u64,
}

/// Async filesystem operations used by the caching core
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Existence, size and kind of a path; `Missing` is not an error
    async fn info(&self, path: &Path) -> io::Result<FileInfo>;

    /// Create a directory and all parents (idempotent)
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Move a file
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Delete a file; deleting a missing file succeeds
    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Regular files directly inside `dir`
    async fn list_files(&self, dir: &Path) -> io::Result<Vec<DirEntryInfo>>;
}

/// [`FileSystem`] backed by `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
const CROSS_DEVICE_ERROR: i32 = 18; // EXDEV
#[cfg(windows)]
const CROSS_DEVICE_ERROR: i32 = 17; // ERROR_NOT_SAME_DEVICE
#[cfg(not(any(unix, windows)))]
const CROSS_DEVICE_ERROR: i32 = -1;

fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(CROSS_DEVICE_ERROR)
}

/// Move by copying; a failed copy leaves no destination behind
async fn copy_then_remove(from: &Path, to: &Path) -> io::Result<()> {
    if let Err(e) = fs::copy(from, to).await {
        match fs::remove_file(to).await {
            Ok(()) => {}
            Err(cleanup) if cleanup.kind() == io::ErrorKind::NotFound => {}
            Err(cleanup) => {
                warn!(path = %to.display(), error = %cleanup, "Partial copy not removed");
            }
        }
        return Err(e);
    }
    fs::remove_file(from).await
}

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn info(&self, path: &Path) -> io::Result<FileInfo> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(FileInfo::Existing {
                size: metadata.len(),
                is_directory: metadata.is_dir(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FileInfo::Missing),
            Err(e) => Err(e),
        }
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        match fs::rename(from, to).await {
            Ok(()) => Ok(()),
            // Cache and documents directories can sit on different volumes
            Err(e) if is_cross_device(&e) => copy_then_remove(from, to).await,
            Err(e) => Err(e),
        }
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list_files(&self, dir: &Path) -> io::Result<Vec<DirEntryInfo>> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                files.push(DirEntryInfo {
                    path: entry.path(),
                    size: metadata.len(),
                });
            }
        }
        Ok(files)
    }
}
