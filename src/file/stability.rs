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


//! Stable-file detection
//!
//! Downloaders, native compressors and the camera all hand back a path
//! before the last bytes are necessarily visible on disk. This module decides
//! when such a file has stopped changing.
//!
//! # Polling
//! 1. Sleep `initial_delay_ms`
//! 2. Read the size up to `max_retries` times, sleeping `base_delay_ms * n`
//!    after read `n`
//! 3. Two consecutive reads of the same size → stable
//! 4. A changed size becomes the new baseline; a missing file, an I/O error
//!    or (unless allowed) a zero size clears it
//! 5. Out of reads → `None`
//!
//! Verification only. Moving the file is [`crate::file::promotion`]'s job.

use crate::config::StabilityOptions;
use crate::file::fs::{FileInfo, FileSystem};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Equal-size readings in a row needed to call a file stable
const REQUIRED_CONSECUTIVE_READS: u32 = 2;

/// A file certified as fully written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StableFile {
    pub path: PathBuf,
    pub size: u64,
    /// Number of size reads it took
    pub checks: u32,
}

/// Polls a staged file until its size settles
#[derive(Clone)]
pub struct StabilityChecker {
    fs: Arc<dyn FileSystem>,
    options: StabilityOptions,
}

impl StabilityChecker {
    pub fn new(fs: Arc<dyn FileSystem>, options: StabilityOptions) -> Self {
        Self { fs, options }
    }

    pub fn options(&self) -> &StabilityOptions {
        &self.options
    }

    /// Wait for `path` to stop changing, using the configured options
    pub async fn promote_to_stable(&self, path: &Path) -> Option<StableFile> {
        self.promote_to_stable_with(path, &self.options).await
    }

    /// Wait for `path` to stop changing
    ///
    /// Never fails: a file that does not settle within the budget yields
    /// `None` and the caller picks the fallback.
    pub async fn promote_to_stable_with(
        &self,
        path: &Path,
        options: &StabilityOptions,
    ) -> Option<StableFile> {
        sleep(options.initial_delay()).await;

        let mut baseline: Option<u64> = None;
        let mut consecutive = 0u32;

        for attempt in 1..=options.max_retries {
            match self.fs.info(path).await {
                Ok(FileInfo::Existing { size, is_directory: false }) => {
                    if size == 0 && !options.allow_empty {
                        debug!(path = %path.display(), attempt, "File still empty");
                        baseline = None;
                        consecutive = 0;
                    } else if baseline == Some(size) {
                        consecutive += 1;
                    } else {
                        debug!(path = %path.display(), attempt, size, "File size changed");
                        baseline = Some(size);
                        consecutive = 1;
                    }

                    if consecutive >= REQUIRED_CONSECUTIVE_READS {
                        debug!(path = %path.display(), size, checks = attempt, "File is stable");
                        return Some(StableFile {
                            path: path.to_path_buf(),
                            size,
                            checks: attempt,
                        });
                    }
                }
                Ok(FileInfo::Existing { is_directory: true, .. }) => {
                    warn!(path = %path.display(), "Expected a file but found a directory");
                    return None;
                }
                Ok(FileInfo::Missing) => {
                    debug!(path = %path.display(), attempt, "File not visible yet");
                    baseline = None;
                    consecutive = 0;
                }
                Err(e) => {
                    // Some devices throw while the writer still holds the file
                    warn!(path = %path.display(), attempt, error = %e, "Size check failed, retrying");
                    baseline = None;
                    consecutive = 0;
                }
            }

            if attempt < options.max_retries {
                sleep(options.delay_after(attempt)).await;
            }
        }

        warn!(
            path = %path.display(),
            checks = options.max_retries,
            "File did not stabilize"
        );
        None
    }
}
