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


//! Compression before upload
//!
//! # Pipeline
//! 1. Native compressor writes its output somewhere in cache storage
//! 2. Output is stabilized and promoted to permanent storage
//! 3. Only then is the uncompressed original deleted
//!
//! Any failure returns the original input. A missed optimization means a
//! larger upload; it never means lost content.

use crate::config::{CompressionOptions, CoreConfig};
use crate::error::{CacheError, Result};
use crate::file::fs::FileSystem;
use crate::file::promotion::{Promoter, StagedKind};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Prefix for promoted compressor output
const COMPRESSED_PREFIX: &str = "compressed";

/// Compression progress as a fraction in `0.0..=1.0`
pub type CompressionProgress = Arc<dyn Fn(f64) + Send + Sync>;

/// Platform video compressor
///
/// Implementations may return before the output is fully flushed; the
/// pipeline waits for it to settle.
#[async_trait]
pub trait VideoCompressor: Send + Sync {
    /// Compress `input` with engine-specific `options`, returning the path of
    /// the compressed file
    async fn compress(
        &self,
        input: &Path,
        options: &serde_json::Value,
        on_progress: Option<CompressionProgress>,
    ) -> Result<PathBuf>;
}

/// Result of [`CompressionPipeline::compress_and_secure`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecuredVideo {
    /// File to upload
    pub path: PathBuf,
    /// `false` when `path` is the untouched original
    pub compressed: bool,
}

impl SecuredVideo {
    fn original(input: &Path) -> Self {
        Self {
            path: input.to_path_buf(),
            compressed: false,
        }
    }
}

/// Compress, verify, promote, then delete the original
pub struct CompressionPipeline {
    compressor: Arc<dyn VideoCompressor>,
    promoter: Promoter,
    options: CompressionOptions,
}

impl CompressionPipeline {
    pub fn new(
        compressor: Arc<dyn VideoCompressor>,
        promoter: Promoter,
        options: CompressionOptions,
    ) -> Self {
        Self {
            compressor,
            promoter,
            options,
        }
    }

    pub fn from_config(
        compressor: Arc<dyn VideoCompressor>,
        fs: Arc<dyn FileSystem>,
        config: &CoreConfig,
    ) -> Self {
        Self::new(
            compressor,
            Promoter::from_config(fs, config),
            config.compression.clone(),
        )
    }

    /// Compress a recording and move the result into permanent storage
    ///
    /// Never fails; on any error the original input is returned.
    pub async fn compress_and_secure(
        &self,
        input: &Path,
        on_progress: Option<CompressionProgress>,
    ) -> SecuredVideo {
        let output = match self.compress(input, on_progress).await {
            Ok(Some(output)) => output,
            Ok(None) => return SecuredVideo::original(input),
            Err(e) => {
                warn!(input = %input.display(), error = %e, "Compression failed, using original");
                return SecuredVideo::original(input);
            }
        };

        let promoted = match self
            .promoter
            .promote(&output, StagedKind::Intermediate, COMPRESSED_PREFIX)
            .await
        {
            Ok(promoted) => promoted,
            Err(e) => {
                warn!(output = %output.display(), error = %e, "Compressed file not promoted, using original");
                return SecuredVideo::original(input);
            }
        };

        if self.options.delete_original_on_success {
            self.promoter.files().delete_quietly(input).await;
        }

        info!(
            input = %input.display(),
            output = %promoted.path.display(),
            size = promoted.size,
            "Video compressed"
        );

        SecuredVideo {
            path: promoted.path,
            compressed: true,
        }
    }

    /// Run the compressor; `None` when it declined and handed back its input
    async fn compress(
        &self,
        input: &Path,
        on_progress: Option<CompressionProgress>,
    ) -> Result<Option<PathBuf>> {
        let output = self
            .compressor
            .compress(input, &self.options.encoder, on_progress)
            .await
            .map_err(|e| match e {
                CacheError::CompressionFailed(_) => e,
                other => CacheError::CompressionFailed(other.to_string()),
            })?;

        Ok(if output == input { None } else { Some(output) })
    }
}
