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


//! Core configuration
//!
//! The host app passes configuration across the bridge as JSON. Every field
//! has a default, so `{}` is a valid configuration and partial objects only
//! override what they name.
//!
//! The timing defaults were tuned against slow Android storage. They are
//! defaults, not protocol constants.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for the caching core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Directory holding cached remote videos (may be evicted by the OS)
    pub cache_directory: PathBuf,

    /// Durable application storage for promoted files
    pub permanent_directory: PathBuf,

    /// Extension used when a URL carries none
    pub default_extension: String,

    /// Stable-file polling parameters
    pub stability: StabilityOptions,

    /// Directory creation retry budget
    pub directory_retry: DirectoryRetry,

    /// Download behaviour
    pub download: DownloadOptions,

    /// Compression pipeline behaviour
    pub compression: CompressionOptions,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let root = std::env::temp_dir().join("clipcache");
        Self {
            cache_directory: root.join("videos"),
            permanent_directory: root.join("media"),
            default_extension: "mp4".to_string(),
            stability: StabilityOptions::default(),
            directory_retry: DirectoryRetry::default(),
            download: DownloadOptions::default(),
            compression: CompressionOptions::default(),
        }
    }
}

impl CoreConfig {
    /// Configuration rooted at a single directory
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            cache_directory: root.join("videos"),
            permanent_directory: root.join("media"),
            ..Self::default()
        }
    }

    /// Parse from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file on disk
    pub async fn from_file(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            CacheError::FileIoError(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Reject configurations the core cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.cache_directory.as_os_str().is_empty() {
            return Err(CacheError::InvalidConfiguration("cache_directory is empty".into()));
        }
        if self.permanent_directory.as_os_str().is_empty() {
            return Err(CacheError::InvalidConfiguration("permanent_directory is empty".into()));
        }
        if self.cache_directory == self.permanent_directory {
            return Err(CacheError::InvalidConfiguration(
                "cache_directory and permanent_directory must differ".into(),
            ));
        }
        if self.default_extension.is_empty()
            || !self.default_extension.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(CacheError::InvalidConfiguration(format!(
                "default_extension must be alphanumeric: {:?}",
                self.default_extension
            )));
        }
        if self.stability.max_retries == 0 {
            return Err(CacheError::InvalidConfiguration("stability.max_retries must be > 0".into()));
        }
        if self.directory_retry.attempts == 0 {
            return Err(CacheError::InvalidConfiguration("directory_retry.attempts must be > 0".into()));
        }
        Ok(())
    }
}

/// Parameters for the stable-file poller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityOptions {
    /// Wait before the first size check
    pub initial_delay_ms: u64,

    /// Maximum number of size checks
    pub max_retries: u32,

    /// Delay after check N is `base_delay_ms * N`
    pub base_delay_ms: u64,

    /// Whether a zero-byte file may be declared stable
    pub allow_empty: bool,
}

impl Default for StabilityOptions {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_retries: 15,
            base_delay_ms: 250,
            allow_empty: false,
        }
    }
}

impl StabilityOptions {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Linear backoff after the given (1-based) attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(attempt as u64))
    }
}

/// Retry budget for `ensure_directory_exists`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryRetry {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for DirectoryRetry {
    fn default() -> Self {
        Self { attempts: 3, delay_ms: 100 }
    }
}

impl DirectoryRetry {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// HTTP download behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadOptions {
    /// Whole-request timeout
    pub timeout_secs: u64,

    /// Run downloaded bytes through the stability check before exposing them
    pub verify_stability: bool,

    /// Extra headers sent with every download
    pub request_headers: HashMap<String, String>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            verify_stability: true,
            request_headers: HashMap::new(),
        }
    }
}

/// Compression pipeline behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionOptions {
    /// Delete the uncompressed input once the compressed copy is promoted
    pub delete_original_on_success: bool,
    /// Passed through to the platform compressor untouched
    pub encoder: serde_json::Value,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            delete_original_on_success: true,
            encoder: serde_json::Value::Null,
        }
    }
}
