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


//! Shared state and helpers for the native bridges
//!
//! The host app calls `init` once with its configuration. That builds the
//! single [`DownloadCoordinator`] and [`Promoter`] every later bridge call
//! uses; calling `init` again replaces them.
//!
//! # Response Format
//! Every bridge function returns a JSON string:
//! ```json
//! { "success": true, "data": ... }
//! ```
//! or
//! ```json
//! { "success": false, "error": "Error message" }
//! ```

use crate::config::{CoreConfig, StabilityOptions};
use crate::download::{CacheUsage, DownloadCoordinator};
use crate::error::{CacheError, Result};
use crate::file::fs::{FileSystem, TokioFileSystem};
use crate::file::promotion::Promoter;
use crate::file::stability::StableFile;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::info;

// Lazy static tokio runtime for async operations
lazy_static::lazy_static! {
    pub(crate) static ref RUNTIME: tokio::runtime::Runtime =
        tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    static ref CORE: RwLock<Option<Arc<Core>>> = RwLock::new(None);
}

/// Everything the bridges operate on
pub(crate) struct Core {
    pub(crate) config: CoreConfig,
    pub(crate) coordinator: DownloadCoordinator,
    pub(crate) promoter: Promoter,
}

/// Returned by `init`
#[derive(Debug, Serialize)]
pub(crate) struct InitInfo {
    cache_directory: PathBuf,
    permanent_directory: PathBuf,
}

/// Optional per-call overrides for `promote_to_stable`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PromoteParams {
    initial_delay_ms: Option<u64>,
    max_retries: Option<u32>,
}

impl PromoteParams {
    fn apply(&self, base: StabilityOptions) -> StabilityOptions {
        StabilityOptions {
            initial_delay_ms: self.initial_delay_ms.unwrap_or(base.initial_delay_ms),
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            ..base
        }
    }
}

fn core() -> Result<Arc<Core>> {
    let guard = CORE
        .read()
        .map_err(|_| CacheError::internal("Core state lock poisoned"))?;
    guard
        .clone()
        .ok_or_else(|| CacheError::InvalidConfiguration("Core not initialized; call init first".into()))
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Build the core from a JSON configuration (`""` means defaults)
pub(crate) fn init(config_json: &str) -> Result<InitInfo> {
    let config = if config_json.trim().is_empty() {
        CoreConfig::default()
    } else {
        CoreConfig::from_json(config_json)?
    };

    let fs: Arc<dyn FileSystem> = Arc::new(TokioFileSystem::new());
    // reqwest's client needs a runtime context
    let coordinator = {
        let _enter = RUNTIME.enter();
        DownloadCoordinator::new(&config)?
    };
    let promoter = Promoter::from_config(fs, &config);

    let info = InitInfo {
        cache_directory: config.cache_directory.clone(),
        permanent_directory: config.permanent_directory.clone(),
    };

    let mut guard = CORE
        .write()
        .map_err(|_| CacheError::internal("Core state lock poisoned"))?;
    *guard = Some(Arc::new(Core {
        config,
        coordinator,
        promoter,
    }));

    info!(cache = %info.cache_directory.display(), "Core initialized");
    Ok(info)
}

pub(crate) fn get_cached_uri(url: &str) -> Result<Option<String>> {
    let core = core()?;
    let path = RUNTIME.block_on(core.coordinator.get_cached_uri(url));
    Ok(path.map(|p| p.to_string_lossy().into_owned()))
}

pub(crate) fn start_caching(url: &str) -> Result<String> {
    let core = core()?;
    let path = RUNTIME.block_on(core.coordinator.start_caching(url))?;
    Ok(path.to_string_lossy().into_owned())
}

/// Cached path, or the URL itself when caching failed
pub(crate) fn playable_uri(url: &str) -> Result<String> {
    let core = core()?;
    Ok(RUNTIME.block_on(core.coordinator.playable_uri(url)))
}

/// Stability check only; `None` when the file never settled
pub(crate) fn promote_to_stable(path: &str, params_json: &str) -> Result<Option<StableFile>> {
    let core = core()?;
    let params: PromoteParams = if params_json.trim().is_empty() {
        PromoteParams::default()
    } else {
        serde_json::from_str(params_json)
            .map_err(|e| CacheError::invalid_input(format!("Invalid JSON: {}", e)))?
    };

    let options = params.apply(core.config.stability);
    let checker = core.promoter.checker();
    Ok(RUNTIME.block_on(checker.promote_to_stable_with(Path::new(path), &options)))
}

pub(crate) fn cache_path_for_url(url: &str) -> Result<String> {
    let core = core()?;
    Ok(core.coordinator.cache_path_for(url).to_string_lossy().into_owned())
}

pub(crate) fn clear_cache() -> Result<CacheUsage> {
    let core = core()?;
    RUNTIME.block_on(core.coordinator.clear_cache())
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Convert Rust result to JSON response string
pub(crate) fn result_to_json<T: Serialize>(result: Result<T>) -> String {
    match result {
        Ok(data) => success_response(data),
        Err(e) => error_response(&e.to_string()),
    }
}

/// Create success response JSON
pub(crate) fn success_response<T: Serialize>(data: T) -> String {
    serde_json::json!({
        "success": true,
        "data": data
    })
    .to_string()
}

/// Create error response JSON
pub(crate) fn error_response(error: &str) -> String {
    serde_json::json!({
        "success": false,
        "error": error
    })
    .to_string()
}

/// Run a bridge call, turning panics into error responses
pub(crate) fn catch_panic<F>(f: F) -> String
where
    F: FnOnce() -> String,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic_err) => {
            let panic_msg = if let Some(s) = panic_err.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = panic_err.downcast_ref::<&str>() {
                s.to_string()
            } else {
                "Unknown panic occurred".to_string()
            };
            error_response(&format!("Rust panic: {}", panic_msg))
        }
    }
}
