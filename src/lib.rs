//! ClipCache core
//!
//! Local caching of remote videos and safe promotion of files written by
//! other components (downloader, compressor, camera) into durable storage.
//!
//! # Modules
//! - `file` - filesystem seam, cache paths, stability check, promotion
//! - `download` - download coordinator and HTTP downloader
//! - `pipeline` - compression consumer and cancellable operations
//! - `ios_bridge` / `jni_bridge` - native entry points

uniffi::setup_scaffolding!();

pub mod config;
pub mod download;
pub mod error;
pub mod file;
pub mod pipeline;

mod bridge;
pub mod ios_bridge;

// JNI bridge for Android
#[cfg(target_os = "android")]
mod jni_bridge;

pub use config::CoreConfig;
pub use download::{DownloadCoordinator, HttpDownloader};
pub use error::{CacheError, Result};
pub use file::{FileManager, Promoter, StabilityChecker, StableFile};
pub use pipeline::{ActiveOperations, CompressionPipeline};

/// Cache path for `url` under `cache_dir`
#[uniffi::export]
pub fn cache_path_for_url(cache_dir: String, url: String, default_extension: String) -> String {
    file::paths::cache_path(std::path::Path::new(&cache_dir), &url, &default_extension)
        .to_string_lossy()
        .into_owned()
}

/// Hash naming the cache file of `url`
#[uniffi::export]
pub fn url_hash(url: String) -> u32 {
    file::paths::url_hash(&url)
}
