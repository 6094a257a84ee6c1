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


//! Path generation for cached and promoted files
//!
//! # Cache paths
//! A cached video lives at `<cache_dir>/<hash>.<ext>`:
//! - `hash` is a 32-bit rolling hash of the full URL (query included), printed
//!   as a non-negative decimal integer
//! - `ext` is taken from the last path segment, ignoring query and fragment,
//!   and falls back to the configured default
//!
//! The mapping is pure, so no index file is kept: the cache describes itself.
//! Distinct URLs may collide; that is accepted.
//!
//! # Permanent paths
//! Promoted files get a fresh timestamp-based name so two promotions never
//! target the same path.

use std::path::{Path, PathBuf};
use url::Url;

/// Suffix of in-progress downloads inside the cache directory
pub const STAGING_SUFFIX: &str = "part";

/// Longest extension accepted from a URL
const MAX_EXTENSION_LENGTH: usize = 5;

/// 32-bit rolling hash of a URL (`h = 31 * h + unit` over UTF-16 code units)
///
/// Matches the hash the mobile client has always used, so caches written by
/// earlier app versions stay addressable.
pub fn url_hash(url: &str) -> u32 {
    let hash = url
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32));
    hash.unsigned_abs()
}

/// Extension of the URL's last path segment, lowercased
///
/// Returns `default_extension` when the segment has no usable extension, or
/// when its extension is the staging suffix: a finished entry must never look
/// like an in-progress download.
pub fn file_extension(url: &str, default_extension: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => strip_query_and_fragment(url).to_string(),
    };

    let segment = path.rsplit('/').next().unwrap_or("");
    segment
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| is_valid_extension(ext))
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| ext != STAGING_SUFFIX)
        .unwrap_or_else(|| default_extension.to_string())
}

/// File name of the cache entry for a URL
pub fn cache_file_name(url: &str, default_extension: &str) -> String {
    format!("{}.{}", url_hash(url), file_extension(url, default_extension))
}

/// Full cache path for a URL
pub fn cache_path(cache_dir: &Path, url: &str, default_extension: &str) -> PathBuf {
    cache_dir.join(cache_file_name(url, default_extension))
}

/// Path a download is written to before it is verified
pub fn staging_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(STAGING_SUFFIX);
    final_path.with_file_name(name)
}

/// Whether a path is an in-progress download
pub fn is_staging_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(STAGING_SUFFIX)
}

/// Fresh, collision-free name for a promoted file
///
/// Format: `{prefix}_{YYYYmmdd_HHMMSS_mmm}_{8 hex}.{ext}`
pub fn unique_file_name(prefix: &str, extension: &str) -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}.{}",
        sanitize_component(prefix),
        timestamp,
        &suffix[..8],
        extension
    )
}

/// Extension of an existing local file, or the default
pub fn local_extension(path: &Path, default_extension: &str) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|ext| is_valid_extension(ext))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| default_extension.to_string())
}

fn strip_query_and_fragment(url: &str) -> &str {
    let end = url.find(|c| c == '?' || c == '#').unwrap_or(url.len());
    &url[..end]
}

fn is_valid_extension(ext: &str) -> bool {
    !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LENGTH
        && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Replace characters that are unsafe in file names
fn sanitize_component(name: &str) -> String {
    let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', '.'];
    let cleaned: String = name
        .chars()
        .map(|c| if invalid_chars.contains(&c) || c.is_control() { '_' } else { c })
        .collect::<String>()
        .trim()
        .to_string();

    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned
    }
}
