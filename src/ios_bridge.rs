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


//! C FFI bridge for iOS - Exposes the caching core to React Native
//!
//! # Architecture
//! JavaScript (React Native) → Swift (ClipCacheModule) → C FFI → Rust
//!
//! # Design Patterns
//! 1. **JSON Communication**: Results cross the boundary as JSON strings
//! 2. **Error Handling**: Errors come back as JSON error responses
//! 3. **Async Runtime**: Calls block on the shared Tokio runtime
//! 4. **No Panics**: Panics are caught before they reach Swift
//! 5. **Memory Safety**: Returned strings must be freed with `cc_free_string()`
//!
//! Example Swift code:
//! ```swift
//! let resultPtr = cc_start_caching(url)
//! defer { cc_free_string(resultPtr) }
//! let jsonString = String(cString: resultPtr)
//! ```

use crate::bridge::{self, catch_panic, error_response, result_to_json};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Safely convert C string pointer to Rust String
fn c_str_to_string(ptr: *const c_char) -> crate::Result<String> {
    if ptr.is_null() {
        return Err(crate::CacheError::invalid_input("Null pointer received"));
    }
    // SAFETY: non-null pointers from Swift are valid NUL-terminated strings
    unsafe {
        CStr::from_ptr(ptr)
            .to_str()
            .map(|s| s.to_string())
            .map_err(|e| crate::CacheError::invalid_input(format!("Invalid UTF-8: {}", e)))
    }
}

/// Optional string argument; null reads as empty
fn c_str_or_empty(ptr: *const c_char) -> crate::Result<String> {
    if ptr.is_null() {
        Ok(String::new())
    } else {
        c_str_to_string(ptr)
    }
}

/// Convert Rust string to C string pointer
///
/// Caller MUST free the returned pointer using `cc_free_string()`
fn string_to_c_str(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(c_string) => c_string.into_raw(),
        Err(_) => {
            let error_json = error_response("String contains null bytes");
            CString::new(error_json).unwrap_or_default().into_raw()
        }
    }
}

/// Run a call taking one string argument
fn with_arg<T, F>(arg: *const c_char, f: F) -> *mut c_char
where
    T: serde::Serialize,
    F: FnOnce(String) -> crate::Result<T>,
{
    let response = catch_panic(|| result_to_json(c_str_to_string(arg).and_then(f)));
    string_to_c_str(response)
}

// ============================================================================
// CACHE FUNCTIONS
// ============================================================================

/// Initialize the core
///
/// # Arguments
/// * `config_json` - `CoreConfig` JSON; null or `""` for defaults
///
/// # Returns
/// `{"success": true, "data": {"cache_directory": "...", "permanent_directory": "..."}}`
#[no_mangle]
pub extern "C" fn cc_init(config_json: *const c_char) -> *mut c_char {
    let response = catch_panic(|| {
        result_to_json(c_str_or_empty(config_json).and_then(|json| bridge::init(&json)))
    });
    string_to_c_str(response)
}

/// Local path of a cached URL
///
/// `data` is the path, or `null` on a miss. Never an error once initialized.
#[no_mangle]
pub extern "C" fn cc_get_cached_uri(url: *const c_char) -> *mut c_char {
    with_arg(url, |url| bridge::get_cached_uri(&url))
}

/// Local path for a URL, downloading it if needed
///
/// Blocks until the (possibly shared) download settles.
#[no_mangle]
pub extern "C" fn cc_start_caching(url: *const c_char) -> *mut c_char {
    with_arg(url, |url| bridge::start_caching(&url))
}

/// Path for the player: the cached file, or `url` when caching failed
///
/// Only fails when the core is not initialized.
#[no_mangle]
pub extern "C" fn cc_playable_uri(url: *const c_char) -> *mut c_char {
    with_arg(url, |url| bridge::playable_uri(&url))
}

/// Wait for a file to stop changing
///
/// # Arguments
/// * `path` - File written by another component
/// * `options_json` - Optional `{"initial_delay_ms": 500, "max_retries": 15}`
///
/// # Returns
/// `data` is `{"path", "size", "checks"}`, or `null` if it never settled.
#[no_mangle]
pub extern "C" fn cc_promote_to_stable(
    path: *const c_char,
    options_json: *const c_char,
) -> *mut c_char {
    let response = catch_panic(|| {
        let result = c_str_to_string(path).and_then(|path| {
            let options = c_str_or_empty(options_json)?;
            bridge::promote_to_stable(&path, &options)
        });
        result_to_json(result)
    });
    string_to_c_str(response)
}

/// Deterministic cache path for a URL, without touching the disk
#[no_mangle]
pub extern "C" fn cc_cache_path_for_url(url: *const c_char) -> *mut c_char {
    with_arg(url, |url| bridge::cache_path_for_url(&url))
}

/// Delete every completed cache entry
///
/// `data` is `{"files", "bytes"}` freed.
#[no_mangle]
pub extern "C" fn cc_clear_cache() -> *mut c_char {
    string_to_c_str(catch_panic(|| result_to_json(bridge::clear_cache())))
}

/// Free a string returned by any `cc_*` function
///
/// # Safety
/// Call exactly once per returned string. Null is ignored.
#[no_mangle]
pub extern "C" fn cc_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        // SAFETY: ptr came from CString::into_raw in this module
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn call(ptr: *mut c_char) -> serde_json::Value {
        // SAFETY: ptr was just returned by a cc_* function
        let json = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        cc_free_string(ptr);
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_string_conversions() {
        let c_str = CString::new("Hello, World!").unwrap();
        assert_eq!(c_str_to_string(c_str.as_ptr()).unwrap(), "Hello, World!");
        assert!(c_str_to_string(std::ptr::null()).is_err());
        assert_eq!(c_str_or_empty(std::ptr::null()).unwrap(), "");
    }

    #[test]
    fn test_null_url_is_an_error_response() {
        let response = call(cc_start_caching(std::ptr::null()));
        assert_eq!(response["success"], false);
        assert!(response["error"].as_str().unwrap().contains("Null pointer"));
    }

    #[test]
    fn test_memory_safety() {
        let c_ptr = string_to_c_str("Memory test".to_string());
        assert!(!c_ptr.is_null());
        cc_free_string(c_ptr);
        cc_free_string(std::ptr::null_mut());
    }

    // Single test touching the global core so parallel tests don't race on it
    #[test]
    fn test_cache_round_trip_through_ffi() {
        let temp_dir = TempDir::new().unwrap();
        let config = serde_json::json!({
            "cache_directory": temp_dir.path().join("videos"),
            "permanent_directory": temp_dir.path().join("media"),
            "stability": {"initial_delay_ms": 1, "base_delay_ms": 1, "max_retries": 4},
        })
        .to_string();
        let config = CString::new(config).unwrap();

        let init = call(cc_init(config.as_ptr()));
        assert_eq!(init["success"], true);

        let url = CString::new("https://cdn.example.com/a/b/video.mp4?x=1").unwrap();
        let path = call(cc_cache_path_for_url(url.as_ptr()));
        let path = path["data"].as_str().unwrap().to_string();
        assert!(path.ends_with(".mp4"));

        let miss = call(cc_get_cached_uri(url.as_ptr()));
        assert_eq!(miss["success"], true);
        assert!(miss["data"].is_null());

        std::fs::write(&path, b"already cached").unwrap();
        let hit = call(cc_start_caching(url.as_ptr()));
        assert_eq!(hit["data"].as_str().unwrap(), path);
        let playable = call(cc_playable_uri(url.as_ptr()));
        assert_eq!(playable["data"].as_str().unwrap(), path);

        // Unsupported scheme: caching fails, playback uses the source
        let ftp = CString::new("ftp://cdn.example.com/clip.mp4").unwrap();
        let fallback = call(cc_playable_uri(ftp.as_ptr()));
        assert_eq!(fallback["success"], true);
        assert_eq!(fallback["data"], "ftp://cdn.example.com/clip.mp4");

        let file = CString::new(path.clone()).unwrap();
        let stable = call(cc_promote_to_stable(file.as_ptr(), std::ptr::null()));
        assert_eq!(stable["data"]["size"], 14);

        let cleared = call(cc_clear_cache());
        assert_eq!(cleared["data"]["files"], 1);
        assert!(!std::path::Path::new(&path).exists());
    }
}
