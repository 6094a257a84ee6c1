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


//! JNI bridge for Android - Exposes the caching core to React Native
//!
//! # Architecture
//! JavaScript (React Native) → Kotlin (ClipCacheModule) → JNI → Rust
//!
//! Same JSON responses as the iOS bridge; see [`crate::bridge`].

use crate::bridge::{self, catch_panic, error_response, result_to_json};
use jni::objects::{JClass, JString};
use jni::sys::jstring;
use jni::JNIEnv;
use serde::Serialize;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Convert JString to Rust String; a null reference reads as empty
fn jstring_to_string(env: &mut JNIEnv, jstr: &JString) -> crate::Result<String> {
    if jstr.is_null() {
        return Ok(String::new());
    }
    env.get_string(jstr)
        .map(|s| s.into())
        .map_err(|e| crate::CacheError::invalid_input(format!("JNI string conversion failed: {}", e)))
}

/// Hand a response back to Kotlin
fn to_jstring(env: &mut JNIEnv, response: String) -> jstring {
    match env.new_string(response) {
        Ok(output) => output.into_raw(),
        // A pending Java exception is already set
        Err(_) => std::ptr::null_mut(),
    }
}

/// Run a call taking one string argument
fn with_arg<T, F>(env: &mut JNIEnv, arg: &JString, f: F) -> jstring
where
    T: Serialize,
    F: FnOnce(String) -> crate::Result<T>,
{
    let response = match jstring_to_string(env, arg) {
        Ok(arg) => catch_panic(move || result_to_json(f(arg))),
        Err(e) => error_response(&e.to_string()),
    };
    to_jstring(env, response)
}

// ============================================================================
// CACHE FUNCTIONS
// ============================================================================

/// Initialize the core from `CoreConfig` JSON (`""` for defaults)
#[no_mangle]
pub extern "C" fn Java_expo_modules_clipcache_ClipCacheModule_nativeInit(
    mut env: JNIEnv,
    _class: JClass,
    config_json: JString,
) -> jstring {
    with_arg(&mut env, &config_json, |json| bridge::init(&json))
}

/// Cached path for a URL, or `null` data on a miss
#[no_mangle]
pub extern "C" fn Java_expo_modules_clipcache_ClipCacheModule_nativeGetCachedUri(
    mut env: JNIEnv,
    _class: JClass,
    url: JString,
) -> jstring {
    with_arg(&mut env, &url, |url| bridge::get_cached_uri(&url))
}

/// Local path for a URL, downloading it if needed
///
/// Blocks the calling thread; Kotlin calls this off the main thread.
#[no_mangle]
pub extern "C" fn Java_expo_modules_clipcache_ClipCacheModule_nativeStartCaching(
    mut env: JNIEnv,
    _class: JClass,
    url: JString,
) -> jstring {
    with_arg(&mut env, &url, |url| bridge::start_caching(&url))
}

/// Cached path for a URL, or the URL itself when caching failed
#[no_mangle]
pub extern "C" fn Java_expo_modules_clipcache_ClipCacheModule_nativePlayableUri(
    mut env: JNIEnv,
    _class: JClass,
    url: JString,
) -> jstring {
    with_arg(&mut env, &url, |url| bridge::playable_uri(&url))
}

/// Wait for a file to stop changing
///
/// `options_json` may override `initial_delay_ms` and `max_retries`.
#[no_mangle]
pub extern "C" fn Java_expo_modules_clipcache_ClipCacheModule_nativePromoteToStable(
    mut env: JNIEnv,
    _class: JClass,
    path: JString,
    options_json: JString,
) -> jstring {
    let options = match jstring_to_string(&mut env, &options_json) {
        Ok(options) => options,
        Err(e) => return to_jstring(&mut env, error_response(&e.to_string())),
    };
    with_arg(&mut env, &path, move |path| {
        bridge::promote_to_stable(&path, &options)
    })
}

/// Deterministic cache path for a URL
#[no_mangle]
pub extern "C" fn Java_expo_modules_clipcache_ClipCacheModule_nativeCachePathForUrl(
    mut env: JNIEnv,
    _class: JClass,
    url: JString,
) -> jstring {
    with_arg(&mut env, &url, |url| bridge::cache_path_for_url(&url))
}

/// Delete every completed cache entry
#[no_mangle]
pub extern "C" fn Java_expo_modules_clipcache_ClipCacheModule_nativeClearCache(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    let response = catch_panic(|| result_to_json(bridge::clear_cache()));
    to_jstring(&mut env, response)
}
