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


//! HTTP streaming to a local file
//!
//! # Key Features
//! - Streams the response body in chunks through a buffered writer
//! - Non-2xx responses fail with the status code
//! - Bytes are flushed and synced before the download reports success
//! - A body shorter than the announced `Content-Length` is an error
//!
//! There is no resume: a failed download is deleted by the coordinator and
//! the next request starts over.

use crate::config::DownloadOptions;
use crate::download::progress::{DownloadState, ProgressCallback, ProgressTracker};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;
use url::Url;

/// Write buffer size
const DOWNLOAD_BUFF_SZ: usize = 64 * 1024;

/// Fetches a remote resource into a local file
///
/// The coordinator only knows this trait, so tests can swap in counting or
/// failing downloaders without a network.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` into `destination`, overwriting it
    ///
    /// Returns the number of bytes written.
    async fn download(
        &self,
        url: &str,
        destination: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<u64>;
}

/// [`Downloader`] backed by reqwest
pub struct HttpDownloader {
    client: Client,
    request_headers: HashMap<String, String>,
}

impl HttpDownloader {
    pub fn new(options: &DownloadOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            request_headers: options.request_headers.clone(),
        })
    }

    fn parse_url(url: &str) -> Result<Url> {
        let parsed = Url::parse(url).map_err(|e| CacheError::InvalidUrl(format!("{}: {}", url, e)))?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => Err(CacheError::InvalidUrl(format!(
                "Unsupported scheme {:?}: {}",
                scheme, url
            ))),
        }
    }

    async fn request(&self, url: Url) -> Result<reqwest::Response> {
        let display = url.to_string();
        let mut request = self.client.get(url);

        for (key, value) in &self.request_headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::UnexpectedStatusCode {
                status_code: status.as_u16(),
                url: display,
            });
        }

        Ok(response)
    }
}

/// Classify a reqwest failure
fn network_error(err: reqwest::Error) -> CacheError {
    let is_transient = err.is_timeout() || err.is_connect() || err.is_body();
    CacheError::network_error(err.to_string(), is_transient)
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(
        &self,
        url: &str,
        destination: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<u64> {
        let parsed = Self::parse_url(url)?;
        let response = self.request(parsed).await?;
        let content_length = response.content_length();

        let mut tracker = ProgressTracker::new(url.to_string(), content_length.unwrap_or(0));
        tracker.set_state(DownloadState::Downloading);

        let file = File::create(destination).await?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_BUFF_SZ, file);
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(network_error)?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if tracker.update(written) {
                if let Some(ref callback) = progress {
                    callback(tracker.snapshot());
                }
            }
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;

        // Final progress update; a response without a length is complete now
        if content_length.is_none() {
            tracker.set_total_bytes(written);
        }
        tracker.update(written);
        if let Some(ref callback) = progress {
            callback(tracker.snapshot());
        }

        if let Some(expected) = content_length {
            if written < expected {
                return Err(CacheError::network_error(
                    format!("Download incomplete: {}/{} bytes", written, expected),
                    true,
                ));
            }
        }

        debug!(url, bytes = written, path = %destination.display(), "Download finished");
        Ok(written)
    }
}
