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


//! Download progress tracking and reporting
//!
//! # Progress Information
//! - Source URL for identification
//! - Bytes downloaded / total bytes (0 when the server sends no length)
//! - Current speed with a moving average
//! - Percentage complete
//! - Download state (Queued, Downloading, Verifying, ...)
//!
//! Callbacks are throttled to one every 200ms; the final snapshot of a
//! download is always delivered.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Minimum interval between progress callbacks
const UPDATE_INTERVAL: Duration = Duration::from_millis(200);

/// Lifecycle of a single cache download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    /// Registered but no bytes requested yet
    Queued,
    /// Receiving bytes from the server
    Downloading,
    /// Bytes received; waiting for the file size to settle
    Verifying,
    /// File is at its cache path
    Completed,
    /// Download or verification failed
    Failed,
}

/// Progress snapshot for a single download
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Remote URL being cached
    pub url: String,

    /// Bytes written to the staging file so far
    pub bytes_downloaded: u64,

    /// Total bytes to download (0 if unknown)
    pub total_bytes: u64,

    /// Percentage complete (0.0 - 100.0)
    pub percent_complete: f64,

    /// Current download speed in bytes per second
    pub download_speed: f64,

    /// Current state of the download
    pub state: DownloadState,
}

impl DownloadProgress {
    pub fn new(url: String, total_bytes: u64) -> Self {
        Self {
            url,
            bytes_downloaded: 0,
            total_bytes,
            percent_complete: 0.0,
            download_speed: 0.0,
            state: DownloadState::Queued,
        }
    }

    /// Calculate percentage from bytes
    pub fn calculate_percentage(&mut self) {
        if self.total_bytes > 0 {
            self.percent_complete =
                (self.bytes_downloaded as f64 / self.total_bytes as f64 * 100.0).min(100.0);
        } else {
            self.percent_complete = 0.0;
        }
    }

    /// Format download speed as human-readable string (e.g., "2.5 MB/s")
    pub fn speed_string(&self) -> String {
        format!("{:.1} MB/s", self.download_speed / 1_000_000.0)
    }

    /// Format bytes as human-readable string (e.g., "45.2 MB")
    pub fn bytes_string(bytes: u64) -> String {
        format!("{:.1} MB", bytes as f64 / 1_000_000.0)
    }

    /// One-line status for logs and the CLI
    pub fn display_string(&self) -> String {
        match self.state {
            DownloadState::Queued => format!("{}: Queued", self.url),
            DownloadState::Downloading if self.total_bytes > 0 => format!(
                "{}: {:.1}% ({} / {}) - {}",
                self.url,
                self.percent_complete,
                Self::bytes_string(self.bytes_downloaded),
                Self::bytes_string(self.total_bytes),
                self.speed_string()
            ),
            DownloadState::Downloading => format!(
                "{}: {} - {}",
                self.url,
                Self::bytes_string(self.bytes_downloaded),
                self.speed_string()
            ),
            DownloadState::Verifying => format!("{}: Verifying", self.url),
            DownloadState::Completed => format!("{}: Completed", self.url),
            DownloadState::Failed => format!("{}: Failed", self.url),
        }
    }
}

/// Callback type for progress updates
pub type ProgressCallback = std::sync::Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Speed tracker with moving average
///
/// Uses a sliding window to smooth out network fluctuations.
#[derive(Debug)]
pub struct SpeedTracker {
    samples: VecDeque<SpeedSample>,
    window_duration: Duration,
}

#[derive(Debug, Clone)]
struct SpeedSample {
    timestamp: Instant,
    /// Total bytes at this point in time
    position: u64,
}

impl SpeedTracker {
    /// Create new speed tracker with default 10-second window
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(10))
    }

    pub fn with_window(window_duration: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window_duration,
        }
    }

    /// Add a position sample (total bytes downloaded so far)
    pub fn add_position(&mut self, position: u64) {
        let now = Instant::now();

        self.samples.push_back(SpeedSample {
            timestamp: now,
            position,
        });

        // Remove samples outside the window
        while let Some(sample) = self.samples.front() {
            if now.duration_since(sample.timestamp) > self.window_duration {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Current average speed in bytes per second
    pub fn average_speed(&self) -> f64 {
        let (first, last) = match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) if self.samples.len() >= 2 => (first, last),
            _ => return 0.0,
        };

        let bytes_delta = last.position.saturating_sub(first.position);
        let time_delta = last.timestamp.duration_since(first.timestamp).as_secs_f64();

        if time_delta > 0.0 {
            bytes_delta as f64 / time_delta
        } else {
            0.0
        }
    }
}

impl Default for SpeedTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress snapshot plus speed tracking and callback throttling
#[derive(Debug)]
pub struct ProgressTracker {
    progress: DownloadProgress,
    speed_tracker: SpeedTracker,
    last_update: Option<Instant>,
    update_interval: Duration,
}

impl ProgressTracker {
    pub fn new(url: String, total_bytes: u64) -> Self {
        Self {
            progress: DownloadProgress::new(url, total_bytes),
            speed_tracker: SpeedTracker::new(),
            last_update: None,
            update_interval: UPDATE_INTERVAL,
        }
    }

    /// Set the length once it is known, e.g. at the end of a chunked response
    pub fn set_total_bytes(&mut self, total_bytes: u64) {
        self.progress.total_bytes = total_bytes;
        self.progress.calculate_percentage();
    }

    /// Update progress with new position
    ///
    /// Returns true if enough time has passed and the callback should fire.
    /// The first update always fires.
    pub fn update(&mut self, bytes_downloaded: u64) -> bool {
        self.progress.bytes_downloaded = bytes_downloaded;
        self.speed_tracker.add_position(bytes_downloaded);
        self.progress.download_speed = self.speed_tracker.average_speed();
        self.progress.calculate_percentage();

        let now = Instant::now();
        match self.last_update {
            Some(last) if now.duration_since(last) < self.update_interval => false,
            _ => {
                self.last_update = Some(now);
                true
            }
        }
    }

    pub fn set_state(&mut self, state: DownloadState) {
        self.progress.state = state;
    }

    pub fn progress(&self) -> &DownloadProgress {
        &self.progress
    }

    pub fn snapshot(&self) -> DownloadProgress {
        self.progress.clone()
    }
}
