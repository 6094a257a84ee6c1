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


//! File management, stability detection and promotion
//!
//! # Layers
//! - `fs` - the [`FileSystem`] seam and its `tokio::fs` implementation
//! - `paths` - deterministic cache paths and fresh permanent names
//! - `manager` - directory ensure, delete and verified move with retry
//! - `stability` - polls a staged file until its size settles
//! - `promotion` - stabilize, then move into durable storage

pub mod fs;
pub mod manager;
pub mod paths;
pub mod promotion;
pub mod stability;

// Re-export commonly used types
pub use fs::{FileInfo, FileSystem, TokioFileSystem};
pub use manager::FileManager;
pub use promotion::{PromotedFile, Promoter, SecuredFile, StagedKind};
pub use stability::{StabilityChecker, StableFile};
