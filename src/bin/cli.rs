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


use anyhow::Context;
use clap::{Parser, Subcommand};
use clipcache_core::download::{DownloadProgress, DownloadState};
use clipcache_core::file::TokioFileSystem;
use clipcache_core::{CoreConfig, DownloadCoordinator, Promoter};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clipcache-cli")]
#[command(about = "ClipCache CLI - Desktop testing tool", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a URL into the cache (or reuse the cached copy)
    Fetch {
        url: String,
        /// Print download progress
        #[arg(short, long)]
        progress: bool,
    },
    /// Print what a player should open: cached path, or the URL on failure
    Play { url: String },
    /// Print the cached path of a URL, if cached
    Lookup { url: String },
    /// Print the cache path a URL maps to
    Path { url: String },
    /// Wait for a file to stabilize and move it to permanent storage
    Promote {
        file: PathBuf,
        /// Name prefix of the promoted file
        #[arg(long, default_value = "capture")]
        prefix: String,
    },
    /// Show number and size of cached videos
    Usage,
    /// Delete every cached video
    Clear,
    /// Delete part files left by interrupted downloads
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CoreConfig::from_file(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => CoreConfig::default(),
    };

    let coordinator = DownloadCoordinator::new(&config).context("building coordinator")?;

    match cli.command {
        Commands::Fetch { url, progress } => {
            if progress {
                coordinator.set_progress_callback(Some(Arc::new(|p: DownloadProgress| {
                    if p.state != DownloadState::Queued {
                        println!("{}", p.display_string());
                    }
                })));
            }
            let path = coordinator
                .start_caching(&url)
                .await
                .with_context(|| format!("caching {}", url))?;
            println!("{}", path.display());
        }
        Commands::Play { url } => {
            println!("{}", coordinator.playable_uri(&url).await);
        }
        Commands::Lookup { url } => match coordinator.get_cached_uri(&url).await {
            Some(path) => println!("{}", path.display()),
            None => println!("not cached"),
        },
        Commands::Path { url } => {
            println!("{}", coordinator.cache_path_for(&url).display());
        }
        Commands::Promote { file, prefix } => {
            let promoter = Promoter::from_config(Arc::new(TokioFileSystem::new()), &config);
            let secured = promoter.secure_or_fallback(&file, &prefix).await;
            if secured.promoted {
                println!("{}", secured.path.display());
            } else {
                anyhow::bail!("promotion failed, original kept at {}", secured.path.display());
            }
        }
        Commands::Usage => {
            let usage = coordinator.cache_usage().await?;
            println!(
                "{} files, {} in {}",
                usage.files,
                DownloadProgress::bytes_string(usage.bytes),
                coordinator.cache_dir().display()
            );
        }
        Commands::Clear => {
            let freed = coordinator.clear_cache().await?;
            println!(
                "Removed {} files ({})",
                freed.files,
                DownloadProgress::bytes_string(freed.bytes)
            );
        }
        Commands::Sweep => {
            let removed = coordinator.sweep_partial_downloads().await?;
            println!("Removed {} partial downloads", removed);
        }
    }

    Ok(())
}
