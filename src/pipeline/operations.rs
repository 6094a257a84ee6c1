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


//! Registry of cancellable background operations
//!
//! Uploads and other user-visible jobs are keyed by an operation id. Unlike
//! cache downloads they can be cancelled. An entry leaves the registry as
//! soon as its operation settles, whether it succeeded, failed or was
//! cancelled.

use crate::error::{CacheError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Registered operation
struct ActiveOperation {
    /// Distinguishes reuse of the same id after the first settles
    generation: u64,
    cancel_tx: oneshot::Sender<()>,
    started_at: chrono::DateTime<chrono::Utc>,
}

type Registry = Arc<Mutex<HashMap<String, ActiveOperation>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<String, ActiveOperation>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes an entry when its task ends, unless the id was reused meanwhile
struct RegistryGuard {
    registry: Registry,
    id: String,
    generation: u64,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        let mut active = lock(&self.registry);
        if active.get(&self.id).map(|op| op.generation) == Some(self.generation) {
            active.remove(&self.id);
        }
    }
}

/// Awaitable result of a spawned operation
#[derive(Debug)]
pub struct OperationHandle<T> {
    id: String,
    handle: JoinHandle<Result<T>>,
}

impl<T> OperationHandle<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the operation; a cancelled one yields [`CacheError::Cancelled`]
    pub async fn wait(self) -> Result<T> {
        self.handle.await?
    }
}

/// Cancellable operations keyed by id
#[derive(Clone, Default)]
pub struct ActiveOperations {
    registry: Registry,
    next_generation: Arc<AtomicU64>,
}

impl ActiveOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `operation` in the background under `id`
    ///
    /// Fails with `OperationAlreadyActive` if `id` has not settled yet.
    pub fn spawn<T, F>(&self, id: impl Into<String>, operation: F) -> Result<OperationHandle<T>>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let id = id.into();
        let mut active = lock(&self.registry);

        if active.contains_key(&id) {
            return Err(CacheError::OperationAlreadyActive(id));
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        active.insert(
            id.clone(),
            ActiveOperation {
                generation,
                cancel_tx,
                started_at: chrono::Utc::now(),
            },
        );
        // The guard takes the lock when dropped, possibly on this thread
        drop(active);

        let guard = RegistryGuard {
            registry: Arc::clone(&self.registry),
            id: id.clone(),
            generation,
        };

        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            tokio::select! {
                result = operation => result,
                Ok(()) = cancel_rx => {
                    debug!(id = %task_id, "Operation cancelled");
                    Err(CacheError::Cancelled)
                }
            }
        });
        info!(id = %id, "Operation started");

        Ok(OperationHandle { id, handle })
    }

    /// Cancel a running operation
    pub fn cancel(&self, id: &str) -> Result<()> {
        let operation = lock(&self.registry)
            .remove(id)
            .ok_or_else(|| CacheError::OperationNotFound(id.to_string()))?;

        // A send error means the task finished first; the entry is gone either way
        let _ = operation.cancel_tx.send(());
        info!(id, "Operation cancel requested");
        Ok(())
    }

    pub fn is_active(&self, id: &str) -> bool {
        lock(&self.registry).contains_key(id)
    }

    /// Ids of unsettled operations with their start times
    pub fn active(&self) -> Vec<(String, chrono::DateTime<chrono::Utc>)> {
        lock(&self.registry)
            .iter()
            .map(|(id, op)| (id.clone(), op.started_at))
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
