//! Bounded-concurrency task queue keyed by id.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

/// Runs pushed tasks with at most `concurrency` in flight.
pub struct TaskQueue<T> {
    name: String,
    permits: Arc<Semaphore>,
    tasks: Mutex<HashMap<String, JoinHandle<SyncResult<T>>>>,
    abort_handles: Mutex<Vec<AbortHandle>>,
    stopping: AtomicBool,
}

impl<T: Send + 'static> TaskQueue<T> {
    pub fn new(name: impl Into<String>, concurrency: usize) -> Self {
        Self {
            name: name.into(),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            tasks: Mutex::new(HashMap::new()),
            abort_handles: Mutex::new(Vec::new()),
            stopping: AtomicBool::new(false),
        }
    }

    /// Schedules `task` under `id`. A task already queued under the same id
    /// is replaced.
    pub fn push<F>(&self, id: impl Into<String>, task: F)
    where
        F: Future<Output = SyncResult<T>> + Send + 'static,
    {
        let id = id.into();
        if self.is_stopping() {
            warn!(queue = %self.name, %id, "queue is stopping, task not scheduled");
            return;
        }
        let permits = Arc::clone(&self.permits);
        let handle = tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.map_err(|_| SyncError::Cancelled)?;
            task.await
        });
        self.abort_handles.lock().push(handle.abort_handle());
        if let Some(previous) = self.tasks.lock().insert(id, handle) {
            previous.abort();
        }
    }

    /// Waits for the task pushed under `id`.
    pub async fn wait_for_result(&self, id: &str) -> SyncResult<T> {
        let handle = self.tasks.lock().remove(id);
        let Some(handle) = handle else {
            return Err(if self.is_stopping() {
                SyncError::Cancelled
            } else {
                SyncError::InvalidInput(format!("no task with id {id} in queue {}", self.name))
            });
        };
        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(SyncError::Cancelled),
            Err(e) => Err(SyncError::InvalidInput(format!("task {id} failed: {e}"))),
        }
    }

    /// Aborts every queued and running task.
    pub fn stop(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(queue = %self.name, "stopping task queue");
        self.permits.close();
        for handle in self.abort_handles.lock().drain(..) {
            handle.abort();
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}
