//! Concurrency-bounded execution of transfers.
//!
//! The manager owns a fixed worker pool sized to the concurrency limit and
//! the map of running download ids, both behind one lock. Cancellation is
//! cooperative: the transfer's token is set, then the manager waits (bounded)
//! for the transfer's termination signal.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::control::{CancelToken, TerminationGuard, TerminationSignal};
use crate::model::{Download, DownloadId};
use crate::pool::WorkerPool;
use crate::strategy::FileTransfer;
use crate::transport::Downloader;

/// Builds the transfer for a download about to start.
pub type TransferFactory =
    Arc<dyn Fn(Download, CancelToken) -> Box<dyn FileTransfer> + Send + Sync>;

/// Called after a transfer has left the running map.
pub type FinishHook = Arc<dyn Fn(DownloadId) + Send + Sync>;

struct Running {
    cancel: CancelToken,
    terminated: TerminationSignal,
    download: Download,
}

struct Shared {
    running: Mutex<HashMap<DownloadId, Running>>,
    finish_hook: Mutex<Option<FinishHook>>,
}

impl Shared {
    fn running(&self) -> MutexGuard<'_, HashMap<DownloadId, Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop the entry for `id` unless it already belongs to a newer run.
    fn release(&self, id: DownloadId, signal: &TerminationSignal) {
        let mut running = self.running();
        if running
            .get(&id)
            .is_some_and(|r| r.terminated.same_as(signal))
        {
            running.remove(&id);
        }
    }
}

/// Clears the running entry and fires the termination signal however the
/// transfer's run ends.
struct RunGuard {
    shared: Arc<Shared>,
    id: DownloadId,
    terminated: TerminationGuard,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.shared.release(self.id, &self.terminated.0);
        let hook = self
            .shared
            .finish_hook
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(hook) = hook {
            hook(self.id);
        }
    }
}

pub struct DownloadManager {
    shared: Arc<Shared>,
    pool: WorkerPool,
    factory: TransferFactory,
    downloader: Arc<dyn Downloader>,
    limit: usize,
    cancel_wait: Duration,
    closed: AtomicBool,
}

impl DownloadManager {
    pub fn new(
        limit: usize,
        cancel_wait: Duration,
        factory: TransferFactory,
        downloader: Arc<dyn Downloader>,
    ) -> Result<Self> {
        let limit = limit.max(1);
        Ok(Self {
            shared: Arc::new(Shared {
                running: Mutex::new(HashMap::new()),
                finish_hook: Mutex::new(None),
            }),
            pool: WorkerPool::new(limit, "fetchq-worker")?,
            factory,
            downloader,
            limit,
            cancel_wait,
            closed: AtomicBool::new(false),
        })
    }

    pub fn set_finish_hook(&self, hook: FinishHook) {
        *self
            .shared
            .finish_hook
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(hook);
    }

    /// Start a transfer. Returns false when the download is already running,
    /// the limit is reached, the manager is closed, or the transfer could not
    /// be built or queued; the caller tries again later.
    pub fn start(&self, download: Download) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let id = download.id;
        if !self.has_room_for(id) {
            return false;
        }

        // Built outside the lock: the factory consults the transport.
        let cancel = CancelToken::new();
        let built = panic::catch_unwind(AssertUnwindSafe(|| {
            (self.factory)(download.clone(), cancel.clone())
        }));
        let mut transfer = match built {
            Ok(t) => t,
            Err(_) => {
                error!(id, "building transfer panicked, not started");
                return false;
            }
        };

        let mut running = self.shared.running();
        if running.contains_key(&id) || running.len() >= self.limit {
            debug!(id, "lost the slot while building, not started");
            return false;
        }
        let terminated = TerminationSignal::new();
        running.insert(
            id,
            Running {
                cancel,
                terminated: terminated.clone(),
                download,
            },
        );
        drop(running);

        let guard = RunGuard {
            shared: Arc::clone(&self.shared),
            id,
            terminated: TerminationGuard(terminated.clone()),
        };
        let submitted = self.pool.execute(move || {
            let _guard = guard;
            debug!(id, "transfer running");
            transfer.run();
        });
        if let Err(e) = submitted {
            warn!(id, error = %e, "could not queue transfer");
            self.shared.release(id, &terminated);
            return false;
        }
        debug!(id, "transfer started");
        true
    }

    /// Cancel a running transfer and wait (bounded) for it to stop. Returns
    /// false if it was not running.
    pub fn cancel(&self, id: DownloadId) -> bool {
        let entry = self
            .shared
            .running()
            .get(&id)
            .map(|r| (r.cancel.clone(), r.terminated.clone()));
        let Some((cancel, terminated)) = entry else {
            return false;
        };
        cancel.cancel();
        self.await_stop(id, &terminated);
        true
    }

    fn await_stop(&self, id: DownloadId, terminated: &TerminationSignal) {
        if !terminated.wait(self.cancel_wait) {
            warn!(id, wait = ?self.cancel_wait, "transfer did not stop in time");
        }
        self.shared.release(id, terminated);
    }

    /// Cancel every running transfer. All tokens are set before any wait.
    pub fn cancel_all(&self) -> Vec<DownloadId> {
        let entries: Vec<_> = self
            .shared
            .running()
            .iter()
            .map(|(id, r)| (*id, r.cancel.clone(), r.terminated.clone()))
            .collect();
        for (_, cancel, _) in &entries {
            cancel.cancel();
        }
        for (id, _, terminated) in &entries {
            self.await_stop(*id, terminated);
        }
        entries.into_iter().map(|(id, _, _)| id).collect()
    }

    /// Cancel everything, stop the pool and release the transport. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let cancelled = self.cancel_all();
        self.pool.shutdown();
        self.downloader.close();
        info!(cancelled = cancelled.len(), "download manager closed");
    }

    fn has_room_for(&self, id: DownloadId) -> bool {
        let running = self.shared.running();
        !running.contains_key(&id) && running.len() < self.limit
    }

    pub fn contains(&self, id: DownloadId) -> bool {
        self.shared.running().contains_key(&id)
    }

    pub fn active_count(&self) -> usize {
        self.shared.running().len()
    }

    pub fn can_accommodate_new_download(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.active_count() < self.limit
    }

    pub fn running_ids(&self) -> Vec<DownloadId> {
        self.shared.running().keys().copied().collect()
    }

    /// The snapshot a running transfer was started with.
    pub fn started_download(&self, id: DownloadId) -> Option<Download> {
        self.shared.running().get(&id).map(|r| r.download.clone())
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for DownloadManager {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests;
