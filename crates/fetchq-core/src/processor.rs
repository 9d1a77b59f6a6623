//! Priority queue processor: the scheduler loop.
//!
//! Each tick pulls QUEUED records, orders them by priority then creation
//! time, drops the ones whose network requirement is unmet and hands the rest
//! to the [`DownloadManager`] while it has capacity. Running transfers whose
//! stored record left the active states are cancelled, and running transfers
//! whose network requirement stopped holding are paused through the
//! [`NetworkGateHandler`].

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::manager::DownloadManager;
use crate::model::{
    Connectivity, Download, DownloadId, DownloadRecord, NetworkType, SortOrder, Status,
};
use crate::network::{network_gate_open, NetworkInfoProvider};
use crate::store::DownloadStore;

/// Order records for scheduling: priority descending, then creation time per
/// `order`, then id so the result is deterministic.
pub fn sort_queue(records: &mut [DownloadRecord], order: SortOrder) {
    records.sort_by(|a, b| {
        let by_created = match order {
            SortOrder::Asc => a.created.cmp(&b.created),
            SortOrder::Desc => b.created.cmp(&a.created),
        };
        b.priority
            .cmp(&a.priority)
            .then(by_created)
            .then(a.id.cmp(&b.id))
    });
}

/// Engine side of the network-type gate for downloads already past the queue.
pub trait NetworkGateHandler: Send + Sync {
    /// Stop running downloads whose requirement no longer holds. Returns the
    /// ones actually paused.
    fn pause_for_network(&self, ids: &[DownloadId]) -> Vec<Download>;

    /// Queue again the downloads the gate paused whose requirement holds now.
    fn requeue_for_network(&self) -> Vec<Download>;
}

/// What a tick reads and drives.
pub struct QueueSource {
    pub store: Arc<dyn DownloadStore>,
    pub manager: Arc<DownloadManager>,
    pub network: Arc<dyn NetworkInfoProvider>,
    pub gate: Arc<dyn NetworkGateHandler>,
    pub sort_order: SortOrder,
    pub global_network_type: Option<NetworkType>,
    /// Connectivity seen by the previous gate pass.
    last_connectivity: Mutex<Option<Connectivity>>,
}

impl QueueSource {
    pub fn new(
        store: Arc<dyn DownloadStore>,
        manager: Arc<DownloadManager>,
        network: Arc<dyn NetworkInfoProvider>,
        gate: Arc<dyn NetworkGateHandler>,
        sort_order: SortOrder,
        global_network_type: Option<NetworkType>,
    ) -> Self {
        Self {
            store,
            manager,
            network,
            gate,
            sort_order,
            global_network_type,
            last_connectivity: Mutex::new(None),
        }
    }

    /// Start what can be started. Returns how many transfers were started.
    pub fn start_eligible(&self) -> usize {
        let mut queued = match self.store.get_by_status(&[Status::Queued]) {
            Ok(q) => q,
            Err(e) => {
                warn!(error = %e, "reading queue failed");
                return 0;
            }
        };
        sort_queue(&mut queued, self.sort_order);
        let connectivity = self.network.connectivity();
        let mut started = 0;
        for record in queued {
            if !self.manager.can_accommodate_new_download() {
                break;
            }
            if self.manager.contains(record.id) {
                continue;
            }
            if !network_gate_open(record.network_type, self.global_network_type, connectivity) {
                debug!(id = record.id, ?connectivity, "network requirement unmet");
                continue;
            }
            if self.manager.start(record.snapshot()) {
                started += 1;
            }
        }
        started
    }

    /// Cancel running transfers whose record was paused, removed or deleted
    /// behind the engine's back (another process sharing the store).
    pub fn cancel_externally_stopped(&self) -> usize {
        let mut cancelled = 0;
        for id in self.manager.running_ids() {
            let keep = match self.store.get(id) {
                Ok(Some(r)) => r.status.is_active(),
                Ok(None) => false,
                Err(e) => {
                    warn!(id, error = %e, "reading record failed");
                    true
                }
            };
            if !keep && self.manager.cancel(id) {
                info!(id, "record left the queue, transfer cancelled");
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Running transfers whose network requirement fails under `connectivity`.
    /// Losing the network altogether is left to the transfers' own failure
    /// handling, which waits for it to come back.
    pub fn gate_closed_ids(&self, connectivity: Connectivity) -> Vec<DownloadId> {
        if !connectivity.is_connected() {
            return Vec::new();
        }
        self.manager
            .running_ids()
            .into_iter()
            .filter(|&id| match self.store.get(id) {
                Ok(Some(r)) => {
                    !network_gate_open(r.network_type, self.global_network_type, connectivity)
                }
                Ok(None) => false,
                Err(e) => {
                    warn!(id, error = %e, "reading record failed");
                    false
                }
            })
            .collect()
    }

    /// Pause running transfers the gate now refuses, and queue again the ones
    /// it paused earlier once connectivity changed in their favour (or always,
    /// with `force_requeue`). Returns the re-queued downloads.
    pub fn enforce_network_gate(&self, force_requeue: bool) -> Vec<Download> {
        let connectivity = self.network.connectivity();
        let closed = self.gate_closed_ids(connectivity);
        if !closed.is_empty() {
            let paused = self.gate.pause_for_network(&closed);
            if !paused.is_empty() {
                info!(count = paused.len(), ?connectivity, "network requirement lost, paused");
            }
        }
        let changed = {
            let mut last = self
                .last_connectivity
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            last.replace(connectivity) != Some(connectivity)
        };
        if connectivity.is_connected() && (changed || force_requeue) {
            self.gate.requeue_for_network()
        } else {
            Vec::new()
        }
    }
}

#[derive(Debug, Default)]
struct LoopState {
    running: bool,
    paused: bool,
    wake: bool,
}

struct Shared {
    state: Mutex<LoopState>,
    cvar: Condvar,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct QueueProcessor {
    source: Arc<QueueSource>,
    interval: Duration,
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl QueueProcessor {
    pub fn new(source: QueueSource, interval: Duration) -> Self {
        Self {
            source: Arc::new(source),
            interval,
            shared: Arc::new(Shared {
                state: Mutex::new(LoopState::default()),
                cvar: Condvar::new(),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Start the loop thread. Idempotent.
    pub fn start(&self) -> Result<()> {
        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        {
            let mut st = self.shared.state();
            if st.running {
                return Ok(());
            }
            st.running = true;
            st.wake = true;
        }
        let source = Arc::clone(&self.source);
        let shared = Arc::clone(&self.shared);
        let interval = self.interval;
        let spawned = thread::Builder::new()
            .name("fetchq-scheduler".into())
            .spawn(move || run_loop(&source, &shared, interval))
            .context("spawning scheduler thread");
        match spawned {
            Ok(h) => {
                *handle = Some(h);
                debug!(?interval, "queue processor started");
                Ok(())
            }
            Err(e) => {
                self.shared.state().running = false;
                Err(e)
            }
        }
    }

    /// Stop and join the loop thread. Idempotent.
    pub fn stop(&self) {
        self.shared.state().running = false;
        self.shared.cvar.notify_all();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(h) = handle {
            if h.thread().id() != thread::current().id() {
                let _ = h.join();
            }
            debug!("queue processor stopped");
        }
    }

    /// Stop pulling new work; running transfers continue.
    pub fn pause(&self) {
        self.shared.state().paused = true;
    }

    pub fn resume(&self) {
        self.shared.state().paused = false;
        self.wake();
    }

    /// Run a tick now instead of at the next interval.
    pub fn wake(&self) {
        self.shared.state().wake = true;
        self.shared.cvar.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.state().paused
    }

    pub fn is_running(&self) -> bool {
        self.shared.state().running
    }

    /// One scheduling pass on the caller's thread.
    pub fn tick(&self) -> usize {
        tick(&self.source, self.is_paused())
    }

    /// Apply the network-type gate now. See [`QueueSource::enforce_network_gate`].
    pub fn enforce_network_gate(&self) -> Vec<Download> {
        self.source.enforce_network_gate(true)
    }
}

impl Drop for QueueProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn tick(source: &QueueSource, paused: bool) -> usize {
    source.cancel_externally_stopped();
    source.enforce_network_gate(false);
    if paused {
        return 0;
    }
    source.start_eligible()
}

fn run_loop(source: &QueueSource, shared: &Shared, interval: Duration) {
    loop {
        let paused = {
            let st = shared.state();
            let (mut st, _) = shared
                .cvar
                .wait_timeout_while(st, interval, |s| s.running && !s.wake)
                .unwrap_or_else(|e| e.into_inner());
            if !st.running {
                break;
            }
            st.wake = false;
            st.paused
        };
        let started = tick(source, paused);
        if started > 0 {
            debug!(started, "scheduled downloads");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Priority, Request};
    use std::cmp::Ordering as CmpOrdering;

    fn record(name: &str, priority: Priority, created: i64) -> DownloadRecord {
        DownloadRecord::from_request(
            &Request::new(format!("http://h/{name}"), format!("/tmp/{name}"))
                .with_priority(priority),
            "default",
            created,
            0,
        )
    }

    fn urls(records: &[DownloadRecord]) -> Vec<&str> {
        records.iter().map(|r| r.url.as_str()).collect()
    }

    #[test]
    fn priority_then_creation_ascending() {
        let mut q = vec![
            record("late", Priority::Normal, 30),
            record("low", Priority::Low, 1),
            record("early", Priority::Normal, 10),
            record("high", Priority::High, 50),
        ];
        sort_queue(&mut q, SortOrder::Asc);
        assert_eq!(
            urls(&q),
            vec!["http://h/high", "http://h/early", "http://h/late", "http://h/low"]
        );
    }

    #[test]
    fn descending_order_prefers_newest() {
        let mut q = vec![
            record("early", Priority::Normal, 10),
            record("late", Priority::Normal, 30),
        ];
        sort_queue(&mut q, SortOrder::Desc);
        assert_eq!(urls(&q), vec!["http://h/late", "http://h/early"]);
    }

    #[test]
    fn equal_keys_sort_deterministically() {
        let mut a = vec![record("x", Priority::Normal, 5), record("y", Priority::Normal, 5)];
        let mut b = vec![a[1].clone(), a[0].clone()];
        sort_queue(&mut a, SortOrder::Asc);
        sort_queue(&mut b, SortOrder::Asc);
        assert_eq!(a, b);
        assert_eq!(CmpOrdering::Less, a[0].id.cmp(&a[1].id));
    }
}
