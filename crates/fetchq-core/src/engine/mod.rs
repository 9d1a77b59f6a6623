//! The `Fetch` engine: one handle owning the store, the download manager,
//! the queue processor and the listener registry.
//!
//! Construct with [`Fetch::new`], drive it with the enqueue and control
//! methods, and call [`Fetch::close`] when done (dropping does the same).

mod delegate;
mod enqueue;
mod gate;
mod ops;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::FetchConfig;
use crate::control::CancelToken;
use crate::listener::{FetchEvent, FetchListener, ListenerId, ListenerRegistry};
use crate::manager::{DownloadManager, TransferFactory};
use crate::model::{Download, DownloadId, DownloadRecord, Status};
use crate::network::NetworkInfoProvider;
use crate::processor::{QueueProcessor, QueueSource};
use crate::store::DownloadStore;
use crate::strategy::{new_transfer, FileTransfer, TransferContext, TransferSettings};
use crate::transport::Downloader;

use delegate::EngineDelegate;
use gate::NetworkGateKeeper;

/// State shared by the engine handle and the strategy delegate.
struct Core {
    config: FetchConfig,
    settings: TransferSettings,
    store: Arc<dyn DownloadStore>,
    listeners: ListenerRegistry,
    /// Serializes read-modify-write cycles on records.
    records: Mutex<()>,
}

impl Core {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: FetchEvent) {
        self.listeners.emit(&event);
    }

    /// Load `id`, let `f` change it, store it. `f` returning `None` leaves the
    /// record untouched. Storage errors are logged and read as "no change".
    fn modify<R>(
        &self,
        id: DownloadId,
        f: impl FnOnce(&mut DownloadRecord) -> Option<R>,
    ) -> Option<R> {
        let _guard = self.lock();
        let mut record = match self.store.get(id) {
            Ok(Some(r)) => r,
            Ok(None) => return None,
            Err(e) => {
                warn!(id, error = %e, "reading record failed");
                return None;
            }
        };
        let out = f(&mut record)?;
        if let Err(e) = self.store.update(&record) {
            warn!(id, error = %e, "saving record failed");
            return None;
        }
        Some(out)
    }

    fn get(&self, id: DownloadId) -> Option<DownloadRecord> {
        match self.store.get(id) {
            Ok(r) => r,
            Err(e) => {
                warn!(id, error = %e, "reading record failed");
                None
            }
        }
    }

    fn query(&self, what: &str, result: Result<Vec<DownloadRecord>>) -> Vec<DownloadRecord> {
        result.unwrap_or_else(|e| {
            warn!(query = what, error = %e, "reading records failed");
            Vec::new()
        })
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub struct Fetch {
    core: Arc<Core>,
    manager: Arc<DownloadManager>,
    processor: Arc<QueueProcessor>,
    network: Arc<dyn NetworkInfoProvider>,
    recovered: AtomicBool,
    closed: AtomicBool,
}

impl Fetch {
    /// Build an engine over `store` and `downloader`. The scheduler starts
    /// right away when `auto_start` is set; otherwise the handle only serves
    /// queries and control operations until [`Fetch::start`].
    pub fn new(
        config: FetchConfig,
        store: Arc<dyn DownloadStore>,
        downloader: Arc<dyn Downloader>,
        network: Arc<dyn NetworkInfoProvider>,
    ) -> Result<Self> {
        let settings = TransferSettings::from_config(&config)?;
        let core = Arc::new(Core {
            config,
            settings: settings.clone(),
            store: Arc::clone(&store),
            listeners: ListenerRegistry::new(),
            records: Mutex::new(()),
        });
        let cfg = &core.config;

        let ctx = TransferContext {
            downloader: Arc::clone(&downloader),
            delegate: Arc::new(EngineDelegate::new(Arc::clone(&core))),
            network: Arc::clone(&network),
            settings,
        };
        let factory: TransferFactory =
            Arc::new(move |d: Download, c: CancelToken| -> Box<dyn FileTransfer> {
                new_transfer(d, ctx.clone(), c)
            });
        let manager = Arc::new(DownloadManager::new(
            cfg.concurrency_limit,
            cfg.cancel_wait(),
            factory,
            downloader,
        )?);
        let gate = Arc::new(NetworkGateKeeper::new(
            Arc::clone(&core),
            Arc::clone(&manager),
            Arc::clone(&network),
        ));
        let processor = Arc::new(QueueProcessor::new(
            QueueSource::new(
                store,
                Arc::clone(&manager),
                Arc::clone(&network),
                gate,
                cfg.sort_order,
                cfg.global_network_type,
            ),
            cfg.scheduler_interval(),
        ));
        let weak = Arc::downgrade(&processor);
        manager.set_finish_hook(Arc::new(move |_| {
            if let Some(p) = weak.upgrade() {
                p.wake();
            }
        }));

        let fetch = Self {
            core,
            manager,
            processor,
            network,
            recovered: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        };
        if fetch.core.config.auto_start {
            fetch.start()?;
        }
        info!(
            namespace = %fetch.core.config.namespace,
            limit = fetch.manager.limit(),
            "engine ready"
        );
        Ok(fetch)
    }

    /// Start the scheduler loop. Idempotent.
    ///
    /// The first start puts records stranded in `Downloading` by a previous
    /// process back in the queue.
    pub fn start(&self) -> Result<()> {
        if self.is_closed() {
            anyhow::bail!("engine is closed");
        }
        if !self.recovered.swap(true, Ordering::AcqRel) {
            let recovered = self
                .core
                .store
                .recover_interrupted()
                .context("recovering interrupted downloads")?;
            if recovered > 0 {
                info!(recovered, "re-queued downloads interrupted by a previous run");
            }
        }
        self.processor.start()
    }

    pub fn config(&self) -> &FetchConfig {
        &self.core.config
    }

    pub fn namespace(&self) -> &str {
        &self.core.config.namespace
    }

    /// Stop scheduling new downloads; running ones continue.
    pub fn freeze(&self) {
        self.processor.pause();
        info!("engine frozen");
    }

    pub fn unfreeze(&self) {
        self.processor.resume();
        info!("engine unfrozen");
    }

    pub fn is_frozen(&self) -> bool {
        self.processor.is_paused()
    }

    pub fn add_listener(&self, listener: Arc<dyn FetchListener>) -> ListenerId {
        self.core.listeners.subscribe(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.core.listeners.unsubscribe(id)
    }

    pub fn get(&self, id: DownloadId) -> Option<Download> {
        self.core.get(id).map(|r| r.snapshot())
    }

    pub fn get_many(&self, ids: &[DownloadId]) -> Vec<Download> {
        snapshots(self.core.query("ids", self.core.store.get_many(ids)))
    }

    pub fn get_all(&self) -> Vec<Download> {
        snapshots(self.core.query("all", self.core.store.get_all()))
    }

    pub fn get_by_status(&self, status: Status) -> Vec<Download> {
        snapshots(self.core.query("status", self.core.store.get_by_status(&[status])))
    }

    pub fn get_by_group(&self, group: i32) -> Vec<Download> {
        snapshots(self.core.query("group", self.core.store.get_by_group(group)))
    }

    /// Number of transfers running right now.
    pub fn active_count(&self) -> usize {
        self.manager.active_count()
    }

    /// True while anything is queued or downloading.
    pub fn has_pending_work(&self) -> bool {
        self.manager.active_count() > 0
            || !self
                .core
                .query(
                    "pending",
                    self.core
                        .store
                        .get_by_status(&[Status::Queued, Status::Downloading]),
                )
                .is_empty()
    }

    /// Tell the engine connectivity may have changed. Running downloads whose
    /// network type is no longer satisfied are paused; downloads paused that
    /// way whose requirement holds again are queued. When the network is
    /// available, failed downloads with a network-class cause are queued
    /// again too. Returns the re-queued downloads.
    pub fn network_changed(&self) -> Vec<Download> {
        let mut requeued = self.processor.enforce_network_gate();
        if self.network.is_network_available() && self.core.config.retry_on_network_gain {
            let failed = self
                .core
                .query("failed", self.core.store.get_by_status(&[Status::Failed]));
            let gated = requeued.len();
            for record in failed.into_iter().filter(|r| r.error.is_network_related()) {
                let changed = self.core.modify(record.id, |r| {
                    (r.status == Status::Failed && r.transition(Status::Queued))
                        .then(|| r.snapshot())
                });
                if let Some(d) = changed {
                    self.core.emit(FetchEvent::Queued(d.clone()));
                    requeued.push(d);
                }
            }
            if requeued.len() > gated {
                info!(count = requeued.len() - gated, "network back, failed downloads re-queued");
            }
        }
        self.processor.wake();
        requeued
    }

    /// Cancel running transfers, stop the scheduler and release the transport.
    /// Interrupted downloads stay `Downloading` in the store and are
    /// re-queued by the next engine. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.processor.stop();
        self.manager.close();
        self.core.listeners.clear();
        info!(namespace = %self.core.config.namespace, "engine closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for Fetch {
    fn drop(&mut self) {
        self.close();
    }
}

/// Cancel the running transfer of each download, then emit with the counters
/// the transfer saved on its way out.
fn stop_and_emit(
    core: &Core,
    manager: &DownloadManager,
    changed: Vec<Download>,
    event: fn(Download) -> FetchEvent,
) -> Vec<Download> {
    changed
        .into_iter()
        .map(|d| {
            manager.cancel(d.id);
            let d = core.get(d.id).map(|r| r.snapshot()).unwrap_or(d);
            core.emit(event(d.clone()));
            d
        })
        .collect()
}

fn snapshots(records: Vec<DownloadRecord>) -> Vec<Download> {
    records.iter().map(DownloadRecord::snapshot).collect()
}
