//! Network-type gate for downloads past the queue: pause a running transfer
//! when its requirement stops holding, queue it again when it holds again.

use std::sync::Arc;

use tracing::info;

use super::{stop_and_emit, Core};
use crate::listener::FetchEvent;
use crate::manager::DownloadManager;
use crate::model::{Download, DownloadId, Status};
use crate::network::{network_gate_open, NetworkInfoProvider};
use crate::processor::NetworkGateHandler;

/// Marks a record the gate paused, as opposed to one the user paused.
pub(super) const NETWORK_PAUSE_KEY: &str = "fetchq.paused_by_network";

pub(super) struct NetworkGateKeeper {
    core: Arc<Core>,
    manager: Arc<DownloadManager>,
    network: Arc<dyn NetworkInfoProvider>,
}

impl NetworkGateKeeper {
    pub(super) fn new(
        core: Arc<Core>,
        manager: Arc<DownloadManager>,
        network: Arc<dyn NetworkInfoProvider>,
    ) -> Self {
        Self {
            core,
            manager,
            network,
        }
    }
}

impl NetworkGateHandler for NetworkGateKeeper {
    fn pause_for_network(&self, ids: &[DownloadId]) -> Vec<Download> {
        let paused: Vec<Download> = ids
            .iter()
            .filter_map(|&id| {
                self.core.modify(id, |r| {
                    if r.status != Status::Downloading || !r.transition(Status::Paused) {
                        return None;
                    }
                    r.extras.insert(NETWORK_PAUSE_KEY.to_string(), "true".to_string());
                    Some(r.snapshot())
                })
            })
            .collect();
        stop_and_emit(&self.core, &self.manager, paused, FetchEvent::Paused)
    }

    fn requeue_for_network(&self) -> Vec<Download> {
        let connectivity = self.network.connectivity();
        let global = self.core.config.global_network_type;
        let waiting: Vec<DownloadId> = self
            .core
            .query("paused", self.core.store.get_by_status(&[Status::Paused]))
            .into_iter()
            .filter(|r| {
                r.extras.contains_key(NETWORK_PAUSE_KEY)
                    && network_gate_open(r.network_type, global, connectivity)
            })
            .map(|r| r.id)
            .collect();

        let requeued: Vec<Download> = waiting
            .into_iter()
            .filter_map(|id| {
                self.core.modify(id, |r| {
                    let marked = r.extras.remove(NETWORK_PAUSE_KEY).is_some();
                    if r.status != Status::Paused || !marked {
                        return None;
                    }
                    r.transition(Status::Queued).then(|| r.snapshot())
                })
            })
            .collect();
        for d in &requeued {
            self.core.emit(FetchEvent::Resumed(d.clone()));
        }
        if !requeued.is_empty() {
            info!(count = requeued.len(), ?connectivity, "network requirement met, re-queued");
        }
        requeued
    }
}
