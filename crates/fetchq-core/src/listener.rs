//! Events emitted by the engine and the subscriber registry.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::error;

use crate::model::{Download, DownloadError};
use crate::segmenter::Slice;

/// One engine event, carrying the snapshot it refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    /// Tracked but not scheduled (`download_on_enqueue = false`).
    Added(Download),
    Queued(Download),
    /// Failed while offline; queued again until connectivity returns.
    WaitingNetwork(Download),
    Started(Download),
    Progress(Download),
    BlockUpdated {
        download: Download,
        slice: Slice,
        total_blocks: usize,
    },
    Completed(Download),
    Error {
        download: Download,
        error: DownloadError,
    },
    Paused(Download),
    Resumed(Download),
    Cancelled(Download),
    Removed(Download),
    Deleted(Download),
}

impl FetchEvent {
    pub fn download(&self) -> &Download {
        match self {
            FetchEvent::Added(d)
            | FetchEvent::Queued(d)
            | FetchEvent::WaitingNetwork(d)
            | FetchEvent::Started(d)
            | FetchEvent::Progress(d)
            | FetchEvent::Completed(d)
            | FetchEvent::Paused(d)
            | FetchEvent::Resumed(d)
            | FetchEvent::Cancelled(d)
            | FetchEvent::Removed(d)
            | FetchEvent::Deleted(d) => d,
            FetchEvent::BlockUpdated { download, .. } | FetchEvent::Error { download, .. } => {
                download
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FetchEvent::Added(_) => "added",
            FetchEvent::Queued(_) => "queued",
            FetchEvent::WaitingNetwork(_) => "waiting_network",
            FetchEvent::Started(_) => "started",
            FetchEvent::Progress(_) => "progress",
            FetchEvent::BlockUpdated { .. } => "block_updated",
            FetchEvent::Completed(_) => "completed",
            FetchEvent::Error { .. } => "error",
            FetchEvent::Paused(_) => "paused",
            FetchEvent::Resumed(_) => "resumed",
            FetchEvent::Cancelled(_) => "cancelled",
            FetchEvent::Removed(_) => "removed",
            FetchEvent::Deleted(_) => "deleted",
        }
    }

    /// Events after which the download sends nothing more until it is queued again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FetchEvent::Completed(_)
                | FetchEvent::Error { .. }
                | FetchEvent::Cancelled(_)
                | FetchEvent::Removed(_)
                | FetchEvent::Deleted(_)
        )
    }
}

/// Receives engine events. Called on engine threads; keep it quick.
pub trait FetchListener: Send + Sync {
    fn on_event(&self, event: &FetchEvent);
}

impl<F> FetchListener for F
where
    F: Fn(&FetchEvent) + Send + Sync,
{
    fn on_event(&self, event: &FetchEvent) {
        self(event)
    }
}

/// Handle returned by [`ListenerRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct ListenerRegistry {
    next: AtomicU64,
    listeners: RwLock<BTreeMap<ListenerId, Arc<dyn FetchListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn FetchListener>) -> ListenerId {
        let id = ListenerId(self.next.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, listener);
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .is_some()
    }

    pub fn clear(&self) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every listener in subscription order. A panicking
    /// listener is logged and does not stop delivery to the others.
    pub fn emit(&self, event: &FetchEvent) {
        // Snapshot so listeners may (un)subscribe from inside a callback.
        let listeners: Vec<_> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for l in listeners {
            let delivered = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                l.on_event(event)
            }));
            if delivered.is_err() {
                error!(event = event.name(), id = event.download().id, "listener panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DownloadRecord, Request};
    use std::sync::Mutex;

    fn download() -> Download {
        DownloadRecord::from_request(&Request::new("http://h/a", "/tmp/a"), "default", 0, 0)
            .snapshot()
    }

    #[test]
    fn subscribe_emit_unsubscribe() {
        let reg = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let id = reg.subscribe(Arc::new(move |e: &FetchEvent| {
            s.lock().unwrap().push(e.name());
        }));
        reg.emit(&FetchEvent::Queued(download()));
        reg.emit(&FetchEvent::Completed(download()));
        assert!(reg.unsubscribe(id));
        assert!(!reg.unsubscribe(id));
        reg.emit(&FetchEvent::Paused(download()));
        assert_eq!(*seen.lock().unwrap(), vec!["queued", "completed"]);
        assert!(reg.is_empty());
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let reg = ListenerRegistry::new();
        let count = Arc::new(AtomicU64::new(0));
        reg.subscribe(Arc::new(|_: &FetchEvent| panic!("boom")));
        let c = count.clone();
        reg.subscribe(Arc::new(move |_: &FetchEvent| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        reg.emit(&FetchEvent::Started(download()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn terminal_events() {
        let d = download();
        assert!(FetchEvent::Completed(d.clone()).is_terminal());
        assert!(FetchEvent::Error {
            download: d.clone(),
            error: DownloadError::ServerError
        }
        .is_terminal());
        assert!(!FetchEvent::Progress(d.clone()).is_terminal());
        assert!(!FetchEvent::WaitingNetwork(d).is_terminal());
    }
}
