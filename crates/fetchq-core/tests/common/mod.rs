#![allow(dead_code)]

pub mod fake;
pub mod range_server;
pub mod tcp_server;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use fetchq_core::config::{FetchConfig, NetworkRetryConfig, ParallelMode};
use fetchq_core::{Download, DownloadId, Fetch, FetchEvent, Status};

/// Engine settings tuned for tests: short intervals, side files under `dir`.
pub fn test_config(dir: &Path) -> FetchConfig {
    FetchConfig {
        namespace: "test".to_string(),
        concurrency_limit: 2,
        progress_interval_ms: 20,
        sample_interval_ms: 10,
        scheduler_interval_ms: 20,
        network_retry: NetworkRetryConfig {
            attempts: 1,
            interval_ms: 1,
        },
        parallel_mode: ParallelMode::InPlace,
        temp_dir: Some(dir.join("side")),
        buffer_size: 1024,
        cancel_wait_ms: 3000,
        connect_timeout_secs: 5,
        slice_persist_interval_ms: 10,
        ..FetchConfig::default()
    }
}

/// Deterministic test payload.
pub fn body(len: usize) -> Vec<u8> {
    (0u8..251).cycle().take(len).collect()
}

/// Files left in the side-file directory of [`test_config`].
pub fn side_file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir.join("side"))
        .map(|entries| entries.count())
        .unwrap_or(0)
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

/// Wait for `id` to reach `status`, panicking with the last snapshot otherwise.
pub fn wait_for_status(fetch: &Fetch, id: DownloadId, status: Status) -> Download {
    let reached = wait_for(Duration::from_secs(15), || {
        fetch.get(id).is_some_and(|d| d.status == status)
    });
    let current = fetch.get(id);
    assert!(reached, "expected {status:?}, last seen {current:?}");
    current.expect("download exists")
}

/// Listener that keeps every event.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<FetchEvent>>,
}

impl EventLog {
    pub fn attach(fetch: &Fetch) -> Arc<Self> {
        let log = Arc::new(Self::default());
        let sink = Arc::clone(&log);
        fetch.add_listener(Arc::new(move |event: &FetchEvent| {
            sink.events.lock().unwrap().push(event.clone());
        }));
        log
    }

    pub fn names_for(&self, id: DownloadId) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.download().id == id)
            .map(|e| e.name())
            .collect()
    }

    /// Status each `name` event for `id` carried, in order.
    pub fn statuses_for(&self, id: DownloadId, name: &str) -> Vec<Status> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.download().id == id && e.name() == name)
            .map(|e| e.download().status)
            .collect()
    }

    pub fn count(&self, id: DownloadId, name: &str) -> usize {
        self.names_for(id).iter().filter(|n| **n == name).count()
    }

    /// Ids in the order their `started` events arrived.
    pub fn started_order(&self) -> Vec<DownloadId> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, FetchEvent::Started(_)))
            .map(|e| e.download().id)
            .collect()
    }
}
