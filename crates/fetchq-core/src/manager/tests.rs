use super::*;

use std::sync::atomic::AtomicUsize;
use std::sync::mpsc;
use std::time::Instant;

use crate::model::{DownloadRecord, Request};
use crate::retry::TransferError;
use crate::transport::{Response, TransportRequest};

struct IdleDownloader {
    closed: AtomicBool,
}

impl Downloader for IdleDownloader {
    fn execute(
        &self,
        _request: &TransportRequest,
        _cancel: &CancelToken,
    ) -> Result<Response, TransferError> {
        Err(TransferError::Http(500))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Runs until cancelled, then reports how it ended.
struct BlockingTransfer {
    download: Download,
    cancel: CancelToken,
    stopped: mpsc::Sender<DownloadId>,
}

impl FileTransfer for BlockingTransfer {
    fn download(&self) -> Download {
        self.download.clone()
    }

    fn run(&mut self) {
        while !self.cancel.sleep(Duration::from_millis(10)) {}
        let _ = self.stopped.send(self.download.id);
    }
}

fn download(name: &str) -> Download {
    DownloadRecord::from_request(
        &Request::new(format!("http://host/{name}"), format!("/tmp/{name}")),
        "default",
        0,
        0,
    )
    .snapshot()
}

fn manager(limit: usize) -> (DownloadManager, mpsc::Receiver<DownloadId>, Arc<IdleDownloader>) {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let factory: TransferFactory = Arc::new(move |download: Download, cancel: CancelToken| -> Box<dyn FileTransfer> {
        let stopped = tx.lock().unwrap().clone();
        Box::new(BlockingTransfer {
            download,
            cancel,
            stopped,
        })
    });
    let downloader = Arc::new(IdleDownloader {
        closed: AtomicBool::new(false),
    });
    let m = DownloadManager::new(limit, Duration::from_secs(5), factory, downloader.clone())
        .unwrap();
    (m, rx, downloader)
}

#[test]
fn start_respects_limit_and_duplicates() {
    let (m, _rx, _) = manager(1);
    let a = download("a");
    let b = download("b");
    assert!(m.start(a.clone()));
    assert!(!m.start(a.clone()), "already running");
    assert!(!m.start(b.clone()), "limit reached");
    assert!(!m.can_accommodate_new_download());
    assert!(m.contains(a.id));
    assert_eq!(m.active_count(), 1);
    assert_eq!(m.started_download(a.id).map(|d| d.id), Some(a.id));
    m.close();
}

#[test]
fn cancel_waits_for_termination_and_frees_slot() {
    let (m, rx, _) = manager(1);
    let a = download("a");
    assert!(m.start(a.clone()));
    assert!(m.cancel(a.id));
    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), a.id);
    assert!(!m.contains(a.id));
    assert!(m.can_accommodate_new_download());
    assert!(!m.cancel(a.id), "second cancel is a no-op");
    m.close();
}

#[test]
fn cancel_all_stops_every_transfer() {
    let (m, rx, _) = manager(3);
    let ids: Vec<_> = ["a", "b", "c"].iter().map(|n| download(n)).collect();
    for d in &ids {
        assert!(m.start(d.clone()));
    }
    let start = Instant::now();
    let mut cancelled = m.cancel_all();
    cancelled.sort();
    let mut expected: Vec<_> = ids.iter().map(|d| d.id).collect();
    expected.sort();
    assert_eq!(cancelled, expected);
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(m.active_count(), 0);
    for _ in 0..3 {
        rx.recv_timeout(Duration::from_secs(1)).unwrap();
    }
    m.close();
}

#[test]
fn finish_hook_runs_after_entry_is_gone() {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let factory: TransferFactory = Arc::new(|download: Download, cancel: CancelToken| -> Box<dyn FileTransfer> {
        drop(cancel);
        Box::new(QuickTransfer { download })
    });
    let m = Arc::new(
        DownloadManager::new(
            2,
            Duration::from_secs(1),
            factory,
            Arc::new(IdleDownloader {
                closed: AtomicBool::new(false),
            }),
        )
        .unwrap(),
    );
    let weak = Arc::downgrade(&m);
    m.set_finish_hook(Arc::new(move |id| {
        let still_running = weak.upgrade().map(|m| m.contains(id)).unwrap_or(false);
        let _ = tx.lock().unwrap().send((id, still_running));
    }));
    let a = download("a");
    assert!(m.start(a.clone()));
    let (id, still_running) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(id, a.id);
    assert!(!still_running);
    m.close();
}

struct QuickTransfer {
    download: Download,
}

impl FileTransfer for QuickTransfer {
    fn download(&self) -> Download {
        self.download.clone()
    }

    fn run(&mut self) {}
}

#[test]
fn panicking_factory_is_not_started() {
    let runs = Arc::new(AtomicUsize::new(0));
    let r = runs.clone();
    let factory: TransferFactory = Arc::new(move |_: Download, _: CancelToken| -> Box<dyn FileTransfer> {
        r.fetch_add(1, Ordering::SeqCst);
        panic!("no strategy")
    });
    let m = DownloadManager::new(
        1,
        Duration::from_secs(1),
        factory,
        Arc::new(IdleDownloader {
            closed: AtomicBool::new(false),
        }),
    )
    .unwrap();
    assert!(!m.start(download("a")));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(m.active_count(), 0);
}

#[test]
fn close_is_idempotent_and_rejects_new_work() {
    let (m, rx, downloader) = manager(2);
    let a = download("a");
    assert!(m.start(a.clone()));
    m.close();
    m.close();
    assert!(m.is_closed());
    assert!(downloader.closed.load(Ordering::Acquire));
    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), a.id);
    assert!(!m.start(download("b")));
    assert!(!m.can_accommodate_new_download());
}

#[test]
fn transfer_is_built_outside_the_running_map_lock() {
    let (building_tx, building_rx) = mpsc::channel::<()>();
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let (stopped_tx, _stopped_rx) = mpsc::channel();
    let handshake = Mutex::new((building_tx, go_rx));
    let stopped = Mutex::new(stopped_tx);
    let released = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&released);
    let factory: TransferFactory = Arc::new(move |download: Download, cancel: CancelToken| -> Box<dyn FileTransfer> {
        if download.url.ends_with("/slow") {
            let handshake = handshake.lock().unwrap();
            let _ = handshake.0.send(());
            let go = handshake.1.recv_timeout(Duration::from_secs(2)).is_ok();
            seen.store(go, Ordering::SeqCst);
            return Box::new(QuickTransfer { download });
        }
        Box::new(BlockingTransfer {
            download,
            cancel,
            stopped: stopped.lock().unwrap().clone(),
        })
    });
    let m = Arc::new(
        DownloadManager::new(
            1,
            Duration::from_secs(1),
            factory,
            Arc::new(IdleDownloader {
                closed: AtomicBool::new(false),
            }),
        )
        .unwrap(),
    );

    let starter = {
        let m = Arc::clone(&m);
        std::thread::spawn(move || m.start(download("slow")))
    };
    building_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(m.active_count(), 0);
    let fast = download("fast");
    assert!(m.start(fast.clone()), "slot is free while the other builds");
    go_tx.send(()).unwrap();

    assert!(!starter.join().unwrap(), "slot was taken while building");
    assert!(released.load(Ordering::SeqCst));
    assert!(m.contains(fast.id));
    assert_eq!(m.active_count(), 1);
    m.close();
}
