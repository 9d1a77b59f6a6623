//! Integration test: every strategy against a local HTTP server with Range
//! support, driven through the engine and libcurl.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::range_server::{self, RangeServerOptions};
use fetchq_core::config::{FetchConfig, ParallelMode};
use fetchq_core::network::ManualNetwork;
use fetchq_core::store::MemoryStore;
use fetchq_core::transport::{CurlDownloader, FileDownloaderType};
use fetchq_core::{Download, DownloadError, Fetch, Request, Status};
use tempfile::tempdir;

fn curl(kind: FileDownloaderType, slices: Option<usize>) -> CurlDownloader {
    CurlDownloader::new(Duration::from_secs(5))
        .with_downloader_type(kind)
        .with_slicing_count(slices)
}

/// Enqueue `url` into `dir/out.bin` and wait for it to settle.
fn fetch_once(dir: &Path, cfg: FetchConfig, downloader: CurlDownloader, url: &str) -> Download {
    let fetch = Fetch::new(
        cfg,
        Arc::new(MemoryStore::new()),
        Arc::new(downloader),
        Arc::new(ManualNetwork::default()),
    )
    .unwrap();
    let queued = fetch.enqueue(Request::new(url, dir.join("out.bin"))).unwrap();
    let settled = common::wait_for(Duration::from_secs(15), || {
        fetch
            .get(queued.id)
            .is_some_and(|d| matches!(d.status, Status::Completed | Status::Failed))
    });
    assert!(settled, "download never settled: {:?}", fetch.get(queued.id));
    let done = fetch.get(queued.id).unwrap();
    fetch.close();
    done
}

#[test]
fn parallel_modes_complete_and_file_matches() {
    let body = common::body(64 * 1024);
    let server = range_server::start(body.clone());

    for mode in [ParallelMode::Chunked, ParallelMode::InPlace, ParallelMode::Probing] {
        let dir = tempdir().unwrap();
        let cfg = FetchConfig {
            parallel_mode: mode,
            ..common::test_config(dir.path())
        };
        let done = fetch_once(
            dir.path(),
            cfg,
            curl(FileDownloaderType::Parallel, Some(4)),
            &server.url,
        );
        assert_eq!(done.status, Status::Completed, "{mode:?}: {:?}", done.error);
        assert_eq!(done.downloaded, body.len() as u64);
        assert_eq!(done.total, body.len() as i64);
        assert_eq!(std::fs::read(dir.path().join("out.bin")).unwrap(), body, "{mode:?}");
        assert_eq!(common::side_file_count(dir.path()), 0, "{mode:?} left side files behind");
    }
}

#[test]
fn sequential_resumes_from_bytes_on_disk() {
    let body = common::body(32 * 1024);
    let server = range_server::start(body.clone());
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("out.bin"), &body[..1500]).unwrap();

    let done = fetch_once(
        dir.path(),
        common::test_config(dir.path()),
        curl(FileDownloaderType::Sequential, None),
        &server.url,
    );
    assert_eq!(done.status, Status::Completed, "{:?}", done.error);
    assert_eq!(std::fs::read(dir.path().join("out.bin")).unwrap(), body);
    assert_eq!(server.ranges(), vec![(1500, None)]);
}

#[test]
fn head_blocked_probe_still_completes() {
    let body = common::body(32 * 1024);
    let server = range_server::start_with_options(
        body.clone(),
        RangeServerOptions {
            head_allowed: false,
            ..RangeServerOptions::default()
        },
    );
    let dir = tempdir().unwrap();
    let cfg = FetchConfig {
        parallel_mode: ParallelMode::Probing,
        ..common::test_config(dir.path())
    };
    let done = fetch_once(
        dir.path(),
        cfg,
        curl(FileDownloaderType::Parallel, Some(3)),
        &server.url,
    );
    assert_eq!(done.status, Status::Completed, "{:?}", done.error);
    assert_eq!(std::fs::read(dir.path().join("out.bin")).unwrap(), body);
}

#[test]
fn no_range_server_falls_back_to_single_stream() {
    let body = common::body(32 * 1024);
    let server = range_server::start_with_options(
        body.clone(),
        RangeServerOptions {
            support_ranges: false,
            ..RangeServerOptions::default()
        },
    );
    for mode in [ParallelMode::Chunked, ParallelMode::InPlace, ParallelMode::Probing] {
        let dir = tempdir().unwrap();
        let cfg = FetchConfig {
            parallel_mode: mode,
            ..common::test_config(dir.path())
        };
        let done = fetch_once(
            dir.path(),
            cfg,
            curl(FileDownloaderType::Parallel, Some(4)),
            &server.url,
        );
        assert_eq!(done.status, Status::Completed, "{mode:?}: {:?}", done.error);
        assert_eq!(std::fs::read(dir.path().join("out.bin")).unwrap(), body, "{mode:?}");
    }
}

#[test]
fn digest_checked_when_enabled() {
    let body = common::body(16 * 1024);
    let good = range_server::start_with_options(
        body.clone(),
        RangeServerOptions {
            digest: true,
            ..RangeServerOptions::default()
        },
    );
    let bad = range_server::start_with_options(
        body,
        RangeServerOptions {
            digest: true,
            corrupt_digest: true,
            ..RangeServerOptions::default()
        },
    );

    let dir = tempdir().unwrap();
    let cfg = FetchConfig {
        hash_check_enabled: true,
        ..common::test_config(dir.path())
    };
    let done = fetch_once(dir.path(), cfg, curl(FileDownloaderType::Sequential, None), &good.url);
    assert_eq!(done.status, Status::Completed, "{:?}", done.error);

    let dir = tempdir().unwrap();
    let cfg = FetchConfig {
        hash_check_enabled: true,
        parallel_mode: ParallelMode::InPlace,
        ..common::test_config(dir.path())
    };
    let done = fetch_once(
        dir.path(),
        cfg,
        curl(FileDownloaderType::Parallel, Some(2)),
        &bad.url,
    );
    assert_eq!(done.status, Status::Failed);
    assert_eq!(done.error, DownloadError::InvalidContentChecksum);
}
