//! fetchlocal transport end to end: plain and sliced downloads, catalog
//! paging and authorization, through the scheme router.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::tcp_server::{self, TcpFiles};
use common::wait_for_status;
use fetchq_core::config::{FetchConfig, ParallelMode};
use fetchq_core::control::CancelToken;
use fetchq_core::network::ManualNetwork;
use fetchq_core::retry::TransferError;
use fetchq_core::store::MemoryStore;
use fetchq_core::transport::{CurlDownloader, FileDownloaderType, RouterDownloader, TcpDownloader};
use fetchq_core::{DownloadError, Fetch, Request, Status};
use tempfile::tempdir;

fn engine(cfg: FetchConfig, tcp: TcpDownloader) -> Fetch {
    let router = RouterDownloader::new(CurlDownloader::new(Duration::from_secs(5)), tcp);
    Fetch::new(
        cfg,
        Arc::new(MemoryStore::new()),
        Arc::new(router),
        Arc::new(ManualNetwork::default()),
    )
    .unwrap()
}

#[test]
fn sequential_and_sliced_downloads_match() {
    let small = common::body(10_000);
    let large = common::body(200_000);
    let base = tcp_server::start(
        TcpFiles::default()
            .with_file("small.bin", small.clone())
            .with_file("large.bin", large.clone()),
    );

    for (kind, mode) in [
        (FileDownloaderType::Sequential, ParallelMode::InPlace),
        (FileDownloaderType::Parallel, ParallelMode::InPlace),
        (FileDownloaderType::Parallel, ParallelMode::Chunked),
    ] {
        let dir = tempdir().unwrap();
        let cfg = FetchConfig {
            parallel_mode: mode,
            ..common::test_config(dir.path())
        };
        let tcp = TcpDownloader::new(Duration::from_secs(5))
            .with_downloader_type(kind)
            .with_slicing_count(Some(3));
        let fetch = engine(cfg, tcp);

        let a = fetch
            .enqueue(Request::new(format!("{base}/small.bin"), dir.path().join("small.bin")))
            .unwrap();
        let b = fetch
            .enqueue(Request::new(format!("{base}/large.bin"), dir.path().join("large.bin")))
            .unwrap();
        let done = wait_for_status(&fetch, b.id, Status::Completed);
        assert_eq!(done.total, large.len() as i64, "{kind:?} {mode:?}");
        wait_for_status(&fetch, a.id, Status::Completed);
        assert_eq!(std::fs::read(dir.path().join("small.bin")).unwrap(), small);
        assert_eq!(std::fs::read(dir.path().join("large.bin")).unwrap(), large);
        fetch.close();
    }
}

#[test]
fn missing_resource_fails_with_not_found() {
    let base = tcp_server::start(TcpFiles::default());
    let dir = tempdir().unwrap();
    let fetch = engine(common::test_config(dir.path()), TcpDownloader::default());
    let d = fetch
        .enqueue(Request::new(format!("{base}/nope.bin"), dir.path().join("nope.bin")))
        .unwrap();
    let failed = wait_for_status(&fetch, d.id, Status::Failed);
    assert_eq!(failed.error, DownloadError::HttpNotFound);
}

#[test]
fn authorization_header_is_forwarded() {
    let body = common::body(4096);
    let base = tcp_server::start(
        TcpFiles::default()
            .with_file("secret.bin", body.clone())
            .with_token("letmein"),
    );
    let dir = tempdir().unwrap();
    let fetch = engine(common::test_config(dir.path()), TcpDownloader::default());

    let denied = fetch
        .enqueue(Request::new(format!("{base}/secret.bin"), dir.path().join("denied.bin")))
        .unwrap();
    let failed = wait_for_status(&fetch, denied.id, Status::Failed);
    assert_eq!(failed.error, DownloadError::HttpUnauthorized);

    let allowed = fetch
        .enqueue(
            Request::new(format!("{base}/secret.bin"), dir.path().join("allowed.bin"))
                .with_header("Authorization", "letmein"),
        )
        .unwrap();
    wait_for_status(&fetch, allowed.id, Status::Completed);
    assert_eq!(std::fs::read(dir.path().join("allowed.bin")).unwrap(), body);
}

#[test]
fn catalog_pages_through_served_files() {
    let mut files = TcpFiles::default();
    for i in 0..5 {
        files = files.with_file(&format!("f{i}.bin"), common::body(100 * (i + 1)));
    }
    let base = tcp_server::start(files);
    let client = TcpDownloader::default();
    let cancel = CancelToken::new();

    let first = client.catalog(&base, 0, 2, &cancel).unwrap();
    let names: Vec<_> = first.iter().map(|e| e.resource.as_str()).collect();
    assert_eq!(names, vec!["f0.bin", "f1.bin"]);
    assert_eq!(first[1].length, 200);
    assert_eq!(
        first[0].checksum.as_deref(),
        Some(fetchq_core::checksum::sha256_bytes(&common::body(100)).as_str())
    );

    let last = client.catalog(&base, 2, 2, &cancel).unwrap();
    assert_eq!(last.len(), 1);
    assert!(client.catalog(&base, 3, 2, &cancel).unwrap().is_empty());

    let err = client.catalog("http://127.0.0.1/", 0, 2, &cancel).unwrap_err();
    assert!(matches!(err, TransferError::UnsupportedScheme(_)));
}
