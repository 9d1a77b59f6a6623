//! File-transfer strategies: the algorithms that turn one download and a
//! [`Downloader`] into bytes on disk.
//!
//! - [`SequentialTransfer`]: one ranged stream resumed from the file's length
//! - [`ChunkedTransfer`]: fixed chunks into temp files, merged at the end
//! - [`InPlaceTransfer`]: slices written straight into the destination
//! - [`ProbingTransfer`]: in-place slicing after a capability probe, with a
//!   byte-sum integrity check
//!
//! Every strategy reports through a [`StrategyDelegate`]: `on_started`, then
//! progress and block updates, then exactly one of `on_complete`/`on_error`.
//! A cancelled run ends without a terminal callback.

mod chunked;
mod in_place;
mod probing;
mod sequential;
mod slices;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, warn};

use crate::checksum;
use crate::config::{FetchConfig, ParallelMode};
use crate::control::CancelToken;
use crate::model::{Download, DownloadError};
use crate::network::NetworkInfoProvider;
use crate::progress::{eta_ms, RateSampler, ReportThrottle};
use crate::retry::{classify, settle_failure, NetworkRetryPolicy, TransferError};
use crate::segmenter::Slice;
use crate::transport::{Downloader, FileDownloaderType, TransportRequest};

pub use chunked::ChunkedTransfer;
pub use in_place::InPlaceTransfer;
pub use probing::ProbingTransfer;
pub use sequential::SequentialTransfer;

/// Receives a strategy's lifecycle callbacks.
pub trait StrategyDelegate: Send + Sync {
    fn on_started(&self, download: &Download);

    fn on_progress(&self, download: &Download);

    /// A slice advanced. Parallel strategies only.
    fn on_block_updated(&self, download: &Download, slice: &Slice, total_blocks: usize);

    fn on_complete(&self, download: &Download);

    /// `cause` is the raw failure the classification came from.
    fn on_error(&self, download: &Download, error: DownloadError, cause: Option<&TransferError>);

    /// Persist byte counters without any status change.
    fn save_download_progress(&self, download: &Download);
}

/// Knobs every strategy reads.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub buffer_size: usize,
    pub progress_interval: Duration,
    pub sample_interval: Duration,
    pub slice_persist_interval: Duration,
    pub hash_check_enabled: bool,
    pub network_retry: NetworkRetryPolicy,
    /// Side files and chunk temps.
    pub temp_dir: PathBuf,
    pub parallel_mode: ParallelMode,
}

impl TransferSettings {
    pub fn from_config(cfg: &FetchConfig) -> Result<Self> {
        Ok(Self {
            buffer_size: cfg.buffer_size.max(1024),
            progress_interval: cfg.progress_interval(),
            sample_interval: cfg.sample_interval(),
            slice_persist_interval: cfg.slice_persist_interval(),
            hash_check_enabled: cfg.hash_check_enabled,
            network_retry: cfg.network_retry_policy(),
            temp_dir: cfg.resolved_temp_dir()?,
            parallel_mode: cfg.parallel_mode,
        })
    }
}

/// Collaborators shared by every transfer of one engine.
#[derive(Clone)]
pub struct TransferContext {
    pub downloader: Arc<dyn Downloader>,
    pub delegate: Arc<dyn StrategyDelegate>,
    pub network: Arc<dyn NetworkInfoProvider>,
    pub settings: TransferSettings,
}

/// One runnable transfer.
pub trait FileTransfer: Send {
    /// Latest snapshot, counters included.
    fn download(&self) -> Download;

    /// Transfer until done, failed, or cancelled. Never panics on transfer
    /// errors; they go to the delegate.
    fn run(&mut self);
}

/// Pick the strategy for `download`: the transport chooses between sequential
/// and parallel, the configuration chooses the parallel flavour.
pub fn new_transfer(
    download: Download,
    ctx: TransferContext,
    cancel: CancelToken,
) -> Box<dyn FileTransfer> {
    let request = TransportRequest::for_download(&download);
    let kind = ctx.downloader.request_file_downloader_type(
        &request,
        &[FileDownloaderType::Sequential, FileDownloaderType::Parallel],
    );
    match (kind, ctx.settings.parallel_mode) {
        (FileDownloaderType::Sequential, _) => {
            Box::new(SequentialTransfer::new(download, ctx, cancel))
        }
        (FileDownloaderType::Parallel, ParallelMode::Chunked) => {
            Box::new(ChunkedTransfer::new(download, ctx, cancel))
        }
        (FileDownloaderType::Parallel, ParallelMode::InPlace) => {
            Box::new(InPlaceTransfer::new(download, ctx, cancel))
        }
        (FileDownloaderType::Parallel, ParallelMode::Probing) => {
            Box::new(ProbingTransfer::new(download, ctx, cancel))
        }
    }
}

/// Deliver the terminal callback for a finished run.
fn finish(
    ctx: &TransferContext,
    current: &Download,
    cancel: &CancelToken,
    result: Result<(), TransferError>,
) {
    match result {
        Ok(()) => {
            debug!(id = current.id, bytes = current.downloaded, "transfer complete");
            ctx.delegate.on_complete(current);
        }
        Err(e) if e.is_interrupted() || cancel.is_cancelled() => {
            debug!(id = current.id, "transfer interrupted");
            ctx.delegate.save_download_progress(current);
        }
        Err(e) => {
            let classified = classify(&e);
            let cause = settle_failure(
                &ctx.settings.network_retry,
                ctx.network.as_ref(),
                classified,
                cancel,
            );
            if cancel.is_cancelled() {
                ctx.delegate.save_download_progress(current);
                return;
            }
            warn!(id = current.id, error = %e, cause = %cause, "transfer failed");
            ctx.delegate.on_error(current, cause, Some(&e));
        }
    }
}

/// Check the finished file against the server checksum when enabled.
fn verify_checksum(
    ctx: &TransferContext,
    request: &TransportRequest,
    expected: Option<&str>,
) -> Result<(), TransferError> {
    let Some(expected) = expected.filter(|_| ctx.settings.hash_check_enabled) else {
        return Ok(());
    };
    if ctx.downloader.verify_content_checksum(request, expected) {
        return Ok(());
    }
    Err(TransferError::ChecksumMismatch {
        expected: checksum::normalize(expected),
        actual: checksum::sha256_path(&request.file).unwrap_or_default(),
    })
}

fn check_cancel(cancel: &CancelToken) -> Result<(), TransferError> {
    if cancel.is_cancelled() {
        Err(TransferError::Interrupted)
    } else {
        Ok(())
    }
}

/// Rate sampling on the short interval, progress reports on the long one.
struct ProgressPacer {
    sampler: RateSampler,
    sample: ReportThrottle,
    report: ReportThrottle,
}

impl ProgressPacer {
    fn new(settings: &TransferSettings, initial_bytes: u64) -> Self {
        let now = Instant::now();
        let mut sample = ReportThrottle::new(settings.sample_interval);
        let mut report = ReportThrottle::new(settings.progress_interval);
        sample.ready(now);
        report.ready(now);
        Self {
            sampler: RateSampler::new(initial_bytes, now),
            sample,
            report,
        }
    }

    /// Returns the snapshot to report when a progress event is due.
    fn tick(&mut self, download: &Download, downloaded: u64, total: i64) -> Option<Download> {
        let now = Instant::now();
        if self.sample.ready(now) {
            self.sampler.sample(downloaded, now);
        }
        if !self.report.ready(now) {
            return None;
        }
        let bps = self.sampler.bytes_per_second();
        Some(
            download
                .with_counters(downloaded, total)
                .with_rate(eta_ms(total, downloaded, bps), bps.round() as i64),
        )
    }
}
