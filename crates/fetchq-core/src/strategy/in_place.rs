//! Slices written directly into the destination at their offsets; per-slice
//! progress goes to side files so each slice resumes on its own.

use std::sync::Arc;

use tracing::{debug, warn};

use super::sequential::run_sequential;
use super::slices::{open, run_slices, slice_count, SliceJob, SliceSink};
use super::{check_cancel, finish, verify_checksum, FileTransfer, TransferContext};
use crate::control::CancelToken;
use crate::model::Download;
use crate::retry::TransferError;
use crate::segmenter::plan_slices;
use crate::storage::{self, OutputResource, SideFiles, StorageWriterBuilder};
use crate::transport::TransportRequest;

pub struct InPlaceTransfer {
    download: Download,
    ctx: TransferContext,
    cancel: CancelToken,
}

impl InPlaceTransfer {
    pub fn new(download: Download, ctx: TransferContext, cancel: CancelToken) -> Self {
        Self {
            download,
            ctx,
            cancel,
        }
    }
}

impl FileTransfer for InPlaceTransfer {
    fn download(&self) -> Download {
        self.download.clone()
    }

    fn run(&mut self) {
        let result = run_in_place(&self.ctx, &mut self.download, &self.cancel, false);
        finish(&self.ctx, &self.download, &self.cancel, result);
    }
}

/// In-place slicing. With `probe`, server capability is checked with a HEAD
/// first and the byte sum is verified before completing.
pub(super) fn run_in_place(
    ctx: &TransferContext,
    download: &mut Download,
    cancel: &CancelToken,
    probe: bool,
) -> Result<(), TransferError> {
    let request = TransportRequest::for_download(download);
    let head = if probe {
        match ctx.downloader.head(&request.clone().head(), cancel) {
            Ok(info) => info,
            Err(e) => {
                check_cancel(cancel)?;
                debug!(id = download.id, error = %e, "capability probe failed");
                None
            }
        }
    } else {
        None
    };

    let opening = open(ctx, download, cancel)?;
    check_cancel(cancel)?;
    let chunked = opening.chunked || head.as_ref().is_some_and(|h| h.chunked);
    let Some(total) = opening.total.filter(|_| !chunked) else {
        debug!(id = download.id, "length unknown, streaming sequentially");
        return run_sequential(ctx, download, cancel);
    };
    storage::ensure_parent(&download.file).map_err(TransferError::FileCreate)?;
    if total == 0 {
        StorageWriterBuilder::create(&download.file).map_err(TransferError::FileCreate)?;
        *download = download.with_counters(0, 0);
        ctx.delegate.on_started(download);
        return Ok(());
    }

    let viable = opening.ranged && head.as_ref().map_or(true, |h| h.accepts_ranges);
    let count = if viable { slice_count(ctx, download, total) } else { 1 };
    let side = SideFiles::new(&ctx.settings.temp_dir, download.id);
    if !opening.ranged {
        side.clear().map_err(TransferError::FileCreate)?;
    }
    let kept = side
        .reconcile_slice_count(count)
        .map_err(TransferError::FileCreate)?;
    let custom = ctx.downloader.output_resource(&request);
    let mut resume = kept && opening.ranged;
    // Slice records only count when the destination still has its full
    // preallocated length. A transport-supplied output keeps its own bytes.
    if resume && custom.is_none() && storage::file_len(&download.file) != total {
        debug!(
            id = download.id,
            total,
            "partial file does not match slice records, starting over"
        );
        side.clear().map_err(TransferError::FileCreate)?;
        side.write_slice_count(count).map_err(TransferError::FileCreate)?;
        resume = false;
    }

    let mut plan = plan_slices(download.id, total, count);
    if resume {
        for slice in &mut plan {
            slice.downloaded = side.read_slice_progress(slice.position).min(slice.len());
        }
    }

    let output: Arc<dyn OutputResource> = match custom {
        Some(custom) => {
            custom.set_len(total)?;
            custom
        }
        None => {
            let builder = if resume {
                StorageWriterBuilder::open(&download.file)
            } else {
                StorageWriterBuilder::create(&download.file)
            };
            let mut builder = builder.map_err(TransferError::FileCreate)?;
            builder.preallocate(total)?;
            Arc::new(builder.build())
        }
    };

    let resumed: u64 = plan.iter().map(|s| s.downloaded).sum();
    *download = download.with_counters(resumed, total as i64);
    debug!(id = download.id, count, resumed, probe, "slice transfer planned");
    ctx.delegate.on_started(download);

    let job = SliceJob {
        ctx,
        cancel,
        total,
        side: &side,
        sink: SliceSink::Shared(Arc::clone(&output)),
        accept_full_body: !viable,
        persist_progress: true,
    };
    let done = run_slices(&job, plan, download)?;
    check_cancel(cancel)?;
    output.flush()?;

    if probe {
        let received: u64 = done.iter().map(|s| s.downloaded).sum();
        if received != total {
            return Err(TransferError::PartialTransfer {
                expected: total,
                received,
            });
        }
    }

    if let Err(e) = side.clear() {
        warn!(id = download.id, error = %e, "could not clear side files");
    }
    verify_checksum(ctx, &request, opening.checksum.as_deref())?;
    *download = download.with_counters(total, total as i64);
    Ok(())
}
