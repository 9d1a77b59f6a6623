//! Fixed chunks, each fetched into its own temp file and concatenated once
//! every chunk is complete.

use tracing::{debug, warn};

use super::sequential::run_sequential;
use super::slices::{open, run_slices, slice_count, SliceJob, SliceSink};
use super::{check_cancel, finish, verify_checksum, FileTransfer, TransferContext};
use crate::control::CancelToken;
use crate::model::Download;
use crate::retry::TransferError;
use crate::segmenter::plan_slices;
use crate::storage::{self, merge_chunks, SideFiles, StorageWriterBuilder};
use crate::transport::TransportRequest;

pub struct ChunkedTransfer {
    download: Download,
    ctx: TransferContext,
    cancel: CancelToken,
}

impl ChunkedTransfer {
    pub fn new(download: Download, ctx: TransferContext, cancel: CancelToken) -> Self {
        Self {
            download,
            ctx,
            cancel,
        }
    }
}

impl FileTransfer for ChunkedTransfer {
    fn download(&self) -> Download {
        self.download.clone()
    }

    fn run(&mut self) {
        let result = run_chunked(&self.ctx, &mut self.download, &self.cancel);
        finish(&self.ctx, &self.download, &self.cancel, result);
    }
}

fn run_chunked(
    ctx: &TransferContext,
    download: &mut Download,
    cancel: &CancelToken,
) -> Result<(), TransferError> {
    let opening = open(ctx, download, cancel)?;
    check_cancel(cancel)?;
    let Some(total) = opening.total.filter(|_| !opening.chunked) else {
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

    let side = SideFiles::new(&ctx.settings.temp_dir, download.id);
    let count = if opening.ranged {
        slice_count(ctx, download, total)
    } else {
        // Without ranges nothing on disk can be trusted.
        side.clear().map_err(TransferError::FileCreate)?;
        1
    };
    side.reconcile_slice_count(count)
        .map_err(TransferError::FileCreate)?;

    let mut plan = plan_slices(download.id, total, count);
    for slice in &mut plan {
        let on_disk = side.chunk_len(slice.position);
        if on_disk > slice.len() {
            std::fs::remove_file(side.chunk_path(slice.position))?;
        } else {
            slice.downloaded = on_disk;
        }
    }
    let resumed: u64 = plan.iter().map(|s| s.downloaded).sum();
    *download = download.with_counters(resumed, total as i64);
    debug!(id = download.id, count, resumed, "chunked transfer planned");
    ctx.delegate.on_started(download);

    let job = SliceJob {
        ctx,
        cancel,
        total,
        side: &side,
        sink: SliceSink::ChunkFiles,
        accept_full_body: !opening.ranged,
        persist_progress: false,
    };
    let done = run_slices(&job, plan, download)?;
    check_cancel(cancel)?;

    merge_chunks(&done, &side, &download.file, total)?;
    if let Err(e) = side.clear() {
        warn!(id = download.id, error = %e, "could not clear side files");
    }
    let request = TransportRequest::for_download(download);
    verify_checksum(ctx, &request, opening.checksum.as_deref())?;
    *download = download.with_counters(total, total as i64);
    Ok(())
}
