//! One ranged stream, resumed from the bytes already in the destination.

use std::io::Read;

use tracing::debug;

use super::{check_cancel, finish, verify_checksum, FileTransfer, ProgressPacer, TransferContext};
use crate::control::CancelToken;
use crate::model::{Download, UNKNOWN_TOTAL};
use crate::retry::TransferError;
use crate::storage::{self, StorageWriterBuilder};
use crate::transport::TransportRequest;

pub struct SequentialTransfer {
    download: Download,
    ctx: TransferContext,
    cancel: CancelToken,
}

impl SequentialTransfer {
    pub fn new(download: Download, ctx: TransferContext, cancel: CancelToken) -> Self {
        Self {
            download,
            ctx,
            cancel,
        }
    }
}

impl FileTransfer for SequentialTransfer {
    fn download(&self) -> Download {
        self.download.clone()
    }

    fn run(&mut self) {
        let result = run_sequential(&self.ctx, &mut self.download, &self.cancel);
        finish(&self.ctx, &self.download, &self.cancel, result);
    }
}

/// Stream the download from the bytes already on disk. Shared with the
/// parallel strategies for resources of unknown length.
pub(super) fn run_sequential(
    ctx: &TransferContext,
    download: &mut Download,
    cancel: &CancelToken,
) -> Result<(), TransferError> {
    let on_disk = storage::file_len(&download.file);
    let request = TransportRequest::for_download(download).with_range_from(on_disk);
    let mut response = ctx.downloader.execute(&request, cancel)?;
    if let Err(e) = check_cancel(cancel) {
        ctx.downloader.disconnect(response);
        return Err(e);
    }
    if !response.is_successful {
        let code = response.code;
        ctx.downloader.disconnect(response);
        // Everything was already on disk when the last run stopped.
        if code == 416 && on_disk > 0 && download.total == on_disk as i64 {
            *download = download.with_counters(on_disk, download.total);
            ctx.delegate.on_started(download);
            return Ok(());
        }
        return Err(TransferError::Http(code));
    }

    // A full response to a ranged request means the server ignored the
    // range: start over.
    let offset = if response.is_partial() { on_disk } else { 0 };
    let checksum = response.checksum.clone();
    let total = match response.resource_length() {
        Some(len) => len as i64,
        None if response.content_length >= 0 => offset as i64 + response.content_length,
        None => UNKNOWN_TOTAL,
    };
    debug!(
        id = download.id,
        offset,
        total,
        code = response.code,
        "sequential transfer opened"
    );

    storage::ensure_parent(&download.file).map_err(TransferError::FileCreate)?;
    let builder = if offset == 0 {
        StorageWriterBuilder::create(&download.file)
    } else {
        StorageWriterBuilder::open(&download.file)
    };
    let writer = builder.map_err(TransferError::FileCreate)?.build();

    let mut downloaded = offset;
    *download = download.with_counters(downloaded, total);
    ctx.delegate.on_started(download);

    let mut pacer = ProgressPacer::new(&ctx.settings, downloaded);
    let mut buf = vec![0u8; ctx.settings.buffer_size];
    loop {
        check_cancel(cancel)?;
        let n = match response.body.read(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                *download = download.with_counters(downloaded, total);
                return Err(TransferError::from_stream(e));
            }
        };
        if n == 0 {
            break;
        }
        writer.write_at(downloaded, &buf[..n])?;
        downloaded += n as u64;
        *download = download.with_counters(downloaded, total);
        if let Some(report) = pacer.tick(download, downloaded, total) {
            ctx.delegate.on_progress(&report);
            ctx.delegate.save_download_progress(&report);
        }
    }
    ctx.downloader.disconnect(response);
    writer.sync()?;

    if total >= 0 && downloaded != total as u64 {
        return Err(TransferError::PartialTransfer {
            expected: total as u64,
            received: downloaded,
        });
    }
    verify_checksum(ctx, &request, checksum.as_deref())?;
    *download = download.with_counters(downloaded, downloaded as i64);
    Ok(())
}
