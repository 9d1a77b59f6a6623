//! Slice engine shared by the parallel strategies.
//!
//! The opening request learns the total length and whether ranges work. One
//! scoped worker thread per unfinished slice then fetches its range, while
//! the calling thread samples progress until every worker has reported back.
//! The first real failure stops the remaining workers.

use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;

use tracing::{debug, warn};

use super::{ProgressPacer, TransferContext};
use crate::control::CancelToken;
use crate::model::Download;
use crate::progress::ReportThrottle;
use crate::retry::TransferError;
use crate::segmenter::{slice_count_for_length, Slice};
use crate::storage::{OutputResource, SideFiles};
use crate::transport::TransportRequest;

/// What the opening request told us.
#[derive(Debug, Clone)]
pub(super) struct Opening {
    /// Full resource length, if known.
    pub total: Option<u64>,
    /// The server answered the `bytes=0-` request with 206.
    pub ranged: bool,
    pub chunked: bool,
    pub checksum: Option<String>,
}

pub(super) fn open(
    ctx: &TransferContext,
    download: &Download,
    cancel: &CancelToken,
) -> Result<Opening, TransferError> {
    let request = TransportRequest::for_download(download).with_range_from(0);
    let response = ctx.downloader.execute(&request, cancel)?;
    let code = response.code;
    if !response.is_successful {
        ctx.downloader.disconnect(response);
        return Err(TransferError::Http(code));
    }
    let chunked = response.headers.chunked;
    let total = response.resource_length().or_else(|| {
        (!chunked && response.content_length >= 0).then_some(response.content_length as u64)
    });
    let opening = Opening {
        total,
        ranged: response.is_partial(),
        chunked,
        checksum: response.checksum.clone(),
    };
    ctx.downloader.disconnect(response);
    debug!(id = download.id, code, ?opening, "parallel transfer opened");
    Ok(opening)
}

/// Transport override, else the length thresholds.
pub(super) fn slice_count(ctx: &TransferContext, download: &Download, total: u64) -> usize {
    let request = TransportRequest::for_download(download);
    ctx.downloader
        .file_slicing_count(&request, total)
        .filter(|n| *n > 0)
        .unwrap_or_else(|| slice_count_for_length(total))
}

/// Where slice bytes go.
pub(super) enum SliceSink {
    /// Positional writes into one shared output.
    Shared(Arc<dyn OutputResource>),
    /// One temp file per slice, appended to.
    ChunkFiles,
}

/// Where one worker's bytes go, resolved from the job's [`SliceSink`].
enum SliceWriter<'a> {
    Shared(&'a dyn OutputResource),
    Chunk(File),
}

impl<'a> SliceWriter<'a> {
    fn open(sink: &'a SliceSink, side: &SideFiles, position: usize) -> io::Result<Self> {
        Ok(match sink {
            SliceSink::Shared(out) => SliceWriter::Shared(&**out),
            SliceSink::ChunkFiles => SliceWriter::Chunk(
                File::options()
                    .create(true)
                    .append(true)
                    .open(side.chunk_path(position))?,
            ),
        })
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        match self {
            SliceWriter::Shared(out) => out.write_at(offset, data),
            SliceWriter::Chunk(file) => file.write_all(data),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            SliceWriter::Shared(_) => Ok(()),
            SliceWriter::Chunk(file) => file.flush(),
        }
    }
}

pub(super) struct SliceJob<'a> {
    pub ctx: &'a TransferContext,
    pub cancel: &'a CancelToken,
    pub total: u64,
    pub side: &'a SideFiles,
    pub sink: SliceSink,
    /// A slice starting at byte 0 may take a 200 (range-less server).
    pub accept_full_body: bool,
    /// Record per-slice progress in side files.
    pub persist_progress: bool,
}

fn lock(state: &Mutex<Vec<Slice>>) -> MutexGuard<'_, Vec<Slice>> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

fn sum_downloaded(slices: &[Slice]) -> u64 {
    slices.iter().map(|s| s.downloaded.min(s.len())).sum()
}

/// Fetch every unfinished slice. `download` tracks the summed counters the
/// whole time, so it is current whichever way this returns.
pub(super) fn run_slices(
    job: &SliceJob<'_>,
    slices: Vec<Slice>,
    download: &mut Download,
) -> Result<Vec<Slice>, TransferError> {
    let settings = &job.ctx.settings;
    let total = job.total as i64;
    let total_blocks = slices.len();
    let mut reported: Vec<u64> = slices.iter().map(|s| s.downloaded).collect();
    let pending: Vec<usize> = slices
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.is_done())
        .map(|(i, _)| i)
        .collect();

    *download = download.with_counters(sum_downloaded(&slices), total);
    let mut pacer = ProgressPacer::new(settings, download.downloaded);
    let state = Mutex::new(slices);
    let stop = CancelToken::new();
    let mut first_error: Option<TransferError> = None;
    let base = download.clone();

    thread::scope(|scope| {
        let (tx, rx) = mpsc::channel();
        let mut spawned = 0usize;
        for &index in &pending {
            let tx = tx.clone();
            let (state, stop, base) = (&state, &stop, &base);
            let spawn = thread::Builder::new()
                .name(format!("fetchq-slice-{}-{}", base.id, index))
                .spawn_scoped(scope, move || {
                    let result = fetch_slice(job, base, index, state, stop);
                    let _ = tx.send((index, result));
                });
            match spawn {
                Ok(_) => spawned += 1,
                Err(e) => {
                    first_error.get_or_insert(TransferError::Io(e));
                    stop.cancel();
                    break;
                }
            }
        }
        drop(tx);

        let mut finished = 0usize;
        while finished < spawned {
            match rx.recv_timeout(settings.sample_interval) {
                Ok((index, Err(e))) => {
                    finished += 1;
                    if !e.is_interrupted() && first_error.is_none() {
                        debug!(slice = index, error = %e, "slice failed, stopping siblings");
                        first_error = Some(e);
                        stop.cancel();
                    }
                }
                Ok((_, Ok(()))) => finished += 1,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if job.cancel.is_cancelled() {
                stop.cancel();
            }
            report(job, &state, &mut reported, total_blocks, &mut pacer, download);
        }
    });

    let slices = state.into_inner().unwrap_or_else(|e| e.into_inner());
    *download = download.with_counters(sum_downloaded(&slices), total);
    if job.cancel.is_cancelled() {
        return Err(TransferError::Interrupted);
    }
    if let Some(e) = first_error {
        return Err(e);
    }
    Ok(slices)
}

/// Emit block updates for slices that moved, then a paced progress report.
fn report(
    job: &SliceJob<'_>,
    state: &Mutex<Vec<Slice>>,
    reported: &mut [u64],
    total_blocks: usize,
    pacer: &mut ProgressPacer,
    download: &mut Download,
) {
    let snapshot = lock(state).clone();
    *download = download.with_counters(sum_downloaded(&snapshot), job.total as i64);
    for slice in &snapshot {
        if reported[slice.position] != slice.downloaded {
            reported[slice.position] = slice.downloaded;
            job.ctx
                .delegate
                .on_block_updated(download, slice, total_blocks);
        }
    }
    if let Some(progress) = pacer.tick(download, download.downloaded, download.total) {
        job.ctx.delegate.on_progress(&progress);
        job.ctx.delegate.save_download_progress(&progress);
    }
}

/// Worker body for one slice.
fn fetch_slice(
    job: &SliceJob<'_>,
    base: &Download,
    index: usize,
    state: &Mutex<Vec<Slice>>,
    stop: &CancelToken,
) -> Result<(), TransferError> {
    let slice = lock(state)[index];
    if slice.is_done() {
        return Ok(());
    }
    let request =
        TransportRequest::for_download(base).with_range(slice.next_offset(), slice.end - 1);
    let mut response = job.ctx.downloader.execute(&request, stop)?;
    if !response.is_successful {
        let code = response.code;
        job.ctx.downloader.disconnect(response);
        return Err(TransferError::Http(code));
    }
    let whole_body_ok = job.accept_full_body && slice.next_offset() == 0;
    if !response.is_partial() && !whole_body_ok {
        job.ctx.downloader.disconnect(response);
        return Err(TransferError::Protocol(format!(
            "server ignored range for slice {}",
            slice.position
        )));
    }

    let mut writer = match SliceWriter::open(&job.sink, job.side, slice.position) {
        Ok(w) => w,
        Err(e) => {
            job.ctx.downloader.disconnect(response);
            return Err(TransferError::FileCreate(e));
        }
    };

    let len = slice.len();
    let mut written = slice.downloaded;
    let mut persist = ReportThrottle::new(job.ctx.settings.slice_persist_interval);
    let mut buf = vec![0u8; job.ctx.settings.buffer_size];
    let outcome = loop {
        if stop.is_cancelled() {
            break Err(TransferError::Interrupted);
        }
        let n = match response.body.read(&mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) => n.min((len - written) as usize),
            Err(e) => break Err(TransferError::from_stream(e)),
        };
        if let Err(e) = writer.write(slice.start + written, &buf[..n]) {
            break Err(TransferError::Io(e));
        }
        written += n as u64;
        lock(state)[index].downloaded = written;
        if job.persist_progress && persist.ready(Instant::now()) {
            persist_slice(job.side, slice.position, written);
        }
        if written >= len {
            break Ok(());
        }
    };
    job.ctx.downloader.disconnect(response);
    if let Err(e) = writer.flush() {
        warn!(slice = slice.position, error = %e, "chunk flush failed");
    }
    if job.persist_progress {
        persist_slice(job.side, slice.position, written);
    }
    outcome?;
    if written < len {
        return Err(TransferError::PartialTransfer {
            expected: len,
            received: written,
        });
    }
    Ok(())
}

fn persist_slice(side: &SideFiles, position: usize, downloaded: u64) {
    if let Err(e) = side.write_slice_progress(position, downloaded) {
        warn!(position, error = %e, "could not record slice progress");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageWriterBuilder;

    #[test]
    fn chunk_writer_appends_to_the_slice_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let side = SideFiles::new(dir.path(), 7);
        let mut writer = SliceWriter::open(&SliceSink::ChunkFiles, &side, 2).unwrap();
        writer.write(4000, b"abc").unwrap();
        writer.write(4003, b"def").unwrap();
        writer.flush().unwrap();
        assert_eq!(std::fs::read(side.chunk_path(2)).unwrap(), b"abcdef");
        assert_eq!(side.chunk_len(2), 6);
    }

    #[test]
    fn shared_writer_writes_at_slice_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut builder = StorageWriterBuilder::create(&path).unwrap();
        builder.preallocate(8).unwrap();
        let sink = SliceSink::Shared(Arc::new(builder.build()));
        let side = SideFiles::new(dir.path(), 7);

        let mut writer = SliceWriter::open(&sink, &side, 1).unwrap();
        writer.write(4, b"wxyz").unwrap();
        writer.flush().unwrap();
        assert_eq!(&std::fs::read(&path).unwrap()[4..], b"wxyz");
        assert!(!side.chunk_path(1).exists());
    }
}
