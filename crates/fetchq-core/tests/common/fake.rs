//! In-memory downloader serving one body, with range support, fault injection
//! and a request log.

use std::io::{self, Read};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use fetchq_core::control::CancelToken;
use fetchq_core::model::Connectivity;
use fetchq_core::network::ManualNetwork;
use fetchq_core::retry::TransferError;
use fetchq_core::transport::headers::ContentRange;
use fetchq_core::transport::{
    Downloader, FileDownloaderType, HeaderInfo, Method, Response, TransportRequest,
};

/// Largest read the fake body hands out at once.
const STEP: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Logged {
    pub method: Method,
    pub range: Option<(u64, Option<u64>)>,
}

#[derive(Debug, Clone, Copy)]
struct Fault {
    /// Fires on the next request whose range starts here.
    range_start: u64,
    /// Bytes delivered before the stream breaks.
    after: u64,
}

pub struct FakeDownloader {
    body: Arc<Vec<u8>>,
    ranges: bool,
    kind: FileDownloaderType,
    slices: Option<usize>,
    checksum: Option<String>,
    step_delay: Duration,
    offline_on_fault: Option<Arc<ManualNetwork>>,
    faults: Mutex<Vec<Fault>>,
    log: Mutex<Vec<Logged>>,
}

impl FakeDownloader {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body: Arc::new(body),
            ranges: true,
            kind: FileDownloaderType::Sequential,
            slices: None,
            checksum: None,
            step_delay: Duration::ZERO,
            offline_on_fault: None,
            faults: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Answer every GET with 200 and the whole body.
    pub fn ignoring_ranges(mut self) -> Self {
        self.ranges = false;
        self
    }

    pub fn parallel(mut self, slices: usize) -> Self {
        self.kind = FileDownloaderType::Parallel;
        self.slices = Some(slices);
        self
    }

    pub fn with_checksum(mut self, hex: impl Into<String>) -> Self {
        self.checksum = Some(hex.into());
        self
    }

    /// Sleep before each body read so transfers stay in flight.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Drop `network` to offline when a fault fires.
    pub fn offline_on_fault(mut self, network: Arc<ManualNetwork>) -> Self {
        self.offline_on_fault = Some(network);
        self
    }

    /// Break the next stream starting at `range_start` after `after` bytes.
    pub fn fail_once(&self, range_start: u64, after: u64) {
        self.faults.lock().unwrap().push(Fault { range_start, after });
    }

    pub fn requests(&self) -> Vec<Logged> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    /// Bytes asked for by closed-range GETs (the slice requests).
    pub fn ranged_bytes(&self) -> u64 {
        self.requests()
            .iter()
            .filter(|r| r.method == Method::Get)
            .filter_map(|r| match r.range {
                Some((start, Some(end))) => Some(end + 1 - start),
                _ => None,
            })
            .sum()
    }

    fn take_fault(&self, start: u64) -> Option<Fault> {
        let mut faults = self.faults.lock().unwrap();
        let index = faults.iter().position(|f| f.range_start == start)?;
        Some(faults.remove(index))
    }
}

impl Downloader for FakeDownloader {
    fn execute(
        &self,
        request: &TransportRequest,
        cancel: &CancelToken,
    ) -> Result<Response, TransferError> {
        let range = request.range();
        self.log.lock().unwrap().push(Logged {
            method: request.method,
            range,
        });
        if cancel.is_cancelled() {
            return Err(TransferError::Interrupted);
        }
        let total = self.body.len() as u64;
        let mut headers = HeaderInfo {
            accepts_ranges: self.ranges,
            checksum: self.checksum.clone(),
            ..HeaderInfo::default()
        };

        let (code, start, end) = match range.filter(|_| self.ranges) {
            Some((start, _)) if start >= total => {
                headers.status = Some(416);
                return Ok(Response {
                    code: 416,
                    is_successful: false,
                    content_length: 0,
                    body: Box::new(io::empty()),
                    headers,
                    accepts_ranges: self.ranges,
                    checksum: None,
                });
            }
            Some((start, end)) => {
                let end = end.map_or(total, |e| (e + 1).min(total));
                headers.content_range = Some(ContentRange {
                    start,
                    end: end - 1,
                    total: Some(total),
                });
                (206, start, end)
            }
            None => (200, 0, total),
        };
        headers.status = Some(code);
        headers.content_length = Some(end - start);

        let fail_at = self.take_fault(start).map(|f| start + f.after);
        Ok(Response {
            code,
            is_successful: true,
            content_length: (end - start) as i64,
            body: Box::new(FakeBody {
                data: Arc::clone(&self.body),
                pos: start,
                end,
                fail_at,
                delay: self.step_delay,
                offline: fail_at.and(self.offline_on_fault.clone()),
            }),
            headers,
            accepts_ranges: self.ranges,
            checksum: self.checksum.clone(),
        })
    }

    fn file_slicing_count(&self, _request: &TransportRequest, _content_length: u64) -> Option<usize> {
        self.slices
    }

    fn request_file_downloader_type(
        &self,
        _request: &TransportRequest,
        supported: &[FileDownloaderType],
    ) -> FileDownloaderType {
        if supported.contains(&self.kind) {
            self.kind
        } else {
            FileDownloaderType::Sequential
        }
    }

    fn head(
        &self,
        request: &TransportRequest,
        _cancel: &CancelToken,
    ) -> Result<Option<HeaderInfo>, TransferError> {
        self.log.lock().unwrap().push(Logged {
            method: request.method,
            range: None,
        });
        Ok(Some(HeaderInfo {
            status: Some(200),
            content_length: Some(self.body.len() as u64),
            accepts_ranges: self.ranges,
            checksum: self.checksum.clone(),
            ..HeaderInfo::default()
        }))
    }
}

struct FakeBody {
    data: Arc<Vec<u8>>,
    pos: u64,
    end: u64,
    fail_at: Option<u64>,
    delay: Duration,
    offline: Option<Arc<ManualNetwork>>,
}

impl Read for FakeBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let limit = self.fail_at.unwrap_or(self.end).min(self.end);
        if self.pos >= limit {
            if self.fail_at.is_some() && self.pos < self.end {
                if let Some(network) = &self.offline {
                    network.set(Connectivity::None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "injected fault",
                ));
            }
            return Ok(0);
        }
        let n = buf.len().min(STEP).min((limit - self.pos) as usize);
        let start = self.pos as usize;
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}
