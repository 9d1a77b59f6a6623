//! HTTP(S) transport over libcurl.
//!
//! `curl::easy::Easy` pushes data through callbacks, while strategies pull
//! from a `Read`. Each request therefore runs on its own thread and sends
//! header and body events over a bounded channel. Dropping the body closes the
//! channel, and the next write callback then aborts the transfer.

use std::cell::{Cell, RefCell};
use std::io::{self, Read};
use std::str;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;
use std::time::Duration;

use curl::easy::{Easy, List};
use tracing::debug;

use super::headers::parse_headers;
use super::{Downloader, FileDownloaderType, HeaderInfo, Method, Response, TransportRequest};
use crate::control::CancelToken;
use crate::retry::TransferError;

const CHANNEL_DEPTH: usize = 32;

enum BodyEvent {
    Headers(Vec<String>),
    Data(Vec<u8>),
    Done(Result<(), curl::Error>),
}

/// libcurl-backed [`Downloader`] for `http` and `https` URLs.
#[derive(Debug, Clone)]
pub struct CurlDownloader {
    connect_timeout: Duration,
    buffer_size: usize,
    downloader_type: FileDownloaderType,
    slicing_count: Option<usize>,
}

impl Default for CurlDownloader {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl CurlDownloader {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            buffer_size: 64 * 1024,
            downloader_type: FileDownloaderType::Sequential,
            slicing_count: None,
        }
    }

    /// Strategy family to ask for when the engine offers a choice.
    pub fn with_downloader_type(mut self, downloader_type: FileDownloaderType) -> Self {
        self.downloader_type = downloader_type;
        self
    }

    /// Fixed slice count instead of the length thresholds.
    pub fn with_slicing_count(mut self, count: Option<usize>) -> Self {
        self.slicing_count = count;
        self
    }

    pub fn with_buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes.max(1024);
        self
    }

    fn build_easy(&self, request: &TransportRequest) -> Result<Easy, TransferError> {
        let mut easy = Easy::new();
        easy.url(&request.url)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.buffer_size(self.buffer_size)?;
        easy.useragent(concat!("fetchq/", env!("CARGO_PKG_VERSION")))?;
        easy.progress(true)?;
        if request.method == Method::Head {
            easy.nobody(true)?;
        }
        if !request.headers.is_empty() {
            let mut list = List::new();
            for (k, v) in &request.headers {
                list.append(&format!("{}: {}", k.trim(), v.trim()))?;
            }
            easy.http_headers(list)?;
        }
        Ok(easy)
    }
}

fn check_scheme(url: &str) -> Result<(), TransferError> {
    let parsed = url::Url::parse(url).map_err(|_| TransferError::InvalidUrl(url.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(TransferError::UnsupportedScheme(other.to_string())),
    }
}

/// Runs on the transfer thread until the body is done or nobody listens.
fn run_transfer(mut easy: Easy, tx: SyncSender<BodyEvent>, cancel: CancelToken) {
    let lines: RefCell<Vec<String>> = RefCell::new(Vec::new());
    let headers_sent = Cell::new(false);

    let result = {
        let send_headers = || {
            if headers_sent.replace(true) {
                return true;
            }
            let block = std::mem::take(&mut *lines.borrow_mut());
            tx.send(BodyEvent::Headers(block)).is_ok()
        };
        let mut transfer = easy.transfer();
        let outcome = (|| -> Result<(), curl::Error> {
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    lines.borrow_mut().push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.write_function(|data| {
                if !send_headers() || tx.send(BodyEvent::Data(data.to_vec())).is_err() {
                    // Reader went away; returning a short count aborts.
                    return Ok(0);
                }
                Ok(data.len())
            })?;
            transfer.progress_function(|_, _, _, _| !cancel.is_cancelled())?;
            transfer.perform()
        })();
        drop(transfer);
        if outcome.is_ok() {
            send_headers();
        }
        outcome
    };

    let _ = tx.send(BodyEvent::Done(result));
}

/// Pull side of the body channel.
struct ChannelBody {
    rx: Receiver<BodyEvent>,
    pending: Vec<u8>,
    pos: usize,
    done: bool,
}

impl Read for ChannelBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.pos < self.pending.len() {
                let n = buf.len().min(self.pending.len() - self.pos);
                buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.done {
                return Ok(0);
            }
            match self.rx.recv() {
                Ok(BodyEvent::Data(data)) => {
                    self.pending = data;
                    self.pos = 0;
                }
                Ok(BodyEvent::Headers(_)) => {}
                Ok(BodyEvent::Done(Ok(()))) => self.done = true,
                Ok(BodyEvent::Done(Err(e))) => {
                    self.done = true;
                    return Err(io::Error::new(io::ErrorKind::Other, e));
                }
                Err(_) => {
                    self.done = true;
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "transfer thread ended without finishing",
                    ));
                }
            }
        }
    }
}

impl Downloader for CurlDownloader {
    fn execute(
        &self,
        request: &TransportRequest,
        cancel: &CancelToken,
    ) -> Result<Response, TransferError> {
        check_scheme(&request.url)?;
        let easy = self.build_easy(request)?;
        let (tx, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
        let cancel = cancel.clone();
        thread::Builder::new()
            .name(format!("fetchq-curl-{}", request.id))
            .spawn(move || run_transfer(easy, tx, cancel))?;

        let lines = match rx.recv() {
            Ok(BodyEvent::Headers(lines)) => lines,
            Ok(BodyEvent::Done(Err(e))) => return Err(TransferError::Curl(e)),
            Ok(_) => return Err(TransferError::Protocol("body before headers".into())),
            Err(_) => return Err(TransferError::Protocol("transfer thread exited".into())),
        };

        let info = parse_headers(&lines);
        let code = info.status.unwrap_or(0);
        debug!(id = request.id, code, range = ?request.range(), "http response");
        let content_length = if info.chunked {
            -1
        } else {
            info.content_length.map(|n| n as i64).unwrap_or(-1)
        };
        Ok(Response {
            code,
            is_successful: (200..300).contains(&code),
            content_length,
            accepts_ranges: info.accepts_ranges || code == 206,
            checksum: info.checksum.clone(),
            headers: info,
            body: Box::new(ChannelBody {
                rx,
                pending: Vec::new(),
                pos: 0,
                done: false,
            }),
        })
    }

    fn file_slicing_count(&self, _request: &TransportRequest, _content_length: u64) -> Option<usize> {
        self.slicing_count
    }

    fn request_file_downloader_type(
        &self,
        _request: &TransportRequest,
        supported: &[FileDownloaderType],
    ) -> FileDownloaderType {
        if supported.contains(&self.downloader_type) {
            self.downloader_type
        } else {
            FileDownloaderType::Sequential
        }
    }

    fn head(
        &self,
        request: &TransportRequest,
        cancel: &CancelToken,
    ) -> Result<Option<HeaderInfo>, TransferError> {
        let response = self.execute(&request.clone().head(), cancel)?;
        if !response.is_successful {
            debug!(id = request.id, code = response.code, "HEAD not supported");
            return Ok(None);
        }
        Ok(Some(response.headers))
    }
}
