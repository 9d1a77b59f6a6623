//! The transport seam: everything above a [`Downloader`] is protocol-agnostic.
//!
//! A downloader performs one (usually ranged) request and hands back a
//! [`Response`] whose body is read by the strategy. Implementations here:
//! libcurl for HTTP(S) ([`CurlDownloader`]), the framed TCP protocol
//! ([`TcpDownloader`]), and a scheme router over both ([`RouterDownloader`]).

pub mod headers;
mod http;
mod router;
pub mod tcp;

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use crate::checksum;
use crate::control::CancelToken;
use crate::model::{Download, DownloadId};
use crate::retry::TransferError;
use crate::storage::OutputResource;

pub use headers::HeaderInfo;
pub use http::CurlDownloader;
pub use router::RouterDownloader;
pub use tcp::TcpDownloader;

/// Header name the core uses for byte ranges.
pub const RANGE_HEADER: &str = "Range";

/// Request method. `Head` asks only for headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Head,
}

/// One request as seen by a transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub id: DownloadId,
    pub url: String,
    pub method: Method,
    /// Caller headers plus the `Range` header set by the core.
    pub headers: BTreeMap<String, String>,
    pub file: PathBuf,
    pub tag: Option<String>,
    pub extras: BTreeMap<String, String>,
}

impl TransportRequest {
    pub fn for_download(download: &Download) -> Self {
        Self {
            id: download.id,
            url: download.url.clone(),
            method: Method::Get,
            headers: download.headers.clone(),
            file: download.file.clone(),
            tag: download.tag.clone(),
            extras: download.extras.clone(),
        }
    }

    /// `Range: bytes=<start>-`
    pub fn with_range_from(self, start: u64) -> Self {
        self.with_range_value(format!("bytes={start}-"))
    }

    /// `Range: bytes=<start>-<end_inclusive>`
    pub fn with_range(self, start: u64, end_inclusive: u64) -> Self {
        self.with_range_value(format!("bytes={start}-{end_inclusive}"))
    }

    fn with_range_value(mut self, value: String) -> Self {
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(RANGE_HEADER));
        self.headers.insert(RANGE_HEADER.to_string(), value);
        self
    }

    pub fn head(mut self) -> Self {
        self.method = Method::Head;
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(RANGE_HEADER));
        self
    }

    /// `(start, inclusive end)` of the requested range, if any.
    pub fn range(&self) -> Option<(u64, Option<u64>)> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(RANGE_HEADER))
            .and_then(|(_, v)| headers::parse_range_header(v))
    }
}

/// Result of a request whose headers have arrived. The body is streamed.
pub struct Response {
    pub code: u32,
    pub is_successful: bool,
    /// Length of this response's body; -1 when unknown.
    pub content_length: i64,
    pub body: Box<dyn Read + Send>,
    pub headers: HeaderInfo,
    /// The server serves byte ranges for this resource.
    pub accepts_ranges: bool,
    /// Server-supplied SHA-256 of the full resource (hex).
    pub checksum: Option<String>,
}

impl Response {
    /// 206: the server honoured the requested range.
    pub fn is_partial(&self) -> bool {
        self.code == 206
    }

    /// Length of the whole resource, as far as the response tells.
    pub fn resource_length(&self) -> Option<u64> {
        self.headers.resource_length()
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("code", &self.code)
            .field("content_length", &self.content_length)
            .field("accepts_ranges", &self.accepts_ranges)
            .field("checksum", &self.checksum)
            .finish_non_exhaustive()
    }
}

/// How a download should be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileDownloaderType {
    #[default]
    Sequential,
    Parallel,
}

/// Pluggable transport client.
pub trait Downloader: Send + Sync {
    /// Open the request. `Ok` carries any status; non-2xx is reported through
    /// `is_successful` so the caller can classify it.
    fn execute(
        &self,
        request: &TransportRequest,
        cancel: &CancelToken,
    ) -> Result<Response, TransferError>;

    /// Release a response early. Dropping it has the same effect.
    fn disconnect(&self, response: Response) {
        drop(response);
    }

    /// Override for the number of slices; `None` uses the length thresholds.
    fn file_slicing_count(&self, _request: &TransportRequest, _content_length: u64) -> Option<usize> {
        None
    }

    /// Pick a strategy family from `supported`.
    fn request_file_downloader_type(
        &self,
        _request: &TransportRequest,
        _supported: &[FileDownloaderType],
    ) -> FileDownloaderType {
        FileDownloaderType::Sequential
    }

    /// Check the finished file against a server-supplied checksum.
    fn verify_content_checksum(&self, request: &TransportRequest, checksum: &str) -> bool {
        match checksum::file_matches(&request.file, checksum) {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!(id = request.id, error = %e, "checksum verification failed");
                false
            }
        }
    }

    /// Metadata-only probe. `Ok(None)` means the transport has no cheap probe.
    fn head(
        &self,
        _request: &TransportRequest,
        _cancel: &CancelToken,
    ) -> Result<Option<HeaderInfo>, TransferError> {
        Ok(None)
    }

    /// Caller-supplied output for in-place slicing; `None` writes to the file.
    fn output_resource(&self, _request: &TransportRequest) -> Option<Arc<dyn OutputResource>> {
        None
    }

    /// Release pooled connections. Called once when the engine closes.
    fn close(&self) {}
}

impl<D: Downloader + ?Sized> Downloader for Arc<D> {
    fn execute(
        &self,
        request: &TransportRequest,
        cancel: &CancelToken,
    ) -> Result<Response, TransferError> {
        (**self).execute(request, cancel)
    }

    fn disconnect(&self, response: Response) {
        (**self).disconnect(response)
    }

    fn file_slicing_count(&self, request: &TransportRequest, content_length: u64) -> Option<usize> {
        (**self).file_slicing_count(request, content_length)
    }

    fn request_file_downloader_type(
        &self,
        request: &TransportRequest,
        supported: &[FileDownloaderType],
    ) -> FileDownloaderType {
        (**self).request_file_downloader_type(request, supported)
    }

    fn verify_content_checksum(&self, request: &TransportRequest, checksum: &str) -> bool {
        (**self).verify_content_checksum(request, checksum)
    }

    fn head(
        &self,
        request: &TransportRequest,
        cancel: &CancelToken,
    ) -> Result<Option<HeaderInfo>, TransferError> {
        (**self).head(request, cancel)
    }

    fn output_resource(&self, request: &TransportRequest) -> Option<Arc<dyn OutputResource>> {
        (**self).output_resource(request)
    }

    fn close(&self) {
        (**self).close()
    }
}
