//! `fetchlocal://host:port/resource` client.

use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use super::wire::{
    read_frame, write_frame, CatalogEntry, RequestType, WireRequest, WireResponse,
};
use crate::control::CancelToken;
use crate::retry::TransferError;
use crate::transport::headers::{ContentRange, HeaderInfo};
use crate::transport::{Downloader, FileDownloaderType, Response, TransportRequest};

pub const SCHEME: &str = "fetchlocal";
pub const DEFAULT_PORT: u16 = 6886;

/// Poll period for blocked socket reads, so cancellation is noticed.
const READ_POLL: Duration = Duration::from_millis(250);

/// Where a `fetchlocal://` URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub resource: String,
}

impl Endpoint {
    pub fn parse(url: &str) -> Result<Self, TransferError> {
        let parsed = url::Url::parse(url).map_err(|_| TransferError::InvalidUrl(url.to_string()))?;
        if parsed.scheme() != SCHEME {
            return Err(TransferError::UnsupportedScheme(parsed.scheme().to_string()));
        }
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TransferError::InvalidUrl(url.to_string()))?
            .to_string();
        let resource = parsed.path().trim_start_matches('/').to_string();
        Ok(Self {
            host,
            port: parsed.port().unwrap_or(DEFAULT_PORT),
            resource,
        })
    }

    fn resolve(&self) -> Result<SocketAddr, TransferError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                TransferError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("could not resolve host {}", self.host),
                ))
            })
    }
}

/// [`Downloader`] for the fetchlocal TCP protocol.
#[derive(Debug, Clone)]
pub struct TcpDownloader {
    connect_timeout: Duration,
    client: String,
    downloader_type: FileDownloaderType,
    slicing_count: Option<usize>,
}

impl Default for TcpDownloader {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl TcpDownloader {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            client: "fetchq".to_string(),
            downloader_type: FileDownloaderType::Sequential,
            slicing_count: None,
        }
    }

    pub fn with_downloader_type(mut self, downloader_type: FileDownloaderType) -> Self {
        self.downloader_type = downloader_type;
        self
    }

    pub fn with_slicing_count(mut self, count: Option<usize>) -> Self {
        self.slicing_count = count;
        self
    }

    fn connect(&self, endpoint: &Endpoint) -> Result<TcpStream, TransferError> {
        let addr = endpoint.resolve()?;
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)?;
        stream.set_read_timeout(Some(READ_POLL))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Exchange the request frame and read the response frame.
    fn open(
        &self,
        endpoint: &Endpoint,
        request: WireRequest,
        cancel: &CancelToken,
    ) -> Result<(WireResponse, PolledStream), TransferError> {
        let mut stream = self.connect(endpoint)?;
        write_frame(&mut stream, &request)?;
        let mut polled = PolledStream {
            stream,
            cancel: cancel.clone(),
        };
        let response: WireResponse = read_frame(&mut polled)?;
        Ok((response, polled))
    }

    /// One page of the server's catalog.
    pub fn catalog(
        &self,
        url: &str,
        page: u32,
        size: u32,
        cancel: &CancelToken,
    ) -> Result<Vec<CatalogEntry>, TransferError> {
        let endpoint = Endpoint::parse(url)?;
        let request = WireRequest {
            kind: RequestType::Catalog,
            resource: endpoint.resource.clone(),
            range_start: 0,
            range_end: -1,
            authorization: None,
            client: self.client.clone(),
            page,
            size,
            persist_connection: false,
        };
        let (response, polled) = self.open(&endpoint, request, cancel)?;
        if !(200..300).contains(&response.status) {
            return Err(TransferError::Http(response.status));
        }
        let len = response.content_length.max(0) as u64;
        let mut body = Vec::new();
        polled.take(len).read_to_end(&mut body).map_err(TransferError::from_stream)?;
        serde_json::from_slice(&body).map_err(|e| TransferError::Protocol(format!("catalog: {e}")))
    }
}

/// Socket reader that keeps waiting through read timeouts until cancelled.
struct PolledStream {
    stream: TcpStream,
    cancel: CancelToken,
}

impl Read for PolledStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.stream.read(buf) {
                Err(e)
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    if self.cancel.is_cancelled() {
                        return Err(io::Error::new(io::ErrorKind::Other, "read cancelled"));
                    }
                }
                other => return other,
            }
        }
    }
}

impl Downloader for TcpDownloader {
    fn execute(
        &self,
        request: &TransportRequest,
        cancel: &CancelToken,
    ) -> Result<Response, TransferError> {
        let endpoint = Endpoint::parse(&request.url)?;
        let (start, end) = request.range().unwrap_or((0, None));
        let authorization = request
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("authorization"))
            .map(|(_, v)| v.clone());
        let wire = WireRequest {
            kind: RequestType::File,
            resource: endpoint.resource.clone(),
            range_start: start as i64,
            range_end: end.map(|e| e as i64).unwrap_or(-1),
            authorization,
            client: self.client.clone(),
            page: 0,
            size: 0,
            persist_connection: false,
        };
        let (response, polled) = self.open(&endpoint, wire, cancel)?;
        debug!(
            id = request.id,
            status = response.status,
            len = response.content_length,
            "fetchlocal response"
        );

        let code = response.status;
        let length = response.content_length;
        let mut headers = HeaderInfo {
            status: Some(code),
            content_length: (length >= 0).then_some(length as u64),
            accepts_ranges: true,
            checksum: response.checksum.clone(),
            ..HeaderInfo::default()
        };
        if code == 206 && length > 0 {
            let len = length as u64;
            headers.content_range = Some(ContentRange {
                start,
                end: start + len - 1,
                total: end.is_none().then_some(start + len),
            });
        }
        let body: Box<dyn Read + Send> = if length >= 0 {
            Box::new(polled.take(length as u64))
        } else {
            Box::new(polled)
        };

        Ok(Response {
            code,
            is_successful: (200..300).contains(&code),
            content_length: length,
            body,
            accepts_ranges: true,
            checksum: response.checksum.map(|c| c.to_ascii_lowercase()),
            headers,
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
}
