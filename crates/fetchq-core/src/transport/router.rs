use std::sync::Arc;

use super::tcp::SCHEME as FETCHLOCAL;
use super::{
    CurlDownloader, Downloader, FileDownloaderType, HeaderInfo, Response, TcpDownloader,
    TransportRequest,
};
use crate::control::CancelToken;
use crate::retry::TransferError;
use crate::storage::OutputResource;

/// Sends `fetchlocal://` URLs to the TCP transport and everything else to curl.
#[derive(Debug, Clone, Default)]
pub struct RouterDownloader {
    http: CurlDownloader,
    tcp: TcpDownloader,
}

impl RouterDownloader {
    pub fn new(http: CurlDownloader, tcp: TcpDownloader) -> Self {
        Self { http, tcp }
    }

    fn route(&self, request: &TransportRequest) -> &dyn Downloader {
        let is_local = request
            .url
            .split_once("://")
            .map(|(scheme, _)| scheme.eq_ignore_ascii_case(FETCHLOCAL))
            .unwrap_or(false);
        if is_local {
            &self.tcp
        } else {
            &self.http
        }
    }
}

impl Downloader for RouterDownloader {
    fn execute(
        &self,
        request: &TransportRequest,
        cancel: &CancelToken,
    ) -> Result<Response, TransferError> {
        self.route(request).execute(request, cancel)
    }

    fn file_slicing_count(&self, request: &TransportRequest, content_length: u64) -> Option<usize> {
        self.route(request).file_slicing_count(request, content_length)
    }

    fn request_file_downloader_type(
        &self,
        request: &TransportRequest,
        supported: &[FileDownloaderType],
    ) -> FileDownloaderType {
        self.route(request)
            .request_file_downloader_type(request, supported)
    }

    fn verify_content_checksum(&self, request: &TransportRequest, checksum: &str) -> bool {
        self.route(request).verify_content_checksum(request, checksum)
    }

    fn head(
        &self,
        request: &TransportRequest,
        cancel: &CancelToken,
    ) -> Result<Option<HeaderInfo>, TransferError> {
        self.route(request).head(request, cancel)
    }

    fn output_resource(&self, request: &TransportRequest) -> Option<Arc<dyn OutputResource>> {
        self.route(request).output_resource(request)
    }

    fn close(&self) {
        self.http.close();
        self.tcp.close();
    }
}
