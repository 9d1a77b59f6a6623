//! Closed set of failure causes attached to a download record.

use serde::{Deserialize, Serialize};

/// Classified reason a download failed (or could not be enqueued).
///
/// Persisted by name; `None` means "no error".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error,
)]
#[serde(rename_all = "snake_case")]
pub enum DownloadError {
    #[default]
    #[error("no error")]
    None,
    #[error("unknown error")]
    Unknown,
    #[error("connection timed out")]
    ConnectionTimedOut,
    #[error("host could not be resolved")]
    UnknownHost,
    #[error("connection refused")]
    ConnectionRefused,
    #[error("connection reset by peer")]
    ConnectionReset,
    #[error("no network connection")]
    NoNetworkConnection,
    #[error("TLS handshake failed")]
    TlsHandshakeFailed,
    #[error("too many redirects")]
    TooManyRedirects,
    #[error("resource not found (404)")]
    HttpNotFound,
    #[error("unauthorized (401)")]
    HttpUnauthorized,
    #[error("forbidden (403)")]
    HttpForbidden,
    #[error("requested range not satisfiable (416)")]
    RangeNotSatisfiable,
    #[error("server error")]
    ServerError,
    #[error("request was not successful")]
    RequestNotSuccessful,
    #[error("empty response from server")]
    EmptyResponseBody,
    #[error("invalid URL")]
    InvalidUrl,
    #[error("unsupported protocol")]
    UnsupportedProtocol,
    #[error("file could not be created")]
    FileNotCreated,
    #[error("file not found")]
    FileNotFound,
    #[error("write permission denied")]
    WriteDenied,
    #[error("no storage space left")]
    NoStorageSpace,
    #[error("file allocation failed")]
    FileAllocationFailed,
    #[error("unknown I/O error")]
    UnknownIoError,
    #[error("content checksum mismatch")]
    InvalidContentChecksum,
    #[error("download incomplete")]
    DownloadIncomplete,
    #[error("merging chunk files failed")]
    MergeFailed,
    #[error("a request with this id already exists")]
    RequestAlreadyExists,
    #[error("a request for this file already exists")]
    RequestWithFileExists,
    #[error("download not found")]
    DownloadNotFound,
    #[error("download store error")]
    StoreError,
    #[error("engine already closed")]
    EngineClosed,
}

impl DownloadError {
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadError::None => "none",
            DownloadError::Unknown => "unknown",
            DownloadError::ConnectionTimedOut => "connection_timed_out",
            DownloadError::UnknownHost => "unknown_host",
            DownloadError::ConnectionRefused => "connection_refused",
            DownloadError::ConnectionReset => "connection_reset",
            DownloadError::NoNetworkConnection => "no_network_connection",
            DownloadError::TlsHandshakeFailed => "tls_handshake_failed",
            DownloadError::TooManyRedirects => "too_many_redirects",
            DownloadError::HttpNotFound => "http_not_found",
            DownloadError::HttpUnauthorized => "http_unauthorized",
            DownloadError::HttpForbidden => "http_forbidden",
            DownloadError::RangeNotSatisfiable => "range_not_satisfiable",
            DownloadError::ServerError => "server_error",
            DownloadError::RequestNotSuccessful => "request_not_successful",
            DownloadError::EmptyResponseBody => "empty_response_body",
            DownloadError::InvalidUrl => "invalid_url",
            DownloadError::UnsupportedProtocol => "unsupported_protocol",
            DownloadError::FileNotCreated => "file_not_created",
            DownloadError::FileNotFound => "file_not_found",
            DownloadError::WriteDenied => "write_denied",
            DownloadError::NoStorageSpace => "no_storage_space",
            DownloadError::FileAllocationFailed => "file_allocation_failed",
            DownloadError::UnknownIoError => "unknown_io_error",
            DownloadError::InvalidContentChecksum => "invalid_content_checksum",
            DownloadError::DownloadIncomplete => "download_incomplete",
            DownloadError::MergeFailed => "merge_failed",
            DownloadError::RequestAlreadyExists => "request_already_exists",
            DownloadError::RequestWithFileExists => "request_with_file_exists",
            DownloadError::DownloadNotFound => "download_not_found",
            DownloadError::StoreError => "store_error",
            DownloadError::EngineClosed => "engine_closed",
        }
    }

    /// Parse a stored cause name; unrecognized names map to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "none" | "" => DownloadError::None,
            "connection_timed_out" => DownloadError::ConnectionTimedOut,
            "unknown_host" => DownloadError::UnknownHost,
            "connection_refused" => DownloadError::ConnectionRefused,
            "connection_reset" => DownloadError::ConnectionReset,
            "no_network_connection" => DownloadError::NoNetworkConnection,
            "tls_handshake_failed" => DownloadError::TlsHandshakeFailed,
            "too_many_redirects" => DownloadError::TooManyRedirects,
            "http_not_found" => DownloadError::HttpNotFound,
            "http_unauthorized" => DownloadError::HttpUnauthorized,
            "http_forbidden" => DownloadError::HttpForbidden,
            "range_not_satisfiable" => DownloadError::RangeNotSatisfiable,
            "server_error" => DownloadError::ServerError,
            "request_not_successful" => DownloadError::RequestNotSuccessful,
            "empty_response_body" => DownloadError::EmptyResponseBody,
            "invalid_url" => DownloadError::InvalidUrl,
            "unsupported_protocol" => DownloadError::UnsupportedProtocol,
            "file_not_created" => DownloadError::FileNotCreated,
            "file_not_found" => DownloadError::FileNotFound,
            "write_denied" => DownloadError::WriteDenied,
            "no_storage_space" => DownloadError::NoStorageSpace,
            "file_allocation_failed" => DownloadError::FileAllocationFailed,
            "unknown_io_error" => DownloadError::UnknownIoError,
            "invalid_content_checksum" => DownloadError::InvalidContentChecksum,
            "download_incomplete" => DownloadError::DownloadIncomplete,
            "merge_failed" => DownloadError::MergeFailed,
            "request_already_exists" => DownloadError::RequestAlreadyExists,
            "request_with_file_exists" => DownloadError::RequestWithFileExists,
            "download_not_found" => DownloadError::DownloadNotFound,
            "store_error" => DownloadError::StoreError,
            "engine_closed" => DownloadError::EngineClosed,
            _ => DownloadError::Unknown,
        }
    }

    /// Causes that a regained network connection can plausibly fix.
    pub fn is_network_related(self) -> bool {
        matches!(
            self,
            DownloadError::NoNetworkConnection
                | DownloadError::ConnectionTimedOut
                | DownloadError::UnknownHost
                | DownloadError::ConnectionRefused
                | DownloadError::ConnectionReset
        )
    }
}
