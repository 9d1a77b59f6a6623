//! Transient transfer failure detail.

use std::fmt;

/// Error raised while performing a transfer. Classified into a
/// [`DownloadError`](crate::model::DownloadError) before it reaches a record;
/// never persisted itself.
#[derive(Debug)]
pub enum TransferError {
    /// libcurl reported an error (timeout, DNS, connection, TLS...).
    Curl(curl::Error),
    /// Response had a non-success status code.
    Http(u32),
    /// Local or socket I/O failed.
    Io(std::io::Error),
    /// The output file could not be created or opened.
    FileCreate(std::io::Error),
    /// Peer sent something the transport could not understand.
    Protocol(String),
    /// The stream ended before the expected number of bytes arrived.
    PartialTransfer { expected: u64, received: u64 },
    /// Content checksum did not match the server-supplied value.
    ChecksumMismatch { expected: String, actual: String },
    /// Chunk files could not be merged into the destination.
    Merge(String),
    InvalidUrl(String),
    UnsupportedScheme(String),
    /// Caller requested a stop; not a failure.
    Interrupted,
}

impl TransferError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, TransferError::Interrupted)
    }

    /// Convert an error from reading a response body. Transports that stream
    /// through a channel wrap their native error inside the `io::Error`; it is
    /// unwrapped here so classification sees the original cause.
    pub fn from_stream(e: std::io::Error) -> Self {
        let inner = e
            .get_ref()
            .and_then(|i| i.downcast_ref::<curl::Error>())
            .cloned();
        match inner {
            Some(ce) => TransferError::Curl(ce),
            None => TransferError::Io(e),
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Curl(e) => write!(f, "{}", e),
            TransferError::Http(code) => write!(f, "HTTP {}", code),
            TransferError::Io(e) => write!(f, "io: {}", e),
            TransferError::FileCreate(e) => write!(f, "cannot create output file: {}", e),
            TransferError::Protocol(msg) => write!(f, "protocol: {}", msg),
            TransferError::PartialTransfer { expected, received } => {
                write!(f, "partial transfer: expected {} bytes, got {}", expected, received)
            }
            TransferError::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch: expected {}, got {}", expected, actual)
            }
            TransferError::Merge(msg) => write!(f, "merge: {}", msg),
            TransferError::InvalidUrl(url) => write!(f, "invalid url: {}", url),
            TransferError::UnsupportedScheme(s) => write!(f, "unsupported scheme: {}", s),
            TransferError::Interrupted => write!(f, "transfer interrupted"),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Curl(e) => Some(e),
            TransferError::Io(e) | TransferError::FileCreate(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        TransferError::Io(e)
    }
}

impl From<curl::Error> for TransferError {
    fn from(e: curl::Error) -> Self {
        TransferError::Curl(e)
    }
}
