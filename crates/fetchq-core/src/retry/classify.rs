//! Map transfer failures onto the closed set of download error causes.
//!
//! Pure functions: structured variants are matched first, message substrings second.

use std::io;

use crate::model::DownloadError;
use crate::retry::error::TransferError;

/// Classify any transfer error.
pub fn classify(e: &TransferError) -> DownloadError {
    match e {
        TransferError::Curl(ce) => classify_curl_error(ce),
        TransferError::Http(code) => classify_http_status(*code),
        TransferError::Io(ioe) => classify_io_error(ioe),
        TransferError::FileCreate(ioe) => match classify_io_error(ioe) {
            DownloadError::WriteDenied => DownloadError::WriteDenied,
            DownloadError::NoStorageSpace => DownloadError::NoStorageSpace,
            _ => DownloadError::FileNotCreated,
        },
        TransferError::Protocol(msg) => match classify_message(msg) {
            DownloadError::Unknown => DownloadError::RequestNotSuccessful,
            other => other,
        },
        TransferError::PartialTransfer { .. } => DownloadError::DownloadIncomplete,
        TransferError::ChecksumMismatch { .. } => DownloadError::InvalidContentChecksum,
        TransferError::Merge(_) => DownloadError::MergeFailed,
        TransferError::InvalidUrl(_) => DownloadError::InvalidUrl,
        TransferError::UnsupportedScheme(_) => DownloadError::UnsupportedProtocol,
        TransferError::Interrupted => DownloadError::None,
    }
}

/// Classify a non-success response status.
pub fn classify_http_status(code: u32) -> DownloadError {
    match code {
        401 | 407 => DownloadError::HttpUnauthorized,
        403 => DownloadError::HttpForbidden,
        404 | 410 => DownloadError::HttpNotFound,
        416 => DownloadError::RangeNotSatisfiable,
        500..=599 => DownloadError::ServerError,
        _ => DownloadError::RequestNotSuccessful,
    }
}

/// Classify a libcurl error.
pub fn classify_curl_error(e: &curl::Error) -> DownloadError {
    if e.is_operation_timedout() {
        return DownloadError::ConnectionTimedOut;
    }
    if e.is_couldnt_resolve_host() || e.is_couldnt_resolve_proxy() {
        return DownloadError::UnknownHost;
    }
    if e.is_couldnt_connect() {
        return match classify_message(&curl_message(e)) {
            DownloadError::NoNetworkConnection => DownloadError::NoNetworkConnection,
            _ => DownloadError::ConnectionRefused,
        };
    }
    if e.is_ssl_connect_error()
        || e.is_peer_failed_verification()
        || e.is_ssl_certproblem()
        || e.is_ssl_cacert()
        || e.is_ssl_cipher()
    {
        return DownloadError::TlsHandshakeFailed;
    }
    if e.is_too_many_redirects() {
        return DownloadError::TooManyRedirects;
    }
    if e.is_got_nothing() {
        return DownloadError::EmptyResponseBody;
    }
    if e.is_recv_error() || e.is_send_error() {
        return DownloadError::ConnectionReset;
    }
    if e.is_partial_file() {
        return DownloadError::DownloadIncomplete;
    }
    if e.is_range_error() {
        return DownloadError::RangeNotSatisfiable;
    }
    if e.is_url_malformed() {
        return DownloadError::InvalidUrl;
    }
    if e.is_unsupported_protocol() {
        return DownloadError::UnsupportedProtocol;
    }
    if e.is_http_returned_error() {
        return DownloadError::RequestNotSuccessful;
    }
    classify_message(&curl_message(e))
}

fn curl_message(e: &curl::Error) -> String {
    match e.extra_description() {
        Some(extra) => format!("{} {}", e.description(), extra),
        None => e.description().to_string(),
    }
}

/// Classify a local or socket I/O error.
pub fn classify_io_error(e: &io::Error) -> DownloadError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => DownloadError::ConnectionTimedOut,
        io::ErrorKind::ConnectionRefused => DownloadError::ConnectionRefused,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => DownloadError::ConnectionReset,
        io::ErrorKind::NotFound => DownloadError::FileNotFound,
        io::ErrorKind::PermissionDenied => DownloadError::WriteDenied,
        io::ErrorKind::UnexpectedEof => DownloadError::DownloadIncomplete,
        _ => match classify_message(&e.to_string()) {
            DownloadError::Unknown => DownloadError::UnknownIoError,
            other => other,
        },
    }
}

/// Classify by message substring (case-insensitive). Order matters: the most
/// specific phrases are checked first. Returns `Unknown` when nothing matches.
pub fn classify_message(message: &str) -> DownloadError {
    let m = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| m.contains(n));

    if has(&["checksum", "md5", "sha-256", "sha256"]) {
        DownloadError::InvalidContentChecksum
    } else if has(&["no space left", "disk full", "not enough space", "storage full"]) {
        DownloadError::NoStorageSpace
    } else if has(&["permission denied", "read-only file system", "access is denied"]) {
        DownloadError::WriteDenied
    } else if has(&["network is unreachable", "network is down", "no route to host"]) {
        DownloadError::NoNetworkConnection
    } else if has(&[
        "could not resolve",
        "couldn't resolve",
        "unknown host",
        "name or service not known",
        "failed to lookup address",
        "no address associated",
    ]) {
        DownloadError::UnknownHost
    } else if has(&["timed out", "timeout"]) {
        DownloadError::ConnectionTimedOut
    } else if has(&["connection refused"]) {
        DownloadError::ConnectionRefused
    } else if has(&["connection reset", "broken pipe", "connection aborted"]) {
        DownloadError::ConnectionReset
    } else if has(&["ssl", "tls", "certificate"]) {
        DownloadError::TlsHandshakeFailed
    } else if has(&["redirect"]) {
        DownloadError::TooManyRedirects
    } else if has(&["empty reply", "empty response", "empty body"]) {
        DownloadError::EmptyResponseBody
    } else if has(&["404"]) {
        DownloadError::HttpNotFound
    } else if has(&["416", "range not satisfiable"]) {
        DownloadError::RangeNotSatisfiable
    } else if has(&["no such file", "file not found"]) {
        DownloadError::FileNotFound
    } else if has(&["unsupported protocol", "unsupported scheme"]) {
        DownloadError::UnsupportedProtocol
    } else if has(&["malformed", "bad/illegal format", "invalid url"]) {
        DownloadError::InvalidUrl
    } else if has(&["already exists"]) {
        DownloadError::RequestAlreadyExists
    } else if has(&["unexpected end", "partial transfer", "incomplete"]) {
        DownloadError::DownloadIncomplete
    } else {
        DownloadError::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(classify_http_status(404), DownloadError::HttpNotFound);
        assert_eq!(classify_http_status(410), DownloadError::HttpNotFound);
        assert_eq!(classify_http_status(401), DownloadError::HttpUnauthorized);
        assert_eq!(classify_http_status(403), DownloadError::HttpForbidden);
        assert_eq!(classify_http_status(416), DownloadError::RangeNotSatisfiable);
        assert_eq!(classify_http_status(500), DownloadError::ServerError);
        assert_eq!(classify_http_status(503), DownloadError::ServerError);
        assert_eq!(classify_http_status(400), DownloadError::RequestNotSuccessful);
        assert_eq!(classify_http_status(302), DownloadError::RequestNotSuccessful);
    }

    #[test]
    fn curl_codes() {
        // CURLE_COULDNT_RESOLVE_HOST = 6, CURLE_COULDNT_CONNECT = 7,
        // CURLE_OPERATION_TIMEDOUT = 28, CURLE_TOO_MANY_REDIRECTS = 47,
        // CURLE_GOT_NOTHING = 52, CURLE_RECV_ERROR = 56
        assert_eq!(classify_curl_error(&curl::Error::new(6)), DownloadError::UnknownHost);
        assert_eq!(classify_curl_error(&curl::Error::new(7)), DownloadError::ConnectionRefused);
        assert_eq!(classify_curl_error(&curl::Error::new(28)), DownloadError::ConnectionTimedOut);
        assert_eq!(classify_curl_error(&curl::Error::new(47)), DownloadError::TooManyRedirects);
        assert_eq!(classify_curl_error(&curl::Error::new(52)), DownloadError::EmptyResponseBody);
        assert_eq!(classify_curl_error(&curl::Error::new(56)), DownloadError::ConnectionReset);
    }

    #[test]
    fn io_kinds() {
        let e = |k| io::Error::new(k, "x");
        assert_eq!(classify_io_error(&e(io::ErrorKind::TimedOut)), DownloadError::ConnectionTimedOut);
        assert_eq!(classify_io_error(&e(io::ErrorKind::ConnectionRefused)), DownloadError::ConnectionRefused);
        assert_eq!(classify_io_error(&e(io::ErrorKind::BrokenPipe)), DownloadError::ConnectionReset);
        assert_eq!(classify_io_error(&e(io::ErrorKind::NotFound)), DownloadError::FileNotFound);
        assert_eq!(classify_io_error(&e(io::ErrorKind::PermissionDenied)), DownloadError::WriteDenied);
        assert_eq!(classify_io_error(&e(io::ErrorKind::UnexpectedEof)), DownloadError::DownloadIncomplete);
        assert_eq!(classify_io_error(&e(io::ErrorKind::Other)), DownloadError::UnknownIoError);
    }

    #[test]
    fn io_falls_back_to_message() {
        let e = io::Error::new(io::ErrorKind::Other, "No space left on device (os error 28)");
        assert_eq!(classify_io_error(&e), DownloadError::NoStorageSpace);
    }

    #[test]
    fn message_substrings() {
        let cases = [
            ("Checksum mismatch for file", DownloadError::InvalidContentChecksum),
            ("No space left on device", DownloadError::NoStorageSpace),
            ("Read-only file system", DownloadError::WriteDenied),
            ("Permission denied (os error 13)", DownloadError::WriteDenied),
            ("Network is unreachable", DownloadError::NoNetworkConnection),
            ("Could not resolve host: nowhere.invalid", DownloadError::UnknownHost),
            ("failed to lookup address information", DownloadError::UnknownHost),
            ("operation timed out after 30000 ms", DownloadError::ConnectionTimedOut),
            ("Connection refused", DownloadError::ConnectionRefused),
            ("Connection reset by peer", DownloadError::ConnectionReset),
            ("SSL certificate problem", DownloadError::TlsHandshakeFailed),
            ("Maximum (10) redirects followed", DownloadError::TooManyRedirects),
            ("Empty reply from server", DownloadError::EmptyResponseBody),
            ("server said 404 Not Found", DownloadError::HttpNotFound),
            ("HTTP 416 range not satisfiable", DownloadError::RangeNotSatisfiable),
            ("No such file or directory", DownloadError::FileNotFound),
            ("Unsupported protocol", DownloadError::UnsupportedProtocol),
            ("URL using bad/illegal format or missing URL", DownloadError::InvalidUrl),
            ("file already exists", DownloadError::RequestAlreadyExists),
            ("unexpected end of stream", DownloadError::DownloadIncomplete),
            ("something odd happened", DownloadError::Unknown),
        ];
        for (msg, want) in cases {
            assert_eq!(classify_message(msg), want, "{msg}");
        }
    }

    #[test]
    fn structured_variants() {
        assert_eq!(classify(&TransferError::Http(404)), DownloadError::HttpNotFound);
        assert_eq!(
            classify(&TransferError::PartialTransfer { expected: 10, received: 4 }),
            DownloadError::DownloadIncomplete
        );
        assert_eq!(
            classify(&TransferError::ChecksumMismatch {
                expected: "a".into(),
                actual: "b".into()
            }),
            DownloadError::InvalidContentChecksum
        );
        assert_eq!(classify(&TransferError::Merge("x".into())), DownloadError::MergeFailed);
        assert_eq!(classify(&TransferError::InvalidUrl("x".into())), DownloadError::InvalidUrl);
        assert_eq!(
            classify(&TransferError::UnsupportedScheme("gopher".into())),
            DownloadError::UnsupportedProtocol
        );
        assert_eq!(classify(&TransferError::Interrupted), DownloadError::None);
        assert_eq!(
            classify(&TransferError::FileCreate(io::Error::new(io::ErrorKind::NotFound, "x"))),
            DownloadError::FileNotCreated
        );
        assert_eq!(
            classify(&TransferError::FileCreate(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "x"
            ))),
            DownloadError::WriteDenied
        );
        assert_eq!(
            classify(&TransferError::Protocol("frame too large".into())),
            DownloadError::RequestNotSuccessful
        );
    }
}
