//! Minimal HTTP/1.1 server with HEAD, Range GET and an optional `Digest`
//! header, for integration tests.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405.
    pub head_allowed: bool,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// Send `Digest: sha-256=...` for the served body.
    pub digest: bool,
    /// Advertise the digest of different bytes.
    pub corrupt_digest: bool,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            digest: false,
            corrupt_digest: false,
        }
    }
}

/// Handle to a running server. It lives until the test process exits.
#[derive(Clone)]
pub struct RangeServer {
    pub url: String,
    ranges: Arc<Mutex<Vec<(u64, Option<u64>)>>>,
}

impl RangeServer {
    /// Range headers of every GET served so far.
    pub fn ranges(&self) -> Vec<(u64, Option<u64>)> {
        self.ranges.lock().unwrap().clone()
    }
}

pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let ranges = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&ranges);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let log = Arc::clone(&log);
            thread::spawn(move || handle(stream, &body, opts, &log));
        }
    });
    RangeServer {
        url: format!("http://127.0.0.1:{}/file.bin", port),
        ranges,
    }
}

fn digest_header(body: &[u8], opts: RangeServerOptions) -> String {
    if !opts.digest {
        return String::new();
    }
    let mut hasher = Sha256::new();
    hasher.update(body);
    if opts.corrupt_digest {
        hasher.update(b"tampered");
    }
    format!("Digest: sha-256={}\r\n", STANDARD.encode(hasher.finalize()))
}

fn handle(
    mut stream: TcpStream,
    body: &[u8],
    opts: RangeServerOptions,
    log: &Mutex<Vec<(u64, Option<u64>)>>,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let (method, range) = parse_request(request);
    let total = body.len() as u64;
    let accept_ranges = if opts.support_ranges {
        "Accept-Ranges: bytes\r\n"
    } else {
        ""
    };
    let digest = digest_header(body, opts);

    if method.eq_ignore_ascii_case("HEAD") {
        if !opts.head_allowed {
            let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
            return;
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}{}\r\n",
            total, accept_ranges, digest
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }

    if let Some(r) = range {
        log.lock().unwrap().push(r);
    }
    let (status, content_range, slice) = match range.filter(|_| opts.support_ranges) {
        Some((start, _)) if start >= total => (
            "416 Range Not Satisfiable",
            format!("Content-Range: bytes */{}\r\n", total),
            &body[0..0],
        ),
        Some((start, end)) => {
            let end_excl = end.map_or(total, |e| (e + 1).min(total));
            (
                "206 Partial Content",
                format!("Content-Range: bytes {}-{}/{}\r\n", start, end_excl - 1, total),
                &body[start as usize..end_excl as usize],
            )
        }
        None => ("200 OK", String::new(), body),
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}{}{}\r\n",
        status,
        slice.len(),
        content_range,
        accept_ranges,
        digest
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(slice);
}

/// Returns (method, optional (start, inclusive end)) for `Range: bytes=X-Y`.
fn parse_request(request: &str) -> (&str, Option<(u64, Option<u64>)>) {
    let mut lines = request.lines();
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("");
    let range = lines
        .map(str::trim)
        .take_while(|l| !l.is_empty())
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("range"))
        .and_then(|(_, value)| {
            let spec = value.trim().strip_prefix("bytes=")?;
            let (a, b) = spec.split_once('-')?;
            let start = a.trim().parse().ok()?;
            let end = b.trim();
            let end = if end.is_empty() { None } else { end.parse().ok() };
            Some((start, end))
        });
    (method, range)
}
