//! Parse raw response header lines into what the strategies care about.

use base64::Engine;

/// `Content-Range: bytes start-end/total`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    /// Inclusive.
    pub end: u64,
    /// `None` for `*`.
    pub total: Option<u64>,
}

/// Parsed response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderInfo {
    /// Status code of the last status line seen (redirect hops are dropped).
    pub status: Option<u32>,
    pub content_length: Option<u64>,
    /// Server sent `Accept-Ranges: bytes`.
    pub accepts_ranges: bool,
    pub content_range: Option<ContentRange>,
    /// `Transfer-Encoding: chunked`: length unknown up front.
    pub chunked: bool,
    /// SHA-256 of the full resource as lowercase hex, when advertised.
    pub checksum: Option<String>,
    pub etag: Option<String>,
    /// Every header of the final block, names lowercased.
    pub headers: Vec<(String, String)>,
}

impl HeaderInfo {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Full resource length: the `Content-Range` total on partial responses,
    /// `Content-Length` on full ones.
    pub fn resource_length(&self) -> Option<u64> {
        match self.content_range {
            Some(cr) => cr.total,
            None if self.chunked => None,
            None => self.content_length,
        }
    }
}

/// Parse collected header lines. A status line starts a new block, so only
/// the final response of a redirect chain is kept.
pub fn parse_headers<S: AsRef<str>>(lines: &[S]) -> HeaderInfo {
    let mut info = HeaderInfo::default();

    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            info = HeaderInfo {
                status: parse_status_line(line),
                ..HeaderInfo::default()
            };
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim();
        match name.as_str() {
            "content-length" => info.content_length = value.parse().ok(),
            "accept-ranges" => info.accepts_ranges = value.eq_ignore_ascii_case("bytes"),
            "content-range" => info.content_range = parse_content_range(value),
            "transfer-encoding" => {
                info.chunked = value
                    .split(',')
                    .any(|v| v.trim().eq_ignore_ascii_case("chunked"))
            }
            "digest" => {
                if let Some(sum) = parse_digest_sha256(value) {
                    info.checksum = Some(sum);
                }
            }
            "x-checksum-sha256" => info.checksum = Some(value.to_ascii_lowercase()),
            "etag" => info.etag = Some(value.trim_matches('"').to_string()),
            _ => {}
        }
        info.headers.push((name, value.to_string()));
    }

    info
}

fn parse_status_line(line: &str) -> Option<u32> {
    line.split_whitespace().nth(1)?.parse().ok()
}

/// `bytes 0-99/1000`, `bytes 0-99/*`
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.trim().split_once('-')?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some(ContentRange {
        start: start.trim().parse().ok()?,
        end: end.trim().parse().ok()?,
        total,
    })
}

/// `Range` request header value `bytes=start-` or `bytes=start-end` into
/// `(start, inclusive end)`.
pub fn parse_range_header(value: &str) -> Option<(u64, Option<u64>)> {
    let spec = value.trim().strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = match end.trim() {
        "" => None,
        e => Some(e.parse().ok()?),
    };
    Some((start, end))
}

/// `Digest: sha-256=<base64>` (possibly among other algorithms) to hex.
fn parse_digest_sha256(value: &str) -> Option<String> {
    value.split(',').find_map(|part| {
        let (alg, encoded) = part.trim().split_once('=')?;
        if !alg.trim().eq_ignore_ascii_case("sha-256") {
            return None;
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .ok()?;
        Some(hex::encode(bytes))
    })
}
