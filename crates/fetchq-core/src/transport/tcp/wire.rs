//! Frame codec for the fetchlocal protocol.
//!
//! A frame is a 4-byte big-endian length followed by that many bytes of JSON.
//! The client sends one [`WireRequest`] frame; the server answers with one
//! [`WireResponse`] frame followed by `content_length` raw body bytes.

use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::retry::TransferError;

/// Upper bound on a single JSON frame.
pub const MAX_FRAME_LEN: usize = 1 << 20;

pub const CONNECTION_KEEP_ALIVE: &str = "keep-alive";
pub const CONNECTION_CLOSE: &str = "close";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    #[default]
    File,
    Catalog,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRequest {
    #[serde(rename = "type")]
    pub kind: RequestType,
    /// File identifier on the server.
    pub resource: String,
    pub range_start: i64,
    /// Inclusive; -1 reads to the end.
    pub range_end: i64,
    #[serde(default)]
    pub authorization: Option<String>,
    pub client: String,
    /// Catalog paging.
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub persist_connection: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireResponse {
    /// HTTP-style status: 200, 206, 401, 404, 416, 500.
    pub status: u32,
    #[serde(rename = "type")]
    pub kind: RequestType,
    pub connection: String,
    /// Server time, Unix milliseconds.
    pub date: i64,
    /// Body bytes following this frame.
    pub content_length: i64,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl WireResponse {
    pub fn keeps_alive(&self) -> bool {
        self.connection.eq_ignore_ascii_case(CONNECTION_KEEP_ALIVE)
    }
}

/// One catalog listing entry (catalog bodies are a JSON array of these).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub resource: String,
    pub length: u64,
    #[serde(default)]
    pub checksum: Option<String>,
}

pub fn write_frame<W: Write, T: Serialize>(w: &mut W, value: &T) -> Result<(), TransferError> {
    let body = serde_json::to_vec(value)
        .map_err(|e| TransferError::Protocol(format!("encode frame: {e}")))?;
    if body.len() > MAX_FRAME_LEN {
        return Err(TransferError::Protocol(format!(
            "frame of {} bytes exceeds limit",
            body.len()
        )));
    }
    w.write_all(&(body.len() as u32).to_be_bytes())?;
    w.write_all(&body)?;
    w.flush()?;
    Ok(())
}

pub fn read_frame<R: Read, T: DeserializeOwned>(r: &mut R) -> Result<T, TransferError> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => TransferError::Protocol("connection closed before frame".into()),
        _ => TransferError::Io(e),
    })?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransferError::Protocol(format!("frame of {len} bytes exceeds limit")));
    }
    let mut body = vec![0u8; len];
    r.read_exact(&mut body)?;
    serde_json::from_slice(&body).map_err(|e| TransferError::Protocol(format!("decode frame: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_frame_layout() {
        let req = WireRequest {
            kind: RequestType::File,
            resource: "movie.mp4".into(),
            range_start: 10,
            range_end: -1,
            authorization: Some("token".into()),
            client: "fetchq".into(),
            page: 0,
            size: 0,
            persist_connection: false,
        };
        let mut buf = Vec::new();
        write_frame(&mut buf, &req).unwrap();
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, buf.len() - 4);
        let json: serde_json::Value = serde_json::from_slice(&buf[4..]).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["range_end"], -1);

        let back: WireRequest = read_frame(&mut buf.as_slice()).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes());
        let err = read_frame::<_, WireResponse>(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, TransferError::Protocol(_)));
    }

    #[test]
    fn truncated_frame_is_protocol_error() {
        let buf = [0u8, 0];
        let err = read_frame::<_, WireResponse>(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, TransferError::Protocol(_)));
    }

    #[test]
    fn response_defaults_for_optional_fields() {
        let json = br#"{"status":200,"type":"file","connection":"close","date":0,"content_length":5}"#;
        let mut buf = Vec::new();
        buf.extend_from_slice(&(json.len() as u32).to_be_bytes());
        buf.extend_from_slice(json);
        let resp: WireResponse = read_frame(&mut buf.as_slice()).unwrap();
        assert_eq!(resp.content_length, 5);
        assert!(resp.checksum.is_none());
        assert!(!resp.keeps_alive());
    }
}
