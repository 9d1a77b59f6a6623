//! fetchlocal file server for integration tests: serves named in-memory files
//! with ranges, a paged catalog and optional token authorization.

use std::collections::BTreeMap;
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fetchq_core::checksum;
use fetchq_core::transport::tcp::wire::{
    read_frame, write_frame, CatalogEntry, RequestType, WireRequest, WireResponse,
    CONNECTION_CLOSE,
};

#[derive(Default)]
pub struct TcpFiles {
    files: BTreeMap<String, Vec<u8>>,
    token: Option<String>,
}

impl TcpFiles {
    pub fn with_file(mut self, name: &str, body: Vec<u8>) -> Self {
        self.files.insert(name.to_string(), body);
        self
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

/// Start serving; returns the `fetchlocal://127.0.0.1:<port>` base.
pub fn start(files: TcpFiles) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let files = Arc::new(files);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let files = Arc::clone(&files);
            thread::spawn(move || handle(stream, &files));
        }
    });
    format!("fetchlocal://127.0.0.1:{}", port)
}

fn header(status: u32, kind: RequestType, content_length: i64) -> WireResponse {
    let date = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    WireResponse {
        status,
        kind,
        connection: CONNECTION_CLOSE.to_string(),
        date,
        content_length,
        checksum: None,
        session_id: None,
    }
}

fn handle(mut stream: TcpStream, files: &TcpFiles) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let Ok(request) = read_frame::<_, WireRequest>(&mut stream) else {
        return;
    };
    if files.token.is_some() && request.authorization != files.token {
        let _ = write_frame(&mut stream, &header(401, request.kind, 0));
        return;
    }
    match request.kind {
        RequestType::Catalog => {
            let entries: Vec<CatalogEntry> = files
                .files
                .iter()
                .skip((request.page * request.size) as usize)
                .take(request.size as usize)
                .map(|(name, body)| CatalogEntry {
                    resource: name.clone(),
                    length: body.len() as u64,
                    checksum: Some(checksum::sha256_bytes(body)),
                })
                .collect();
            let Ok(body) = serde_json::to_vec(&entries) else {
                return;
            };
            if write_frame(&mut stream, &header(200, request.kind, body.len() as i64)).is_ok() {
                let _ = stream.write_all(&body);
            }
        }
        RequestType::File => {
            let Some(body) = files.files.get(&request.resource) else {
                let _ = write_frame(&mut stream, &header(404, request.kind, 0));
                return;
            };
            let total = body.len() as i64;
            let start = request.range_start.max(0);
            if start >= total {
                let _ = write_frame(&mut stream, &header(416, request.kind, 0));
                return;
            }
            let end = if request.range_end < 0 {
                total
            } else {
                (request.range_end + 1).min(total)
            };
            let mut response = header(206, request.kind, end - start);
            response.checksum = Some(checksum::sha256_bytes(body));
            if write_frame(&mut stream, &response).is_ok() {
                let _ = stream.write_all(&body[start as usize..end as usize]);
            }
        }
    }
}
