//! The fetchlocal TCP file protocol: frame codec and client transport.

mod client;
pub mod wire;

pub use client::{Endpoint, TcpDownloader, DEFAULT_PORT, SCHEME};
