//! fetchq core: a resumable, prioritized background file-transfer engine.
//!
//! Layers, leaf to root: [`transport`] performs ranged requests, [`strategy`]
//! turns one download into bytes on disk, [`manager`] bounds how many run at
//! once, [`processor`] decides what runs next, and [`engine`] ties them to a
//! [`store`] and the [`listener`] registry.

pub mod checksum;
pub mod config;
pub mod control;
pub mod engine;
pub mod listener;
pub mod logging;
pub mod manager;
pub mod model;
pub mod network;
pub mod pool;
pub mod processor;
pub mod progress;
pub mod retry;
pub mod segmenter;
pub mod storage;
pub mod store;
pub mod strategy;
pub mod transport;

pub use engine::Fetch;
pub use listener::{FetchEvent, FetchListener, ListenerId};
pub use model::{Download, DownloadError, DownloadId, Request, Status};
