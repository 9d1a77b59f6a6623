//! CLI command handlers. Each command is in its own file.

mod add;
mod checksum;
mod control;
mod run;
mod status;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use fetchq_core::config::FetchConfig;
use fetchq_core::network::ManualNetwork;
use fetchq_core::store::SqliteStore;
use fetchq_core::transport::{
    CurlDownloader, FileDownloaderType, RouterDownloader, TcpDownloader,
};
use fetchq_core::Fetch;

pub use add::{run_add, AddOptions};
pub use checksum::run_checksum;
pub use control::{run_control, Action};
pub use run::run_queue;
pub use status::run_status;

/// Engine over the shared database with the default transports. Both ask
/// for the parallel strategies; downloads of unknown length still stream.
fn open_engine(cfg: FetchConfig, store: Arc<SqliteStore>) -> Result<Fetch> {
    let timeout = Duration::from_secs(cfg.connect_timeout_secs);
    let downloader = RouterDownloader::new(
        CurlDownloader::new(timeout)
            .with_buffer_size(cfg.buffer_size)
            .with_downloader_type(FileDownloaderType::Parallel),
        TcpDownloader::new(timeout).with_downloader_type(FileDownloaderType::Parallel),
    );
    Fetch::new(
        cfg,
        store,
        Arc::new(downloader),
        Arc::new(ManualNetwork::default()),
    )
}

/// Engine for one-shot commands: the scheduler is not started, so nothing
/// downloads in this process.
fn open_control_engine(mut cfg: FetchConfig, store: Arc<SqliteStore>) -> Result<Fetch> {
    cfg.auto_start = false;
    open_engine(cfg, store)
}

fn format_size(bytes: i64) -> String {
    if bytes < 0 {
        return "-".to_string();
    }
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
