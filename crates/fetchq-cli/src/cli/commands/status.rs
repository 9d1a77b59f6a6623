//! `fetchq status` – show all downloads.

use std::sync::Arc;

use anyhow::Result;
use fetchq_core::config::FetchConfig;
use fetchq_core::model::DownloadError;
use fetchq_core::store::SqliteStore;

use super::{format_size, open_control_engine};

pub fn run_status(cfg: FetchConfig, store: Arc<SqliteStore>, group: Option<i32>) -> Result<()> {
    let engine = open_control_engine(cfg, store)?;
    let downloads = match group {
        Some(g) => engine.get_by_group(g),
        None => engine.get_all(),
    };
    engine.close();
    if downloads.is_empty() {
        println!("No downloads.");
        return Ok(());
    }
    println!(
        "{:<20} {:<12} {:>5} {:>10} {:<6} {}",
        "ID", "STATUS", "%", "SIZE", "GROUP", "FILE"
    );
    for d in downloads {
        let pct = match d.progress() {
            p if p < 0 => "-".to_string(),
            p => p.to_string(),
        };
        println!(
            "{:<20} {:<12} {:>5} {:>10} {:<6} {}",
            d.id,
            d.status.as_str(),
            pct,
            format_size(d.total),
            d.group,
            d.file.display()
        );
        if d.error != DownloadError::None {
            println!("{:<20} error: {}", "", d.error);
        }
    }
    Ok(())
}
