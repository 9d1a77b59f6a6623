//! `fetchq run` – run the queue until nothing is left to download.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use fetchq_core::config::{FetchConfig, ParallelMode};
use fetchq_core::store::SqliteStore;
use fetchq_core::{FetchEvent, Status};

use super::{format_size, open_engine};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn describe(event: &FetchEvent) -> Option<String> {
    let d = event.download();
    let line = match event {
        FetchEvent::Started(_) => format!("[{}] started {}", d.id, d.url),
        FetchEvent::Progress(_) => {
            let pct = match d.progress() {
                p if p < 0 => "?".to_string(),
                p => format!("{p}%"),
            };
            let eta = if d.eta_ms < 0 {
                "?".to_string()
            } else {
                format!("{}s", d.eta_ms / 1000)
            };
            format!(
                "[{}] {} / {} ({})  {}/s  ETA {}",
                d.id,
                format_size(d.downloaded as i64),
                format_size(d.total),
                pct,
                format_size(d.bytes_per_second),
                eta
            )
        }
        FetchEvent::Completed(_) => format!("[{}] done -> {}", d.id, d.file.display()),
        FetchEvent::Error { error, .. } => format!("[{}] failed: {error}", d.id),
        FetchEvent::WaitingNetwork(_) => format!("[{}] waiting for network", d.id),
        FetchEvent::Queued(_) if d.auto_retry_attempts > 0 => {
            format!("[{}] retrying (attempt {})", d.id, d.auto_retry_attempts)
        }
        _ => return None,
    };
    Some(line)
}

pub fn run_queue(
    mut cfg: FetchConfig,
    store: Arc<SqliteStore>,
    jobs: Option<usize>,
    mode: Option<ParallelMode>,
) -> Result<()> {
    if let Some(n) = jobs {
        cfg.concurrency_limit = n.max(1);
    }
    if let Some(m) = mode {
        cfg.parallel_mode = m;
    }
    cfg.auto_start = true;

    let started = Instant::now();
    let engine = open_engine(cfg, store)?;
    engine.add_listener(Arc::new(|event: &FetchEvent| {
        if let Some(line) = describe(event) {
            println!("{line}");
        }
    }));

    while engine.has_pending_work() {
        std::thread::sleep(POLL_INTERVAL);
    }
    engine.close();

    let completed = engine.get_by_status(Status::Completed).len();
    let failed = engine.get_by_status(Status::Failed).len();
    tracing::info!(completed, failed, elapsed = ?started.elapsed(), "queue drained");
    println!("Queue empty: {completed} completed, {failed} failed.");
    Ok(())
}
