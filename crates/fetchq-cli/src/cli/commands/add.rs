//! `fetchq add <url>` – add a download to the queue.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use fetchq_core::config::FetchConfig;
use fetchq_core::model::{derive_file_name, EnqueueAction, NetworkType, Priority, Request};
use fetchq_core::store::SqliteStore;

use super::open_control_engine;

#[derive(Debug)]
pub struct AddOptions {
    pub output: Option<PathBuf>,
    pub dir: Option<PathBuf>,
    pub priority: Priority,
    pub group: i32,
    pub unmetered: bool,
    pub paused: bool,
    pub headers: Vec<String>,
    pub tag: Option<String>,
    pub action: EnqueueAction,
    pub retries: Option<u32>,
}

/// Split `"Name: value"`.
pub(crate) fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("header {raw:?} is not in \"Name: value\" form"))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("header {raw:?} has an empty name");
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Destination for `url`: the explicit output, else the URL's file name in
/// `dir` (or the current directory).
pub(crate) fn destination(url: &str, output: Option<PathBuf>, dir: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(out) = output {
        return Ok(out);
    }
    let dir = match dir {
        Some(d) => d,
        None => std::env::current_dir()?,
    };
    Ok(dir.join(derive_file_name(url)))
}

pub fn run_add(cfg: FetchConfig, store: Arc<SqliteStore>, url: &str, opts: AddOptions) -> Result<()> {
    let file = destination(url, opts.output, opts.dir)?;
    let mut request = Request::new(url, file)
        .with_priority(opts.priority)
        .with_group(opts.group)
        .with_enqueue_action(opts.action)
        .with_download_on_enqueue(!opts.paused);
    if opts.unmetered {
        request = request.with_network_type(NetworkType::Unmetered);
    }
    for raw in &opts.headers {
        let (name, value) = parse_header(raw)?;
        request = request.with_header(name, value);
    }
    if let Some(tag) = opts.tag {
        request = request.with_tag(tag);
    }
    if let Some(n) = opts.retries {
        request = request.with_auto_retry(n);
    }

    let engine = open_control_engine(cfg, store)?;
    let download = engine
        .enqueue(request)
        .map_err(|e| anyhow!("could not add {url}: {e}"))?;
    println!(
        "Added download {} ({}) -> {}",
        download.id,
        download.status,
        download.file.display()
    );
    engine.close();
    Ok(())
}
