//! `fetchq pause|resume|cancel|remove|delete|retry` – state changes by id,
//! group or all. A running `fetchq run` notices them on its next tick.

use std::sync::Arc;

use anyhow::{bail, Result};
use fetchq_core::config::FetchConfig;
use fetchq_core::store::SqliteStore;
use fetchq_core::{Download, Fetch};

use super::open_control_engine;
use crate::cli::Selection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Pause,
    Resume,
    Cancel,
    Remove,
    Delete,
    Retry,
}

impl Action {
    fn past_tense(self) -> &'static str {
        match self {
            Action::Pause => "Paused",
            Action::Resume => "Resumed",
            Action::Cancel => "Cancelled",
            Action::Remove => "Removed",
            Action::Delete => "Deleted",
            Action::Retry => "Re-queued",
        }
    }

    fn apply(self, engine: &Fetch, sel: &Selection) -> Vec<Download> {
        match (self, sel.group, sel.all) {
            (Action::Pause, Some(g), _) => engine.pause_group(g),
            (Action::Pause, None, true) => engine.pause_all(),
            (Action::Pause, None, false) => engine.pause(&sel.ids),
            (Action::Resume, Some(g), _) => engine.resume_group(g),
            (Action::Resume, None, true) => engine.resume_all(),
            (Action::Resume, None, false) => engine.resume(&sel.ids),
            (Action::Cancel, Some(g), _) => engine.cancel_group(g),
            (Action::Cancel, None, true) => engine.cancel_all(),
            (Action::Cancel, None, false) => engine.cancel(&sel.ids),
            (Action::Remove, Some(g), _) => engine.remove_group(g),
            (Action::Remove, None, true) => engine.remove_all(),
            (Action::Remove, None, false) => engine.remove(&sel.ids),
            (Action::Delete, Some(g), _) => engine.delete_group(g),
            (Action::Delete, None, true) => engine.delete_all(),
            (Action::Delete, None, false) => engine.delete(&sel.ids),
            (Action::Retry, Some(g), _) => engine.retry_group(g),
            (Action::Retry, None, true) => engine.retry_all(),
            (Action::Retry, None, false) => engine.retry(&sel.ids),
        }
    }
}

pub fn run_control(
    cfg: FetchConfig,
    store: Arc<SqliteStore>,
    action: Action,
    sel: &Selection,
) -> Result<()> {
    if sel.ids.is_empty() && sel.group.is_none() && !sel.all {
        bail!("give download ids, --group or --all");
    }
    let engine = open_control_engine(cfg, store)?;
    let changed = action.apply(&engine, sel);
    engine.close();
    if changed.is_empty() {
        println!("Nothing to do.");
    }
    for d in changed {
        println!("{} download {} ({})", action.past_tense(), d.id, d.file.display());
    }
    Ok(())
}
