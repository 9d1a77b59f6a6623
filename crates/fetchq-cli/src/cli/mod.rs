//! CLI for the fetchq download queue.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use fetchq_core::config::{self, ParallelMode};
use fetchq_core::model::{EnqueueAction, Priority};
use fetchq_core::store::SqliteStore;

use commands::{run_add, run_checksum, run_control, run_queue, run_status, AddOptions, Action};

/// Top-level CLI for the fetchq download queue.
#[derive(Debug, Parser)]
#[command(name = "fetchq")]
#[command(about = "fetchq: resumable, prioritized background downloads", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Which downloads a control command applies to.
#[derive(Debug, Args)]
pub struct Selection {
    /// Download ids.
    pub ids: Vec<i64>,

    /// Every download in this group.
    #[arg(long, conflicts_with_all = ["ids", "all"])]
    pub group: Option<i32>,

    /// Every download.
    #[arg(long, conflicts_with = "ids")]
    pub all: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PriorityArg {
    Low,
    Normal,
    High,
}

impl From<PriorityArg> for Priority {
    fn from(p: PriorityArg) -> Self {
        match p {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::High => Priority::High,
        }
    }
}

/// What to do when the download is already tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConflictArg {
    Replace,
    Rename,
    Skip,
    Update,
}

impl From<ConflictArg> for EnqueueAction {
    fn from(c: ConflictArg) -> Self {
        match c {
            ConflictArg::Replace => EnqueueAction::ReplaceExisting,
            ConflictArg::Rename => EnqueueAction::IncrementFileName,
            ConflictArg::Skip => EnqueueAction::DoNotEnqueueIfExisting,
            ConflictArg::Update => EnqueueAction::UpdateAccordingly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Chunked,
    InPlace,
    Probing,
}

impl From<ModeArg> for ParallelMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Chunked => ParallelMode::Chunked,
            ModeArg::InPlace => ParallelMode::InPlace,
            ModeArg::Probing => ParallelMode::Probing,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Add a download to the queue.
    Add {
        /// HTTP/HTTPS or fetchlocal:// URL to download.
        url: String,

        /// Destination file (default: name from the URL, in --dir).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory for the derived file name (default: current directory).
        #[arg(long, conflicts_with = "output")]
        dir: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = PriorityArg::Normal)]
        priority: PriorityArg,

        #[arg(long, default_value_t = 0)]
        group: i32,

        /// Only download on an unmetered network.
        #[arg(long)]
        unmetered: bool,

        /// Track without queueing; start later with `resume`.
        #[arg(long)]
        paused: bool,

        /// Extra request header, e.g. "Authorization: Bearer t". Repeatable.
        #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
        headers: Vec<String>,

        #[arg(long)]
        tag: Option<String>,

        #[arg(long, value_enum, default_value_t = ConflictArg::Update)]
        on_conflict: ConflictArg,

        /// Automatic retries on failure (default from config).
        #[arg(long, value_name = "N")]
        retries: Option<u32>,
    },

    /// Run the queue until nothing is left to download.
    Run {
        /// Run up to N downloads at once (default from config).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,

        /// How parallel transfers are split (default from config).
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },

    /// Show all downloads.
    Status {
        /// Only this group.
        #[arg(long)]
        group: Option<i32>,
    },

    /// Pause downloads; a running `fetchq run` stops them.
    Pause(Selection),

    /// Queue paused downloads again.
    Resume(Selection),

    /// Cancel downloads (bytes on disk are kept for retry).
    Cancel(Selection),

    /// Stop tracking downloads; files are kept.
    Remove(Selection),

    /// Stop tracking downloads and delete their files.
    Delete(Selection),

    /// Queue failed or cancelled downloads again.
    Retry(Selection),

    /// Compute SHA-256 of a file (e.g. after download).
    Checksum {
        /// Path to the file.
        path: PathBuf,

        /// Expected digest; exit with an error on mismatch.
        #[arg(long)]
        expect: Option<String>,
    },
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        if let CliCommand::Checksum { path, expect } = &cli.command {
            return run_checksum(path, expect.as_deref());
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let store = Arc::new(SqliteStore::open_default(&cfg.namespace)?);

        match cli.command {
            CliCommand::Add {
                url,
                output,
                dir,
                priority,
                group,
                unmetered,
                paused,
                headers,
                tag,
                on_conflict,
                retries,
            } => {
                let opts = AddOptions {
                    output,
                    dir,
                    priority: priority.into(),
                    group,
                    unmetered,
                    paused,
                    headers,
                    tag,
                    action: on_conflict.into(),
                    retries,
                };
                run_add(cfg, store, &url, opts)?
            }
            CliCommand::Run { jobs, mode } => run_queue(cfg, store, jobs, mode.map(Into::into))?,
            CliCommand::Status { group } => run_status(cfg, store, group)?,
            CliCommand::Pause(sel) => run_control(cfg, store, Action::Pause, &sel)?,
            CliCommand::Resume(sel) => run_control(cfg, store, Action::Resume, &sel)?,
            CliCommand::Cancel(sel) => run_control(cfg, store, Action::Cancel, &sel)?,
            CliCommand::Remove(sel) => run_control(cfg, store, Action::Remove, &sel)?,
            CliCommand::Delete(sel) => run_control(cfg, store, Action::Delete, &sel)?,
            CliCommand::Retry(sel) => run_control(cfg, store, Action::Retry, &sel)?,
            CliCommand::Checksum { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
