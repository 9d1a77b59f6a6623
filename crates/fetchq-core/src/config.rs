use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::{NetworkType, SortOrder};
use crate::retry::NetworkRetryPolicy;

/// Connectivity poll run when a transfer fails (`[network_retry]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkRetryConfig {
    /// Number of polls before the cause is settled.
    pub attempts: u32,
    /// Delay between polls in milliseconds.
    pub interval_ms: u64,
}

impl Default for NetworkRetryConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval_ms: 500,
        }
    }
}

/// Which parallel strategy handles range-capable downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelMode {
    /// One temp file per chunk, concatenated after all chunks finish.
    Chunked,
    /// Slices written straight into the destination at their offsets.
    InPlace,
    /// In-place slicing after probing server capability, with a byte-sum check.
    #[default]
    Probing,
}

/// Engine configuration loaded from `~/.config/fetchq/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Records are scoped by namespace in the store.
    pub namespace: String,
    /// Maximum number of downloads running at once.
    pub concurrency_limit: usize,
    /// Minimum spacing of progress events per download.
    pub progress_interval_ms: u64,
    /// Throughput sampling tick.
    pub sample_interval_ms: u64,
    /// Scheduler wake-up interval when nothing else wakes it.
    pub scheduler_interval_ms: u64,
    /// Creation-time tie break among equal priorities.
    pub sort_order: SortOrder,
    /// Overrides every download's own network requirement when set.
    pub global_network_type: Option<NetworkType>,
    pub retry_on_network_gain: bool,
    pub network_retry: NetworkRetryConfig,
    /// Default automatic retries for requests that do not set their own (0 = off).
    pub auto_retry_max_attempts: u32,
    /// Verify server-supplied checksums before completing.
    pub hash_check_enabled: bool,
    pub parallel_mode: ParallelMode,
    /// Chunk temp files and slice progress files. Defaults to the XDG cache dir.
    pub temp_dir: Option<PathBuf>,
    /// Read buffer size for body streams.
    pub buffer_size: usize,
    /// How long `cancel` waits for a transfer to stop.
    pub cancel_wait_ms: u64,
    pub connect_timeout_secs: u64,
    /// Minimum spacing of slice progress side-file writes.
    pub slice_persist_interval_ms: u64,
    /// Start the scheduler when the engine is built.
    pub auto_start: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            concurrency_limit: 1,
            progress_interval_ms: 2000,
            sample_interval_ms: 500,
            scheduler_interval_ms: 500,
            sort_order: SortOrder::Asc,
            global_network_type: None,
            retry_on_network_gain: true,
            network_retry: NetworkRetryConfig::default(),
            auto_retry_max_attempts: 0,
            hash_check_enabled: false,
            parallel_mode: ParallelMode::Probing,
            temp_dir: None,
            buffer_size: 8192,
            cancel_wait_ms: 5000,
            connect_timeout_secs: 30,
            slice_persist_interval_ms: 1000,
            auto_start: true,
        }
    }
}

impl FetchConfig {
    pub fn network_retry_policy(&self) -> NetworkRetryPolicy {
        NetworkRetryPolicy {
            enabled: self.retry_on_network_gain,
            attempts: self.network_retry.attempts,
            interval: Duration::from_millis(self.network_retry.interval_ms),
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler_interval_ms.max(1))
    }

    pub fn cancel_wait(&self) -> Duration {
        Duration::from_millis(self.cancel_wait_ms)
    }

    pub fn slice_persist_interval(&self) -> Duration {
        Duration::from_millis(self.slice_persist_interval_ms)
    }

    /// Resolve the side-file directory, falling back to `$XDG_CACHE_HOME/fetchq/slices`.
    pub fn resolved_temp_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.temp_dir {
            return Ok(dir.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("fetchq")?;
        Ok(xdg_dirs.get_cache_home().join("slices"))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("fetchq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<FetchConfig> {
    load_or_init_at(&config_path()?)
}

/// Same as [`load_or_init`] for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<FetchConfig> {
    if !path.exists() {
        let default_cfg = FetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let cfg: FetchConfig =
        toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}
