//! SQLite-backed record store (sqlx).
//!
//! The engine runs on plain threads, so the store owns a small tokio runtime
//! and blocks on each query. Rows are scoped by namespace so several engines
//! can share one database file.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use tokio::runtime::Runtime;

use super::DownloadStore;
use crate::model::{
    DownloadError, DownloadId, DownloadRecord, EnqueueAction, NetworkType, Priority, Status,
};

const COLUMNS: &str = "id, namespace, url, file, group_id, priority, headers_json, downloaded, \
    total, status, error, network_type, created, tag, enqueue_action, download_on_enqueue, \
    auto_retry_max_attempts, auto_retry_attempts, extras_json";

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Default database location: `~/.local/state/fetchq/downloads.db`.
pub fn default_db_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("fetchq")?;
    Ok(xdg_dirs.get_state_home().join("downloads.db"))
}

pub struct SqliteStore {
    pool: Pool<Sqlite>,
    namespace: String,
    // Declared last: the pool must drop while the runtime is still alive.
    runtime: Runtime,
}

impl SqliteStore {
    /// Open (or create) the database under the XDG state directory.
    pub fn open_default(namespace: &str) -> Result<Self> {
        Self::open_at(default_db_path()?, namespace)
    }

    /// Open (or create) the database at `path`, creating parent dirs.
    pub fn open_at(path: impl AsRef<Path>, namespace: &str) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        Self::connect(&uri, SqlitePoolOptions::new().max_connections(4), namespace)
            .with_context(|| format!("opening database {}", path.display()))
    }

    /// In-memory database. One connection that never expires, so every query
    /// sees the same data.
    pub fn open_memory(namespace: &str) -> Result<Self> {
        let options = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
        Self::connect("sqlite::memory:", options, namespace)
    }

    fn connect(uri: &str, options: SqlitePoolOptions, namespace: &str) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("fetchq-sqlite")
            .enable_all()
            .build()
            .context("building database runtime")?;
        let pool = runtime.block_on(options.connect(uri))?;
        let store = Self {
            pool,
            namespace: namespace.to_string(),
            runtime,
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    fn migrate(&self) -> Result<()> {
        self.block_on(
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS downloads (
                    id INTEGER NOT NULL,
                    namespace TEXT NOT NULL,
                    url TEXT NOT NULL,
                    file TEXT NOT NULL,
                    group_id INTEGER NOT NULL DEFAULT 0,
                    priority INTEGER NOT NULL DEFAULT 0,
                    headers_json TEXT NOT NULL DEFAULT '{}',
                    downloaded INTEGER NOT NULL DEFAULT 0,
                    total INTEGER NOT NULL DEFAULT -1,
                    status TEXT NOT NULL,
                    error TEXT NOT NULL DEFAULT 'none',
                    network_type TEXT NOT NULL DEFAULT 'all',
                    created INTEGER NOT NULL,
                    tag TEXT,
                    enqueue_action TEXT NOT NULL,
                    download_on_enqueue INTEGER NOT NULL DEFAULT 1,
                    auto_retry_max_attempts INTEGER NOT NULL DEFAULT 0,
                    auto_retry_attempts INTEGER NOT NULL DEFAULT 0,
                    extras_json TEXT NOT NULL DEFAULT '{}',
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (namespace, id)
                );
                "#,
            )
            .execute(&self.pool),
        )?;
        Ok(())
    }

    fn select(&self) -> QueryBuilder<'_, Sqlite> {
        let mut qb = QueryBuilder::new(format!("SELECT {COLUMNS} FROM downloads WHERE namespace = "));
        qb.push_bind(self.namespace.as_str());
        qb
    }

    fn fetch(&self, mut qb: QueryBuilder<'_, Sqlite>) -> Result<Vec<DownloadRecord>> {
        qb.push(" ORDER BY created ASC, id ASC");
        let rows = self.block_on(qb.build().fetch_all(&self.pool))?;
        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_record(row: &SqliteRow) -> Result<DownloadRecord> {
    let status: String = row.try_get("status")?;
    let status = Status::parse(&status).with_context(|| format!("unknown status {status:?}"))?;
    let headers: String = row.try_get("headers_json")?;
    let extras: String = row.try_get("extras_json")?;
    let network: String = row.try_get("network_type")?;
    let action: String = row.try_get("enqueue_action")?;
    let error: String = row.try_get("error")?;
    let file: String = row.try_get("file")?;
    let downloaded: i64 = row.try_get("downloaded")?;
    let max_attempts: i64 = row.try_get("auto_retry_max_attempts")?;
    let attempts: i64 = row.try_get("auto_retry_attempts")?;
    Ok(DownloadRecord {
        id: row.try_get("id")?,
        namespace: row.try_get("namespace")?,
        url: row.try_get("url")?,
        file: PathBuf::from(file),
        group: row.try_get("group_id")?,
        priority: Priority::from_value(row.try_get("priority")?),
        headers: serde_json::from_str::<BTreeMap<String, String>>(&headers)
            .context("decoding headers")?,
        downloaded: downloaded.max(0) as u64,
        total: row.try_get("total")?,
        status,
        error: DownloadError::parse(&error),
        network_type: NetworkType::parse(&network).unwrap_or_default(),
        created: row.try_get("created")?,
        tag: row.try_get("tag")?,
        enqueue_action: EnqueueAction::parse(&action).unwrap_or_default(),
        download_on_enqueue: row.try_get("download_on_enqueue")?,
        auto_retry_max_attempts: max_attempts.max(0) as u32,
        auto_retry_attempts: attempts.max(0) as u32,
        extras: serde_json::from_str::<BTreeMap<String, String>>(&extras)
            .context("decoding extras")?,
    })
}

impl DownloadStore for SqliteStore {
    fn insert(&self, record: &DownloadRecord) -> Result<bool> {
        let headers = serde_json::to_string(&record.headers)?;
        let extras = serde_json::to_string(&record.extras)?;
        let r = self.block_on(
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO downloads (
                    id, namespace, url, file, group_id, priority, headers_json,
                    downloaded, total, status, error, network_type, created, tag,
                    enqueue_action, download_on_enqueue, auto_retry_max_attempts,
                    auto_retry_attempts, extras_json, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                          ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
                "#,
            )
            .bind(record.id)
            .bind(self.namespace.as_str())
            .bind(&record.url)
            .bind(record.file.to_string_lossy().into_owned())
            .bind(record.group)
            .bind(record.priority.value())
            .bind(headers)
            .bind(record.downloaded as i64)
            .bind(record.total)
            .bind(record.status.as_str())
            .bind(record.error.as_str())
            .bind(record.network_type.as_str())
            .bind(record.created)
            .bind(record.tag.as_deref())
            .bind(record.enqueue_action.as_str())
            .bind(record.download_on_enqueue)
            .bind(i64::from(record.auto_retry_max_attempts))
            .bind(i64::from(record.auto_retry_attempts))
            .bind(extras)
            .bind(unix_timestamp())
            .execute(&self.pool),
        )?;
        Ok(r.rows_affected() == 1)
    }

    fn update(&self, record: &DownloadRecord) -> Result<()> {
        let headers = serde_json::to_string(&record.headers)?;
        let extras = serde_json::to_string(&record.extras)?;
        self.block_on(
            sqlx::query(
                r#"
                UPDATE downloads
                SET url = ?1,
                    file = ?2,
                    group_id = ?3,
                    priority = ?4,
                    headers_json = ?5,
                    downloaded = ?6,
                    total = ?7,
                    status = ?8,
                    error = ?9,
                    network_type = ?10,
                    tag = ?11,
                    enqueue_action = ?12,
                    download_on_enqueue = ?13,
                    auto_retry_max_attempts = ?14,
                    auto_retry_attempts = ?15,
                    extras_json = ?16,
                    updated_at = ?17
                WHERE namespace = ?18 AND id = ?19
                "#,
            )
            .bind(&record.url)
            .bind(record.file.to_string_lossy().into_owned())
            .bind(record.group)
            .bind(record.priority.value())
            .bind(headers)
            .bind(record.downloaded as i64)
            .bind(record.total)
            .bind(record.status.as_str())
            .bind(record.error.as_str())
            .bind(record.network_type.as_str())
            .bind(record.tag.as_deref())
            .bind(record.enqueue_action.as_str())
            .bind(record.download_on_enqueue)
            .bind(i64::from(record.auto_retry_max_attempts))
            .bind(i64::from(record.auto_retry_attempts))
            .bind(extras)
            .bind(unix_timestamp())
            .bind(self.namespace.as_str())
            .bind(record.id)
            .execute(&self.pool),
        )?;
        Ok(())
    }

    fn delete(&self, id: DownloadId) -> Result<()> {
        self.block_on(
            sqlx::query("DELETE FROM downloads WHERE namespace = ?1 AND id = ?2")
                .bind(self.namespace.as_str())
                .bind(id)
                .execute(&self.pool),
        )?;
        Ok(())
    }

    fn get(&self, id: DownloadId) -> Result<Option<DownloadRecord>> {
        let mut qb = self.select();
        qb.push(" AND id = ").push_bind(id);
        Ok(self.fetch(qb)?.into_iter().next())
    }

    fn get_all(&self) -> Result<Vec<DownloadRecord>> {
        self.fetch(self.select())
    }

    fn get_by_status(&self, statuses: &[Status]) -> Result<Vec<DownloadRecord>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = self.select();
        qb.push(" AND status IN (");
        let mut sep = qb.separated(", ");
        for s in statuses {
            sep.push_bind(s.as_str());
        }
        sep.push_unseparated(")");
        self.fetch(qb)
    }

    fn get_by_group(&self, group: i32) -> Result<Vec<DownloadRecord>> {
        let mut qb = self.select();
        qb.push(" AND group_id = ").push_bind(group);
        self.fetch(qb)
    }

    fn get_by_file(&self, file: &Path) -> Result<Option<DownloadRecord>> {
        let mut qb = self.select();
        qb.push(" AND file = ")
            .push_bind(file.to_string_lossy().into_owned());
        Ok(self.fetch(qb)?.into_iter().next())
    }

    fn recover_interrupted(&self) -> Result<u64> {
        let r = self.block_on(
            sqlx::query(
                r#"
                UPDATE downloads
                SET status = 'queued',
                    error = 'none',
                    updated_at = ?1
                WHERE namespace = ?2 AND status = 'downloading'
                "#,
            )
            .bind(unix_timestamp())
            .bind(self.namespace.as_str())
            .execute(&self.pool),
        )?;
        Ok(r.rows_affected())
    }
}
