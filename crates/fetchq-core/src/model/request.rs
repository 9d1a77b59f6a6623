//! Caller-supplied transfer intent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::types::{EnqueueAction, NetworkType, Priority};

/// A request to download `url` into `file`. Converted to a record at enqueue time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub url: String,
    pub file: PathBuf,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub network_type: NetworkType,
    #[serde(default)]
    pub group: i32,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub enqueue_action: EnqueueAction,
    /// When false the record is created as `Added` and waits for `resume`.
    #[serde(default = "default_true")]
    pub download_on_enqueue: bool,
    /// Overrides the engine-wide auto retry budget when set.
    #[serde(default)]
    pub auto_retry_max_attempts: Option<u32>,
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl Request {
    pub fn new(url: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            file: file.into(),
            headers: BTreeMap::new(),
            priority: Priority::Normal,
            network_type: NetworkType::All,
            group: 0,
            tag: None,
            enqueue_action: EnqueueAction::UpdateAccordingly,
            download_on_enqueue: true,
            auto_retry_max_attempts: None,
            extras: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_network_type(mut self, network_type: NetworkType) -> Self {
        self.network_type = network_type;
        self
    }

    pub fn with_group(mut self, group: i32) -> Self {
        self.group = group;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_enqueue_action(mut self, action: EnqueueAction) -> Self {
        self.enqueue_action = action;
        self
    }

    pub fn with_download_on_enqueue(mut self, enabled: bool) -> Self {
        self.download_on_enqueue = enabled;
        self
    }

    pub fn with_auto_retry(mut self, max_attempts: u32) -> Self {
        self.auto_retry_max_attempts = Some(max_attempts);
        self
    }
}
