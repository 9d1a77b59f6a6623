//! Strategy callbacks turned into record updates and listener events.

use std::sync::Arc;

use tracing::{debug, info};

use super::Core;
use crate::listener::FetchEvent;
use crate::model::{Download, DownloadError, Status};
use crate::retry::{decide_failure, FailureDecision, TransferError};
use crate::segmenter::Slice;
use crate::strategy::StrategyDelegate;

pub(super) struct EngineDelegate {
    core: Arc<Core>,
}

impl EngineDelegate {
    pub(super) fn new(core: Arc<Core>) -> Self {
        Self { core }
    }
}

impl StrategyDelegate for EngineDelegate {
    fn on_started(&self, download: &Download) {
        let started = self.core.modify(download.id, |r| {
            if r.status == Status::Queued && !r.transition(Status::Downloading) {
                return None;
            }
            if r.status != Status::Downloading {
                return None;
            }
            r.apply_counters(download.downloaded, download.total);
            Some(r.snapshot())
        });
        if let Some(d) = started {
            debug!(id = d.id, downloaded = d.downloaded, total = d.total, "download started");
            self.core.emit(FetchEvent::Started(d));
        }
    }

    fn on_progress(&self, download: &Download) {
        let progressed = self.core.modify(download.id, |r| {
            if r.status != Status::Downloading {
                return None;
            }
            r.apply_counters(download.downloaded, download.total);
            Some(
                r.snapshot()
                    .with_rate(download.eta_ms, download.bytes_per_second),
            )
        });
        if let Some(d) = progressed {
            self.core.emit(FetchEvent::Progress(d));
        }
    }

    fn on_block_updated(&self, download: &Download, slice: &Slice, total_blocks: usize) {
        let Some(record) = self.core.get(download.id) else {
            return;
        };
        if record.status != Status::Downloading {
            return;
        }
        self.core.emit(FetchEvent::BlockUpdated {
            download: record
                .snapshot()
                .with_counters(download.downloaded, download.total),
            slice: *slice,
            total_blocks,
        });
    }

    fn on_complete(&self, download: &Download) {
        let completed = self.core.modify(download.id, |r| {
            if r.status != Status::Downloading {
                return None;
            }
            let total = if download.total >= 0 {
                download.total
            } else {
                download.downloaded as i64
            };
            r.apply_counters(download.downloaded, total);
            r.auto_retry_attempts = 0;
            r.transition(Status::Completed).then(|| r.snapshot())
        });
        if let Some(d) = completed {
            info!(id = d.id, bytes = d.downloaded, file = %d.file.display(), "download completed");
            self.core.emit(FetchEvent::Completed(d));
        }
    }

    fn on_error(&self, download: &Download, error: DownloadError, cause: Option<&TransferError>) {
        let retry_on_network_gain = self.core.config.retry_on_network_gain;
        let settled = self.core.modify(download.id, |r| {
            if r.status != Status::Downloading {
                return None;
            }
            r.apply_counters(download.downloaded, download.total);
            let decision = decide_failure(
                error,
                retry_on_network_gain,
                r.auto_retry_attempts,
                r.auto_retry_max_attempts,
            );
            let next = match decision {
                FailureDecision::WaitForNetwork => Status::Queued,
                FailureDecision::AutoRetry => {
                    r.auto_retry_attempts += 1;
                    Status::Queued
                }
                FailureDecision::Fail => Status::Failed,
            };
            if !r.transition(next) {
                return None;
            }
            if next == Status::Failed {
                r.error = error;
            }
            Some((decision, r.snapshot()))
        });
        let Some((decision, d)) = settled else {
            return;
        };
        let cause = cause.map(ToString::to_string).unwrap_or_default();
        match decision {
            FailureDecision::WaitForNetwork => {
                info!(id = d.id, "offline, waiting for network");
                self.core.emit(FetchEvent::WaitingNetwork(d));
            }
            FailureDecision::AutoRetry => {
                info!(
                    id = d.id,
                    attempt = d.auto_retry_attempts,
                    error = %error,
                    cause = %cause,
                    "download failed, retrying"
                );
                self.core.emit(FetchEvent::Queued(d));
            }
            FailureDecision::Fail => {
                info!(id = d.id, error = %error, cause = %cause, "download failed");
                self.core.emit(FetchEvent::Error { download: d, error });
            }
        }
    }

    fn save_download_progress(&self, download: &Download) {
        self.core.modify(download.id, |r| {
            if r.status.is_terminal() {
                return None;
            }
            r.apply_counters(download.downloaded, download.total);
            Some(())
        });
    }
}
