//! Turning requests into records, honouring the request's enqueue action.

use tracing::{debug, warn};

use super::{now_millis, Fetch};
use crate::listener::FetchEvent;
use crate::model::{
    incremented_file_name, Download, DownloadError, DownloadRecord, EnqueueAction, Request, Status,
};

impl Fetch {
    /// Track `request` and (unless it opted out) queue it for download.
    ///
    /// When the request maps onto a download already tracked (same id, or
    /// another download writing the same file) its enqueue action decides:
    /// replace it, pick a new file name, reject, or update it in place.
    pub fn enqueue(&self, request: Request) -> Result<Download, DownloadError> {
        if self.is_closed() {
            return Err(DownloadError::EngineClosed);
        }
        let record = self.new_record(&request);
        let existing = self.conflicting(&record)?;
        let record = match (existing, request.enqueue_action) {
            (None, _) => record,
            (Some(ex), EnqueueAction::DoNotEnqueueIfExisting) => {
                return Err(if ex.id == record.id {
                    DownloadError::RequestAlreadyExists
                } else {
                    DownloadError::RequestWithFileExists
                });
            }
            (Some(ex), EnqueueAction::ReplaceExisting) => {
                self.delete(&[ex.id]);
                record
            }
            (Some(_), EnqueueAction::IncrementFileName) => self.with_free_file_name(&request),
            (Some(ex), EnqueueAction::UpdateAccordingly) if ex.id == record.id => {
                return Ok(self.update_existing(ex, &request));
            }
            (Some(_), EnqueueAction::UpdateAccordingly) => {
                return Err(DownloadError::RequestWithFileExists);
            }
        };
        self.insert(record)
    }

    /// Enqueue each request in order; one failure does not stop the rest.
    pub fn enqueue_many(&self, requests: Vec<Request>) -> Vec<Result<Download, DownloadError>> {
        requests.into_iter().map(|r| self.enqueue(r)).collect()
    }

    fn new_record(&self, request: &Request) -> DownloadRecord {
        let cfg = &self.core.config;
        DownloadRecord::from_request(
            request,
            &cfg.namespace,
            now_millis(),
            cfg.auto_retry_max_attempts,
        )
    }

    /// The tracked download with the same id, else the one writing the same file.
    fn conflicting(&self, record: &DownloadRecord) -> Result<Option<DownloadRecord>, DownloadError> {
        let store = &self.core.store;
        let found = match store.get(record.id) {
            Ok(Some(r)) => Ok(Some(r)),
            Ok(None) => store.get_by_file(&record.file),
            Err(e) => Err(e),
        };
        found.map_err(|e| {
            warn!(id = record.id, error = %e, "checking for existing download failed");
            DownloadError::StoreError
        })
    }

    fn with_free_file_name(&self, request: &Request) -> DownloadRecord {
        let store = &self.core.store;
        let file = incremented_file_name(&request.file, |p| {
            p.exists() || !matches!(store.get_by_file(p), Ok(None))
        });
        let mut renamed = request.clone();
        renamed.file = file;
        self.new_record(&renamed)
    }

    fn update_existing(&self, existing: DownloadRecord, request: &Request) -> Download {
        let updated = self.core.modify(existing.id, |r| {
            if r.status == Status::Completed {
                return None;
            }
            r.priority = request.priority;
            r.headers = request.headers.clone();
            r.network_type = request.network_type;
            r.group = request.group;
            r.tag = request.tag.clone();
            r.extras = request.extras.clone();
            r.enqueue_action = request.enqueue_action;
            r.download_on_enqueue = request.download_on_enqueue;
            if let Some(max) = request.auto_retry_max_attempts {
                r.auto_retry_max_attempts = max;
            }
            let requeue = request.download_on_enqueue
                && matches!(
                    r.status,
                    Status::Added | Status::Paused | Status::Failed | Status::Cancelled
                );
            if requeue && r.transition(Status::Queued) {
                r.auto_retry_attempts = 0;
                return Some((r.snapshot(), true));
            }
            Some((r.snapshot(), false))
        });
        match updated {
            Some((d, true)) => {
                self.core.emit(FetchEvent::Queued(d.clone()));
                self.processor.wake();
                d
            }
            Some((d, false)) => d,
            None => self
                .core
                .get(existing.id)
                .unwrap_or(existing)
                .snapshot(),
        }
    }

    fn insert(&self, record: DownloadRecord) -> Result<Download, DownloadError> {
        let inserted = {
            let _guard = self.core.lock();
            self.core.store.insert(&record)
        };
        match inserted {
            Ok(true) => {}
            Ok(false) => return Err(DownloadError::RequestAlreadyExists),
            Err(e) => {
                warn!(id = record.id, error = %e, "storing new download failed");
                return Err(DownloadError::StoreError);
            }
        }
        let d = record.snapshot();
        debug!(id = d.id, url = %d.url, file = %d.file.display(), status = %d.status, "enqueued");
        if d.status == Status::Queued {
            self.core.emit(FetchEvent::Queued(d.clone()));
            self.processor.wake();
        } else {
            self.core.emit(FetchEvent::Added(d.clone()));
        }
        Ok(d)
    }
}
