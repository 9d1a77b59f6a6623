//! In-place slicing that first checks what the server can do.

use super::in_place::run_in_place;
use super::{finish, FileTransfer, TransferContext};
use crate::control::CancelToken;
use crate::model::Download;

/// Probes with HEAD (range support, chunked encoding) before slicing, falls
/// back to one slice when slicing is not viable, and fails with an
/// incomplete-download error when the slice byte sum misses the total.
pub struct ProbingTransfer {
    download: Download,
    ctx: TransferContext,
    cancel: CancelToken,
}

impl ProbingTransfer {
    pub fn new(download: Download, ctx: TransferContext, cancel: CancelToken) -> Self {
        Self {
            download,
            ctx,
            cancel,
        }
    }
}

impl FileTransfer for ProbingTransfer {
    fn download(&self) -> Download {
        self.download.clone()
    }

    fn run(&mut self) {
        let result = run_in_place(&self.ctx, &mut self.download, &self.cancel, true);
        finish(&self.ctx, &self.download, &self.cancel, result);
    }
}
