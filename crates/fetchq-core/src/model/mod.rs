//! Download vocabulary shared by every layer: status, error causes, request,
//! the mutable record and its immutable snapshot.

mod download;
mod error;
mod file_name;
mod id;
mod request;
mod status;
mod types;

pub use download::{Download, DownloadId, DownloadRecord, UNKNOWN_TOTAL};
pub use error::DownloadError;
pub use file_name::{derive_file_name, incremented_file_name};
pub use id::download_id;
pub use request::Request;
pub use status::Status;
pub use types::{Connectivity, EnqueueAction, NetworkType, Priority, SortOrder};
