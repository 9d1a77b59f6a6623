//! Failure handling: classification of raw transfer errors into download
//! error causes, and the connectivity poll that decides whether a failure was
//! really a lost network.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{
    classify, classify_curl_error, classify_http_status, classify_io_error, classify_message,
};
pub use error::TransferError;
pub use policy::{decide_failure, FailureDecision, NetworkRetryPolicy};
pub use run::settle_failure;
