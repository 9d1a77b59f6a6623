use std::time::Duration;

use crate::model::DownloadError;

/// How long a failed transfer waits for connectivity before giving up.
#[derive(Debug, Clone, Copy)]
pub struct NetworkRetryPolicy {
    /// When false, failures are settled immediately.
    pub enabled: bool,
    /// Number of connectivity polls.
    pub attempts: u32,
    /// Delay before each poll.
    pub interval: Duration,
}

impl Default for NetworkRetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            attempts: 10,
            interval: Duration::from_millis(500),
        }
    }
}

/// What the engine does with a download whose transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    /// Park it in the queue until connectivity returns.
    WaitForNetwork,
    /// Put it straight back in the queue and count the attempt.
    AutoRetry,
    /// Mark it failed.
    Fail,
}

/// Decide how to settle a failed transfer.
///
/// `attempts_used` is the number of automatic retries already spent on this
/// download; `max_attempts` of 0 disables automatic retries.
pub fn decide_failure(
    error: DownloadError,
    retry_on_network_gain: bool,
    attempts_used: u32,
    max_attempts: u32,
) -> FailureDecision {
    if error == DownloadError::NoNetworkConnection && retry_on_network_gain {
        return FailureDecision::WaitForNetwork;
    }
    if attempts_used < max_attempts {
        return FailureDecision::AutoRetry;
    }
    FailureDecision::Fail
}
