//! Connectivity poll run after a transfer fails.

use tracing::debug;

use super::policy::NetworkRetryPolicy;
use crate::control::CancelToken;
use crate::model::DownloadError;
use crate::network::NetworkInfoProvider;

/// Settles the final error cause for a failed transfer.
///
/// With the policy enabled, connectivity is polled up to `attempts` times. Any
/// sign of disconnection (before or during the poll) turns the cause into
/// `NoNetworkConnection`; otherwise the classified cause stands. Cancellation
/// cuts the poll short and keeps the classified cause.
pub fn settle_failure(
    policy: &NetworkRetryPolicy,
    network: &dyn NetworkInfoProvider,
    classified: DownloadError,
    cancel: &CancelToken,
) -> DownloadError {
    if !policy.enabled {
        return classified;
    }
    let mut disconnected = !network.is_network_available();
    if !disconnected {
        for attempt in 1..=policy.attempts {
            if cancel.sleep(policy.interval) {
                return classified;
            }
            if !network.is_network_available() {
                debug!(attempt, "connectivity lost while settling failure");
                disconnected = true;
                break;
            }
        }
    }
    if disconnected {
        DownloadError::NoNetworkConnection
    } else {
        classified
    }
}
