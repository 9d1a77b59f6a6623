//! Connectivity information and the scheduler's network-type gate.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::model::{Connectivity, NetworkType};

/// Source of current connectivity. Implemented by the embedding application.
pub trait NetworkInfoProvider: Send + Sync {
    fn connectivity(&self) -> Connectivity;

    fn is_network_available(&self) -> bool {
        self.connectivity().is_connected()
    }
}

/// Provider whose state is set explicitly (CLI, tests, or an external watcher).
#[derive(Debug)]
pub struct ManualNetwork {
    state: AtomicU8,
}

impl ManualNetwork {
    pub fn new(initial: Connectivity) -> Self {
        Self {
            state: AtomicU8::new(encode(initial)),
        }
    }

    /// Update connectivity; returns the previous value.
    pub fn set(&self, connectivity: Connectivity) -> Connectivity {
        decode(self.state.swap(encode(connectivity), Ordering::AcqRel))
    }
}

impl Default for ManualNetwork {
    fn default() -> Self {
        Self::new(Connectivity::Unmetered)
    }
}

impl NetworkInfoProvider for ManualNetwork {
    fn connectivity(&self) -> Connectivity {
        decode(self.state.load(Ordering::Acquire))
    }
}

fn encode(c: Connectivity) -> u8 {
    match c {
        Connectivity::None => 0,
        Connectivity::Metered => 1,
        Connectivity::Unmetered => 2,
    }
}

fn decode(v: u8) -> Connectivity {
    match v {
        0 => Connectivity::None,
        1 => Connectivity::Metered,
        _ => Connectivity::Unmetered,
    }
}

/// True if a download requiring `required` may start under `current`.
/// A configured global network type overrides the per-download requirement.
pub fn network_gate_open(
    required: NetworkType,
    global_override: Option<NetworkType>,
    current: Connectivity,
) -> bool {
    global_override.unwrap_or(required).is_satisfied_by(current)
}
