//! Cooperative cancellation for running transfers.
//!
//! Each running strategy gets a [`CancelToken`] it polls at every read/write
//! boundary and a [`TerminationSignal`] it fires once its run loop has exited.
//! The manager requests cancellation through the token and waits (bounded) on
//! the signal instead of spinning on a flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Sleep for up to `dur`, waking early (in small steps) once cancelled.
    /// Returns true if the token was cancelled.
    pub fn sleep(&self, dur: Duration) -> bool {
        const STEP: Duration = Duration::from_millis(25);
        let deadline = Instant::now() + dur;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(STEP.min(deadline - now));
        }
    }
}

/// One-shot "run loop has exited" signal.
#[derive(Debug, Clone, Default)]
pub struct TerminationSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl TerminationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        let (lock, cvar) = &*self.inner;
        let mut done = lock.lock().unwrap_or_else(|e| e.into_inner());
        *done = true;
        cvar.notify_all();
    }

    pub fn is_fired(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// True if both handles refer to the same signal.
    pub fn same_as(&self, other: &TerminationSignal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Wait up to `timeout` for the signal. Returns true if it fired.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |done| !*done)
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }
}

/// Fires its signal when dropped, so the signal goes off however the run loop exits.
pub struct TerminationGuard(pub TerminationSignal);

impl Drop for TerminationGuard {
    fn drop(&mut self) {
        self.0.fire();
    }
}
