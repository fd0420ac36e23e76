//! Cooperative shutdown flag checked by tick functions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable shutdown token owned by the host loop.
///
/// Tick functions check it once on entry and return early when it is set.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Creates a signal that has not been triggered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown for every clone of this signal.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns true once shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
