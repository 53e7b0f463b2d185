//! Utility modules.

pub mod retry;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock state whose every mutation is a single assignment or set operation,
/// where a panic elsewhere cannot leave it half-updated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
