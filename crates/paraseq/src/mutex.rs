#[cfg(feature = "parking-lot")]
pub(crate) use parking_lot::{Mutex, MutexGuard};
#[cfg(not(feature = "parking-lot"))]
pub(crate) use std::sync::{Mutex, MutexGuard};

/// Acquires `mutex`, ignoring poisoning.
///
/// Every structure guarded this way is only ever mutated by whole-entry
/// inserts and removals, so a panicking holder cannot leave it half-written.
#[cfg(feature = "parking-lot")]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock()
}

/// Acquires `mutex`, ignoring poisoning.
///
/// Every structure guarded this way is only ever mutated by whole-entry
/// inserts and removals, so a panicking holder cannot leave it half-written.
#[cfg(not(feature = "parking-lot"))]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Consumes `mutex`, ignoring poisoning.
#[cfg(feature = "parking-lot")]
pub(crate) fn into_inner<T>(mutex: Mutex<T>) -> T {
    mutex.into_inner()
}

/// Consumes `mutex`, ignoring poisoning.
#[cfg(not(feature = "parking-lot"))]
pub(crate) fn into_inner<T>(mutex: Mutex<T>) -> T {
    mutex
        .into_inner()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
