//! Pluggable lock policy for single- vs multi-threaded embedding.
//!
//! The wheel keeps every mutation of its handle table and bucket queues
//! inside one short [`LockCell::with`] critical section and invokes
//! user callbacks outside it, so a callback may re-enter `add`/`stop`
//! on the same wheel under either policy.

use std::cell::RefCell;
use std::sync::Mutex;

/// Minimal acquire/release capability over some guarded state.
pub trait LockCell<T> {
    fn new(value: T) -> Self;

    /// Run `f` with exclusive access to the guarded state.
    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;
}

/// Lock policy selected at wheel construction via a type parameter.
pub trait Lock {
    type Cell<T>: LockCell<T>;
}

/// No-op lock analogue for single-threaded embedding.
///
/// Backed by [`RefCell`]; holding the state across a user callback is a
/// discipline violation and panics instead of deadlocking.
pub enum SingleThread {}

/// Real mutual exclusion for multi-threaded embedding.
pub enum MultiThread {}

impl Lock for SingleThread {
    type Cell<T> = RefCell<T>;
}

impl Lock for MultiThread {
    type Cell<T> = Mutex<T>;
}

impl<T> LockCell<T> for RefCell<T> {
    fn new(value: T) -> Self {
        RefCell::new(value)
    }

    #[inline(always)]
    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.borrow_mut())
    }
}

impl<T> LockCell<T> for Mutex<T> {
    fn new(value: T) -> Self {
        Mutex::new(value)
    }

    #[inline(always)]
    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock().unwrap_or_else(|e| e.into_inner()))
    }
}
