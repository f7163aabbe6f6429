//! Dispatch seam between "a timer is due" and "its callback runs".

use crate::event::FireFn;
use crate::handle::TimerHandle;

/// Invocation strategy for due timers.
///
/// The wheel has already left its critical section when `notify` runs,
/// and re-validates the record afterwards, so an implementation only
/// decides *where* the callback executes. The default [`SyncAlert`]
/// runs it inline on the polling thread.
///
/// A queued variant that hands due records to a worker pool is a
/// deliberate extension point; such an implementation must preserve
/// at-most-once dispatch per due tick and at-most-once stopped-callback
/// delivery.
pub trait Alert {
    fn notify(&self, handle: TimerHandle, fire: &mut FireFn);
}

/// Synchronous in-poll invocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncAlert;

impl Alert for SyncAlert {
    #[inline(always)]
    fn notify(&self, handle: TimerHandle, fire: &mut FireFn) {
        fire(handle);
    }
}
