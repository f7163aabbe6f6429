//! Cascading wheel core: bucket storage, insertion, tick advance and
//! the dispatch loop.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tracing::{trace, warn};

use crate::alert::{Alert, SyncAlert};
use crate::clock::{self, Clock, SystemClock, BUCKET_COUNT, DIGITS, FINEST};
use crate::event::{EventRecord, FireFn, ScheduleError, StopFn, Trigger, UNBOUNDED};
use crate::handle::{HandleAllocator, TimerHandle};
use crate::lock::{Lock, LockCell, SingleThread};

pub const DEFAULT_PRECISION_MS: u64 = 10;

/// Hierarchical, cascading timer wheel.
///
/// Timers are registered with [`add`], [`add_interval`] or
/// [`add_cron`], cancelled with [`stop`], and driven by periodic
/// [`execute`] polls from whatever thread(s) the host chooses; the
/// wheel spawns none of its own.
///
/// Bucket queues hold only handles; the handle table is the single
/// owner of record storage, so a `stop` racing a concurrent dispatch is
/// resolved by which side erases the table entry first. User callbacks
/// always run outside the wheel's critical section and may re-enter
/// `add`/`stop` on the same wheel.
///
/// Type parameters, all defaulted: tick precision in milliseconds
/// (compile-time, must be nonzero), the lock policy
/// ([`SingleThread`]/[`MultiThread`]), the wall-clock source, and the
/// dispatch strategy.
///
/// [`add`]: Self::add
/// [`add_interval`]: Self::add_interval
/// [`add_cron`]: Self::add_cron
/// [`stop`]: Self::stop
/// [`execute`]: Self::execute
/// [`MultiThread`]: crate::lock::MultiThread
pub struct TimerWheel<
    const PRECISION_MS: u64 = DEFAULT_PRECISION_MS,
    L: Lock = SingleThread,
    C: Clock = SystemClock,
    A: Alert = SyncAlert,
> {
    state: L::Cell<WheelState>,
    clock: C,
    allocator: Arc<HandleAllocator>,
    alert: A,
}

struct WheelState {
    /// Flat cascading bucket array: Σ 2^width queues of handles.
    buckets: Vec<VecDeque<TimerHandle>>,
    /// Single owner of record storage, keyed by handle.
    table: HashMap<TimerHandle, EventRecord>,
    /// Next tick unit to process.
    tick: u64,
    /// Set while `execute` has a drained bucket in flight; submissions
    /// during that window can no longer land in the current unit.
    in_dispatch: bool,
}

impl WheelState {
    fn new(tick: u64) -> Self {
        Self {
            buckets: (0..BUCKET_COUNT).map(|_| VecDeque::new()).collect(),
            table: HashMap::new(),
            tick,
            in_dispatch: false,
        }
    }

    /// Cascading placement: clamp behind-schedule targets up to the
    /// current tick, then enqueue under the first digit (coarse to
    /// fine) where target and current tick differ. Returns the
    /// effective target tick, which the caller stores back into the
    /// record so the due test stays exact equality.
    fn submit(&mut self, handle: TimerHandle, requested: u64) -> u64 {
        let mut target = requested.max(self.tick);
        // Two targets can no longer fire in the current unit: anything
        // submitted while the unit's bucket is mid-drain, and the
        // finest bucket at digit value 0, which the advance rule never
        // visits.
        if target == self.tick && (self.in_dispatch || clock::digit(target, FINEST) == 0) {
            target += 1;
        }
        let mut idx = clock::bucket_index(FINEST, clock::digit(target, FINEST));
        for i in 0..DIGITS {
            if clock::digit(target, i) != clock::digit(self.tick, i) {
                idx = clock::bucket_index(i, clock::digit(target, i));
                break;
            }
        }
        self.buckets[idx].push_back(handle);
        target
    }
}

/// Bucket processed for `tick`: the finest digit's bucket when that
/// digit is nonzero, otherwise the first coarser nonzero digit, each
/// gated on every finer digit having wrapped to zero. At most one
/// bucket per tick unit.
#[inline(always)]
fn due_bucket(tick: u64) -> Option<usize> {
    for i in (0..DIGITS).rev() {
        let value = clock::digit(tick, i);
        if value != 0 {
            return Some(clock::bucket_index(i, value));
        }
    }
    None
}

enum Dispatch {
    /// Stale queued handle, or a cascade re-queue; nothing to run.
    Skip,
    Fire(FireFn),
    Finished(Option<StopFn>),
}

enum Refire {
    Live,
    /// `stop` erased the record during the callback and owns the
    /// stopped-callback invocation.
    Gone,
    Finished(Option<StopFn>),
}

impl<const PRECISION_MS: u64, L: Lock, C: Clock, A: Alert> TimerWheel<PRECISION_MS, L, C, A> {
    /// Fully explicit constructor; the other constructors delegate
    /// here. The allocator is an explicit capability so hosts can
    /// share one across wheels when handles must be process-unique.
    pub fn with_parts(clock: C, allocator: Arc<HandleAllocator>, alert: A) -> Self {
        const {
            assert!(PRECISION_MS >= 1, "precision must be at least 1ms");
        }
        let tick = clock.now_ms() / PRECISION_MS;
        Self {
            state: <L::Cell<WheelState> as LockCell<WheelState>>::new(WheelState::new(tick)),
            clock,
            allocator,
            alert,
        }
    }

    #[inline(always)]
    pub const fn precision_ms(&self) -> u64 {
        PRECISION_MS
    }

    /// Live timer count.
    pub fn len(&self) -> usize {
        self.state.with(|s| s.table.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn allocator(&self) -> &Arc<HandleAllocator> {
        &self.allocator
    }

    /// Schedule a one-shot timer `delay` from now. Always succeeds.
    pub fn add<F>(&self, delay: Duration, fire: F) -> TimerHandle
    where
        F: FnMut(TimerHandle) + Send + 'static,
    {
        self.add_interval(delay, Duration::ZERO, 0, fire, None)
    }

    /// Schedule a repeating timer: first trigger `delay` from now, then
    /// every `period`, for `rounds` fires ([`UNBOUNDED`] repeats until
    /// stopped). A zero `period` forces a single round. Always
    /// succeeds.
    ///
    /// Each next trigger is computed from the actual fire-time clock,
    /// so a busy host stretches the schedule rather than bunching
    /// fires.
    pub fn add_interval<F>(
        &self,
        delay: Duration,
        period: Duration,
        rounds: u64,
        fire: F,
        stopped: Option<StopFn>,
    ) -> TimerHandle
    where
        F: FnMut(TimerHandle) + Send + 'static,
    {
        let period_ms = period.as_millis() as u64;
        let rounds = if period_ms == 0 { 1 } else { rounds };
        let next = self.clock.now_ms().saturating_add(delay.as_millis() as u64) / PRECISION_MS;
        self.register(
            next,
            rounds,
            Trigger::Interval { period_ms },
            Box::new(fire),
            stopped,
        )
    }

    /// Schedule a cron-driven timer, repeating until stopped.
    ///
    /// A malformed expression registers nothing and returns
    /// [`TimerHandle::INVALID`]; see
    /// [`try_add_cron`](Self::try_add_cron) for the typed error.
    pub fn add_cron<F>(&self, expr: &str, fire: F, stopped: Option<StopFn>) -> TimerHandle
    where
        F: FnMut(TimerHandle) + Send + 'static,
    {
        match self.try_add_cron(expr, fire, stopped) {
            Ok(handle) => handle,
            Err(error) => {
                warn!(expr, %error, "rejected cron timer");
                TimerHandle::INVALID
            }
        }
    }

    /// [`add_cron`](Self::add_cron) with the rejection reason.
    pub fn try_add_cron<F>(
        &self,
        expr: &str,
        fire: F,
        stopped: Option<StopFn>,
    ) -> Result<TimerHandle, ScheduleError>
    where
        F: FnMut(TimerHandle) + Send + 'static,
    {
        let trigger = Trigger::parse_cron(expr)?;
        let next = trigger
            .next_trigger(self.clock.now_ms(), PRECISION_MS)
            .ok_or(ScheduleError::Exhausted)?;
        Ok(self.register(next, UNBOUNDED, trigger, Box::new(fire), stopped))
    }

    fn register(
        &self,
        next: u64,
        rounds: u64,
        trigger: Trigger,
        fire: FireFn,
        stopped: Option<StopFn>,
    ) -> TimerHandle {
        let handle = self.allocator.acquire();
        self.state.with(|s| {
            let target = s.submit(handle, next);
            s.table
                .insert(handle, EventRecord::new(target, rounds, trigger, fire, stopped));
        });
        handle
    }

    /// Cancel a timer.
    ///
    /// Removes the record if the handle is known (unknown, stale and
    /// [`TimerHandle::INVALID`] handles are a no-op returning zero),
    /// invokes its stopped-callback synchronously, and returns the
    /// time remaining until the next scheduled trigger (zero if past
    /// due).
    ///
    /// The record is unreachable to any later
    /// [`execute`](Self::execute) the moment this returns, but a
    /// dispatch already past its table lookup completes its current
    /// fire callback.
    pub fn stop(&self, handle: TimerHandle) -> Duration {
        let now_ms = self.clock.now_ms();
        let Some(mut record) = self.state.with(|s| s.table.remove(&handle)) else {
            return Duration::ZERO;
        };
        self.allocator.release(handle);
        if let Some(stopped) = record.stopped.take() {
            stopped(handle);
        }
        Duration::from_millis((record.next * PRECISION_MS).saturating_sub(now_ms))
    }

    /// Advance from the last processed tick to the current wall-clock
    /// tick, one unit at a time, dispatching every due timer along the
    /// way. Returns the number of fire callbacks invoked.
    ///
    /// Units are never skipped: a wheel polled infrequently (or after
    /// a forward clock jump) catches up by processing every
    /// intervening unit, in increasing tick order.
    pub fn execute(&self) -> usize {
        let now_tick = self.clock.now_ms() / PRECISION_MS;
        let mut fired = 0usize;
        loop {
            let step = self.state.with(|s| {
                if s.tick > now_tick {
                    return None;
                }
                let tick = s.tick;
                let drained =
                    due_bucket(tick).map(|idx| (idx, std::mem::take(&mut s.buckets[idx])));
                if drained.is_some() {
                    s.in_dispatch = true;
                }
                Some((tick, drained))
            });
            let Some((tick, drained)) = step else { break };
            if let Some((bucket, handles)) = drained {
                if !handles.is_empty() {
                    trace!(tick, bucket, queued = handles.len(), "draining bucket");
                }
                for handle in handles {
                    fired += self.dispatch(handle, tick);
                }
            }
            self.state.with(|s| {
                s.in_dispatch = false;
                // Another executing thread may already have advanced
                // past this unit; never advance twice for one unit.
                if s.tick == tick {
                    s.tick += 1;
                }
            });
        }
        fired
    }

    /// Handle one drained queue entry for `tick`. Returns 1 if a fire
    /// callback ran.
    fn dispatch(&self, handle: TimerHandle, tick: u64) -> usize {
        let action = self.state.with(|s| {
            let Some(record) = s.table.get_mut(&handle) else {
                // Cancelled or exhausted after being queued; the stale
                // reference is dropped here, not at stop() time.
                return Dispatch::Skip;
            };
            if record.next != tick {
                // Coarse-bucket entry not at its exact tick yet:
                // re-insert, which routes it toward a finer bucket.
                let requested = record.next;
                let target = s.submit(handle, requested);
                if let Some(record) = s.table.get_mut(&handle) {
                    record.next = target;
                }
                return Dispatch::Skip;
            }
            if record.rounds == 0 {
                // Zero requested rounds: removed at the due tick
                // without ever firing.
                let stopped = s.table.remove(&handle).and_then(|mut r| r.stopped.take());
                return Dispatch::Finished(stopped);
            }
            match record.fire.take() {
                Some(fire) => Dispatch::Fire(fire),
                None => Dispatch::Skip,
            }
        });

        match action {
            Dispatch::Skip => 0,
            Dispatch::Finished(stopped) => {
                self.finish(handle, stopped);
                0
            }
            Dispatch::Fire(mut fire) => {
                // Critical section released; the callback may re-enter
                // add()/stop() on this wheel.
                self.alert.notify(handle, &mut fire);
                let now_ms = self.clock.now_ms();
                let refire = self.state.with(|s| {
                    let Some(record) = s.table.get_mut(&handle) else {
                        return Refire::Gone;
                    };
                    record.fire = Some(fire);
                    if record.rounds != UNBOUNDED {
                        record.rounds -= 1;
                    }
                    if record.rounds == 0 {
                        let stopped = s.table.remove(&handle).and_then(|mut r| r.stopped.take());
                        return Refire::Finished(stopped);
                    }
                    match record.trigger.next_trigger(now_ms, PRECISION_MS) {
                        Some(requested) => {
                            let target = s.submit(handle, requested);
                            if let Some(record) = s.table.get_mut(&handle) {
                                record.next = target;
                            }
                            Refire::Live
                        }
                        None => {
                            // Bounded cron schedule ran out.
                            let stopped =
                                s.table.remove(&handle).and_then(|mut r| r.stopped.take());
                            Refire::Finished(stopped)
                        }
                    }
                });
                if let Refire::Finished(stopped) = refire {
                    self.finish(handle, stopped);
                }
                1
            }
        }
    }

    /// Final removal: recycle the slot id and run the stopped-callback
    /// outside the critical section.
    fn finish(&self, handle: TimerHandle, stopped: Option<StopFn>) {
        self.allocator.release(handle);
        if let Some(stopped) = stopped {
            stopped(handle);
        }
    }
}

impl<const PRECISION_MS: u64, L: Lock, C: Clock> TimerWheel<PRECISION_MS, L, C> {
    /// Wheel with a caller-supplied clock and its own allocator.
    pub fn with_clock(clock: C) -> Self {
        Self::with_parts(clock, Arc::new(HandleAllocator::new()), SyncAlert)
    }
}

impl<const PRECISION_MS: u64, L: Lock> TimerWheel<PRECISION_MS, L> {
    /// Wheel on the system clock with its own allocator.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Wheel on the system clock sharing `allocator` with other
    /// wheels.
    pub fn with_allocator(allocator: Arc<HandleAllocator>) -> Self {
        Self::with_parts(SystemClock, allocator, SyncAlert)
    }
}

impl<const PRECISION_MS: u64, L: Lock> Default for TimerWheel<PRECISION_MS, L> {
    fn default() -> Self {
        Self::new()
    }
}
