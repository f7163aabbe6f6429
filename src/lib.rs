//! # tickwheel
//!
//! Hierarchical, cascading timer wheel for millisecond-scale scheduling
//! of one-shot, fixed-interval and cron-driven timers.
//!
//! A tick is `wall_ms / PRECISION_MS`. The wheel decomposes it into six
//! mixed-radix digits and keeps one bucket array per digit, so storage
//! is the *sum* of the per-digit sizes (2076 buckets) while the horizon
//! is their product. Far-future timers park in a coarse bucket and
//! cascade toward finer ones as the clock approaches; each tick unit
//! touches at most one bucket.
//!
//! The wheel spawns no threads. The host drives it by calling
//! [`TimerWheel::execute`] periodically; a poll that arrives late
//! catches up one tick unit at a time, skipping nothing.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use tickwheel::Wheel;
//!
//! let wheel = Wheel::new();
//!
//! wheel.add(Duration::from_millis(250), |handle| {
//!     println!("timer {handle:?} fired");
//! });
//! wheel.add_interval(
//!     Duration::ZERO,
//!     Duration::from_secs(1),
//!     5,
//!     |_| println!("tick"),
//!     Some(Box::new(|_| println!("done"))),
//! );
//! wheel.add_cron("0 * * * * *", |_| println!("top of the minute"), None);
//!
//! loop {
//!     wheel.execute();
//!     std::thread::sleep(Duration::from_millis(10));
//! }
//! ```
//!
//! ## Threading
//!
//! The lock policy is a type parameter. [`SingleThread`] wheels use a
//! `RefCell` and stay `!Sync`; [`MultiThread`] wheels use a `Mutex` and
//! can be polled and mutated from any number of threads. Under either
//! policy callbacks run outside the wheel's critical section and may
//! re-enter `add`/`stop` on the same wheel.
//!
//! ## Handles
//!
//! Every registration returns a `Copy`able [`TimerHandle`], valid until
//! the timer's final removal. Stopping an unknown or stale handle is a
//! harmless no-op. Hosts that need handle uniqueness across several
//! wheels can share one [`HandleAllocator`].

mod alert;
mod clock;
mod event;
mod handle;
mod lock;
mod wheel;

pub use alert::{Alert, SyncAlert};
pub use clock::{Clock, SystemClock};
pub use event::{FireFn, ScheduleError, StopFn, UNBOUNDED};
pub use handle::{HandleAllocator, TimerHandle};
pub use lock::{Lock, LockCell, MultiThread, SingleThread};
pub use wheel::{TimerWheel, DEFAULT_PRECISION_MS};

/// Single-threaded wheel at the default 10ms precision.
pub type Wheel = TimerWheel<DEFAULT_PRECISION_MS, SingleThread>;

/// Thread-safe wheel at the default 10ms precision.
pub type SharedWheel = TimerWheel<DEFAULT_PRECISION_MS, MultiThread>;

/// Single-threaded wheel at 1ms precision (horizon ≈ 12.4 days).
pub type PreciseWheel = TimerWheel<1, SingleThread>;

/// Single-threaded wheel at 100ms precision for coarse, long-horizon
/// schedules.
pub type CoarseWheel = TimerWheel<100, SingleThread>;
