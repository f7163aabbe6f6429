//! Tick arithmetic: mixed-radix digit decomposition and the wall-clock seam.
//!
//! A tick is a count of precision-units since the Unix epoch
//! (`wall_ms / PRECISION_MS`). The wheel views a tick as six digits,
//! most-significant first, and owns one bucket array per digit sized
//! `2^width`. Total bucket storage is the *sum* of the per-digit sizes,
//! not their product, which is what keeps long-horizon wheels cheap.

use std::time::{SystemTime, UNIX_EPOCH};

/// Number of digit positions in the decomposition.
pub(crate) const DIGITS: usize = 6;

/// Index of the least-significant (finest) digit.
pub(crate) const FINEST: usize = DIGITS - 1;

/// Bit width per digit, digit 0 (most significant) through digit 5.
pub(crate) const DIGIT_BITS: [u32; DIGITS] = [10, 10, 2, 2, 2, 4];

const fn digit_shifts() -> [u32; DIGITS] {
    let mut shifts = [0u32; DIGITS];
    let mut acc = 0u32;
    let mut i = DIGITS;
    while i > 0 {
        i -= 1;
        shifts[i] = acc;
        acc += DIGIT_BITS[i];
    }
    shifts
}

const fn digit_bases() -> [usize; DIGITS] {
    // Finest segment first in the flat bucket vector; it is the one
    // touched on nearly every tick.
    let mut bases = [0usize; DIGITS];
    let mut acc = 0usize;
    let mut i = DIGITS;
    while i > 0 {
        i -= 1;
        bases[i] = acc;
        acc += 1 << DIGIT_BITS[i];
    }
    bases
}

const SHIFTS: [u32; DIGITS] = digit_shifts();
const BASES: [usize; DIGITS] = digit_bases();

/// Total bucket count across all digit segments (Σ 2^width).
pub(crate) const BUCKET_COUNT: usize = {
    let mut acc = 0usize;
    let mut i = 0;
    while i < DIGITS {
        acc += 1 << DIGIT_BITS[i];
        i += 1;
    }
    acc
};

/// Extract digit `i` of `tick` via shift/mask.
#[inline(always)]
pub(crate) const fn digit(tick: u64, i: usize) -> u64 {
    (tick >> SHIFTS[i]) & ((1u64 << DIGIT_BITS[i]) - 1)
}

/// Flat index of the bucket for digit position `i` at digit value `value`.
#[inline(always)]
pub(crate) const fn bucket_index(i: usize, value: u64) -> usize {
    BASES[i] + value as usize
}

/// Wall-clock collaborator: milliseconds since the Unix epoch.
///
/// The wheel derives its current tick from this on every [`execute`]
/// call. It is expected to be monotonic-enough for scheduling; the
/// design does not defend against clock jumps (a backward jump stalls
/// `execute`, a forward jump causes catch-up processing of every
/// intervening tick).
///
/// [`execute`]: crate::TimerWheel::execute
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Default [`Clock`] backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}
