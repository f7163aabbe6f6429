//! Recyclable, generation-tagged timer handles and their allocator.

use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::warn;

const SLOT_MASK: u64 = 0xFFFF_FFFF;
const GENERATION_MASK: u64 = 0x7F;
const GENERATION_SHIFT: u32 = 32;

/// Slot id reserved as "no id"; never issued, the monotonic counter
/// wraps past it back to 1.
const SLOT_SENTINEL: u64 = 0xFFFF_FFFF;

/// Opaque identifier for a scheduled timer.
///
/// 40 bits of payload in a `u64`: the low 32 bits are a recyclable slot
/// id, bits 32..39 carry a 7-bit rotating generation tag. Two handles
/// with the same slot id but different generations are distinct keys,
/// which bounds (but does not eliminate; the generation wraps every 128
/// allocations) the chance of a stale handle addressing a record that
/// reused its slot.
///
/// Handles are `Copy`: the same value is passed to fire callbacks and
/// accepted by [`stop`]. Using a handle after its record is gone is
/// safe; it is simply unknown to the wheel.
///
/// [`stop`]: crate::TimerWheel::stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Sentinel returned by [`add_cron`] for a malformed expression.
    ///
    /// [`add_cron`]: crate::TimerWheel::add_cron
    pub const INVALID: TimerHandle = TimerHandle(0x7F_FFFF_FFFF);

    #[inline(always)]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline(always)]
    pub(crate) fn pack(slot: u64, generation: u64) -> Self {
        Self((slot & SLOT_MASK) | ((generation & GENERATION_MASK) << GENERATION_SHIFT))
    }

    #[inline(always)]
    pub(crate) fn slot(self) -> u64 {
        self.0 & SLOT_MASK
    }

    /// Raw 40-bit value, for hosts that need to stash handles in
    /// foreign storage.
    #[inline(always)]
    pub fn into_raw(self) -> u64 {
        self.0
    }

    /// Rebuild a handle from [`into_raw`](Self::into_raw).
    #[inline(always)]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

#[derive(Default)]
struct AllocState {
    /// Monotonic slot-id counter; pre-incremented, so ids start at 1.
    next_id: u64,
    /// Per-allocator generation counter, rolls over mod 128.
    generation: u64,
    /// Recycled slot ids, reissued FIFO.
    free: VecDeque<u64>,
}

/// Issues and recycles [`TimerHandle`]s.
///
/// An explicit capability: every wheel owns one by default, and hosts
/// that need handle uniqueness across several wheels can construct one
/// and share it (`Arc<HandleAllocator>`) at wheel construction time.
///
/// `release` is not guarded against double release of the same slot id;
/// the wheel's record-destruction path is its only caller.
#[derive(Default)]
pub struct HandleAllocator {
    state: Mutex<AllocState>,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a handle. Never fails.
    ///
    /// Pops a recycled slot id if one is queued, otherwise takes the
    /// next monotonic id. Exhausting the 32-bit id space wraps back to
    /// 1; that is a liveness risk under extreme uptime, so the wrap is
    /// logged rather than silently absorbed.
    pub fn acquire(&self) -> TimerHandle {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.generation = (state.generation + 1) & GENERATION_MASK;
        let slot = match state.free.pop_front() {
            Some(slot) => slot,
            None => {
                state.next_id += 1;
                if state.next_id == SLOT_SENTINEL {
                    warn!("timer slot-id space wrapped; stale handles may collide");
                    state.next_id = 1;
                }
                state.next_id
            }
        };
        TimerHandle::pack(slot, state.generation)
    }

    /// Return a handle's slot id to the recycle queue.
    pub fn release(&self, handle: TimerHandle) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.free.push_back(handle.slot());
    }
}
