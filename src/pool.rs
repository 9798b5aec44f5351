//! Thread-local reuse table for released storage cells.
//!
//! Every text value below a size threshold allocates through here. Releases
//! park the cell in a per-capacity bucket instead of freeing it, and later
//! acquisitions of the same capacity revive a parked cell instead of hitting
//! the allocator. Short-lived values of recurring sizes (loop counters
//! rendered to text, log fragments, glue strings) then recycle a handful of
//! cells instead of churning the heap.
//!
//! Capacities are exact: an acquisition for `min_len` characters always
//! yields `min_len + RESERVED_SLACK`, so each bucket holds cells of one
//! capacity and a revived cell fits its request by construction. Buckets
//! hold at most [`SLOTS_PER_BUCKET`] cells; beyond that, and for any cell at
//! or over [`REUSE_LIMIT`], releases free the cell outright. UTF-8
//! projection cells are never parked, they exist only as caches sized to
//! their exact image.
//!
//! The table is thread-local and guarded by a `RefCell`. Releasing a cell
//! can recursively release the projection caches it still holds, so the
//! release path detaches those first and lets them drop only after the
//! table borrow is out of scope.

use crate::buffer::{self, BufRef, DeadCell, Encoding, StrBuf};
use std::cell::RefCell;
use std::ptr::NonNull;

/// Extra characters of capacity granted beyond the requested length.
pub(crate) const RESERVED_SLACK: usize = 64;
/// Cells with this capacity or more are never parked.
pub(crate) const REUSE_LIMIT: usize = 256;
/// Parked cells kept per (encoding, capacity) bucket.
pub(crate) const SLOTS_PER_BUCKET: usize = 4;

/// Counters for one thread's pool. Snapshot via [`stats`].
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct PoolStats {
    /// Cells created fresh from the allocator.
    pub allocated: u64,
    /// Acquisitions served by reviving a parked cell.
    pub reused: u64,
    /// Releases that parked their cell.
    pub parked: u64,
    /// Cells freed outright (over the limit, bucket full, or not poolable).
    pub freed: u64,
    /// Cells parked right now.
    pub resident: usize,
}

struct BufferPool {
    byte_slots: Vec<Option<DeadCell>>,
    wide_slots: Vec<Option<DeadCell>>,
    stats: PoolStats,
}

impl BufferPool {
    fn new() -> BufferPool {
        let n = REUSE_LIMIT * SLOTS_PER_BUCKET;
        let mut byte_slots = Vec::new();
        byte_slots.resize_with(n, || None);
        let mut wide_slots = Vec::new();
        wide_slots.resize_with(n, || None);
        BufferPool {
            byte_slots,
            wide_slots,
            stats: PoolStats::default(),
        }
    }

    fn row(&mut self, enc: Encoding) -> &mut Vec<Option<DeadCell>> {
        match enc {
            Encoding::SingleByte => &mut self.byte_slots,
            Encoding::Wide => &mut self.wide_slots,
            Encoding::Utf8 => unreachable!("utf8 cells never reach the pool table"),
        }
    }

    fn acquire(&mut self, enc: Encoding, min_len: usize) -> BufRef {
        let capacity = min_len + RESERVED_SLACK;
        if capacity < REUSE_LIMIT {
            let base = capacity * SLOTS_PER_BUCKET;
            let row = self.row(enc);
            for s in (0..SLOTS_PER_BUCKET).rev() {
                if let Some(dead) = row[base + s].take() {
                    debug_assert_eq!(dead.capacity(), capacity);
                    self.stats.reused += 1;
                    self.stats.resident -= 1;
                    return dead.revive();
                }
            }
        }
        self.stats.allocated += 1;
        buffer::alloc_cell(enc, capacity)
    }

    /// Parks `dead` if a slot is free; hands it back for destruction
    /// otherwise. The caller destroys outside the table borrow.
    fn park(&mut self, dead: DeadCell) -> Option<DeadCell> {
        let enc = dead.encoding();
        let capacity = dead.capacity();
        if enc == Encoding::Utf8 || capacity >= REUSE_LIMIT {
            self.stats.freed += 1;
            return Some(dead);
        }
        let base = capacity * SLOTS_PER_BUCKET;
        let row = self.row(enc);
        for s in 0..SLOTS_PER_BUCKET {
            if row[base + s].is_none() {
                row[base + s] = Some(dead);
                self.stats.parked += 1;
                self.stats.resident += 1;
                return None;
            }
        }
        self.stats.freed += 1;
        Some(dead)
    }

    fn flush(&mut self) {
        for slot in self
            .byte_slots
            .iter_mut()
            .chain(self.wide_slots.iter_mut())
        {
            if slot.take().is_some() {
                self.stats.freed += 1;
            }
        }
        self.stats.resident = 0;
    }
}

thread_local! {
    static POOL: RefCell<BufferPool> = RefCell::new(BufferPool::new());
}

/// A cell with capacity for at least `min_len` characters, length 0.
pub(crate) fn acquire(enc: Encoding, min_len: usize) -> BufRef {
    match POOL.try_with(|p| p.borrow_mut().acquire(enc, min_len)) {
        Ok(h) => h,
        // Thread teardown: the table is already gone, allocate plainly.
        Err(_) => buffer::alloc_cell(enc, min_len + RESERVED_SLACK),
    }
}

/// Release path for a cell whose reference count just hit zero.
pub(crate) fn release_cell(ptr: NonNull<StrBuf>) {
    let (dead, caches) = buffer::retire(ptr);
    match POOL.try_with(move |p| p.borrow_mut().park(dead)) {
        // A rejected cell comes back out of the closure so its destruction
        // runs here, after the table borrow ended.
        Ok(rejected) => drop(rejected),
        // Teardown again: the un-run closure dropped `dead` and freed it.
        Err(_) => {}
    }
    // Cache releases re-enter this function; the borrow is gone by now.
    drop(caches);
}

/// Snapshot of this thread's pool counters.
pub fn stats() -> PoolStats {
    POOL.try_with(|p| p.borrow().stats).unwrap_or_default()
}

/// Frees every cell parked on this thread.
pub fn flush() {
    let _ = POOL.try_with(|p| p.borrow_mut().flush());
}
