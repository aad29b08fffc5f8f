//! Mark-sweep garbage collector
//!
//! Collection runs lazily, when allocation finds the free list exhausted.
//! The arena is not compacted; reclaimed slots are threaded back onto the
//! free list and their stamps bumped so stale handles are caught on read.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{LispError, LispResult};
use crate::heap::{Heap, SweepOutcome};
use crate::value::ValueRef;

/// Garbage collector statistics
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Total number of collections
    pub collections: usize,

    /// Total slots reclaimed
    pub slots_reclaimed: usize,

    /// Total pause time across all collections
    pub total_pause_time: Duration,

    /// Last collection duration
    pub last_pause_time: Duration,

    /// Slots marked in last collection
    pub last_marked_count: usize,

    /// Slots reclaimed in last collection
    pub last_reclaimed_count: usize,

    /// Live slots after last collection
    pub live_slots: usize,

    /// Arena usage in percent after last collection
    pub last_usage_percent: usize,
}

impl GcStats {
    fn update(&mut self, pause_time: Duration, marked: usize, reclaimed: usize, live: usize, usage: usize) {
        self.collections += 1;
        self.slots_reclaimed += reclaimed;
        self.total_pause_time += pause_time;
        self.last_pause_time = pause_time;
        self.last_marked_count = marked;
        self.last_reclaimed_count = reclaimed;
        self.live_slots = live;
        self.last_usage_percent = usage;
    }
}

/// Mark-sweep collector over the value arena.
pub struct Collector {
    /// Usage above which a finished cycle reports out-of-memory.
    max_usage_percent: u8,
    stats: GcStats,
}

impl Collector {
    pub fn new(max_usage_percent: u8) -> Self {
        Collector { max_usage_percent, stats: GcStats::default() }
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Run one full cycle: mark from the permanent region and `roots`, sweep
    /// the rest, then refuse to continue if the arena is still too full.
    pub fn collect(
        &mut self,
        heap: &mut Heap,
        roots: impl IntoIterator<Item = ValueRef>,
    ) -> LispResult<SweepOutcome> {
        let start = Instant::now();
        let generation = heap.advance_generation();

        let mut worklist = Vec::new();
        heap.mark_permanent(&mut worklist)?;
        for root in roots {
            heap.mark_value(root, &mut worklist)?;
        }
        heap.process_worklist(&mut worklist)?;
        let marked = heap.marked_count();

        let outcome = heap.sweep();
        let usage = heap.usage_percent();
        self.stats
            .update(start.elapsed(), marked, outcome.reclaimed, heap.live_count(), usage);

        debug!(
            generation,
            marked,
            reclaimed = outcome.reclaimed,
            free = outcome.free,
            usage,
            "collection finished"
        );

        if usage > self.max_usage_percent as usize {
            return Err(LispError::OutOfMemory {
                live: heap.live_count(),
                capacity: heap.capacity(),
            });
        }
        Ok(outcome)
    }
}
