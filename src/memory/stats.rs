/*!
 * Memory Statistics
 * Per-space byte counters shared by allocators
 */

use super::types::SpaceType;
use crate::core::types::Size;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct SpaceCounters {
    allocated: AtomicUsize,
    freed: AtomicUsize,
    peak_footprint: AtomicUsize,
}

/// Statistics sink, safe to share between threads
#[derive(Debug, Default)]
pub struct MemStats {
    spaces: [SpaceCounters; SpaceType::COUNT],
}

/// Point-in-time view of one space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceStats {
    pub space: SpaceType,
    pub allocated_bytes: Size,
    pub freed_bytes: Size,
    pub footprint_bytes: Size,
    pub peak_footprint_bytes: Size,
}

/// Point-in-time view of every space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemStatsSnapshot {
    pub spaces: Vec<SpaceStats>,
}

impl MemStatsSnapshot {
    pub fn space(&self, space: SpaceType) -> Option<&SpaceStats> {
        self.spaces.iter().find(|s| s.space == space)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl MemStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_allocate(&self, size: Size, space: SpaceType) {
        let counters = &self.spaces[space.index()];
        let allocated = counters.allocated.fetch_add(size, Ordering::Relaxed) + size;
        let footprint = allocated.saturating_sub(counters.freed.load(Ordering::Relaxed));
        counters.peak_footprint.fetch_max(footprint, Ordering::Relaxed);
    }

    pub fn record_free(&self, size: Size, space: SpaceType) {
        self.spaces[space.index()]
            .freed
            .fetch_add(size, Ordering::Relaxed);
    }

    pub fn allocated_bytes(&self, space: SpaceType) -> Size {
        self.spaces[space.index()].allocated.load(Ordering::Relaxed)
    }

    pub fn freed_bytes(&self, space: SpaceType) -> Size {
        self.spaces[space.index()].freed.load(Ordering::Relaxed)
    }

    pub fn footprint(&self, space: SpaceType) -> Size {
        self.allocated_bytes(space)
            .saturating_sub(self.freed_bytes(space))
    }

    pub fn snapshot(&self) -> MemStatsSnapshot {
        let spaces = SpaceType::ALL
            .iter()
            .map(|&space| SpaceStats {
                space,
                allocated_bytes: self.allocated_bytes(space),
                freed_bytes: self.freed_bytes(space),
                footprint_bytes: self.footprint(space),
                peak_footprint_bytes: self.spaces[space.index()]
                    .peak_footprint
                    .load(Ordering::Relaxed),
            })
            .collect();
        MemStatsSnapshot { spaces }
    }
}
