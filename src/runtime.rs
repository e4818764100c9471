//! The profile runtime
//!
//! Owns the arena (and with it the profile lock) and the configuration,
//! and is what the rest of the kernel holds on to. Instrumentation entry points forward to
//! [`crate::instrument`]; consumers call [`ProfileRuntime::open`] and
//! [`ProfileRuntime::reset`].

use crate::arena::{ProfileArena, RecordId};
use crate::config::ProfileConfig;
use crate::error::Result;
use crate::instrument;
use crate::lock::ProfLock;
use crate::serialize;
use crate::snapshot::Snapshot;
use std::sync::atomic::Ordering;
use tracing::debug;

/// Arena usage figures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    pub functions: usize,
    pub counters: usize,
    pub value_sites: usize,
    pub nodes_allocated: usize,
    /// Node slots, the nil slot included
    pub node_capacity: usize,
}

/// Live profile state and its configuration
///
/// Interrupt masking is set up on the arena, see [`crate::ArenaBuilder::irq`].
#[derive(Debug)]
pub struct ProfileRuntime {
    arena: ProfileArena,
    config: ProfileConfig,
}

impl ProfileRuntime {
    pub fn new(arena: ProfileArena, config: ProfileConfig) -> Self {
        Self { arena, config }
    }

    pub fn arena(&self) -> &ProfileArena {
        &self.arena
    }

    pub fn lock(&self) -> &ProfLock {
        self.arena.lock()
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            functions: self.arena.records().len(),
            counters: self.arena.counters().len(),
            value_sites: self.arena.head_count(),
            nodes_allocated: self.arena.nodes().allocated(),
            node_capacity: self.arena.nodes().capacity(),
        }
    }

    // ========================================================================
    // Instrumentation
    // ========================================================================

    pub fn increment_counter(&self, record: RecordId, counter: u32) {
        instrument::increment_counter(&self.arena, record, counter);
    }

    pub fn instrument_target(&self, record: RecordId, site_index: u32, target: u64) {
        instrument::instrument_target(&self.arena, record, site_index, target);
    }

    pub fn instrument_range(
        &self,
        record: RecordId,
        site_index: u32,
        value: u64,
        precise_start: i64,
        precise_last: i64,
        large_value: i64,
    ) {
        instrument::instrument_range(
            &self.arena,
            record,
            site_index,
            value,
            precise_start,
            precise_last,
            large_value,
        );
    }

    pub fn instrument_memop(&self, record: RecordId, site_index: u32, size: u64) {
        instrument::instrument_memop(&self.arena, record, site_index, size);
    }

    // ========================================================================
    // Consumers
    // ========================================================================

    /// Size a snapshot taken now would have
    pub fn serialized_size(&self) -> usize {
        let guard = self.arena.lock().lock();
        serialize::total_size(&self.arena, &guard, self.config.pointer_width)
    }

    /// Take a consistent snapshot of all counters and value data
    pub fn open(&self) -> Result<Snapshot> {
        Snapshot::capture(&self.arena, &self.config)
    }

    /// Zero every counter and every value count.
    ///
    /// Values, links and the allocator position stay as they are, so sites
    /// keep their nodes. Runs under the lock so a snapshot never sees a
    /// half-reset arena; fast-path increments racing the reset may land
    /// on either side of it.
    pub fn reset(&self) {
        let _guard = self.arena.lock().lock();

        for counter in self.arena.counters() {
            counter.store(0, Ordering::Relaxed);
        }

        for record in self.arena.records() {
            for slot in record.head_slots() {
                for (_, node) in self.arena.site_values(slot) {
                    node.set_count(0);
                }
            }
        }

        debug!("profile counters reset");
    }
}
