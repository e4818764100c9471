//! Profile arena
//!
//! The sections the compiler lays out at link time: function records,
//! counters, names, value-node head slots and value nodes. Their sizes
//! never change after [`ArenaBuilder::build`]; only their contents do.
//!
//! Design principles:
//! - Arenas are values, not globals: the runtime owns one, tests build
//!   small synthetic ones
//! - Links are indices, never pointers
//! - Nothing is ever freed
//! - The arena owns its lock, so every guard that reaches the allocator
//!   or the serializer is a guard over this arena

pub mod names;
pub mod node;
pub mod record;

pub use names::NameBlob;
pub use node::{ListIter, NodeArena, NodeIndex, ValueNode};
pub use record::{FunctionRecord, RecordId};

use crate::error::{ProfError, Result};
use crate::format::VALUE_KIND_COUNT;
use crate::lock::{IrqControl, ProfLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Synthetic load addresses of the sections
///
/// The raw format stores absolute addresses; readers only use them
/// relative to the bases in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressMap {
    pub counters_base: u64,
    pub names_base: u64,
    pub values_base: u64,
}

impl Default for AddressMap {
    fn default() -> Self {
        Self {
            counters_base: 0x0010_0000,
            names_base: 0x0020_0000,
            values_base: 0x0030_0000,
        }
    }
}

/// The live profile sections
#[derive(Debug)]
pub struct ProfileArena {
    records: Box<[FunctionRecord]>,
    counters: Box<[AtomicU64]>,
    names: NameBlob,
    heads: Box<[AtomicU32]>,
    nodes: NodeArena,
    addresses: AddressMap,
    lock: ProfLock,
}

impl ProfileArena {
    /// The lock guarding node allocation, serialization and reset
    pub fn lock(&self) -> &ProfLock {
        &self.lock
    }

    pub fn records(&self) -> &[FunctionRecord] {
        &self.records
    }

    pub fn record(&self, id: RecordId) -> Option<&FunctionRecord> {
        self.records.get(id.index())
    }

    pub fn counters(&self) -> &[AtomicU64] {
        &self.counters
    }

    /// Current value of every counter
    pub fn counter_values(&self) -> Vec<u64> {
        self.counters
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }

    /// A record's counters
    pub fn record_counters(&self, record: &FunctionRecord) -> &[AtomicU64] {
        &self.counters[record.counters.clone()]
    }

    pub fn names(&self) -> &NameBlob {
        &self.names
    }

    pub fn nodes(&self) -> &NodeArena {
        &self.nodes
    }

    pub fn addresses(&self) -> AddressMap {
        self.addresses
    }

    /// Number of head slots across all records
    pub fn head_count(&self) -> usize {
        self.heads.len()
    }

    /// First node of the list in head slot `slot`; `None` for an empty
    /// list or a slot out of range
    pub fn head(&self, slot: usize) -> Option<NodeIndex> {
        self.heads
            .get(slot)
            .and_then(|h| NodeIndex::from_raw(h.load(Ordering::Acquire)))
    }

    /// Install `node` as the head of an empty list
    pub(crate) fn link_head(&self, slot: usize, node: NodeIndex) -> bool {
        self.heads.get(slot).is_some_and(|h| {
            h.compare_exchange(0, node.to_raw(), Ordering::Release, Ordering::Relaxed)
                .is_ok()
        })
    }

    /// Walk the list in head slot `slot`; empty when out of range
    pub fn site_values(&self, slot: usize) -> ListIter<'_> {
        self.nodes.iter(self.head(slot))
    }

    /// Number of nodes linked at head slot `slot`
    pub fn site_len(&self, slot: usize) -> usize {
        self.site_values(slot).count()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Description of one instrumented function, as emitted by the compiler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name_ref: u64,
    pub func_hash: u64,
    pub function_addr: u64,
    pub num_counters: u32,
    pub num_value_sites: [u16; VALUE_KIND_COUNT],
    /// Allocate head slots for this function's value sites
    pub value_storage: bool,
}

impl FunctionSpec {
    pub fn new(name_ref: u64, func_hash: u64, num_counters: u32) -> Self {
        Self {
            name_ref,
            func_hash,
            num_counters,
            ..Self::default()
        }
    }

    pub fn function_addr(mut self, addr: u64) -> Self {
        self.function_addr = addr;
        self
    }

    /// Declare value sites; storage is allocated for them
    pub fn value_sites(mut self, indirect_calls: u16, mem_ops: u16) -> Self {
        self.num_value_sites = [indirect_calls, mem_ops];
        self.value_storage = indirect_calls > 0 || mem_ops > 0;
        self
    }

    /// Keep the declared sites but give the function no value storage
    pub fn without_value_storage(mut self) -> Self {
        self.value_storage = false;
        self
    }
}

/// Lays out a [`ProfileArena`]
#[derive(Clone, Default)]
pub struct ArenaBuilder {
    functions: Vec<FunctionSpec>,
    names: NameBlob,
    node_capacity: usize,
    addresses: AddressMap,
    irq: Option<Arc<dyn IrqControl>>,
}

impl ArenaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function; ids are assigned in insertion order
    pub fn function(mut self, spec: FunctionSpec) -> Self {
        self.functions.push(spec);
        self
    }

    pub fn names(mut self, names: NameBlob) -> Self {
        self.names = names;
        self
    }

    /// Number of value node slots, the reserved nil slot included
    pub fn node_capacity(mut self, capacity: usize) -> Self {
        self.node_capacity = capacity;
        self
    }

    pub fn addresses(mut self, addresses: AddressMap) -> Self {
        self.addresses = addresses;
        self
    }

    /// Mask interrupts through `irq` while the arena's lock is held
    pub fn irq(mut self, irq: Arc<dyn IrqControl>) -> Self {
        self.irq = Some(irq);
        self
    }

    pub fn build(self) -> Result<ProfileArena> {
        if self.node_capacity > u32::MAX as usize {
            return Err(ProfError::InvalidLayout(format!(
                "node capacity {} exceeds {}",
                self.node_capacity,
                u32::MAX
            )));
        }
        if self.functions.len() > u32::MAX as usize {
            return Err(ProfError::InvalidLayout(format!(
                "{} functions exceed the record id space",
                self.functions.len()
            )));
        }

        let mut records = Vec::with_capacity(self.functions.len());
        let mut counter_offset = 0usize;
        let mut head_offset = 0usize;

        for spec in &self.functions {
            let end = counter_offset
                .checked_add(spec.num_counters as usize)
                .ok_or_else(|| ProfError::InvalidLayout("counter offset overflow".into()))?;
            let counters = counter_offset..end;
            counter_offset = end;

            let total_sites: usize = spec.num_value_sites.iter().map(|&s| s as usize).sum();
            let value_heads = if spec.value_storage && total_sites > 0 {
                let first = head_offset;
                head_offset += total_sites;
                Some(first)
            } else {
                None
            };

            records.push(FunctionRecord {
                name_ref: spec.name_ref,
                func_hash: spec.func_hash,
                function_addr: spec.function_addr,
                counters,
                value_heads,
                num_value_sites: spec.num_value_sites,
            });
        }

        Ok(ProfileArena {
            records: records.into_boxed_slice(),
            counters: (0..counter_offset).map(|_| AtomicU64::new(0)).collect(),
            names: self.names,
            heads: (0..head_offset).map(|_| AtomicU32::new(0)).collect(),
            nodes: NodeArena::new(self.node_capacity),
            addresses: self.addresses,
            lock: self.irq.map_or_else(ProfLock::new, ProfLock::with_irq),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_arena() -> ProfileArena {
        ArenaBuilder::new()
            .function(FunctionSpec::new(1, 11, 3).value_sites(2, 1))
            .function(FunctionSpec::new(2, 22, 1))
            .function(FunctionSpec::new(3, 33, 2).value_sites(0, 4))
            .names(NameBlob::from_names(["a", "b", "c"]))
            .node_capacity(16)
            .build()
            .unwrap()
    }

    #[test]
    fn test_counter_ranges_are_contiguous() {
        let arena = sample_arena();
        let ranges: Vec<_> = arena.records().iter().map(|r| r.counters.clone()).collect();
        assert_eq!(ranges, vec![0..3, 3..4, 4..6]);
        assert_eq!(arena.counters().len(), 6);
    }

    #[test]
    fn test_head_slots_only_for_value_storage() {
        let arena = sample_arena();
        let heads: Vec<_> = arena.records().iter().map(|r| r.value_heads).collect();
        assert_eq!(heads, vec![Some(0), None, Some(3)]);
        assert_eq!(arena.head_count(), 7);
    }

    #[test]
    fn test_without_value_storage() {
        let arena = ArenaBuilder::new()
            .function(FunctionSpec::new(1, 1, 1).value_sites(1, 0).without_value_storage())
            .build()
            .unwrap();
        let record = &arena.records()[0];
        assert_eq!(record.num_value_sites, [1, 0]);
        assert!(!record.has_value_storage());
        assert_eq!(arena.head_count(), 0);
    }

    #[test]
    fn test_link_head_once() {
        let arena = sample_arena();
        let guard = arena.lock().lock();

        let a = arena.nodes().allocate(&guard).unwrap();
        let b = arena.nodes().allocate(&guard).unwrap();
        assert!(arena.link_head(0, a));
        assert!(!arena.link_head(0, b));
        assert_eq!(arena.head(0), Some(a));
        assert_eq!(arena.site_len(0), 1);
        assert_eq!(arena.site_len(1), 0);
    }

    #[test]
    fn test_out_of_range_slot_is_empty() {
        let arena = sample_arena();
        let guard = arena.lock().lock();
        let node = arena.nodes().allocate(&guard).unwrap();

        assert_eq!(arena.head(arena.head_count()), None);
        assert_eq!(arena.site_len(usize::MAX), 0);
        assert!(!arena.link_head(arena.head_count(), node));
    }

    #[test]
    fn test_rejects_oversized_node_arena() {
        let err = ArenaBuilder::new()
            .node_capacity(u32::MAX as usize + 1)
            .build()
            .unwrap_err();
        assert!(matches!(err, ProfError::InvalidLayout(_)));
    }
}
