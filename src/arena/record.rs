//! Per-function descriptors

use crate::format::{VALUE_KIND_COUNT, ValueKind};
use std::ops::Range;

/// Index of a function record in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub u32);

impl RecordId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Build-time descriptor of one instrumented function
///
/// Everything here is fixed once the arena is built. The counters and
/// value nodes it refers to are mutated at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRecord {
    /// Reference to the function's name (MD5 of the PGO name)
    pub name_ref: u64,
    /// Structural hash of the function body
    pub func_hash: u64,
    /// Address of the function's code
    pub function_addr: u64,
    /// This function's slice of the counter array
    pub counters: Range<usize>,
    /// First head slot of this function's value sites; `None` when the
    /// function has no value storage
    pub value_heads: Option<usize>,
    /// Number of value sites per value kind
    pub num_value_sites: [u16; VALUE_KIND_COUNT],
}

impl FunctionRecord {
    pub fn num_counters(&self) -> usize {
        self.counters.len()
    }

    /// Number of sites of one kind
    pub fn sites(&self, kind: ValueKind) -> usize {
        self.num_value_sites[kind.index()] as usize
    }

    /// Number of value sites over all kinds
    pub fn total_sites(&self) -> usize {
        self.num_value_sites.iter().map(|&s| s as usize).sum()
    }

    pub fn has_value_storage(&self) -> bool {
        self.value_heads.is_some()
    }

    /// Head slot of a flattened (kind, site) index, if in range
    pub fn head_slot(&self, site_index: u32) -> Option<usize> {
        let first = self.value_heads?;
        let site_index = site_index as usize;
        (site_index < self.total_sites()).then_some(first + site_index)
    }

    /// Head slots of all sites, kind by kind
    pub fn head_slots(&self) -> Range<usize> {
        match self.value_heads {
            Some(first) => first..first + self.total_sites(),
            None => 0..0,
        }
    }
}
