//! Raw profile serializer
//!
//! Two passes over the same arena state: [`total_size`] says how many
//! bytes the profile needs, [`serialize`] writes exactly that many. Both
//! take a guard over the arena's own lock because they only agree while
//! no node can be linked in between; counts may still move, lengths may
//! not.
//!
//! See [`crate::format`] for the layout.

use crate::arena::{FunctionRecord, ProfileArena};
use crate::config::ProfileConfig;
use crate::error::{ProfError, Result};
use crate::format::{
    self, HEADER_SIZE, MAX_NUM_VALUES_PER_SITE, PointerWidth, RawData32, RawData64, RawHeader,
    VALUE_DATA_HEADER_SIZE, VALUE_KIND_LAST, VALUE_NODE_DATA_SIZE, ValueDataHeader, ValueKind,
    ValueNodeData, ValueRecordHeader,
};
use crate::lock::ProfLockGuard;
use bytemuck::Pod;
use std::sync::atomic::Ordering;

// ============================================================================
// Size calculation
// ============================================================================

/// Size of one function's value data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueSize {
    /// Bytes, value data header included; 0 when nothing is written
    pub bytes: usize,
    /// Kinds with at least one site
    pub kinds: u32,
}

/// Value data size of one function
///
/// Every kind with sites costs a record header and a site count array,
/// even without value storage. Nodes are counted up to the per-site cap.
pub fn record_value_size(arena: &ProfileArena, record: &FunctionRecord) -> ValueSize {
    let mut size = 0usize;
    let mut kinds = 0u32;
    let mut slot = record.value_heads;

    for kind in ValueKind::ALL {
        let sites = record.sites(kind);
        if sites == 0 {
            continue;
        }

        size += format::value_record_size(sites);
        kinds += 1;

        let Some(first) = slot else {
            continue;
        };
        for s in first..first + sites {
            size += live_values(arena, s) * VALUE_NODE_DATA_SIZE;
        }
        slot = Some(first + sites);
    }

    if size > 0 {
        size += VALUE_DATA_HEADER_SIZE;
    }

    ValueSize { bytes: size, kinds }
}

/// Nodes at a site that make it into the profile
fn live_values(arena: &ProfileArena, slot: usize) -> usize {
    arena.site_values(slot).take(MAX_NUM_VALUES_PER_SITE).count()
}

/// Value data size of all functions
pub(crate) fn value_size(arena: &ProfileArena, _guard: &ProfLockGuard<'_>) -> usize {
    arena
        .records()
        .iter()
        .map(|r| record_value_size(arena, r).bytes)
        .sum()
}

/// Exact size of the profile [`serialize`] would write right now
pub(crate) fn total_size(
    arena: &ProfileArena,
    guard: &ProfLockGuard<'_>,
    width: PointerWidth,
) -> usize {
    let names = arena.names().len();
    HEADER_SIZE
        + arena.records().len() * width.data_record_size()
        + arena.counters().len() * size_of::<u64>()
        + names
        + format::padding(names)
        + value_size(arena, guard)
}

// ============================================================================
// Writer
// ============================================================================

/// Bounds-checked cursor over the output buffer
struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&mut [u8]> {
        let end = self.pos + len;
        if end > self.buf.len() {
            return Err(ProfError::BufferTooSmall {
                needed: end,
                available: self.buf.len(),
            });
        }
        let out = &mut self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.take(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    fn pod<T: Pod>(&mut self, value: &T) -> Result<()> {
        self.bytes(bytemuck::bytes_of(value))
    }

    /// Write `len` zero bytes, returning where they start
    fn zeros(&mut self, len: usize) -> Result<usize> {
        let start = self.pos;
        self.take(len)?.fill(0);
        Ok(start)
    }

    fn patch(&mut self, offset: usize, byte: u8) {
        self.buf[offset] = byte;
    }

    fn position(&self) -> usize {
        self.pos
    }
}

/// Write the profile into `buf`, returning the number of bytes written.
///
/// `buf` should be [`total_size`] bytes long; running out of room is
/// reported as [`ProfError::BufferTooSmall`], never an overrun.
pub(crate) fn serialize(
    arena: &ProfileArena,
    _guard: &ProfLockGuard<'_>,
    config: &ProfileConfig,
    buf: &mut [u8],
) -> Result<usize> {
    let mut w = ByteWriter::new(buf);
    let addresses = arena.addresses();
    let names = arena.names().as_bytes();

    w.pod(&RawHeader {
        magic: config.pointer_width.magic(),
        version: format::version_word(config.context_sensitive),
        data_size: arena.records().len() as u64,
        padding_bytes_before_counters: 0,
        counters_size: arena.counters().len() as u64,
        padding_bytes_after_counters: 0,
        names_size: names.len() as u64,
        counters_delta: addresses.counters_base,
        names_delta: addresses.names_base,
        value_kind_last: VALUE_KIND_LAST,
    })?;

    for record in arena.records() {
        write_data_record(&mut w, arena, record, config.pointer_width)?;
    }

    for counter in arena.counters() {
        w.pod(&counter.load(Ordering::Relaxed))?;
    }

    w.bytes(names)?;
    w.zeros(format::padding(names.len()))?;

    for record in arena.records() {
        write_value_data(&mut w, arena, record)?;
    }

    Ok(w.position())
}

fn write_data_record(
    w: &mut ByteWriter<'_>,
    arena: &ProfileArena,
    record: &FunctionRecord,
    width: PointerWidth,
) -> Result<()> {
    let addresses = arena.addresses();
    let counter_ptr = addresses.counters_base + (record.counters.start * size_of::<u64>()) as u64;
    let values = record
        .value_heads
        .map_or(0, |first| addresses.values_base + first as u64 * width.bytes());
    let num_counters = record.num_counters() as u32;

    match width {
        PointerWidth::Bits64 => w.pod(&RawData64 {
            name_ref: record.name_ref,
            func_hash: record.func_hash,
            counter_ptr,
            function_ptr: record.function_addr,
            values,
            num_counters,
            num_value_sites: record.num_value_sites,
        }),
        // Addresses keep their low 32 bits on 32-bit targets
        PointerWidth::Bits32 => w.pod(&RawData32 {
            name_ref: record.name_ref,
            func_hash: record.func_hash,
            counter_ptr: counter_ptr as u32,
            function_ptr: record.function_addr as u32,
            values: values as u32,
            num_counters,
            num_value_sites: record.num_value_sites,
            _pad: 0,
        }),
    }
}

fn write_value_data(
    w: &mut ByteWriter<'_>,
    arena: &ProfileArena,
    record: &FunctionRecord,
) -> Result<()> {
    let size = record_value_size(arena, record);
    if size.kinds == 0 {
        return Ok(());
    }

    // At most 2 * 65535 sites of 255 nodes: well inside u32
    w.pod(&ValueDataHeader {
        total_size: size.bytes as u32,
        num_value_kinds: size.kinds,
    })?;

    let mut slot = record.value_heads;

    for kind in ValueKind::ALL {
        let sites = record.sites(kind);
        if sites == 0 {
            continue;
        }

        w.pod(&ValueRecordHeader {
            kind: kind as u32,
            num_value_sites: sites as u32,
        })?;

        // Counts stay zero without value storage
        let counts = w.zeros(format::align8(sites))?;

        let Some(first) = slot else {
            continue;
        };
        for (n, s) in (first..first + sites).enumerate() {
            let mut count = 0u8;
            for (_, node) in arena.site_values(s).take(MAX_NUM_VALUES_PER_SITE) {
                w.pod(&ValueNodeData {
                    value: node.value(),
                    count: node.count(),
                })?;
                count += 1;
            }
            w.patch(counts + n, count);
        }
        slot = Some(first + sites);
    }

    Ok(())
}
