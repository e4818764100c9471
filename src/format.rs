//! LLVM raw profile format
//!
//! Byte layout of a `.profraw` file (raw version 5), as read by
//! `llvm-profdata`:
//!
//! ```text
//! RawHeader
//! data records          (one per instrumented function)
//! counters              (u64 each)
//! names                 (opaque blob)
//! zero padding to 8 bytes
//! for each data record with value data:
//!     ValueDataHeader
//!     for each value kind with sites:
//!         ValueRecordHeader
//!         site count array  (u8 per site, padded to 8)
//!         ValueNodeData...  (per site, in list order)
//! ```
//!
//! Every field is written in native byte order; the reader detects the
//! byte order from the magic. None of this is negotiable: field order,
//! widths and padding must match the LLVM tooling exactly.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Magic for profiles produced with 64-bit pointers
pub const RAW_MAGIC_64: u64 = (255u64 << 56)
    | (b'l' as u64) << 48
    | (b'p' as u64) << 40
    | (b'r' as u64) << 32
    | (b'o' as u64) << 24
    | (b'f' as u64) << 16
    | (b'r' as u64) << 8
    | 129;

/// Magic for profiles produced with 32-bit pointers
pub const RAW_MAGIC_32: u64 = (255u64 << 56)
    | (b'l' as u64) << 48
    | (b'p' as u64) << 40
    | (b'r' as u64) << 32
    | (b'o' as u64) << 24
    | (b'f' as u64) << 16
    | (b'R' as u64) << 8
    | 129;

/// Raw format version
pub const RAW_VERSION: u64 = 5;

/// Version bit: profile was produced by IR-level instrumentation
pub const VARIANT_MASK_IR_PROF: u64 = 1 << 56;

/// Version bit: profile is context-sensitive IR instrumentation
pub const VARIANT_MASK_CSIR_PROF: u64 = 1 << 57;

/// Alignment of every section boundary
pub const DATA_ALIGNMENT: usize = 8;

/// Upper bound on tracked values per value site
pub const MAX_NUM_VALUES_PER_SITE: usize = 255;

/// Number of value kinds
pub const VALUE_KIND_COUNT: usize = 2;

/// Last valid value kind id, written into the header
pub const VALUE_KIND_LAST: u64 = (VALUE_KIND_COUNT - 1) as u64;

/// Categories of tracked values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ValueKind {
    /// Indirect call targets
    IndirectCallTarget = 0,
    /// Sizes passed to memory intrinsics (memcpy, memset, ...)
    MemOpSize = 1,
}

impl ValueKind {
    pub const ALL: [ValueKind; VALUE_KIND_COUNT] =
        [ValueKind::IndirectCallTarget, ValueKind::MemOpSize];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Pointer width of the instrumented target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PointerWidth {
    #[serde(rename = "32")]
    Bits32,
    #[default]
    #[serde(rename = "64")]
    Bits64,
}

impl PointerWidth {
    /// Header magic for this width
    pub fn magic(self) -> u64 {
        match self {
            PointerWidth::Bits32 => RAW_MAGIC_32,
            PointerWidth::Bits64 => RAW_MAGIC_64,
        }
    }

    /// Size of one pointer in bytes
    pub fn bytes(self) -> u64 {
        match self {
            PointerWidth::Bits32 => 4,
            PointerWidth::Bits64 => 8,
        }
    }

    /// Size of one serialized data record
    pub fn data_record_size(self) -> usize {
        match self {
            PointerWidth::Bits32 => size_of::<RawData32>(),
            PointerWidth::Bits64 => size_of::<RawData64>(),
        }
    }
}

// ============================================================================
// On-disk records
// ============================================================================

/// File header: ten 64-bit fields
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct RawHeader {
    pub magic: u64,
    pub version: u64,
    /// Number of data records
    pub data_size: u64,
    /// Always zero
    pub padding_bytes_before_counters: u64,
    /// Number of counters
    pub counters_size: u64,
    /// Always zero
    pub padding_bytes_after_counters: u64,
    /// Length of the names blob in bytes
    pub names_size: u64,
    /// Base address of the counters section
    pub counters_delta: u64,
    /// Base address of the names section
    pub names_delta: u64,
    pub value_kind_last: u64,
}

/// Per-function data record, 64-bit pointer layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct RawData64 {
    pub name_ref: u64,
    pub func_hash: u64,
    pub counter_ptr: u64,
    pub function_ptr: u64,
    pub values: u64,
    pub num_counters: u32,
    pub num_value_sites: [u16; VALUE_KIND_COUNT],
}

/// Per-function data record, 32-bit pointer layout
///
/// The trailing pad comes from the record's 8-byte alignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct RawData32 {
    pub name_ref: u64,
    pub func_hash: u64,
    pub counter_ptr: u32,
    pub function_ptr: u32,
    pub values: u32,
    pub num_counters: u32,
    pub num_value_sites: [u16; VALUE_KIND_COUNT],
    pub _pad: u32,
}

/// Header of one function's value data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ValueDataHeader {
    /// Total size in bytes, this header included
    pub total_size: u32,
    /// Number of kinds with at least one site
    pub num_value_kinds: u32,
}

/// Header of one value kind's record; the site count array follows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ValueRecordHeader {
    pub kind: u32,
    pub num_value_sites: u32,
}

/// One tracked value as it appears on disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ValueNodeData {
    pub value: u64,
    pub count: u64,
}

pub const HEADER_SIZE: usize = size_of::<RawHeader>();
pub const VALUE_DATA_HEADER_SIZE: usize = size_of::<ValueDataHeader>();
pub const VALUE_RECORD_HEADER_SIZE: usize = size_of::<ValueRecordHeader>();
pub const VALUE_NODE_DATA_SIZE: usize = size_of::<ValueNodeData>();

/// Round `n` up to the next multiple of [`DATA_ALIGNMENT`]
pub const fn align8(n: usize) -> usize {
    n.div_ceil(DATA_ALIGNMENT) * DATA_ALIGNMENT
}

/// Zero bytes needed after a section of `size` bytes
pub const fn padding(size: usize) -> usize {
    7 & (DATA_ALIGNMENT - size % DATA_ALIGNMENT)
}

/// Size of one value kind's record header plus its site count array
pub const fn value_record_size(sites: usize) -> usize {
    VALUE_RECORD_HEADER_SIZE + align8(sites)
}

/// Build the header version word
pub fn version_word(context_sensitive: bool) -> u64 {
    let mut version = VARIANT_MASK_IR_PROF | RAW_VERSION;
    if context_sensitive {
        version |= VARIANT_MASK_CSIR_PROF;
    }
    version
}
