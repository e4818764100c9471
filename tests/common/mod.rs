//! Test-only `.profraw` decoder
//!
//! Walks a raw profile the way `llvm-profdata` would and panics on
//! anything malformed, so tests can assert on decoded structure.

#![allow(dead_code)]

use bytemuck::AnyBitPattern;
use instrprof::format::{
    self, RAW_MAGIC_32, RAW_MAGIC_64, RawData32, RawData64, RawHeader, ValueDataHeader,
    ValueNodeData, ValueRecordHeader,
};

/// One decoded data record, widened to 64 bits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRecord {
    pub name_ref: u64,
    pub func_hash: u64,
    pub counter_ptr: u64,
    pub function_ptr: u64,
    pub values: u64,
    pub num_counters: u32,
    pub num_value_sites: [u16; 2],
}

/// One value kind's record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindRecord {
    pub kind: u32,
    pub site_counts: Vec<u8>,
    pub sites: Vec<Vec<(u64, u64)>>,
}

/// One function's value data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueData {
    pub total_size: u32,
    pub kinds: Vec<KindRecord>,
}

#[derive(Debug, Clone)]
pub struct RawProfile {
    pub header: RawHeader,
    pub data: Vec<DataRecord>,
    pub counters: Vec<u64>,
    pub names: Vec<u8>,
    /// Per data record; `None` for functions without value sites
    pub values: Vec<Option<ValueData>>,
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn bytes(&mut self, len: usize) -> &'a [u8] {
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        out
    }

    fn pod<T: AnyBitPattern>(&mut self) -> T {
        bytemuck::pod_read_unaligned(self.bytes(size_of::<T>()))
    }
}

pub fn decode(buf: &[u8]) -> RawProfile {
    let mut c = Cursor { buf, pos: 0 };
    let header: RawHeader = c.pod();
    assert!(header.magic == RAW_MAGIC_64 || header.magic == RAW_MAGIC_32);
    assert_eq!(header.version & 0xff, format::RAW_VERSION);
    assert_eq!(header.padding_bytes_before_counters, 0);
    assert_eq!(header.padding_bytes_after_counters, 0);
    assert_eq!(header.value_kind_last, 1);

    let data: Vec<DataRecord> = (0..header.data_size)
        .map(|_| {
            if header.magic == RAW_MAGIC_64 {
                let d: RawData64 = c.pod();
                DataRecord {
                    name_ref: d.name_ref,
                    func_hash: d.func_hash,
                    counter_ptr: d.counter_ptr,
                    function_ptr: d.function_ptr,
                    values: d.values,
                    num_counters: d.num_counters,
                    num_value_sites: d.num_value_sites,
                }
            } else {
                let d: RawData32 = c.pod();
                DataRecord {
                    name_ref: d.name_ref,
                    func_hash: d.func_hash,
                    counter_ptr: d.counter_ptr as u64,
                    function_ptr: d.function_ptr as u64,
                    values: d.values as u64,
                    num_counters: d.num_counters,
                    num_value_sites: d.num_value_sites,
                }
            }
        })
        .collect();

    let counters: Vec<u64> = (0..header.counters_size).map(|_| c.pod()).collect();
    let names = c.bytes(header.names_size as usize).to_vec();
    let padding = c.bytes(format::padding(names.len()));
    assert!(padding.iter().all(|&b| b == 0));

    let values = data
        .iter()
        .map(|d| {
            if d.num_value_sites.iter().all(|&s| s == 0) {
                return None;
            }
            let start = c.pos;
            let vd: ValueDataHeader = c.pod();
            let kinds = (0..vd.num_value_kinds)
                .map(|_| {
                    let rec: ValueRecordHeader = c.pod();
                    let sites = rec.num_value_sites as usize;
                    let counts = c.bytes(format::align8(sites))[..sites].to_vec();
                    let sites = counts
                        .iter()
                        .map(|&n| {
                            (0..n)
                                .map(|_| {
                                    let node: ValueNodeData = c.pod();
                                    (node.value, node.count)
                                })
                                .collect()
                        })
                        .collect();
                    KindRecord {
                        kind: rec.kind,
                        site_counts: counts,
                        sites,
                    }
                })
                .collect();
            assert_eq!(c.pos - start, vd.total_size as usize);
            Some(ValueData {
                total_size: vd.total_size,
                kinds,
            })
        })
        .collect();

    assert_eq!(c.pos, buf.len(), "trailing bytes after value data");

    RawProfile {
        header,
        data,
        counters,
        names,
        values,
    }
}
