//! Instrumentation hot path
//!
//! Called from compiler-inserted code at every profiled site, so it must be
//! cheap and must never fail:
//! - Counter increments are single relaxed atomic adds
//! - Looking a value up in a site's list happens without the lock
//! - Only linking a new node takes the arena's lock
//!
//! Each site keeps at most [`MAX_NUM_VALUES_PER_SITE`] values. Once a site
//! is full it becomes a Space-Saving style estimator: a new value
//! decrements the least-seen node (first one wins ties) and takes its
//! place only when that count reaches zero. Counts are approximate from
//! then on.
//!
//! Relaxed consistency: a walker racing a link on another core may miss
//! the node being linked (and allocate a second node for the same value),
//! and two walkers can both find the list short and both allocate. The
//! second link then finds the tail already taken and the node is left
//! unlinked, which costs one arena slot and nothing else.

use crate::arena::{ProfileArena, RecordId, ValueNode};
use crate::format::MAX_NUM_VALUES_PER_SITE;
use std::sync::atomic::Ordering;

/// Bump one of a function's counters; out-of-range is ignored
pub fn increment_counter(arena: &ProfileArena, record: RecordId, counter: u32) {
    let Some(record) = arena.record(record) else {
        return;
    };
    if let Some(c) = arena.record_counters(record).get(counter as usize) {
        c.fetch_add(1, Ordering::Relaxed);
    }
}

/// Count one occurrence of `target` at value site `site_index` of `record`.
///
/// `site_index` is the flattened (kind, site) position. Unknown records,
/// records without value storage and out-of-range sites are ignored.
pub fn instrument_target(
    arena: &ProfileArena,
    record: RecordId,
    site_index: u32,
    target: u64,
) {
    let Some(slot) = arena
        .record(record)
        .and_then(|r| r.head_slot(site_index))
    else {
        return;
    };

    let mut min: Option<&ValueNode> = None;
    let mut min_count = u64::MAX;
    let mut tail: Option<&ValueNode> = None;
    let mut values = 0usize;

    for (_, node) in arena.site_values(slot) {
        if node.value() == target {
            node.hit();
            return;
        }

        let count = node.count();
        if count < min_count {
            min_count = count;
            min = Some(node);
        }

        tail = Some(node);
        values += 1;
    }

    if values >= MAX_NUM_VALUES_PER_SITE {
        if let Some(min) = min {
            evict(min, target);
        }
        return;
    }

    let guard = arena.lock().lock();

    let Some(index) = arena.nodes().allocate(&guard) else {
        return;
    };
    arena.nodes().get(index).replace(target);

    if !arena.link_head(slot, index) {
        if let Some(tail) = tail {
            tail.link_next(index);
        }
    }
}

/// Decrement the least-seen node; replace its value once it hits zero
fn evict(node: &ValueNode, target: u64) {
    let count = node.count();
    if count <= 1 {
        node.replace(target);
    } else {
        node.set_count(count - 1);
    }
}

/// Map `value` onto the range representative the compiler asked for, then
/// record it.
///
/// `large_value == i64::MIN` means the site has no "large" bucket.
pub fn instrument_range(
    arena: &ProfileArena,
    record: RecordId,
    site_index: u32,
    value: u64,
    precise_start: i64,
    precise_last: i64,
    large_value: i64,
) {
    let value = range_bucket(value, precise_start, precise_last, large_value);
    instrument_target(arena, record, site_index, value);
}

/// Record the size passed to a memory intrinsic, bucketed by
/// [`range_rep_value`]
pub fn instrument_memop(arena: &ProfileArena, record: RecordId, site_index: u32, size: u64) {
    instrument_target(arena, record, site_index, range_rep_value(size));
}

/// Representative of `value` within a precise window
pub fn range_bucket(value: u64, precise_start: i64, precise_last: i64, large_value: i64) -> u64 {
    let signed = value as i64;
    if large_value != i64::MIN && signed >= large_value {
        large_value as u64
    } else if signed < precise_start || signed > precise_last {
        precise_last.wrapping_add(1) as u64
    } else {
        value
    }
}

/// Representative of a memory operation size.
///
/// Sizes up to 8 are tracked individually, powers of two are kept, every
/// other size collapses to the previous power of two plus one, and
/// everything from 513 up is one bucket.
pub fn range_rep_value(value: u64) -> u64 {
    if value <= 8 {
        value
    } else if value >= 513 {
        513
    } else if value.is_power_of_two() {
        value
    } else {
        (1u64 << (63 - value.leading_zeros())) + 1
    }
}
