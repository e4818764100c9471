//! Profile snapshots
//!
//! A snapshot is one consistent serialization of the arena, taken under
//! the arena's lock and then owned by whoever opened it. Instrumentation
//! keeps running afterwards without touching the snapshot's bytes.
//!
//! [`SnapshotTable`] exposes snapshots the way a virtual file is exposed:
//! open returns a handle, reads copy byte ranges, release frees it.

use crate::arena::ProfileArena;
use crate::config::ProfileConfig;
use crate::error::{ProfError, Result};
use crate::runtime::ProfileRuntime;
use crate::serialize;
use slab::Slab;
use tracing::debug;

/// One serialized profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    buf: Box<[u8]>,
}

impl Snapshot {
    /// Serialize the arena under its lock.
    ///
    /// Fails with [`ProfError::OutOfMemory`] when the buffer cannot be
    /// allocated or is larger than `config.max_snapshot_bytes`.
    pub fn capture(arena: &ProfileArena, config: &ProfileConfig) -> Result<Self> {
        let guard = arena.lock().lock();

        let size = serialize::total_size(arena, &guard, config.pointer_width);
        if let Some(max) = config.max_snapshot_bytes {
            if size > max {
                return Err(ProfError::OutOfMemory { requested: size });
            }
        }

        let mut buf = Vec::new();
        buf.try_reserve_exact(size)
            .map_err(|_| ProfError::OutOfMemory { requested: size })?;
        buf.resize(size, 0);

        let written = serialize::serialize(arena, &guard, config, &mut buf)?;
        drop(guard);

        if written != size {
            return Err(ProfError::SizeMismatch {
                computed: size,
                written,
            });
        }

        debug!(size, "profile snapshot taken");
        Ok(Self {
            buf: buf.into_boxed_slice(),
        })
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Copy bytes starting at `offset` into `buf`, returning how many were
    /// copied. Reads at or past the end copy nothing.
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> usize {
        if offset >= self.buf.len() {
            return 0;
        }
        let available = self.buf.len() - offset;
        let to_read = buf.len().min(available);
        buf[..to_read].copy_from_slice(&self.buf[offset..offset + to_read]);
        to_read
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.into_vec()
    }
}

/// A snapshot handle
pub type SnapshotHandle = usize;

/// Open snapshots, keyed by handle
#[derive(Debug, Default)]
pub struct SnapshotTable {
    snapshots: Slab<Snapshot>,
}

impl SnapshotTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a snapshot of `runtime` and hand out a handle to it
    pub fn open(&mut self, runtime: &ProfileRuntime) -> Result<SnapshotHandle> {
        let snapshot = runtime.open()?;
        Ok(self.insert(snapshot))
    }

    /// Register an already captured snapshot
    pub fn insert(&mut self, snapshot: Snapshot) -> SnapshotHandle {
        self.snapshots.insert(snapshot)
    }

    pub fn get(&self, handle: SnapshotHandle) -> Option<&Snapshot> {
        self.snapshots.get(handle)
    }

    /// Copy bytes of an open snapshot.
    ///
    /// A handle with no snapshot is [`ProfError::NoSnapshot`]; a read past
    /// the end is `Ok(0)`.
    pub fn read(&self, handle: SnapshotHandle, offset: usize, buf: &mut [u8]) -> Result<usize> {
        self.snapshots
            .get(handle)
            .map(|s| s.read(offset, buf))
            .ok_or(ProfError::NoSnapshot)
    }

    /// Free a snapshot
    pub fn release(&mut self, handle: SnapshotHandle) -> Result<Snapshot> {
        self.snapshots.try_remove(handle).ok_or(ProfError::NoSnapshot)
    }

    /// Number of open snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{ArenaBuilder, FunctionSpec, RecordId};
    use crate::format::HEADER_SIZE;

    fn arena() -> ProfileArena {
        ArenaBuilder::new()
            .function(FunctionSpec::new(1, 1, 2))
            .build()
            .unwrap()
    }

    #[test]
    fn test_capture_size() {
        let arena = arena();
        let snapshot = Snapshot::capture(&arena, &ProfileConfig::default()).unwrap();
        assert_eq!(snapshot.len(), HEADER_SIZE + 48 + 16);
    }

    #[test]
    fn test_read_ranges() {
        let snapshot = Snapshot {
            buf: (0u8..10).collect(),
        };

        let mut buf = [0u8; 4];
        assert_eq!(snapshot.read(0, &mut buf), 4);
        assert_eq!(buf, [0, 1, 2, 3]);

        // Short read at the end
        assert_eq!(snapshot.read(8, &mut buf), 2);
        assert_eq!(&buf[..2], &[8, 9]);

        assert_eq!(snapshot.read(10, &mut buf), 0);
        assert_eq!(snapshot.read(usize::MAX, &mut buf), 0);
    }

    #[test]
    fn test_snapshot_ceiling() {
        let arena = arena();
        let config = ProfileConfig {
            max_snapshot_bytes: Some(HEADER_SIZE),
            ..ProfileConfig::default()
        };
        let err = Snapshot::capture(&arena, &config).unwrap_err();
        assert!(matches!(err, ProfError::OutOfMemory { requested } if requested == 144));
        assert!(!arena.lock().is_locked());
    }

    #[test]
    fn test_table_lifecycle() {
        let rt = ProfileRuntime::new(arena(), ProfileConfig::default());
        let mut table = SnapshotTable::new();

        rt.increment_counter(RecordId(0), 0);
        let handle = table.open(&rt).unwrap();
        assert_eq!(table.len(), 1);

        let mut buf = [0u8; 8];
        assert_eq!(table.read(handle, HEADER_SIZE + 48, &mut buf).unwrap(), 8);
        assert_eq!(u64::from_ne_bytes(buf), 1);

        let snapshot = table.release(handle).unwrap();
        assert_eq!(snapshot.len(), HEADER_SIZE + 48 + 16);
        assert!(table.is_empty());

        assert!(matches!(
            table.read(handle, 0, &mut buf),
            Err(ProfError::NoSnapshot)
        ));
        assert!(matches!(table.release(handle), Err(ProfError::NoSnapshot)));
    }
}
