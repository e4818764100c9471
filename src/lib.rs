//! instrprof - LLVM raw profile export for freestanding kernels
//!
//! Compiler-inserted instrumentation writes into counter and value-node
//! sections that are laid out at build time. This crate keeps those
//! sections, records value profiles into them, and serializes them into
//! the `.profraw` format `llvm-profdata` reads.
//!
//! Design principles:
//! - Fixed memory: every section is sized up front, nothing grows or frees
//! - The hot path never fails: a full arena drops observations
//! - One lock, held only for node allocation, snapshots and reset
//! - Byte-exact output: the size calculator and serializer always agree
//!
//! ```no_run
//! use instrprof::{ArenaBuilder, FunctionSpec, NameBlob, ProfileConfig, ProfileRuntime, RecordId};
//!
//! let arena = ArenaBuilder::new()
//!     .function(FunctionSpec::new(0x1234, 0x5678, 2).value_sites(1, 1))
//!     .names(NameBlob::from_names(["main"]))
//!     .node_capacity(1024)
//!     .build()?;
//! let runtime = ProfileRuntime::new(arena, ProfileConfig::default());
//!
//! runtime.increment_counter(RecordId(0), 0);
//! runtime.instrument_target(RecordId(0), 0, 0xffff_8000_0000_1000);
//! runtime.instrument_memop(RecordId(0), 1, 4096);
//!
//! let snapshot = runtime.open()?;
//! std::fs::write("default.profraw", snapshot.as_bytes())?;
//! # Ok::<(), instrprof::ProfError>(())
//! ```

pub mod arena;
pub mod config;
pub mod dump;
pub mod error;
pub mod format;
pub mod instrument;
pub mod lock;
pub mod runtime;
pub mod serialize;
pub mod snapshot;

pub use arena::{AddressMap, ArenaBuilder, FunctionRecord, FunctionSpec, NameBlob, ProfileArena, RecordId};
pub use config::{DumpConfig, ProfileConfig};
pub use dump::DumpTask;
pub use error::{ProfError, Result};
pub use format::{PointerWidth, ValueKind};
pub use lock::{IrqControl, NoIrq, ProfLock};
pub use runtime::{ArenaStats, ProfileRuntime};
pub use snapshot::{Snapshot, SnapshotHandle, SnapshotTable};
