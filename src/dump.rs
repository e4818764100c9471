//! Periodic profile dump
//!
//! Every period: open a snapshot, write all of it out, drop it. Storage
//! and timing are the caller's: sinks come from a factory and the task
//! sleeps on whatever future the platform's timer hands back, so it runs
//! on any executor.

use crate::error::{ProfError, Result};
use crate::runtime::ProfileRuntime;
use std::fs::File;
use std::future::Future;
use std::io::{self, Write};
use std::time::Duration;
use tracing::{info, warn};

/// Writes snapshots of one runtime
#[derive(Debug, Clone, Copy)]
pub struct DumpTask<'a> {
    runtime: &'a ProfileRuntime,
}

impl<'a> DumpTask<'a> {
    pub fn new(runtime: &'a ProfileRuntime) -> Self {
        Self { runtime }
    }

    /// Write one snapshot to `sink`, returning its size
    pub fn dump_to<W: Write>(&self, sink: &mut W) -> Result<usize> {
        let snapshot = self.runtime.open()?;
        sink.write_all(snapshot.as_bytes())?;
        sink.flush()?;
        Ok(snapshot.len())
    }

    /// Write one snapshot to the configured dump path, replacing the file
    pub fn dump_to_path(&self) -> Result<usize> {
        let path = &self.runtime.config().dump.path;
        let mut file = File::create(path)?;
        let bytes = self.dump_to(&mut file)?;
        info!(bytes, path = %path.display(), "profile written");
        Ok(bytes)
    }

    /// Dump to the configured path every period.
    ///
    /// Runs `rounds` times, or forever with `None`. A failed round is
    /// logged and the next one goes ahead.
    pub async fn run<S, F>(&self, sleep: S, rounds: Option<usize>) -> usize
    where
        S: FnMut(Duration) -> F,
        F: Future<Output = ()>,
    {
        let path = self.runtime.config().dump.path.clone();
        self.run_with(|| File::create(&path), sleep, rounds).await
    }

    /// Like [`DumpTask::run`], with a sink opened by `open_sink` each round.
    /// Returns the number of successful dumps.
    pub async fn run_with<W, O, S, F>(
        &self,
        mut open_sink: O,
        mut sleep: S,
        rounds: Option<usize>,
    ) -> usize
    where
        W: Write,
        O: FnMut() -> io::Result<W>,
        S: FnMut(Duration) -> F,
        F: Future<Output = ()>,
    {
        let period = self.runtime.config().dump.period();
        let mut round = 0usize;
        let mut written = 0usize;

        while rounds.is_none_or(|r| round < r) {
            let result = open_sink()
                .map_err(ProfError::from)
                .and_then(|mut sink| self.dump_to(&mut sink));
            match result {
                Ok(bytes) => {
                    written += 1;
                    info!(bytes, round, "profile dumped");
                }
                Err(e) => warn!(error = %e, round, "profile dump failed"),
            }

            round += 1;
            sleep(period).await;
        }

        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{ArenaBuilder, FunctionSpec, RecordId};
    use crate::config::{DumpConfig, ProfileConfig};
    use futures::executor::block_on;
    use futures::future;
    use std::cell::RefCell;

    fn runtime(config: ProfileConfig) -> ProfileRuntime {
        let arena = ArenaBuilder::new()
            .function(FunctionSpec::new(1, 1, 1).value_sites(1, 0))
            .node_capacity(8)
            .build()
            .unwrap();
        ProfileRuntime::new(arena, config)
    }

    #[test]
    fn test_dump_to_writes_snapshot() {
        let rt = runtime(ProfileConfig::default());
        rt.instrument_target(RecordId(0), 0, 5);

        let mut out = Vec::new();
        let bytes = DumpTask::new(&rt).dump_to(&mut out).unwrap();
        assert_eq!(bytes, out.len());
        assert_eq!(out, rt.open().unwrap().into_bytes());
    }

    #[test]
    fn test_run_with_rounds_and_period() {
        let config = ProfileConfig {
            dump: DumpConfig {
                period_ms: 250,
                ..DumpConfig::default()
            },
            ..ProfileConfig::default()
        };
        let rt = runtime(config);
        let sinks = RefCell::new(Vec::new());
        let mut sleeps = Vec::new();

        let written = block_on(DumpTask::new(&rt).run_with(
            || {
                sinks.borrow_mut().push(());
                Ok(Vec::<u8>::new())
            },
            |period| {
                sleeps.push(period);
                future::ready(())
            },
            Some(3),
        ));

        assert_eq!(written, 3);
        assert_eq!(sinks.borrow().len(), 3);
        assert_eq!(sleeps, vec![Duration::from_millis(250); 3]);
    }

    #[test]
    fn test_failed_sink_does_not_stop_task() {
        let rt = runtime(ProfileConfig::default());
        let mut attempt = 0;

        let written = block_on(DumpTask::new(&rt).run_with(
            || {
                attempt += 1;
                if attempt == 1 {
                    Err(io::Error::other("storage not mounted"))
                } else {
                    Ok(io::sink())
                }
            },
            |_| future::ready(()),
            Some(2),
        ));

        assert_eq!(written, 1);
    }

    #[test]
    fn test_dump_to_path() {
        let path = std::env::temp_dir().join(format!("instrprof-{}.profraw", std::process::id()));
        let config = ProfileConfig {
            dump: DumpConfig {
                path: path.clone(),
                ..DumpConfig::default()
            },
            ..ProfileConfig::default()
        };
        let rt = runtime(config);

        let bytes = DumpTask::new(&rt).dump_to_path().unwrap();
        let on_disk = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(on_disk.len(), bytes);
        assert_eq!(on_disk, rt.open().unwrap().into_bytes());
    }
}
