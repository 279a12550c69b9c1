//! Resource sampling for one container
//!
//! Every snapshot bumps a per-container counter (starting at 0). Snapshot `n`
//! is reported only when display is on and `n % throttle == 0`; a reported
//! snapshot goes to the stats sink only when persistence is on.

use crate::engine::{StatsSnapshot, StatsStream};
use crate::supervisor::SupervisedTask;
use fleet_foundation::{LineSink, Result, StatsSettings};
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const BYTES_PER_MIB: f64 = 1_048_576.0;
pub const BYTES_PER_GIB: f64 = 1_073_741_824.0;

/// Text rendering of one emitted snapshot
#[derive(Debug, Clone)]
pub struct StatsReport<'a> {
    pub index: u64,
    pub host_port: u16,
    pub snapshot: &'a StatsSnapshot,
}

impl fmt::Display for StatsReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.snapshot;
        writeln!(
            f,
            "Resource Snapshot {} for http server @ port {}, PIDs:{}",
            self.index, self.host_port, s.pids
        )?;
        writeln!(
            f,
            "CPU -> CPU {:.2}%, CPUs: {}, Usage Total: {}, System: {}",
            s.cpu_percent(),
            s.online_cpus,
            s.cpu_total_usage,
            s.system_cpu_usage
        )?;
        writeln!(
            f,
            "Memory -> {:.2}% Usage: {:.2}MiB, MaxUsage: {:.2}MiB, Limit: {:.2}GiB",
            s.memory_percent(),
            s.memory_usage as f64 / BYTES_PER_MIB,
            s.memory_max_usage as f64 / BYTES_PER_MIB,
            s.memory_limit as f64 / BYTES_PER_GIB
        )?;
        write!(
            f,
            "IO -> ReadSizeBytes: {}, Service Bytes: {}, Serviced: {}, Procs: {}",
            s.read_size_bytes, s.io_service_bytes, s.io_serviced, s.num_procs
        )
    }
}

/// Throttled reporter for one container's stats stream
pub struct StatsSampler {
    host_port: u16,
    stream: StatsStream,
    sink: Arc<dyn LineSink>,
    settings: StatsSettings,
}

impl StatsSampler {
    pub fn new(
        host_port: u16,
        stream: StatsStream,
        sink: Arc<dyn LineSink>,
        settings: StatsSettings,
    ) -> Self {
        Self {
            host_port,
            stream,
            sink,
            settings,
        }
    }

    /// Wrap as a supervised task; the interrupt closes the stream
    pub fn into_task(self) -> SupervisedTask {
        let name = format!("stats@{}", self.host_port);
        SupervisedTask::cancellable(name, move |token| self.run(token))
    }

    /// Consume snapshots until end-of-data, a stream error, or cancellation
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let mut index: u64 = 0;
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Stats stream for port {} interrupted", self.host_port);
                    return Ok(());
                }
                next = self.stream.next() => next,
            };

            let snapshot = match next {
                Some(Ok(snapshot)) => snapshot,
                Some(Err(e)) => {
                    warn!("Stats stream for port {} failed: {}", self.host_port, e);
                    return Err(e);
                }
                None => {
                    debug!("Stats stream for port {} ended", self.host_port);
                    return Ok(());
                }
            };

            if self.settings.should_emit(index) {
                let report = StatsReport {
                    index,
                    host_port: self.host_port,
                    snapshot: &snapshot,
                }
                .to_string();
                info!("\n{}", report);

                if self.settings.persist {
                    self.sink.write_line(&report).await?;
                } else {
                    info!("Stats in non-persistence mode.");
                }
            }
            index += 1;
        }
    }
}
