//! Container Engine
//!
//! The seam between the fleet supervisor and whatever runs the containers.
//!
//! - [`ContainerEngine`]: the operations the supervisor needs
//! - [`DockerEngine`]: the Docker implementation (bollard + docker CLI)
//! - [`frame`]: the 8-byte multiplexed log framing

pub mod docker;
pub mod frame;

pub use docker::DockerEngine;

use async_trait::async_trait;
use fleet_foundation::Result;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Combined stdout/stderr of one container, every line carrying a frame header
pub type LogStream = Pin<Box<dyn AsyncRead + Send>>;

/// Decoded resource-usage records of one container
pub type StatsStream = BoxStream<'static, Result<StatsSnapshot>>;

/// Progress lines emitted while an image builds
pub type BuildProgress = BoxStream<'static, Result<String>>;

/// One row of the engine's container listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    /// Machine state, e.g. "running"
    pub state: String,
    /// Human status, e.g. "Up 3 seconds"
    pub status: String,
}

/// One resource-usage record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Processes/threads in the container's pid cgroup
    pub pids: u64,
    /// Process count (Windows hosts only)
    pub num_procs: u32,

    /// Total CPU time consumed by the container
    pub cpu_total_usage: u64,
    /// Total CPU time of the host
    pub system_cpu_usage: u64,
    pub online_cpus: u64,

    pub memory_usage: u64,
    pub memory_max_usage: u64,
    pub memory_limit: u64,

    pub read_size_bytes: u64,
    /// Sum of block IO bytes over all devices
    pub io_service_bytes: u64,
    /// Sum of block IO operations over all devices
    pub io_serviced: u64,
}

impl StatsSnapshot {
    /// CPU share, in percent of one core times the online cores
    pub fn cpu_percent(&self) -> f64 {
        if self.system_cpu_usage == 0 {
            return 0.0;
        }
        self.cpu_total_usage as f64 / self.system_cpu_usage as f64
            * self.online_cpus as f64
            * 100.0
    }

    pub fn memory_percent(&self) -> f64 {
        if self.memory_limit == 0 {
            return 0.0;
        }
        self.memory_usage as f64 / self.memory_limit as f64 * 100.0
    }
}

/// Container engine operations
///
/// Every call may fail; callers decide whether a failure is fatal.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Build `tag` from `dockerfile` inside `context`
    async fn build_image(&self, dockerfile: &str, context: &Path, tag: &str)
        -> Result<BuildProgress>;

    /// List live containers
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>>;

    /// Create a container publishing `container_port` on `host_port`
    async fn create_container(
        &self,
        image: &str,
        host_port: u16,
        container_port: u16,
    ) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    async fn stop_container(&self, id: &str) -> Result<()>;

    /// Follow the combined log stream of a container
    async fn log_stream(&self, id: &str) -> Result<LogStream>;

    /// Follow the stats stream of a container
    async fn stats_stream(&self, id: &str) -> Result<StatsStream>;

    /// Remove stopped containers, returning their ids
    async fn prune_containers(&self) -> Result<Vec<String>>;
}
