//! Docker engine - bollard for the container API, the docker CLI for builds

use super::frame::{LineFramer, StreamKind};
use super::{
    BuildProgress, ContainerEngine, ContainerSummary, LogStream, StatsSnapshot, StatsStream,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, LogsOptions,
    PruneContainersOptions, StartContainerOptions, Stats, StatsOptions, StopContainerOptions,
};
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use fleet_foundation::{Error, Result};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::io::StreamReader;
use tracing::{debug, info};

/// Host address published ports bind to
const HOST_IP: &str = "0.0.0.0";

/// Seconds the engine waits before killing a stopping container
const STOP_TIMEOUT_SECS: i64 = 10;

/// Docker engine client
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect using the ambient environment (`DOCKER_HOST` or the local socket)
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::Engine(format!("Unable to create docker client: {}", e)))?;
        docker
            .ping()
            .await
            .map_err(|e| Error::Engine(format!("Docker engine is unreachable: {}", e)))?;
        Ok(Self { docker })
    }

    /// Name given to the container publishing `host_port`
    pub fn container_name(host_port: u16) -> String {
        format!("HttpServerAt_{}", host_port)
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn build_image(
        &self,
        dockerfile: &str,
        context: &Path,
        tag: &str,
    ) -> Result<BuildProgress> {
        info!("Building Docker image {} in {:?}", tag, context);

        let mut child = Command::new("docker")
            .args(["build", "-f", dockerfile, "-t", tag, "."])
            .current_dir(context)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ImageBuild(format!("Failed to run docker build: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ImageBuild("docker build stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::ImageBuild("docker build stderr unavailable".to_string()))?;

        let tag = tag.to_string();
        let exit = stream::once(async move {
            match child.wait().await {
                Ok(status) if status.success() => None,
                Ok(status) => Some(Err(Error::ImageBuild(format!(
                    "docker build for {} exited with {}",
                    tag, status
                )))),
                Err(e) => Some(Err(Error::ImageBuild(format!(
                    "Failed waiting for docker build: {}",
                    e
                )))),
            }
        })
        .filter_map(|outcome| async move { outcome });

        Ok(stream::select(lines_of(stdout), lines_of(stderr))
            .chain(exit)
            .boxed())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| Error::Engine(format!("Unable to list containers: {}", e)))?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                state: c.state.unwrap_or_default(),
                status: c.status.unwrap_or_default(),
            })
            .collect())
    }

    async fn create_container(
        &self,
        image: &str,
        host_port: u16,
        container_port: u16,
    ) -> Result<String> {
        let port_key = format!("{}/tcp", container_port);

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(port_key.clone(), HashMap::new());

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            port_key,
            Some(vec![PortBinding {
                host_ip: Some(HOST_IP.to_string()),
                host_port: Some(host_port.to_string()),
            }]),
        );

        let config = Config {
            image: Some(image.to_string()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                auto_remove: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: Self::container_name(host_port),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| {
                Error::Engine(format!(
                    "ContainerCreate failed for image {} on host port {}: {}",
                    image, host_port, e
                ))
            })?;

        debug!("Created container {} for host port {}", response.id, host_port);
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::Engine(format!("ContainerStart failed for {}: {}", id, e)))
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        let options = StopContainerOptions {
            t: STOP_TIMEOUT_SECS,
        };
        self.docker
            .stop_container(id, Some(options))
            .await
            .map_err(|e| Error::Engine(format!("Stopping container {} failed: {}", id, e)))
    }

    async fn log_stream(&self, id: &str) -> Result<LogStream> {
        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let logs = self.docker.logs(id, Some(options)).boxed();
        let framed = stream::unfold(Some((logs, LineFramer::new())), |state| async move {
            let (mut logs, mut framer) = state?;
            loop {
                match logs.next().await {
                    Some(Ok(output)) => {
                        let bytes = reframe(&mut framer, output);
                        if !bytes.is_empty() {
                            return Some((Ok(Cursor::new(bytes)), Some((logs, framer))));
                        }
                    }
                    Some(Err(e)) => return Some((Err(std::io::Error::other(e)), None)),
                    None => {
                        let rest = framer.finish();
                        return (!rest.is_empty()).then(|| (Ok(Cursor::new(rest)), None));
                    }
                }
            }
        });

        Ok(Box::pin(StreamReader::new(framed)))
    }

    async fn stats_stream(&self, id: &str) -> Result<StatsStream> {
        let options = StatsOptions {
            stream: true,
            one_shot: false,
        };
        let label = id.to_string();

        Ok(self
            .docker
            .stats(id, Some(options))
            .map(move |record| {
                record.map(snapshot_from).map_err(|e| {
                    Error::Stream(format!("Stats stream for {} failed: {}", label, e))
                })
            })
            .boxed())
    }

    async fn prune_containers(&self) -> Result<Vec<String>> {
        let report = self
            .docker
            .prune_containers(None::<PruneContainersOptions<String>>)
            .await
            .map_err(|e| Error::Engine(format!("Prune containers failed: {}", e)))?;
        Ok(report.containers_deleted.unwrap_or_default())
    }
}

/// Frame the complete lines of an engine log chunk
fn reframe(framer: &mut LineFramer, output: LogOutput) -> Vec<u8> {
    match output {
        LogOutput::StdOut { message } | LogOutput::Console { message } => {
            framer.push(StreamKind::Stdout, &message)
        }
        LogOutput::StdErr { message } => framer.push(StreamKind::Stderr, &message),
        LogOutput::StdIn { message } => framer.push(StreamKind::Stdin, &message),
    }
}

fn snapshot_from(stats: Stats) -> StatsSnapshot {
    let sum = |entries: Option<Vec<bollard::container::BlkioStatsEntry>>| {
        entries
            .unwrap_or_default()
            .iter()
            .map(|entry| entry.value)
            .sum::<u64>()
    };

    StatsSnapshot {
        pids: stats.pids_stats.current.unwrap_or_default(),
        num_procs: stats.num_procs,
        cpu_total_usage: stats.cpu_stats.cpu_usage.total_usage,
        system_cpu_usage: stats.cpu_stats.system_cpu_usage.unwrap_or_default(),
        online_cpus: online_cpus(
            stats.cpu_stats.online_cpus,
            stats.cpu_stats.cpu_usage.percpu_usage.as_deref(),
        ),
        memory_usage: stats.memory_stats.usage.unwrap_or_default(),
        memory_max_usage: stats.memory_stats.max_usage.unwrap_or_default(),
        memory_limit: stats.memory_stats.limit.unwrap_or_default(),
        read_size_bytes: stats.storage_stats.read_size_bytes.unwrap_or_default(),
        io_service_bytes: sum(stats.blkio_stats.io_service_bytes_recursive),
        io_serviced: sum(stats.blkio_stats.io_serviced_recursive),
    }
}

/// Online CPU count, counted from the per-CPU usage when the engine omits it
fn online_cpus(reported: Option<u64>, per_cpu: Option<&[u64]>) -> u64 {
    reported.unwrap_or_else(|| per_cpu.map_or(0, |usage| usage.len() as u64))
}

/// Lines of a child process pipe, ending at the first read error
fn lines_of<R>(reader: R) -> BoxStream<'static, Result<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let lines = BufReader::new(reader).lines();
    stream::unfold(Some(lines), |state| async move {
        let mut lines = state?;
        match lines.next_line().await {
            Ok(Some(line)) => Some((Ok(line), Some(lines))),
            Ok(None) => None,
            Err(e) => Some((
                Err(Error::ImageBuild(format!("Failed reading build output: {}", e))),
                None,
            )),
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::frame;

    #[test]
    fn test_container_name() {
        assert_eq!(DockerEngine::container_name(8770), "HttpServerAt_8770");
    }

    #[test]
    fn test_reframe_console_as_stdout() {
        let mut framer = LineFramer::new();
        let output = LogOutput::Console {
            message: "listening\n".as_bytes().to_vec().into(),
        };
        assert_eq!(
            reframe(&mut framer, output),
            frame::encode_lines(StreamKind::Stdout, b"listening\n")
        );
    }

    #[test]
    fn test_reframe_holds_split_line() {
        let mut framer = LineFramer::new();
        let head = LogOutput::StdOut {
            message: "GET /requ".as_bytes().to_vec().into(),
        };
        let tail = LogOutput::StdOut {
            message: "est1\n".as_bytes().to_vec().into(),
        };
        assert!(reframe(&mut framer, head).is_empty());
        assert_eq!(
            reframe(&mut framer, tail),
            frame::encode_lines(StreamKind::Stdout, b"GET /request1\n")
        );
    }

    #[test]
    fn test_online_cpus_falls_back_to_per_cpu_usage() {
        assert_eq!(online_cpus(Some(2), Some(&[1, 2, 3, 4])), 2);
        assert_eq!(online_cpus(None, Some(&[1, 2, 3, 4])), 4);
        assert_eq!(online_cpus(None, None), 0);
    }

    #[tokio::test]
    async fn test_lines_of_pipe() {
        let input: &'static [u8] = b"Step 1/3\nStep 2/3\n";
        let lines: Vec<String> = lines_of(input)
            .filter_map(|line| async move { line.ok() })
            .collect()
            .await;
        assert_eq!(lines, vec!["Step 1/3", "Step 2/3"]);
    }
}
