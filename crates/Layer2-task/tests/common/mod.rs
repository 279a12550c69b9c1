//! Shared test fixtures: an in-memory container engine and a recording observer

#![allow(dead_code)]

use async_trait::async_trait;
use fleet_foundation::{AppConfig, Error, MemorySink, Result};
use fleet_task::engine::frame::{encode_lines, StreamKind};
use fleet_task::{
    BuildProgress, ContainerEngine, ContainerSummary, LifecycleObserver, LogStream,
    OwnedContainers, Sinks, StatsSnapshot, StatsStream,
};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::io::StreamReader;

// ============================================================================
// FakeEngine
// ============================================================================

/// How log and stats streams behave once requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Emit the configured lines/snapshots, then end
    Finite,
    /// Never produce data and never end
    Pending,
}

#[derive(Debug, Clone)]
struct FakeContainer {
    port: u16,
    state: String,
}

#[derive(Debug)]
struct FakeState {
    next_id: u64,
    containers: BTreeMap<String, FakeContainer>,
    stop_calls: Vec<String>,
    create_calls: usize,
    build_calls: usize,
    fail_start_port: Option<u16>,
    fail_stop: HashSet<String>,
    start_state: String,
    log_mode: StreamMode,
    stats_mode: StreamMode,
    log_lines: Vec<String>,
    stats_per_container: usize,
}

/// In-memory engine; stopped containers disappear (auto-remove)
pub struct FakeEngine {
    state: Mutex<FakeState>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_id: 0,
                containers: BTreeMap::new(),
                stop_calls: Vec::new(),
                create_calls: 0,
                build_calls: 0,
                fail_start_port: None,
                fail_stop: HashSet::new(),
                start_state: "running".to_string(),
                log_mode: StreamMode::Finite,
                stats_mode: StreamMode::Finite,
                log_lines: vec!["listening".to_string()],
                stats_per_container: 3,
            }),
        }
    }
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_stream_mode(self: Arc<Self>, mode: StreamMode) -> Arc<Self> {
        {
            let mut state = self.state.lock().unwrap();
            state.log_mode = mode;
            state.stats_mode = mode;
        }
        self
    }

    pub fn with_stats_mode(self: Arc<Self>, mode: StreamMode) -> Arc<Self> {
        self.state.lock().unwrap().stats_mode = mode;
        self
    }

    pub fn with_log_lines(self: Arc<Self>, lines: &[&str]) -> Arc<Self> {
        self.state.lock().unwrap().log_lines = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_stats_per_container(self: Arc<Self>, count: usize) -> Arc<Self> {
        self.state.lock().unwrap().stats_per_container = count;
        self
    }

    pub fn fail_start_on(self: Arc<Self>, port: u16) -> Arc<Self> {
        self.state.lock().unwrap().fail_start_port = Some(port);
        self
    }

    /// State containers enter when started
    pub fn start_in_state(self: Arc<Self>, state: &str) -> Arc<Self> {
        self.state.lock().unwrap().start_state = state.to_string();
        self
    }

    pub fn fail_stop_of(&self, id: &str) {
        self.state.lock().unwrap().fail_stop.insert(id.to_string());
    }

    /// Add a running container this process did not launch
    pub fn preload(&self, id: &str, port: u16, state: &str) {
        self.state.lock().unwrap().containers.insert(
            id.to_string(),
            FakeContainer {
                port,
                state: state.to_string(),
            },
        );
    }

    /// Drop a container from the engine without a stop request
    pub fn forget(&self, id: &str) {
        self.state.lock().unwrap().containers.remove(id);
    }

    pub fn set_state(&self, id: &str, state: &str) {
        if let Some(c) = self.state.lock().unwrap().containers.get_mut(id) {
            c.state = state.to_string();
        }
    }

    pub fn stop_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().stop_calls.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    pub fn build_calls(&self) -> usize {
        self.state.lock().unwrap().build_calls
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn build_image(
        &self,
        _dockerfile: &str,
        _context: &Path,
        tag: &str,
    ) -> Result<BuildProgress> {
        self.state.lock().unwrap().build_calls += 1;
        let lines = vec![
            Ok("Step 1/2 : FROM scratch".to_string()),
            Ok(format!("Successfully tagged {}", tag)),
        ];
        Ok(stream::iter(lines).boxed())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .containers
            .iter()
            .map(|(id, c)| ContainerSummary {
                id: id.clone(),
                state: c.state.clone(),
                status: format!("fake {}", c.state),
            })
            .collect())
    }

    async fn create_container(
        &self,
        _image: &str,
        host_port: u16,
        _container_port: u16,
    ) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        state.next_id += 1;
        let id = format!("fake-{:04}", state.next_id);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                port: host_port,
                state: "created".to_string(),
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let fail_port = state.fail_start_port;
        let start_state = state.start_state.clone();
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| Error::Engine(format!("no such container: {}", id)))?;
        if Some(container.port) == fail_port {
            return Err(Error::Engine(format!(
                "port {} is already allocated",
                container.port
            )));
        }
        container.state = start_state;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.stop_calls.push(id.to_string());
        if state.fail_stop.contains(id) {
            return Err(Error::Engine(format!("stop of {} timed out", id)));
        }
        state
            .containers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::Engine(format!("no such container: {}", id)))
    }

    async fn log_stream(&self, _id: &str) -> Result<LogStream> {
        let state = self.state.lock().unwrap();
        match state.log_mode {
            StreamMode::Finite => {
                let mut bytes = Vec::new();
                for line in &state.log_lines {
                    bytes.extend(encode_lines(
                        StreamKind::Stdout,
                        format!("{}\n", line).as_bytes(),
                    ));
                }
                Ok(Box::pin(Cursor::new(bytes)))
            }
            StreamMode::Pending => {
                let pending = stream::pending::<std::io::Result<Cursor<Vec<u8>>>>();
                Ok(Box::pin(StreamReader::new(pending)))
            }
        }
    }

    async fn stats_stream(&self, _id: &str) -> Result<StatsStream> {
        let state = self.state.lock().unwrap();
        match state.stats_mode {
            StreamMode::Finite => {
                let snapshots: Vec<Result<StatsSnapshot>> = (0..state.stats_per_container)
                    .map(|i| {
                        Ok(StatsSnapshot {
                            pids: 1,
                            cpu_total_usage: i as u64,
                            system_cpu_usage: 100,
                            online_cpus: 1,
                            ..Default::default()
                        })
                    })
                    .collect();
                Ok(stream::iter(snapshots).boxed())
            }
            StreamMode::Pending => Ok(stream::pending().boxed()),
        }
    }

    async fn prune_containers(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

// ============================================================================
// RecordingObserver
// ============================================================================

#[derive(Default)]
pub struct RecordingObserver {
    pub launched: Mutex<Option<OwnedContainers>>,
    pub checked: AtomicBool,
    pub interrupt_armed: AtomicBool,
    pub removed: AtomicUsize,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn launched_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self
            .launched
            .lock()
            .unwrap()
            .as_ref()
            .map(|owned| owned.values().copied().collect())
            .unwrap_or_default();
        ports.sort_unstable();
        ports
    }

    pub fn was_checked(&self) -> bool {
        self.checked.load(Ordering::SeqCst)
    }

    pub fn was_interrupt_armed(&self) -> bool {
        self.interrupt_armed.load(Ordering::SeqCst)
    }

    pub fn removed_count(&self) -> usize {
        self.removed.load(Ordering::SeqCst)
    }
}

impl LifecycleObserver for RecordingObserver {
    fn on_fleet_launched(&self, owned: &OwnedContainers) {
        *self.launched.lock().unwrap() = Some(owned.clone());
    }

    fn on_check_complete(&self) {
        self.checked.store(true, Ordering::SeqCst);
    }

    fn on_interrupt_armed(&self) {
        self.interrupt_armed.store(true, Ordering::SeqCst);
    }

    fn on_fleet_removed(&self) {
        self.removed.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Config for `count` containers with state kept in `dir` and no image build
pub fn test_config(dir: &Path, count: usize) -> AppConfig {
    AppConfig {
        requested_live_containers: count,
        state_dir: dir.to_path_buf(),
        build_image: false,
        throttle_stats_input_requests: 1,
        ..Default::default()
    }
}

pub struct MemorySinks {
    pub logs: Arc<MemorySink>,
    pub stats: Arc<MemorySink>,
}

impl MemorySinks {
    pub fn new() -> Self {
        Self {
            logs: Arc::new(MemorySink::new()),
            stats: Arc::new(MemorySink::new()),
        }
    }

    pub fn sinks(&self) -> Sinks {
        Sinks {
            logs: self.logs.clone(),
            stats: self.stats.clone(),
        }
    }
}
