//! Workflow - one complete fleet run
//!
//! ```text
//! recover ─▶ build image ─▶ launch ─▶ assert live ─▶ supervise ─▶ teardown
//! ```
//!
//! Recovery stops whatever a crashed previous run left behind. Supervision
//! runs one log task and one stats task per running owned container plus an
//! interrupt listener; the first of them to finish ends the whole group.

use crate::engine::{ContainerEngine, ContainerSummary};
use crate::launcher::FleetLauncher;
use crate::liveness::LivenessAsserter;
use crate::monitor::{LogAggregator, StatsSampler};
use crate::observer::{self, LifecycleObserver, SharedObserver};
use crate::recovery;
use crate::registry::{OwnedContainers, OwnershipRegistry, RegistryStore};
use crate::signal::shutdown_signal;
use crate::supervisor::{StreamSupervisor, SupervisedTask};
use crate::teardown::{TeardownReport, TeardownSequencer};
use fleet_foundation::{AppConfig, Error, FileSink, LineSink, Result};
use futures::StreamExt;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Destinations for aggregated output
#[derive(Clone)]
pub struct Sinks {
    pub logs: Arc<dyn LineSink>,
    pub stats: Arc<dyn LineSink>,
}

impl Sinks {
    /// Append-mode files in the configured state directory
    pub async fn open(config: &AppConfig) -> Result<Self> {
        let logs = FileSink::open(config.log_path()).await?;
        let stats = FileSink::open(config.stats_path()).await?;
        Ok(Self {
            logs: Arc::new(logs),
            stats: Arc::new(stats),
        })
    }
}

pub struct Workflow {
    config: AppConfig,
    engine: Arc<dyn ContainerEngine>,
    registry: OwnershipRegistry,
    store: RegistryStore,
    sinks: Sinks,
    observer: SharedObserver,
}

impl Workflow {
    pub fn new(config: AppConfig, engine: Arc<dyn ContainerEngine>, sinks: Sinks) -> Result<Self> {
        config.validate()?;
        let store = RegistryStore::new(config.state_store(), config.registry_filename.clone());
        Ok(Self {
            config,
            engine,
            registry: OwnershipRegistry::new(),
            store,
            sinks,
            observer: None,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn registry(&self) -> &OwnershipRegistry {
        &self.registry
    }

    /// Run until the fleet ends on its own or the process is signalled
    pub async fn run(&self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run, treating `shutdown` resolving as the interrupt signal
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.recover().await?;

        if self.config.build_image {
            self.build_image().await?;
        }

        let launched = FleetLauncher::new(
            self.engine.clone(),
            self.registry.clone(),
            self.store.clone(),
        )
        .with_observer(self.observer.clone())
        .create_fleet(
            self.config.requested_live_containers,
            &self.config.image_name,
            self.config.starting_host_port,
            self.config.exposed_port,
        )
        .await;

        if let Err(e) = launched {
            // A launch error with its snapshot on disk is left for the next
            // recovery pass; anything else has no record and is stopped now.
            if !matches!(e, Error::Launch { .. }) || !self.store.exists() {
                warn!("Launch failed with no recovery record; stopping the fleet");
                self.teardown().await;
            }
            return Err(e);
        }

        let listing = match LivenessAsserter::new(
            self.engine.clone(),
            self.registry.clone(),
            self.config.running_state.clone(),
        )
        .with_observer(self.observer.clone())
        .assert_owned_containers_are_live(self.config.requested_live_containers)
        .await
        {
            Ok(listing) => listing,
            Err(e) => {
                self.teardown().await;
                return Err(e);
            }
        };

        self.supervise(&listing, shutdown).await;
        self.teardown().await;
        Ok(())
    }

    /// Stop a fleet left behind by a crashed run
    pub async fn recover(&self) -> Result<Option<TeardownReport>> {
        recovery::clean_left_over_containers(self.engine.clone(), &self.store).await
    }

    async fn build_image(&self) -> Result<()> {
        let context = &self.config.build_context;
        let mut progress = self
            .engine
            .build_image(&self.config.dockerfile, context, &self.config.image_name)
            .await?;

        while let Some(line) = progress.next().await {
            let line = line?;
            if !line.trim().is_empty() {
                info!("{}", line.trim_end());
            }
        }
        info!("Built image {}", self.config.image_name);
        Ok(())
    }

    /// Monitor the running fleet until the first monitor or the interrupt ends
    async fn supervise<F>(&self, listing: &[ContainerSummary], shutdown: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.registry.is_empty().await {
            debug!("No owned containers; skipping supervision");
            return;
        }
        let owned = self.registry.snapshot().await;

        let mut supervisor = StreamSupervisor::new();
        self.add_monitors(&mut supervisor, &owned, listing).await;
        supervisor.add(self.interrupt_listener(shutdown));

        if let Err(e) = supervisor.run().await {
            warn!("Monitoring ended with error: {}", e);
        }
    }

    async fn add_monitors(
        &self,
        supervisor: &mut StreamSupervisor,
        owned: &OwnedContainers,
        listing: &[ContainerSummary],
    ) {
        let running: HashSet<&str> = listing
            .iter()
            .filter(|c| c.state == self.config.running_state)
            .map(|c| c.id.as_str())
            .collect();

        for (id, port) in owned {
            if !running.contains(id.as_str()) {
                continue;
            }

            match self.engine.stats_stream(id).await {
                Ok(stream) => supervisor.add(
                    StatsSampler::new(
                        *port,
                        stream,
                        self.sinks.stats.clone(),
                        self.config.stats_settings(),
                    )
                    .into_task(),
                ),
                Err(e) => warn!("No stats stream for container {}: {}", id, e),
            }

            match self.engine.log_stream(id).await {
                Ok(stream) => supervisor
                    .add(LogAggregator::new(*port, stream, self.sinks.logs.clone()).into_task()),
                Err(e) => warn!("No log stream for container {}: {}", id, e),
            }
        }
    }

    fn interrupt_listener<F>(&self, shutdown: F) -> SupervisedTask
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Press Ctrl-C at any point to exit.");
        observer::notify(&self.observer, |o| o.on_interrupt_armed());

        SupervisedTask::cancellable("interrupt", move |token| async move {
            tokio::select! {
                _ = shutdown => info!("Received Interrupt signal. Cleaning up and exiting"),
                _ = token.cancelled() => debug!("Interrupt listener released"),
            }
            Ok(())
        })
    }

    /// Stop the fleet and clear the snapshot
    async fn teardown(&self) -> TeardownReport {
        let report = TeardownSequencer::new(self.engine.clone(), self.registry.clone())
            .with_observer(self.observer.clone())
            .stop_all()
            .await;
        if report.failed > 0 {
            warn!("{} containers failed to stop", report.failed);
        }
        self.store.delete_reported();
        report
    }
}
