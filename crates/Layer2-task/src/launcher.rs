//! Fleet Launcher
//!
//! Creates and starts `n` containers concurrently on contiguous host ports and
//! records each one in the ownership registry as soon as it is live.
//!
//! There is no partial success: if any container fails, the batch fails with
//! that launch error. Siblings that did start stay in the registry, and the
//! snapshot is written regardless, so the next run's recovery pass stops them.
//! A snapshot that cannot be written leaves every started container in the
//! registry for the caller to stop.

use crate::engine::ContainerEngine;
use crate::observer::{self, SharedObserver};
use crate::registry::{OwnedContainers, OwnershipRegistry, RegistryStore};
use fleet_foundation::{Error, Result};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Concurrent create+start of a fleet
pub struct FleetLauncher {
    engine: Arc<dyn ContainerEngine>,
    registry: OwnershipRegistry,
    store: RegistryStore,
    observer: SharedObserver,
}

impl FleetLauncher {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        registry: OwnershipRegistry,
        store: RegistryStore,
    ) -> Self {
        Self {
            engine,
            registry,
            store,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Launch `count` containers on ports `starting_port..starting_port + count`
    ///
    /// Returns the ownership map once every container is started and the
    /// snapshot is on disk.
    pub async fn create_fleet(
        &self,
        count: usize,
        image: &str,
        starting_port: u16,
        container_port: u16,
    ) -> Result<OwnedContainers> {
        let ports = port_range(starting_port, count)?;
        info!(
            "Launching {} containers of {} from host port {}",
            count, image, starting_port
        );

        let mut set = JoinSet::new();
        for port in ports {
            let engine = self.engine.clone();
            let registry = self.registry.clone();
            let image = image.to_string();

            set.spawn(async move {
                let id = engine
                    .create_container(&image, port, container_port)
                    .await
                    .map_err(|e| Error::launch(port, e.to_string()))?;
                engine
                    .start_container(&id)
                    .await
                    .map_err(|e| Error::launch(port, format!("container {}: {}", id, e)))?;
                registry
                    .insert(id.clone(), port)
                    .await
                    .map_err(|e| Error::launch(port, e.to_string()))?;
                info!("Container {} with host port {} is live.", id, port);
                Ok::<_, Error>(())
            });
        }

        let mut failure = None;
        while let Some(joined) = set.join_next().await {
            let outcome = joined
                .map_err(|e| Error::Internal(format!("launch task failed: {}", e)))
                .and_then(|result| result);
            if let Err(e) = outcome {
                error!("{}", e);
                failure.get_or_insert(e);
            }
        }

        let owned = self.registry.snapshot().await;
        let saved = self.store.save(&owned);

        if let Some(e) = failure {
            error!(
                "{} of {} containers launched before the batch failed",
                self.registry.len().await,
                count
            );
            if let Err(save_error) = saved {
                error!("Unable to persist the partial fleet: {}", save_error);
            }
            return Err(e);
        }
        saved?;

        observer::notify(&self.observer, |o| o.on_fleet_launched(&owned));
        Ok(owned)
    }
}

/// Host ports for a batch, rejecting ranges that run past `u16::MAX`
fn port_range(starting_port: u16, count: usize) -> Result<Vec<u16>> {
    (0..count)
        .map(|i| {
            u16::try_from(i)
                .ok()
                .and_then(|offset| starting_port.checked_add(offset))
                .ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "{} containers from port {} exceed the port range",
                        count, starting_port
                    ))
                })
        })
        .collect()
}
