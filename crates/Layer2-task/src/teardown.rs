//! Teardown Sequencer
//!
//! Stops every owned container concurrently. Each id leaves the ownership
//! map once its stop attempt completes, whether or not the stop succeeded.

use crate::engine::ContainerEngine;
use crate::observer::{self, SharedObserver};
use crate::registry::OwnershipRegistry;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Outcome counts of one [`TeardownSequencer::stop_all`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub stopped: usize,
    pub failed: usize,
}

pub struct TeardownSequencer {
    engine: Arc<dyn ContainerEngine>,
    registry: OwnershipRegistry,
    observer: SharedObserver,
}

impl TeardownSequencer {
    pub fn new(engine: Arc<dyn ContainerEngine>, registry: OwnershipRegistry) -> Self {
        Self {
            engine,
            registry,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Stop every owned container and empty the registry
    ///
    /// An empty registry makes no engine calls.
    pub async fn stop_all(&self) -> TeardownReport {
        let owned = self.registry.snapshot().await;
        if owned.is_empty() {
            debug!("No owned containers to stop");
            observer::notify(&self.observer, |o| o.on_fleet_removed());
            return TeardownReport::default();
        }

        info!("Stopping {} owned containers", owned.len());
        let mut set = JoinSet::new();
        for (id, port) in owned {
            let engine = self.engine.clone();
            let registry = self.registry.clone();

            set.spawn(async move {
                let result = engine.stop_container(&id).await;
                match &result {
                    Ok(()) => info!("Stopped container with ID: {} (port {})", id, port),
                    Err(e) => warn!("Stopping container {} (port {}) failed: {}", id, port, e),
                }
                registry.remove(&id).await;
                result.is_ok()
            });
        }

        let mut report = TeardownReport::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(true) => report.stopped += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    warn!("Stop task failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        observer::notify(&self.observer, |o| o.on_fleet_removed());
        report
    }
}
