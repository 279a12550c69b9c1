//! Liveness Asserter
//!
//! One-shot post-launch check:
//! 1. the engine lists at least the requested number of live containers
//! 2. every owned container is listed in the running state
//!
//! Containers not in the ownership map are ignored. Any violation is fatal.

use crate::engine::{ContainerEngine, ContainerSummary};
use crate::observer::{self, SharedObserver};
use crate::registry::OwnershipRegistry;
use fleet_foundation::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct LivenessAsserter {
    engine: Arc<dyn ContainerEngine>,
    registry: OwnershipRegistry,
    running_state: String,
    observer: SharedObserver,
}

impl LivenessAsserter {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        registry: OwnershipRegistry,
        running_state: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            registry,
            running_state: running_state.into(),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Check the fleet, returning the engine listing it was checked against
    pub async fn assert_owned_containers_are_live(
        &self,
        expected: usize,
    ) -> Result<Vec<ContainerSummary>> {
        let containers = self.engine.list_containers().await?;

        if containers.len() < expected {
            let message = format!(
                "{} live containers listed, {} requested",
                containers.len(),
                expected
            );
            error!("{}", message);
            return Err(Error::Liveness(message));
        }

        let listed: HashMap<&str, &ContainerSummary> =
            containers.iter().map(|c| (c.id.as_str(), c)).collect();

        for (id, port) in self.registry.snapshot().await {
            match listed.get(id.as_str()) {
                Some(c) if c.state == self.running_state => {
                    debug!("Container {} (port {}) in {} state.", id, port, c.state);
                }
                Some(c) => {
                    let message = format!(
                        "container {} (port {}) is not running: state {}, status {}",
                        id, port, c.state, c.status
                    );
                    error!("{}", message);
                    return Err(Error::Liveness(message));
                }
                None => {
                    let message = format!(
                        "container {} (port {}) is missing from the engine listing",
                        id, port
                    );
                    error!("{}", message);
                    return Err(Error::Liveness(message));
                }
            }
        }

        info!("All {} requested containers are live.", expected);
        observer::notify(&self.observer, |o| o.on_check_complete());
        Ok(containers)
    }
}
