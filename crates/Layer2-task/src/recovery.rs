//! Crash recovery
//!
//! A snapshot on disk at startup means the previous run never reached its
//! teardown. Every id in it is stopped, then the snapshot is deleted, before
//! a new fleet is launched.

use crate::engine::ContainerEngine;
use crate::registry::{OwnershipRegistry, RegistryStore};
use crate::teardown::{TeardownReport, TeardownSequencer};
use fleet_foundation::Result;
use std::sync::Arc;
use tracing::warn;

/// Stop the fleet recorded by a previous run, if any
///
/// Returns `None` when no snapshot was found.
pub async fn clean_left_over_containers(
    engine: Arc<dyn ContainerEngine>,
    store: &RegistryStore,
) -> Result<Option<TeardownReport>> {
    let Some(left_over) = store.load()? else {
        return Ok(None);
    };

    warn!(
        "Found {} containers left over from a previous run; stopping them",
        left_over.len()
    );

    let registry = OwnershipRegistry::from_snapshot(left_over);
    let report = TeardownSequencer::new(engine, registry).stop_all().await;
    store.delete_reported();

    Ok(Some(report))
}
