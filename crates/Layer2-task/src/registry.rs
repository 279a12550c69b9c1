//! Ownership Registry
//!
//! Tracks which containers this process launched (id -> host port) and
//! persists that map so a crashed run can be cleaned up by the next one.
//!
//! A key in the map means "ours to stop". Its absence means "not ours",
//! whatever the engine reports about the container.

use fleet_foundation::{Error, JsonStore, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Container id -> host port
pub type OwnedContainers = BTreeMap<String, u16>;

// ============================================================================
// OwnershipRegistry
// ============================================================================

/// Shared, lock-protected ownership map
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct OwnershipRegistry {
    owned: Arc<Mutex<OwnedContainers>>,
}

impl OwnershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded from a recovered snapshot
    pub fn from_snapshot(owned: OwnedContainers) -> Self {
        Self {
            owned: Arc::new(Mutex::new(owned)),
        }
    }

    /// Record ownership of `id`
    ///
    /// Fails if `port` is already bound to another owned container.
    pub async fn insert(&self, id: impl Into<String>, port: u16) -> Result<()> {
        let id = id.into();
        let mut owned = self.owned.lock().await;
        if let Some((other, _)) = owned.iter().find(|(other, p)| **p == port && **other != id) {
            return Err(Error::InvalidInput(format!(
                "host port {} is already owned by container {}",
                port, other
            )));
        }
        owned.insert(id, port);
        Ok(())
    }

    /// Drop ownership of `id`, returning its port
    pub async fn remove(&self, id: &str) -> Option<u16> {
        self.owned.lock().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.owned.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.owned.lock().await.is_empty()
    }

    /// Copy of the current map
    pub async fn snapshot(&self) -> OwnedContainers {
        self.owned.lock().await.clone()
    }
}

// ============================================================================
// RegistryStore
// ============================================================================

/// On-disk snapshot of [`OwnedContainers`]
///
/// The file exists only between a launch and the matching teardown; finding
/// it at startup means the previous run did not shut down cleanly.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    store: JsonStore,
    filename: String,
}

impl RegistryStore {
    pub fn new(store: JsonStore, filename: impl Into<String>) -> Self {
        Self {
            store,
            filename: filename.into(),
        }
    }

    pub fn exists(&self) -> bool {
        self.store.exists(&self.filename)
    }

    /// Overwrite the snapshot with `owned`
    pub fn save(&self, owned: &OwnedContainers) -> Result<()> {
        self.store.save(&self.filename, owned)?;
        debug!(
            "Saved {} owned containers to {}",
            owned.len(),
            self.store.file_path(&self.filename).display()
        );
        Ok(())
    }

    /// Read the snapshot; `None` is the normal no-leftovers case
    pub fn load(&self) -> Result<Option<OwnedContainers>> {
        let loaded = self.store.load_optional::<OwnedContainers>(&self.filename)?;
        if loaded.is_none() {
            info!("No trace of live containers from previous launch.");
        }
        Ok(loaded)
    }

    /// Remove the snapshot; a missing file is [`Error::NotFound`]
    pub fn delete(&self) -> Result<()> {
        self.store.remove(&self.filename)
    }

    /// Remove the snapshot, logging instead of failing
    pub fn delete_reported(&self) {
        match self.delete() {
            Ok(()) => debug!("Removed ownership snapshot {}", self.filename),
            Err(e) if e.is_not_found() => {
                warn!("Ownership snapshot already absent: {}", e)
            }
            Err(e) => warn!("Failed to remove ownership snapshot: {}", e),
        }
    }
}
