//! Lifecycle observer
//!
//! Optional hook into fleet lifecycle milestones. Production runs pass
//! `None`; tests inject an implementation to watch the fleet come and go.

use crate::registry::OwnedContainers;
use std::sync::Arc;

/// Fleet lifecycle notifications; every method defaults to a no-op
pub trait LifecycleObserver: Send + Sync {
    /// Every launch task succeeded and the snapshot was written
    fn on_fleet_launched(&self, _owned: &OwnedContainers) {}

    /// The liveness check passed
    fn on_check_complete(&self) {}

    /// The interrupt listener was registered with the supervisor
    fn on_interrupt_armed(&self) {}

    /// Every owned container has had its stop attempt
    fn on_fleet_removed(&self) {}
}

/// Observer slot shared by the lifecycle components
pub type SharedObserver = Option<Arc<dyn LifecycleObserver>>;

pub(crate) fn notify(observer: &SharedObserver, event: impl FnOnce(&dyn LifecycleObserver)) {
    if let Some(observer) = observer {
        event(observer.as_ref());
    }
}
