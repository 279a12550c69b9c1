//! # fleet-task
//!
//! Launches a fleet of containers, supervises their log and stats streams,
//! and tears the fleet down on completion or interrupt.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Workflow                                                 │
//! │  ├── recovery       (stop a crashed run's fleet)          │
//! │  ├── FleetLauncher  (concurrent create+start)             │
//! │  ├── LivenessAsserter                                     │
//! │  ├── StreamSupervisor                                     │
//! │  │   ├── LogAggregator × n                                │
//! │  │   ├── StatsSampler  × n                                │
//! │  │   └── interrupt listener                               │
//! │  └── TeardownSequencer                                    │
//! │                     │                                     │
//! │          OwnershipRegistry ◀──▶ RegistryStore (disk)      │
//! │                     │                                     │
//! │              ContainerEngine (Docker)                     │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod launcher;
pub mod liveness;
pub mod monitor;
pub mod observer;
pub mod recovery;
pub mod registry;
pub mod signal;
pub mod supervisor;
pub mod teardown;
pub mod workflow;

// ============================================================================
// Engine
// ============================================================================
pub use engine::{
    BuildProgress, ContainerEngine, ContainerSummary, DockerEngine, LogStream, StatsSnapshot,
    StatsStream,
};

// ============================================================================
// Ownership
// ============================================================================
pub use registry::{OwnedContainers, OwnershipRegistry, RegistryStore};

// ============================================================================
// Lifecycle
// ============================================================================
pub use launcher::FleetLauncher;
pub use liveness::LivenessAsserter;
pub use observer::{LifecycleObserver, SharedObserver};
pub use recovery::clean_left_over_containers;
pub use teardown::{TeardownReport, TeardownSequencer};

// ============================================================================
// Supervision
// ============================================================================
pub use monitor::{LogAggregator, StatsReport, StatsSampler};
pub use signal::shutdown_signal;
pub use supervisor::{Interrupt, StreamSupervisor, SupervisedTask};

// ============================================================================
// Workflow
// ============================================================================
pub use workflow::{Sinks, Workflow};
