//! # fleet-foundation
//!
//! Foundation layer for fleet:
//! - Error: the shared error taxonomy (fatal vs. reported)
//! - Config: AppConfig (defaults, config file, command-line overrides)
//! - Storage: JsonStore (snapshot and config files)
//! - Sink: append-only line sinks for log and stats output

pub mod config;
pub mod error;
pub mod sink;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config
// ============================================================================
pub use config::{AppConfig, ConfigOverrides, StatsSettings, FLEET_CONFIG_FILE};

// ============================================================================
// Storage
// ============================================================================
pub use storage::JsonStore;

// ============================================================================
// Sink
// ============================================================================
pub use sink::{FileSink, LineSink, MemorySink};
