//! Config - application settings
//!
//! - `fleet.rs` - AppConfig, overrides and validation

mod fleet;

pub use fleet::{AppConfig, ConfigOverrides, StatsSettings, FLEET_CONFIG_FILE};
