//! Stream monitors - per-container consumers run under the StreamSupervisor
//!
//! - [`LogAggregator`]: container log lines -> log sink + console
//! - [`StatsSampler`]: throttled resource reports -> stats sink + console

mod logs;
mod stats;

pub use logs::LogAggregator;
pub use stats::{StatsReport, StatsSampler, BYTES_PER_GIB, BYTES_PER_MIB};
