//! Monitoring Module
//!
//! Telemetry for explanation workloads.

mod stats;

pub use stats::{ExplainStats, StatsSnapshot, StatsSummary};
