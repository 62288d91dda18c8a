//! Explanation Statistics
//!
//! Counters for explanation workloads. An [`ExplainStats`] is handed to the
//! engine through its execution context; nothing here is global.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Statistics summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSummary {
    /// Number of observations
    pub count: u64,
    /// Minimum value
    pub min: f64,
    /// Maximum value
    pub max: f64,
    /// Average value
    pub avg: f64,
    /// Population standard deviation
    pub std_dev: f64,
    /// Sum of all values
    pub sum: f64,
}

impl StatsSummary {
    /// Create a summary from a slice of values
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let count = values.len() as u64;
        let sum: f64 = values.iter().sum();
        let avg = sum / count as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let variance: f64 = values.iter().map(|&x| (x - avg).powi(2)).sum::<f64>() / count as f64;
        let std_dev = variance.sqrt();

        Self {
            count,
            min,
            max,
            avg,
            std_dev,
            sum,
        }
    }
}

/// Point-in-time copy of [`ExplainStats`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    pub explanations: u64,
    pub predictions: u64,
    pub failures: u64,
    pub total_latency: Duration,
    pub avg_latency_ms: f64,
}

/// Lock-free counters for explanation workloads
#[derive(Debug, Default)]
pub struct ExplainStats {
    explanations: AtomicU64,
    predictions: AtomicU64,
    failures: AtomicU64,
    latency_micros: AtomicU64,
}

impl ExplainStats {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished explanation
    pub fn record_explanation(&self, elapsed: Duration) {
        self.explanations.fetch_add(1, Ordering::Relaxed);
        self.latency_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record `n` model invocations
    pub fn record_predictions(&self, n: u64) {
        self.predictions.fetch_add(n, Ordering::Relaxed);
    }

    /// Record a failed explanation
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        let explanations = self.explanations.load(Ordering::Relaxed);
        let micros = self.latency_micros.load(Ordering::Relaxed);
        StatsSnapshot {
            explanations,
            predictions: self.predictions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            total_latency: Duration::from_micros(micros),
            avg_latency_ms: if explanations > 0 {
                micros as f64 / 1000.0 / explanations as f64
            } else {
                0.0
            },
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        self.explanations.store(0, Ordering::Relaxed);
        self.predictions.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.latency_micros.store(0, Ordering::Relaxed);
    }
}
