//! Parallel processing configuration

use crate::error::{ExplainError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for fan-out work
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Number of threads (None = use the global rayon pool)
    pub n_threads: Option<usize>,
}

impl ParallelConfig {
    /// Create a new parallel configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set number of threads
    pub fn with_threads(mut self, n: usize) -> Self {
        self.n_threads = Some(n);
        self
    }

    /// Get the number of threads to use
    pub fn num_threads(&self) -> usize {
        self.n_threads.unwrap_or_else(rayon::current_num_threads)
    }

    /// Build a dedicated pool when a thread count is set
    pub fn build_pool(&self) -> Result<Option<rayon::ThreadPool>> {
        match self.n_threads {
            None => Ok(None),
            Some(0) => Err(ExplainError::invalid_parameter(
                "n_threads",
                0,
                "must be at least 1",
            )),
            Some(n) => rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .thread_name(|i| format!("kolosal-explain-{}", i))
                .build()
                .map(Some)
                .map_err(|e| ExplainError::ConfigError(format!("thread pool: {}", e))),
        }
    }
}
