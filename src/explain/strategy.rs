//! Execution strategies for perturbation sampling
//!
//! All strategies compute the same per-feature [`Moments`] from the same
//! per-feature random streams. They differ only in how the work is laid out:
//! one feature after another, one rayon task per feature, or samples grouped
//! into SIMD-width lanes and reduced with [`SimdOps`].

use crate::error::{ensure_finite, ExplainError, Result};
use crate::model::Predictor;
use crate::monitoring::ExplainStats;
use crate::utils::{Moments, ParallelConfig, ScratchPool, SimdOps, LANES};
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How the per-feature sampling loops are executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// One feature after another; the reference implementation
    #[default]
    Sequential,
    /// One rayon task per feature, joined back in feature order
    Concurrent,
    /// Samples grouped into `LANES`-wide batches with lane-parallel reduction
    Vectorized,
}

impl ExecutionStrategy {
    /// All strategies, sequential first
    pub const ALL: [ExecutionStrategy; 3] = [
        ExecutionStrategy::Sequential,
        ExecutionStrategy::Concurrent,
        ExecutionStrategy::Vectorized,
    ];

    /// Strategy to use for one instance inside an instance-level fan-out
    ///
    /// Feature-level tasks are not nested under instance-level tasks.
    pub fn nested(self) -> Self {
        match self {
            ExecutionStrategy::Concurrent => ExecutionStrategy::Sequential,
            other => other,
        }
    }

    pub(crate) fn run(
        self,
        job: &FeatureJob<'_>,
        ctx: &ExecutionContext,
        seed: u64,
    ) -> Result<Vec<Moments>> {
        let streams = feature_streams(seed, job.input.len());
        let moments = match self {
            ExecutionStrategy::Sequential => streams
                .into_iter()
                .enumerate()
                .map(|(i, mut rng)| job.sample_scalar(i, &mut rng))
                .collect::<Result<Vec<_>>>(),
            ExecutionStrategy::Concurrent => ctx.install(|| {
                streams
                    .into_par_iter()
                    .enumerate()
                    .map(|(i, mut rng)| {
                        job.sample_scalar(i, &mut rng).map_err(|e| {
                            ExplainError::task_failed(format!("feature '{}'", job.names[i]), e)
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            }),
            ExecutionStrategy::Vectorized => streams
                .into_iter()
                .enumerate()
                .map(|(i, mut rng)| job.sample_lanes(i, &mut rng, ctx.scratch()))
                .collect::<Result<Vec<_>>>(),
        }?;
        ctx.stats()
            .record_predictions((job.input.len() * job.samples) as u64);
        Ok(moments)
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionStrategy::Sequential => "sequential",
            ExecutionStrategy::Concurrent => "concurrent",
            ExecutionStrategy::Vectorized => "vectorized",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ExecutionStrategy {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(ExecutionStrategy::Sequential),
            "concurrent" | "parallel" => Ok(ExecutionStrategy::Concurrent),
            "vectorized" | "simd" => Ok(ExecutionStrategy::Vectorized),
            other => Err(ExplainError::invalid_parameter(
                "strategy",
                other,
                "expected sequential, concurrent or vectorized",
            )),
        }
    }
}

/// Shared resources for one or many explanation calls
///
/// Carries the bounded thread pool, the scratch buffer pool and the
/// telemetry sink. Cloning is cheap and clones share all three.
#[derive(Clone)]
pub struct ExecutionContext {
    pool: Option<Arc<rayon::ThreadPool>>,
    scratch: Arc<ScratchPool>,
    stats: Arc<ExplainStats>,
}

impl ExecutionContext {
    /// Context on the global rayon pool with fresh scratch and stats
    pub fn new() -> Self {
        Self {
            pool: None,
            scratch: ScratchPool::new(16),
            stats: Arc::new(ExplainStats::new()),
        }
    }

    /// Context with a dedicated pool when the config sets a thread count
    pub fn from_config(config: &ParallelConfig) -> Result<Self> {
        let pool = config.build_pool()?.map(Arc::new);
        Ok(Self {
            pool,
            ..Self::new()
        })
    }

    /// Report into an existing telemetry sink
    pub fn with_stats(mut self, stats: Arc<ExplainStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Telemetry sink
    pub fn stats(&self) -> &ExplainStats {
        &self.stats
    }

    /// Scratch buffer pool
    pub fn scratch(&self) -> &Arc<ScratchPool> {
        &self.scratch
    }

    /// Effective parallelism
    pub fn num_threads(&self) -> usize {
        self.pool
            .as_ref()
            .map(|p| p.current_num_threads())
            .unwrap_or_else(rayon::current_num_threads)
    }

    /// Run `op` inside the dedicated pool, if any
    pub fn install<R, OP>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("num_threads", &self.num_threads())
            .field("scratch", &self.scratch)
            .finish()
    }
}

/// One random stream per feature, all derived from `seed`
///
/// Feature `i` gets the seeded generator advanced by `i` jumps of 2^128
/// draws, so streams never overlap and do not depend on execution order.
pub(crate) fn feature_streams(seed: u64, n_features: usize) -> Vec<Xoshiro256PlusPlus> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut streams = Vec::with_capacity(n_features);
    for _ in 0..n_features {
        streams.push(rng.clone());
        rng.jump();
    }
    streams
}

/// Read-only inputs shared by every per-feature loop of one explanation
pub(crate) struct FeatureJob<'a> {
    pub model: &'a dyn Predictor,
    pub input: &'a [f64],
    pub baselines: &'a [f64],
    pub names: &'a [String],
    pub base_prediction: f64,
    pub samples: usize,
    pub noise: f64,
}

impl FeatureJob<'_> {
    #[inline]
    fn perturbed_value(&self, feature: usize, rng: &mut Xoshiro256PlusPlus) -> f64 {
        let draw: f64 = rng.gen_range(-1.0..=1.0);
        self.baselines[feature] + draw * self.noise
    }

    #[inline]
    fn difference(&self, feature: usize, perturbed: &[f64]) -> Result<f64> {
        let prediction = self.model.predict(perturbed)?;
        ensure_finite(prediction, || {
            format!("Prediction with '{}' perturbed", self.names[feature])
        })?;
        Ok((self.base_prediction - prediction).abs())
    }

    /// Scalar loop: accumulate each difference as it is produced
    pub fn sample_scalar(&self, feature: usize, rng: &mut Xoshiro256PlusPlus) -> Result<Moments> {
        let mut perturbed = self.input.to_vec();
        let mut moments = Moments::default();
        for _ in 0..self.samples {
            perturbed[feature] = self.perturbed_value(feature, rng);
            moments.push(self.difference(feature, &perturbed)?);
        }
        Ok(moments)
    }

    /// Lane loop: fill a scratch buffer lane group by lane group, then reduce
    pub fn sample_lanes(
        &self,
        feature: usize,
        rng: &mut Xoshiro256PlusPlus,
        scratch: &Arc<ScratchPool>,
    ) -> Result<Moments> {
        let mut diffs = scratch.checkout(self.samples);
        let mut perturbed = self.input.to_vec();

        let full = self.samples - self.samples % LANES;
        for group in diffs[..full].chunks_exact_mut(LANES) {
            for slot in group.iter_mut() {
                perturbed[feature] = self.perturbed_value(feature, rng);
                *slot = self.difference(feature, &perturbed)?;
            }
        }
        for slot in diffs[full..].iter_mut() {
            perturbed[feature] = self.perturbed_value(feature, rng);
            *slot = self.difference(feature, &perturbed)?;
        }

        Ok(SimdOps::moments(&diffs))
    }
}
