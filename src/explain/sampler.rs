//! Perturbation sampler
//!
//! For every feature, replaces the input value by its baseline (plus
//! bounded noise) `samples` times and records how far the prediction moves.
//! The mean move is the feature's importance; the spread of the moves
//! gives its stability.

use crate::error::{ensure_finite, ExplainError, Result};
use crate::explain::explanation::{Explanation, ExplanationMetadata, FeatureAttribution};
use crate::explain::strategy::{ExecutionContext, ExecutionStrategy, FeatureJob};
use crate::explain::Explainer;
use crate::model::{ModelContext, Predictor};
use crate::utils::Moments;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Means smaller than this are treated as exactly zero
pub const NEAR_ZERO_MEAN: f64 = 1e-10;

/// Coefficients of variation above this are treated as pathological
pub const MAX_CV: f64 = 10.0;

/// What to do with a non-finite or pathologically large coefficient of variation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtremeCvPolicy {
    /// Report maximal instability (stability 0)
    #[default]
    Unstable,
    /// Legacy mapping: treat the CV as 0 (stability 1)
    Stable,
}

/// Sampler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Perturbation samples per feature
    pub samples: usize,
    /// Half-width of the uniform noise added to each baseline value
    pub noise: f64,
    /// Seed for every random draw
    pub seed: u64,
    /// Execution strategy
    pub strategy: ExecutionStrategy,
    /// Extreme-CV handling
    pub extreme_cv_policy: ExtremeCvPolicy,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            samples: 100,
            noise: 0.01,
            seed: 42,
            strategy: ExecutionStrategy::Sequential,
            extreme_cv_policy: ExtremeCvPolicy::Unstable,
        }
    }
}

impl SamplerConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set samples per feature
    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    /// Set noise half-width
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set execution strategy
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set extreme-CV handling
    pub fn with_extreme_cv_policy(mut self, policy: ExtremeCvPolicy) -> Self {
        self.extreme_cv_policy = policy;
        self
    }

    /// Reject out-of-range settings
    pub fn validate(&self) -> Result<()> {
        validate_noise(self.noise)
    }
}

fn validate_noise(noise: f64) -> Result<()> {
    if !noise.is_finite() || noise < 0.0 {
        return Err(ExplainError::invalid_parameter(
            "noise",
            noise,
            "must be finite and non-negative",
        ));
    }
    Ok(())
}

/// Per-feature statistics behind one attribution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureEstimate {
    /// Mean absolute prediction change
    pub importance: f64,
    /// Standard deviation of the prediction changes
    pub std_dev: f64,
    /// `max - min` of the prediction changes
    pub spread: f64,
    /// Coefficient of variation after clamping
    pub cv: f64,
    /// `clamp(1 - cv, 0, 1)`
    pub stability: f64,
}

impl FeatureEstimate {
    /// Derive importance and stability from accumulated differences
    pub fn from_moments(moments: &Moments, policy: ExtremeCvPolicy) -> Self {
        let importance = moments.mean();
        let std_dev = moments.std_dev();

        let cv = if moments.count < 2 || importance.abs() < NEAR_ZERO_MEAN {
            0.0
        } else {
            let raw = std_dev / importance.abs();
            if raw.is_finite() && raw <= MAX_CV {
                raw
            } else {
                match policy {
                    ExtremeCvPolicy::Unstable => MAX_CV,
                    ExtremeCvPolicy::Stable => 0.0,
                }
            }
        };

        Self {
            importance,
            std_dev,
            spread: moments.spread(),
            cv,
            stability: (1.0 - cv).clamp(0.0, 1.0),
        }
    }
}

/// Monte-Carlo perturbation explainer
#[derive(Debug, Clone)]
pub struct PerturbationSampler {
    config: SamplerConfig,
    exec: ExecutionContext,
}

impl PerturbationSampler {
    /// Create a sampler with its own execution context
    pub fn new(config: SamplerConfig) -> Self {
        Self {
            config,
            exec: ExecutionContext::new(),
        }
    }

    /// Share an execution context (thread pool, scratch pool, stats)
    pub fn with_context(mut self, exec: ExecutionContext) -> Self {
        self.exec = exec;
        self
    }

    /// Override the execution strategy
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Current configuration
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Execution context
    pub fn execution_context(&self) -> &ExecutionContext {
        &self.exec
    }

    /// Explain one input with explicit sampling parameters
    pub fn explain_with(
        &self,
        model: &dyn Predictor,
        input: &[f64],
        context: &ModelContext,
        samples: usize,
        noise: f64,
        seed: u64,
    ) -> Result<Explanation> {
        self.run(model, input, context, samples, noise, seed, self.config.strategy)
            .map(|(explanation, _)| explanation)
    }

    /// Explain many instances, fanning out over instances
    ///
    /// Each instance runs its features without a nested fan-out, so total
    /// parallelism stays bounded by the execution context's pool.
    pub fn explain_batch(
        &self,
        model: &dyn Predictor,
        instances: &Array2<f64>,
        context: &ModelContext,
    ) -> Result<Vec<Explanation>> {
        let rows: Vec<Vec<f64>> = instances.rows().into_iter().map(|r| r.to_vec()).collect();
        let strategy = self.config.strategy.nested();
        self.exec.install(|| {
            rows.par_iter()
                .enumerate()
                .map(|(idx, row)| {
                    self.run(
                        model,
                        row,
                        context,
                        self.config.samples,
                        self.config.noise,
                        self.config.seed,
                        strategy,
                    )
                    .map(|(explanation, _)| explanation)
                    .map_err(|e| ExplainError::task_failed(format!("instance {}", idx), e))
                })
                .collect()
        })
    }

    /// Explanation plus the per-feature statistics it was built from
    pub(crate) fn estimate(
        &self,
        model: &dyn Predictor,
        input: &[f64],
        context: &ModelContext,
        samples: usize,
    ) -> Result<(Explanation, Vec<FeatureEstimate>)> {
        self.run(
            model,
            input,
            context,
            samples,
            self.config.noise,
            self.config.seed,
            self.config.strategy,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn run(
        &self,
        model: &dyn Predictor,
        input: &[f64],
        context: &ModelContext,
        samples: usize,
        noise: f64,
        seed: u64,
        strategy: ExecutionStrategy,
    ) -> Result<(Explanation, Vec<FeatureEstimate>)> {
        let start = Instant::now();
        let result = self.run_inner(model, input, context, samples, noise, seed, strategy);
        match &result {
            Ok(_) => self.exec.stats().record_explanation(start.elapsed()),
            Err(_) => self.exec.stats().record_failure(),
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn run_inner(
        &self,
        model: &dyn Predictor,
        input: &[f64],
        context: &ModelContext,
        samples: usize,
        noise: f64,
        seed: u64,
        strategy: ExecutionStrategy,
    ) -> Result<(Explanation, Vec<FeatureEstimate>)> {
        context.validate_for(model, input)?;
        validate_noise(noise)?;

        let prediction = ensure_finite(model.predict(input)?, || "Prediction".to_string())?;
        let baseline = ensure_finite(model.predict(context.baselines())?, || {
            "Prediction at the baselines".to_string()
        })?;

        debug!(
            model = model.name(),
            features = input.len(),
            samples,
            %strategy,
            "Sampling perturbations"
        );

        let job = FeatureJob {
            model,
            input,
            baselines: context.baselines(),
            names: context.feature_names(),
            base_prediction: prediction,
            samples,
            noise,
        };
        let moments = strategy.run(&job, &self.exec, seed)?;

        let estimates: Vec<FeatureEstimate> = moments
            .iter()
            .map(|m| FeatureEstimate::from_moments(m, self.config.extreme_cv_policy))
            .collect();

        let attributions = context
            .feature_names()
            .iter()
            .zip(&estimates)
            .map(|(name, est)| FeatureAttribution::new(name.clone(), est.importance, est.stability))
            .collect::<Result<Vec<_>>>()?;

        let explanation = Explanation::new(
            prediction,
            baseline,
            attributions,
            ExplanationMetadata::new(self.name(), seed, samples),
        )?;

        Ok((explanation, estimates))
    }
}

impl Default for PerturbationSampler {
    fn default() -> Self {
        Self::new(SamplerConfig::default())
    }
}

impl Explainer for PerturbationSampler {
    fn name(&self) -> &str {
        "perturbation"
    }

    fn explain(
        &self,
        model: &dyn Predictor,
        input: &[f64],
        context: &ModelContext,
    ) -> Result<Explanation> {
        self.explain_with(
            model,
            input,
            context,
            self.config.samples,
            self.config.noise,
            self.config.seed,
        )
    }
}
