//! Adaptive sample-size search
//!
//! Re-runs the sampler at growing sample counts until two consecutive
//! explanations agree within a relative tolerance, or the sample cap is hit.

use crate::error::{ExplainError, Result};
use crate::explain::explanation::Explanation;
use crate::explain::sampler::PerturbationSampler;
use crate::explain::Explainer;
use crate::model::{ModelContext, Predictor};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Floor for the denominator of relative changes
const RELATIVE_FLOOR: f64 = 1e-10;

/// Convergence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    /// Largest relative per-feature change accepted as converged
    pub epsilon: f64,
    /// Samples for the first iteration
    pub min_samples: usize,
    /// Hard cap on samples; always terminates here
    pub max_samples: usize,
    /// Samples added per iteration
    pub step: usize,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.01,
            min_samples: 10,
            max_samples: 100,
            step: 10,
        }
    }
}

impl ConvergenceConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set tolerance
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Set sample range
    pub fn with_samples(mut self, min_samples: usize, max_samples: usize) -> Self {
        self.min_samples = min_samples;
        self.max_samples = max_samples;
        self
    }

    /// Set step
    pub fn with_step(mut self, step: usize) -> Self {
        self.step = step;
        self
    }

    /// Reject out-of-range settings
    pub fn validate(&self) -> Result<()> {
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(ExplainError::invalid_parameter(
                "epsilon",
                self.epsilon,
                "must be finite and positive",
            ));
        }
        // One sample always has zero spread and would pass the first-iteration check
        if self.min_samples < 2 {
            return Err(ExplainError::invalid_parameter(
                "min_samples",
                self.min_samples,
                "must be at least 2",
            ));
        }
        if self.max_samples < self.min_samples {
            return Err(ExplainError::invalid_parameter(
                "max_samples",
                self.max_samples,
                "must be >= min_samples",
            ));
        }
        if self.step == 0 {
            return Err(ExplainError::invalid_parameter(
                "step",
                self.step,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Largest `|curr - prev| / max(|prev|, 1e-10)` over features
pub fn max_relative_change(previous: &Explanation, current: &Explanation) -> f64 {
    previous
        .attributions()
        .iter()
        .zip(current.attributions())
        .map(|(p, c)| {
            (c.importance() - p.importance()).abs() / p.importance().abs().max(RELATIVE_FLOOR)
        })
        .fold(0.0, f64::max)
}

/// Explainer that picks its own sample count
#[derive(Debug, Clone, Default)]
pub struct ConvergenceController {
    sampler: PerturbationSampler,
    config: ConvergenceConfig,
}

impl ConvergenceController {
    /// Wrap a sampler; its noise, seed and strategy are reused at every iteration
    pub fn new(sampler: PerturbationSampler, config: ConvergenceConfig) -> Self {
        Self { sampler, config }
    }

    /// Current configuration
    pub fn config(&self) -> &ConvergenceConfig {
        &self.config
    }

    /// Underlying sampler
    pub fn sampler(&self) -> &PerturbationSampler {
        &self.sampler
    }

    /// Run the adaptive loop with explicit settings
    ///
    /// The returned explanation records the sample count actually used in
    /// `metadata.trials` and whether tolerance was reached in
    /// `metadata.converged`. Hitting `max_samples` is not an error.
    pub fn explain_convergent(
        &self,
        model: &dyn Predictor,
        input: &[f64],
        context: &ModelContext,
        config: &ConvergenceConfig,
    ) -> Result<Explanation> {
        config.validate()?;

        let mut samples = config.min_samples;
        let mut previous: Option<Explanation> = None;

        loop {
            let (current, estimates) = self.sampler.estimate(model, input, context, samples)?;

            match &previous {
                // Zero spread in every feature: more samples cannot move the estimate
                None if estimates.iter().all(|e| e.spread == 0.0) => {
                    debug!(samples, "Converged on first iteration (zero spread)");
                    return Ok(current.with_convergence(self.name(), samples, true));
                }
                None => {}
                Some(prev) => {
                    let change = max_relative_change(prev, &current);
                    debug!(samples, max_relative_change = change, "Convergence iteration");
                    if change < config.epsilon {
                        return Ok(current.with_convergence(self.name(), samples, true));
                    }
                }
            }

            if samples >= config.max_samples {
                warn!(
                    samples,
                    epsilon = config.epsilon,
                    "Sample cap reached before convergence"
                );
                return Ok(current.with_convergence(self.name(), samples, false));
            }

            samples = (samples + config.step).min(config.max_samples);
            previous = Some(current);
        }
    }
}

impl Explainer for ConvergenceController {
    fn name(&self) -> &str {
        "convergent-perturbation"
    }

    fn explain(
        &self,
        model: &dyn Predictor,
        input: &[f64],
        context: &ModelContext,
    ) -> Result<Explanation> {
        self.explain_convergent(model, input, context, &self.config)
    }
}
