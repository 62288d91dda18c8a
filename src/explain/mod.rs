//! Perturbation-based attribution
//!
//! Provides the attribution engine:
//! - Explanation data model (attributions, stability, metadata)
//! - Monte-Carlo perturbation sampler
//! - Sequential, concurrent and vectorized execution strategies
//! - Adaptive sample-size search

mod convergence;
mod explanation;
mod sampler;
mod strategy;

pub use convergence::{max_relative_change, ConvergenceConfig, ConvergenceController};
pub use explanation::{Explanation, ExplanationMetadata, FeatureAttribution, ALGORITHM_VERSION};
pub use sampler::{
    ExtremeCvPolicy, FeatureEstimate, PerturbationSampler, SamplerConfig, MAX_CV, NEAR_ZERO_MEAN,
};
pub use strategy::{ExecutionContext, ExecutionStrategy};

use crate::error::Result;
use crate::model::{ModelContext, Predictor};

/// Anything that turns a model and an input into an [`Explanation`]
pub trait Explainer: Send + Sync {
    /// Name recorded in explanation metadata
    fn name(&self) -> &str;

    /// Explain one input
    fn explain(
        &self,
        model: &dyn Predictor,
        input: &[f64],
        context: &ModelContext,
    ) -> Result<Explanation>;
}
