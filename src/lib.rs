//! Kolosal Explain - Perturbation-based model explanations
//!
//! This crate estimates, per input feature, how much that feature
//! contributed to one prediction of an opaque model, and how trustworthy the
//! estimate is.
//!
//! # Modules
//!
//! ## Attribution
//! - [`model`] - Predictor capability and feature context
//! - [`explain`] - Perturbation sampler, execution strategies, adaptive sampling
//!
//! ## Analyses
//! - [`drift`] - Drift between batches of explanations
//! - [`robustness`] - Explanation stability under input noise
//!
//! ## Infrastructure
//! - [`config`] - JSON engine configuration
//! - [`monitoring`] - Explanation counters and summaries
//! - [`utils`] - SIMD moments, scratch buffers, thread pools
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```
//! use kolosal_explain::prelude::*;
//!
//! let model = LinearModel::new(vec![0.3, 0.5, 0.2]);
//! let context = ModelContext::zeros(3).unwrap();
//! let sampler = PerturbationSampler::new(SamplerConfig::new().with_noise(0.0));
//!
//! let explanation = sampler.explain(&model, &[1.0, 1.0, 1.0], &context).unwrap();
//! assert_eq!(explanation.top_attributions()[0].feature(), "feature_1");
//! ```

// Core error handling
pub mod error;

// Attribution
pub mod model;
pub mod explain;

// Analyses
pub mod drift;
pub mod robustness;

// Infrastructure
pub mod config;
pub mod monitoring;
pub mod utils;

// Interfaces
pub mod cli;

pub use error::{ExplainError, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{EngineConfig, ExplainerKind};
    pub use crate::drift::{DriftLevel, DriftReport, DriftThresholds, ExplanationDriftDetector};
    pub use crate::error::{ExplainError, Result};
    pub use crate::explain::{
        ConvergenceConfig, ConvergenceController, ExecutionContext, ExecutionStrategy, Explainer,
        Explanation, ExplanationMetadata, ExtremeCvPolicy, FeatureAttribution,
        PerturbationSampler, SamplerConfig,
    };
    pub use crate::model::{FnModel, LinearCoefficientProvider, LinearModel, ModelContext, Predictor};
    pub use crate::monitoring::{ExplainStats, StatsSnapshot};
    pub use crate::robustness::{
        PerturbationType, RobustnessConfig, RobustnessEvaluator, RobustnessLevel, RobustnessReport,
    };
    pub use crate::utils::ParallelConfig;
}
