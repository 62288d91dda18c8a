//! Engine configuration
//!
//! One JSON document configures every component. Missing keys fall back to
//! their defaults.

use crate::drift::{DriftThresholds, ExplanationDriftDetector};
use crate::error::{ExplainError, Result};
use crate::explain::{
    ConvergenceConfig, ConvergenceController, ExecutionContext, Explainer, PerturbationSampler,
    SamplerConfig,
};
use crate::robustness::{RobustnessConfig, RobustnessEvaluator};
use crate::utils::ParallelConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Which explainer the engine hands out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplainerKind {
    /// Fixed sample count
    #[default]
    Perturbation,
    /// Adaptive sample count
    Convergent,
}

impl fmt::Display for ExplainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExplainerKind::Perturbation => write!(f, "perturbation"),
            ExplainerKind::Convergent => write!(f, "convergent"),
        }
    }
}

impl FromStr for ExplainerKind {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "perturbation" => Ok(ExplainerKind::Perturbation),
            "convergent" | "adaptive" => Ok(ExplainerKind::Convergent),
            other => Err(ExplainError::ConfigError(format!(
                "Unknown explainer '{}'",
                other
            ))),
        }
    }
}

/// Drift detection settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub thresholds: DriftThresholds,
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub explainer: ExplainerKind,
    pub sampler: SamplerConfig,
    pub convergence: ConvergenceConfig,
    pub robustness: RobustnessConfig,
    pub drift: DriftConfig,
    pub parallel: ParallelConfig,
}

impl EngineConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ExplainError::ConfigError(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        info!(path = %path.display(), explainer = %config.explainer, "Loaded configuration");
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Set explainer kind
    pub fn with_explainer(mut self, explainer: ExplainerKind) -> Self {
        self.explainer = explainer;
        self
    }

    /// Set sampler settings
    pub fn with_sampler(mut self, sampler: SamplerConfig) -> Self {
        self.sampler = sampler;
        self
    }

    /// Set convergence settings
    pub fn with_convergence(mut self, convergence: ConvergenceConfig) -> Self {
        self.convergence = convergence;
        self
    }

    /// Set robustness settings
    pub fn with_robustness(mut self, robustness: RobustnessConfig) -> Self {
        self.robustness = robustness;
        self
    }

    /// Check every section
    pub fn validate(&self) -> Result<()> {
        self.sampler.validate()?;
        self.convergence.validate()?;
        self.robustness.validate()?;
        self.drift.thresholds.validate()?;
        if self.parallel.n_threads == Some(0) {
            return Err(ExplainError::invalid_parameter(
                "parallel.n_threads",
                0,
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Execution context with the configured thread pool
    pub fn execution_context(&self) -> Result<ExecutionContext> {
        ExecutionContext::from_config(&self.parallel)
    }

    /// Sampler sharing `exec`
    pub fn build_sampler(&self, exec: ExecutionContext) -> PerturbationSampler {
        PerturbationSampler::new(self.sampler.clone()).with_context(exec)
    }

    /// Explainer of the configured kind
    pub fn build_explainer(&self, exec: ExecutionContext) -> Box<dyn Explainer> {
        let sampler = self.build_sampler(exec);
        match self.explainer {
            ExplainerKind::Perturbation => Box::new(sampler),
            ExplainerKind::Convergent => {
                Box::new(ConvergenceController::new(sampler, self.convergence.clone()))
            }
        }
    }

    /// Robustness evaluator
    pub fn build_evaluator(&self) -> RobustnessEvaluator {
        RobustnessEvaluator::new(self.robustness.clone())
    }

    /// Drift detector with the configured thresholds
    pub fn build_drift_detector(&self) -> Result<ExplanationDriftDetector> {
        ExplanationDriftDetector::new().with_thresholds(self.drift.thresholds.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::ExecutionStrategy;
    use crate::robustness::PerturbationType;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.explainer, ExplainerKind::Perturbation);
        assert_eq!(config.sampler.samples, 100);
        assert_eq!(config.sampler.noise, 0.01);
        assert_eq!(config.convergence.min_samples, 10);
        assert_eq!(config.convergence.max_samples, 100);
        assert_eq!(config.robustness.num_perturbations, 100);
        assert_eq!(config.robustness.magnitude, 0.01);
        assert_eq!(config.drift.thresholds.high, 0.4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{
                "explainer": "convergent",
                "sampler": { "noise": 0.05, "strategy": "vectorized" },
                "robustness": { "perturbation_type": "uniform" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.explainer, ExplainerKind::Convergent);
        assert_eq!(config.sampler.noise, 0.05);
        assert_eq!(config.sampler.samples, 100);
        assert_eq!(config.sampler.strategy, ExecutionStrategy::Vectorized);
        assert_eq!(config.robustness.perturbation_type, PerturbationType::Uniform);
        assert_eq!(config.robustness.num_perturbations, 100);

        let explainer = config.build_explainer(ExecutionContext::new());
        assert_eq!(explainer.name(), "convergent-perturbation");
    }

    #[test]
    fn test_out_of_range_rejected() {
        for json in [
            r#"{"sampler": {"noise": -1.0}}"#,
            r#"{"convergence": {"min_samples": 50, "max_samples": 10}}"#,
            r#"{"robustness": {"magnitude": 0.9}}"#,
            r#"{"robustness": {"num_perturbations": 3}}"#,
            r#"{"drift": {"thresholds": {"low": 0.5}}}"#,
            r#"{"parallel": {"n_threads": 0}}"#,
            r#"{"explainer": "lime"}"#,
        ] {
            assert!(EngineConfig::from_json_str(json).is_err(), "{}", json);
        }
    }

    #[test]
    fn test_file_round_trip() {
        let config = EngineConfig::new()
            .with_explainer(ExplainerKind::Convergent)
            .with_sampler(SamplerConfig::new().with_seed(7));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_json().unwrap().as_bytes()).unwrap();

        let loaded = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(loaded, config);
        assert!(EngineConfig::from_json_file("/nonexistent/config.json").is_err());
    }

    #[test]
    fn test_explainer_kind_parsing() {
        assert_eq!("Adaptive".parse::<ExplainerKind>().unwrap(), ExplainerKind::Convergent);
        assert!("shap".parse::<ExplainerKind>().is_err());
    }
}
