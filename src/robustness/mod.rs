//! Explanation robustness
//!
//! Measures how much an explanation moves when the explained instance is
//! nudged by small random noise.

mod evaluator;

pub use evaluator::RobustnessEvaluator;

use crate::error::{ExplainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Noise applied to the instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerturbationType {
    /// Additive `N(0, magnitude)`
    #[default]
    Gaussian,
    /// Additive `U(-magnitude, magnitude)`
    Uniform,
    /// Reserved; evaluation fails with [`ExplainError::Unsupported`]
    Adversarial,
}

impl fmt::Display for PerturbationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PerturbationType::Gaussian => "gaussian",
            PerturbationType::Uniform => "uniform",
            PerturbationType::Adversarial => "adversarial",
        };
        f.write_str(s)
    }
}

impl FromStr for PerturbationType {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gaussian" | "normal" => Ok(PerturbationType::Gaussian),
            "uniform" => Ok(PerturbationType::Uniform),
            "adversarial" => Ok(PerturbationType::Adversarial),
            other => Err(ExplainError::invalid_parameter(
                "perturbation_type",
                other,
                "expected gaussian, uniform or adversarial",
            )),
        }
    }
}

/// Robustness evaluation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobustnessConfig {
    /// Number of perturbed copies of the instance (at least 10)
    pub num_perturbations: usize,
    /// Noise scale, in `(0, 0.5]`
    pub magnitude: f64,
    pub perturbation_type: PerturbationType,
    /// Seed for the instance noise
    pub seed: u64,
    /// Explain perturbed copies in parallel
    pub parallel: bool,
}

impl Default for RobustnessConfig {
    fn default() -> Self {
        Self {
            num_perturbations: 100,
            magnitude: 0.01,
            perturbation_type: PerturbationType::Gaussian,
            seed: 42,
            parallel: false,
        }
    }
}

impl RobustnessConfig {
    /// Smallest accepted number of perturbations
    pub const MIN_PERTURBATIONS: usize = 10;
    /// Largest accepted magnitude
    pub const MAX_MAGNITUDE: f64 = 0.5;

    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set number of perturbations
    pub fn with_perturbations(mut self, n: usize) -> Self {
        self.num_perturbations = n;
        self
    }

    /// Set noise magnitude
    pub fn with_magnitude(mut self, magnitude: f64) -> Self {
        self.magnitude = magnitude;
        self
    }

    /// Set noise kind
    pub fn with_type(mut self, perturbation_type: PerturbationType) -> Self {
        self.perturbation_type = perturbation_type;
        self
    }

    /// Set seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enable parallel trials
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Reject out-of-range settings
    pub fn validate(&self) -> Result<()> {
        if self.num_perturbations < Self::MIN_PERTURBATIONS {
            return Err(ExplainError::invalid_parameter(
                "num_perturbations",
                self.num_perturbations,
                &format!("must be at least {}", Self::MIN_PERTURBATIONS),
            ));
        }
        if !(self.magnitude > 0.0 && self.magnitude <= Self::MAX_MAGNITUDE) {
            return Err(ExplainError::invalid_parameter(
                "magnitude",
                self.magnitude,
                "must be in (0, 0.5]",
            ));
        }
        Ok(())
    }
}

/// Interpretation band of a robustness score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobustnessLevel {
    /// Score above 0.95
    HighlyRobust,
    /// Score in `[0.85, 0.95]`
    ModeratelyRobust,
    /// Score below 0.85
    Unstable,
}

impl RobustnessLevel {
    /// Band for a score
    pub fn from_score(score: f64) -> Self {
        if score > 0.95 {
            RobustnessLevel::HighlyRobust
        } else if score >= 0.85 {
            RobustnessLevel::ModeratelyRobust
        } else {
            RobustnessLevel::Unstable
        }
    }

    /// Operator guidance for the band
    pub fn recommendation(&self) -> &'static str {
        match self {
            RobustnessLevel::HighlyRobust => "Explanations are highly robust to small input changes.",
            RobustnessLevel::ModeratelyRobust => {
                "Explanations are moderately robust; monitor them over time."
            }
            RobustnessLevel::Unstable => {
                "Explanations are unstable under small input changes; investigate before relying on them."
            }
        }
    }
}

impl fmt::Display for RobustnessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RobustnessLevel::HighlyRobust => "highly robust",
            RobustnessLevel::ModeratelyRobust => "moderately robust",
            RobustnessLevel::Unstable => "unstable",
        };
        f.write_str(s)
    }
}

/// Robustness of one instance's explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustnessReport {
    /// Mean per-trial stability
    pub score: f64,
    pub mean_stability: f64,
    pub std_stability: f64,
    pub min_stability: f64,
    /// Largest normalized distance from the baseline attributions
    pub max_drift: f64,
    pub num_perturbations: usize,
    pub perturbation_magnitude: f64,
    pub perturbation_type: PerturbationType,
    pub elapsed: Duration,
}

impl RobustnessReport {
    /// Interpretation band
    pub fn level(&self) -> RobustnessLevel {
        RobustnessLevel::from_score(self.score)
    }

    /// Guidance for the band
    pub fn recommendation(&self) -> &'static str {
        self.level().recommendation()
    }

    /// Generate summary string
    pub fn summary(&self) -> String {
        format!(
            "Robustness {:.4} ({}) over {} {} perturbations of magnitude {}: \
             min stability {:.4}, max drift {:.4}, took {:.2?}",
            self.score,
            self.level(),
            self.num_perturbations,
            self.perturbation_type,
            self.perturbation_magnitude,
            self.min_stability,
            self.max_drift,
            self.elapsed
        )
    }
}
