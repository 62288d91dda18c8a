//! Model capability and per-model context
//!
//! The engine treats a model as a pure scalar function over a feature vector.
//! Adapters for concrete classifier/regressor objects implement [`Predictor`];
//! adapters that know their closed-form weights additionally expose
//! [`LinearCoefficientProvider`] through [`Predictor::as_linear`].

use crate::error::{ExplainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A black-box predictive model
///
/// Implementations must be callable from many threads at once without
/// shared mutable state; the engine never mutates a model.
pub trait Predictor: Send + Sync {
    /// Predict a single scalar for one feature vector
    fn predict(&self, features: &[f64]) -> Result<f64>;

    /// Human-readable model name
    fn name(&self) -> &str {
        "model"
    }

    /// Closed-form weights, when the model has them
    fn as_linear(&self) -> Option<&dyn LinearCoefficientProvider> {
        None
    }
}

/// Capability exposed by models with explicit linear weights
pub trait LinearCoefficientProvider {
    /// One coefficient per feature, in feature order
    fn coefficients(&self) -> &[f64];

    /// Additive intercept term
    fn intercept(&self) -> f64;
}

/// Linear model `intercept + sum(coef_i * x_i)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LinearModel {
    /// Create a linear model with zero intercept
    pub fn new(coefficients: Vec<f64>) -> Self {
        Self {
            coefficients,
            intercept: 0.0,
        }
    }

    /// Set the intercept
    pub fn with_intercept(mut self, intercept: f64) -> Self {
        self.intercept = intercept;
        self
    }

    /// Number of input features
    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }
}

impl Predictor for LinearModel {
    fn predict(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.coefficients.len() {
            return Err(ExplainError::ShapeError {
                expected: format!("{} features", self.coefficients.len()),
                actual: format!("{} features", features.len()),
            });
        }
        Ok(self.intercept
            + self
                .coefficients
                .iter()
                .zip(features)
                .map(|(c, x)| c * x)
                .sum::<f64>())
    }

    fn name(&self) -> &str {
        "linear"
    }

    fn as_linear(&self) -> Option<&dyn LinearCoefficientProvider> {
        Some(self)
    }
}

impl LinearCoefficientProvider for LinearModel {
    fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    fn intercept(&self) -> f64 {
        self.intercept
    }
}

/// Adapter turning a plain closure into a [`Predictor`]
pub struct FnModel<F>
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    predict_fn: F,
    name: String,
}

impl<F> FnModel<F>
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    /// Wrap a prediction closure
    pub fn new(predict_fn: F) -> Self {
        Self {
            predict_fn,
            name: "fn".to_string(),
        }
    }

    /// Set the model name reported in logs
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<F> Predictor for FnModel<F>
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn predict(&self, features: &[f64]) -> Result<f64> {
        Ok((self.predict_fn)(features))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for FnModel<F>
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnModel").field("name", &self.name).finish()
    }
}

/// Feature names and reference values for one model
///
/// Built once per model and reused across explanations. Deserialization
/// runs the same checks as [`ModelContext::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawModelContext")]
pub struct ModelContext {
    feature_names: Vec<String>,
    baselines: Vec<f64>,
}

#[derive(Deserialize)]
struct RawModelContext {
    feature_names: Vec<String>,
    baselines: Vec<f64>,
}

impl TryFrom<RawModelContext> for ModelContext {
    type Error = ExplainError;

    fn try_from(raw: RawModelContext) -> Result<Self> {
        Self::new(raw.feature_names, raw.baselines)
    }
}

impl ModelContext {
    /// Create a context; names and baselines must line up one to one
    pub fn new(feature_names: Vec<String>, baselines: Vec<f64>) -> Result<Self> {
        if feature_names.is_empty() {
            return Err(ExplainError::InvalidInput(
                "Model context needs at least one feature".to_string(),
            ));
        }
        if feature_names.len() != baselines.len() {
            return Err(ExplainError::ShapeError {
                expected: format!("{} baselines", feature_names.len()),
                actual: format!("{} baselines", baselines.len()),
            });
        }
        let mut seen = HashSet::with_capacity(feature_names.len());
        for name in &feature_names {
            if !seen.insert(name.as_str()) {
                return Err(ExplainError::InvalidInput(format!(
                    "Duplicate feature name '{}'",
                    name
                )));
            }
        }
        for (name, value) in feature_names.iter().zip(&baselines) {
            if !value.is_finite() {
                return Err(ExplainError::NumericError(format!(
                    "Baseline for '{}' is not finite ({})",
                    name, value
                )));
            }
        }
        Ok(Self {
            feature_names,
            baselines,
        })
    }

    /// Create a context with generated names `feature_0..feature_n`
    pub fn with_baselines(baselines: Vec<f64>) -> Result<Self> {
        let names = (0..baselines.len()).map(|i| format!("feature_{}", i)).collect();
        Self::new(names, baselines)
    }

    /// Create a context with all-zero baselines
    pub fn zeros(n_features: usize) -> Result<Self> {
        Self::with_baselines(vec![0.0; n_features])
    }

    /// Feature names in input order
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Reference values in input order
    pub fn baselines(&self) -> &[f64] {
        &self.baselines
    }

    /// Number of features
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Check that `input` (and the model's weights, if exposed) match this context
    pub fn validate_for(&self, model: &dyn Predictor, input: &[f64]) -> Result<()> {
        if input.is_empty() {
            return Err(ExplainError::InvalidInput("Input vector is empty".to_string()));
        }
        if input.len() != self.n_features() {
            return Err(ExplainError::ShapeError {
                expected: format!("{} features", self.n_features()),
                actual: format!("{} features", input.len()),
            });
        }
        if let Some((idx, value)) = input.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(ExplainError::NumericError(format!(
                "Input feature '{}' is not finite ({})",
                self.feature_names[idx], value
            )));
        }
        if let Some(linear) = model.as_linear() {
            let n_coef = linear.coefficients().len();
            if n_coef != self.n_features() {
                return Err(ExplainError::ShapeError {
                    expected: format!("{} coefficients", self.n_features()),
                    actual: format!("{} coefficients", n_coef),
                });
            }
        }
        Ok(())
    }
}
