//! Explanation data model

use crate::error::{ExplainError, Result};
use chrono::{DateTime, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Version tag stamped into every explanation produced by this crate
pub const ALGORITHM_VERSION: &str = "perturbation-v1";

/// Contribution of one feature to a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAttribution {
    feature: String,
    importance: f64,
    stability_score: f64,
}

impl FeatureAttribution {
    /// Create an attribution; the stability score is clamped to `[0, 1]`
    pub fn new(feature: impl Into<String>, importance: f64, stability_score: f64) -> Result<Self> {
        let feature = feature.into();
        if !importance.is_finite() {
            return Err(ExplainError::NumericError(format!(
                "Importance for '{}' is not finite ({})",
                feature, importance
            )));
        }
        if !stability_score.is_finite() {
            return Err(ExplainError::NumericError(format!(
                "Stability for '{}' is not finite ({})",
                feature, stability_score
            )));
        }
        Ok(Self {
            feature,
            importance,
            stability_score: stability_score.clamp(0.0, 1.0),
        })
    }

    /// Feature identifier
    pub fn feature(&self) -> &str {
        &self.feature
    }

    /// Signed importance
    pub fn importance(&self) -> f64 {
        self.importance
    }

    /// Stability in `[0, 1]`, 1 meaning no sampling variance
    pub fn stability_score(&self) -> f64 {
        self.stability_score
    }

    /// Width of the confidence interval, `1 - stability` clamped to `[0, 1]`
    pub fn confidence_interval(&self) -> f64 {
        (1.0 - self.stability_score).clamp(0.0, 1.0)
    }
}

/// Provenance of an explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationMetadata {
    /// Name of the explainer that produced the explanation
    pub explainer_name: String,
    /// Seed driving every random draw
    pub seed: u64,
    /// Perturbation samples per feature actually used
    pub trials: usize,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Algorithm version, if known
    pub algorithm_version: Option<String>,
    /// False when an adaptive run hit its sample cap before reaching tolerance
    pub converged: bool,
}

impl ExplanationMetadata {
    /// Metadata for a fixed-sample run
    pub fn new(explainer_name: impl Into<String>, seed: u64, trials: usize) -> Self {
        Self {
            explainer_name: explainer_name.into(),
            seed,
            trials,
            timestamp: Utc::now(),
            algorithm_version: Some(ALGORITHM_VERSION.to_string()),
            converged: true,
        }
    }
}

/// Immutable explanation of one prediction
///
/// `attributions` holds exactly one entry per input feature, in input order,
/// and every number in it is finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    prediction: f64,
    baseline: f64,
    attributions: Vec<FeatureAttribution>,
    metadata: ExplanationMetadata,
}

impl Explanation {
    /// Assemble an explanation, rejecting non-finite predictions
    pub fn new(
        prediction: f64,
        baseline: f64,
        attributions: Vec<FeatureAttribution>,
        metadata: ExplanationMetadata,
    ) -> Result<Self> {
        let explanation = Self {
            prediction,
            baseline,
            attributions,
            metadata,
        };
        explanation.validate()?;
        Ok(explanation)
    }

    /// Re-check the finiteness contract, e.g. after deserializing
    pub fn validate(&self) -> Result<()> {
        if !self.prediction.is_finite() {
            return Err(ExplainError::NumericError(format!(
                "Prediction is not finite ({})",
                self.prediction
            )));
        }
        if !self.baseline.is_finite() {
            return Err(ExplainError::NumericError(format!(
                "Baseline prediction is not finite ({})",
                self.baseline
            )));
        }
        for attr in &self.attributions {
            if !attr.importance.is_finite() || !attr.stability_score.is_finite() {
                return Err(ExplainError::NumericError(format!(
                    "Attribution for '{}' is not finite",
                    attr.feature
                )));
            }
            if !(0.0..=1.0).contains(&attr.stability_score) {
                return Err(ExplainError::NumericError(format!(
                    "Stability for '{}' outside [0, 1] ({})",
                    attr.feature, attr.stability_score
                )));
            }
        }
        Ok(())
    }

    /// Model prediction for the explained input
    pub fn prediction(&self) -> f64 {
        self.prediction
    }

    /// Model prediction at the baseline vector
    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    /// Attributions in input feature order
    pub fn attributions(&self) -> &[FeatureAttribution] {
        &self.attributions
    }

    /// Provenance
    pub fn metadata(&self) -> &ExplanationMetadata {
        &self.metadata
    }

    /// Whether the producing run reached its tolerance
    pub fn converged(&self) -> bool {
        self.metadata.converged
    }

    /// Number of features
    pub fn len(&self) -> usize {
        self.attributions.len()
    }

    /// True for an explanation without attributions
    pub fn is_empty(&self) -> bool {
        self.attributions.is_empty()
    }

    /// Look up an attribution by feature name
    pub fn attribution(&self, feature: &str) -> Option<&FeatureAttribution> {
        self.attributions.iter().find(|a| a.feature == feature)
    }

    /// Attributions sorted by descending absolute importance
    pub fn top_attributions(&self) -> Vec<&FeatureAttribution> {
        let mut sorted: Vec<&FeatureAttribution> = self.attributions.iter().collect();
        sorted.sort_by(|a, b| {
            b.importance
                .abs()
                .partial_cmp(&a.importance.abs())
                .unwrap_or(Ordering::Equal)
        });
        sorted
    }

    /// The `k` most important attributions
    pub fn top_k(&self, k: usize) -> Vec<&FeatureAttribution> {
        self.top_attributions().into_iter().take(k).collect()
    }

    /// Mean stability across features, 1.0 when there are none
    pub fn overall_stability(&self) -> f64 {
        if self.attributions.is_empty() {
            return 1.0;
        }
        self.attributions.iter().map(|a| a.stability_score).sum::<f64>()
            / self.attributions.len() as f64
    }

    /// Importances as a dense vector in feature order
    pub fn importance_vector(&self) -> Array1<f64> {
        self.attributions.iter().map(|a| a.importance).collect()
    }

    /// Short human-readable listing, most important first
    pub fn summary(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!(
            "Explanation ({}, {} trials{})\n",
            self.metadata.explainer_name,
            self.metadata.trials,
            if self.metadata.converged { "" } else { ", not converged" }
        ));
        s.push_str(&format!("  Prediction: {:.4}\n", self.prediction));
        s.push_str(&format!("  Baseline:   {:.4}\n", self.baseline));
        s.push_str(&format!("  Stability:  {:.4}\n", self.overall_stability()));
        for attr in self.top_attributions() {
            s.push_str(&format!(
                "    {:<20} {:>10.4}  (stability {:.3})\n",
                attr.feature, attr.importance, attr.stability_score
            ));
        }
        s
    }

    pub(crate) fn with_convergence(mut self, explainer_name: &str, trials: usize, converged: bool) -> Self {
        self.metadata.explainer_name = explainer_name.to_string();
        self.metadata.trials = trials;
        self.metadata.converged = converged;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explanation(importances: &[(&str, f64, f64)]) -> Explanation {
        let attributions = importances
            .iter()
            .map(|(name, imp, stab)| FeatureAttribution::new(*name, *imp, *stab).unwrap())
            .collect();
        Explanation::new(1.0, 0.0, attributions, ExplanationMetadata::new("test", 7, 10)).unwrap()
    }

    #[test]
    fn test_top_attributions() {
        let exp = explanation(&[("a", 1.0, 1.0), ("b", -3.0, 0.5), ("c", 2.0, 0.0)]);
        let top = exp.top_attributions();
        assert_eq!(top[0].feature(), "b");
        assert_eq!(top[1].feature(), "c");
        assert_eq!(top[2].feature(), "a");
        assert_eq!(exp.top_k(1).len(), 1);
    }

    #[test]
    fn test_overall_stability() {
        let exp = explanation(&[("a", 1.0, 1.0), ("b", 1.0, 0.5)]);
        assert!((exp.overall_stability() - 0.75).abs() < 1e-12);

        let empty = explanation(&[]);
        assert_eq!(empty.overall_stability(), 1.0);
    }

    #[test]
    fn test_stability_clamped() {
        let attr = FeatureAttribution::new("a", 0.1, 1.7).unwrap();
        assert_eq!(attr.stability_score(), 1.0);
        assert_eq!(attr.confidence_interval(), 0.0);

        let attr = FeatureAttribution::new("a", 0.1, -0.2).unwrap();
        assert_eq!(attr.stability_score(), 0.0);
        assert_eq!(attr.confidence_interval(), 1.0);
    }

    #[test]
    fn test_rejects_non_finite() {
        assert!(FeatureAttribution::new("a", f64::NAN, 1.0).is_err());
        let err = Explanation::new(f64::INFINITY, 0.0, vec![], ExplanationMetadata::new("t", 0, 1));
        assert!(matches!(err, Err(ExplainError::NumericError(_))));
    }

    #[test]
    fn test_importance_vector_and_lookup() {
        let exp = explanation(&[("a", 0.3, 1.0), ("b", 0.5, 1.0)]);
        assert_eq!(exp.importance_vector().to_vec(), vec![0.3, 0.5]);
        assert_eq!(exp.attribution("b").map(|a| a.importance()), Some(0.5));
        assert!(exp.attribution("z").is_none());
        assert!(exp.summary().contains("Prediction: 1.0000"));
    }

    #[test]
    fn test_serde_roundtrip_keeps_contract() {
        let exp = explanation(&[("a", 0.3, 0.9)]);
        let json = serde_json::to_string(&exp).unwrap();
        let back: Explanation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, exp);
        assert!(back.validate().is_ok());
    }

    #[test]
    fn test_json_keeps_full_float_precision() {
        let exp = explanation(&[("a", 0.1 + 0.2, 0.994_237_036_607_801_6)]);
        let back: Explanation = serde_json::from_str(&serde_json::to_string(&exp).unwrap()).unwrap();
        let (orig, parsed) = (&exp.attributions()[0], &back.attributions()[0]);
        assert_eq!(parsed.stability_score().to_bits(), orig.stability_score().to_bits());
        assert_eq!(parsed.importance().to_bits(), orig.importance().to_bits());
        assert_eq!(
            parsed.confidence_interval().to_bits(),
            orig.confidence_interval().to_bits()
        );
    }
}
