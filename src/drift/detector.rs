//! Explanation drift monitoring

use crate::drift::distribution::{
    entropy_change, feature_shifts, js_divergence, max_feature_shift, spearman_correlation,
    ImportanceDistribution,
};
use crate::drift::{DriftLevel, DriftReport, FeatureShift};
use crate::error::{ExplainError, Result};
use crate::explain::Explanation;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info};

const WEIGHT_JS: f64 = 0.4;
const WEIGHT_RANK: f64 = 0.3;
const WEIGHT_ENTROPY: f64 = 0.2;
const WEIGHT_SHIFT: f64 = 0.1;

/// Score boundaries between drift levels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftThresholds {
    /// Scores below this are `None`
    pub low: f64,
    /// Scores below this are `Low`
    pub moderate: f64,
    /// Scores below this are `Moderate`, the rest `High`
    pub high: f64,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self {
            low: 0.1,
            moderate: 0.2,
            high: 0.4,
        }
    }
}

impl DriftThresholds {
    /// Thresholds must be positive and strictly increasing
    pub fn validate(&self) -> Result<()> {
        let ordered = self.low > 0.0 && self.low < self.moderate && self.moderate < self.high;
        if !ordered || !self.high.is_finite() {
            return Err(ExplainError::invalid_parameter(
                "drift.thresholds",
                format!("{}/{}/{}", self.low, self.moderate, self.high),
                "must satisfy 0 < low < moderate < high",
            ));
        }
        Ok(())
    }

    /// Classify an overall score
    pub fn level(&self, score: f64) -> DriftLevel {
        if score < self.low {
            DriftLevel::None
        } else if score < self.moderate {
            DriftLevel::Low
        } else if score < self.high {
            DriftLevel::Moderate
        } else {
            DriftLevel::High
        }
    }
}

/// Compares explanation batches against a stored baseline batch
///
/// The baseline stays in place until replaced or cleared.
#[derive(Debug, Default)]
pub struct ExplanationDriftDetector {
    thresholds: DriftThresholds,
    baseline: Option<ImportanceDistribution>,
    baseline_size: usize,
    last_report: Mutex<Option<DriftReport>>,
}

impl ExplanationDriftDetector {
    /// Create a detector with default thresholds
    pub fn new() -> Self {
        Self::default()
    }

    /// Use custom thresholds
    pub fn with_thresholds(mut self, thresholds: DriftThresholds) -> Result<Self> {
        thresholds.validate()?;
        self.thresholds = thresholds;
        Ok(self)
    }

    /// Store (or replace) the baseline batch
    pub fn set_baseline(&mut self, batch: &[Explanation]) -> Result<()> {
        let distribution = ImportanceDistribution::from_explanations(batch)?;
        info!(
            explanations = batch.len(),
            features = distribution.len(),
            "Drift baseline set"
        );
        self.baseline = Some(distribution);
        self.baseline_size = batch.len();
        Ok(())
    }

    /// Forget the baseline
    pub fn clear_baseline(&mut self) {
        self.baseline = None;
        self.baseline_size = 0;
        *self.last_report.lock() = None;
    }

    /// Whether a baseline is stored
    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    /// Number of explanations in the stored baseline
    pub fn baseline_size(&self) -> usize {
        self.baseline_size
    }

    /// Thresholds in use
    pub fn thresholds(&self) -> &DriftThresholds {
        &self.thresholds
    }

    /// Most recent report from [`detect`](Self::detect)
    pub fn last_report(&self) -> Option<DriftReport> {
        self.last_report.lock().clone()
    }

    /// Compare a batch against the stored baseline
    pub fn detect(&self, current: &[Explanation]) -> Result<DriftReport> {
        let baseline = self.baseline.as_ref().ok_or(ExplainError::BaselineNotSet)?;
        let current_dist = ImportanceDistribution::from_explanations(current)?;
        let report = self.compare_distributions(
            baseline,
            &current_dist,
            self.baseline_size,
            current.len(),
        );
        let previous = self
            .last_report
            .lock()
            .replace(report.clone())
            .map(|r| r.level);
        if previous.is_some_and(|level| level != report.level) {
            info!(
                score = report.overall_score,
                level = %report.level,
                "Explanation drift level changed"
            );
        } else {
            debug!(
                score = report.overall_score,
                level = %report.level,
                "Explanation drift computed"
            );
        }
        Ok(report)
    }

    /// One-shot comparison of two batches without touching the stored baseline
    pub fn compare(&self, baseline: &[Explanation], current: &[Explanation]) -> Result<DriftReport> {
        let base = ImportanceDistribution::from_explanations(baseline)?;
        let curr = ImportanceDistribution::from_explanations(current)?;
        Ok(self.compare_distributions(&base, &curr, baseline.len(), current.len()))
    }

    fn compare_distributions(
        &self,
        baseline: &ImportanceDistribution,
        current: &ImportanceDistribution,
        baseline_size: usize,
        current_size: usize,
    ) -> DriftReport {
        let js = js_divergence(baseline, current);
        let rho = spearman_correlation(baseline, current);
        let entropy = entropy_change(baseline, current);
        let max_shift = max_feature_shift(baseline, current);

        let overall_score = WEIGHT_JS * js
            + WEIGHT_RANK * (1.0 - rho)
            + WEIGHT_ENTROPY * entropy
            + WEIGHT_SHIFT * max_shift;
        let level = self.thresholds.level(overall_score);

        let mut shifts: Vec<FeatureShift> = feature_shifts(baseline, current)
            .into_iter()
            .map(|(feature, b, c)| FeatureShift {
                feature,
                baseline: b,
                current: c,
                shift: c - b,
            })
            .collect();
        shifts.sort_by(|a, b| {
            b.shift
                .abs()
                .partial_cmp(&a.shift.abs())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.feature.cmp(&b.feature))
        });

        DriftReport {
            js_divergence: js,
            rank_correlation: rho,
            entropy_change: entropy,
            max_feature_shift: max_shift,
            overall_score,
            level,
            recommendation: level.recommendation().to_string(),
            feature_shifts: shifts,
            baseline_size,
            current_size,
            timestamp: Utc::now(),
        }
    }
}
