//! Explanation drift detection
//!
//! Compares the pattern of feature importances between a stored baseline
//! batch of explanations and a new batch using Jensen-Shannon divergence,
//! Spearman rank correlation, entropy change and the largest per-feature
//! shift.

mod detector;
mod distribution;

pub use detector::{DriftThresholds, ExplanationDriftDetector};
pub use distribution::{
    entropy_change, js_divergence, max_feature_shift, spearman_correlation,
    ImportanceDistribution,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Drift severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DriftLevel {
    None,
    Low,
    Moderate,
    High,
}

impl DriftLevel {
    /// Fixed operator guidance for this level
    pub fn recommendation(&self) -> &'static str {
        match self {
            DriftLevel::None => "No action needed: explanation patterns are stable.",
            DriftLevel::Low => "Minor drift: keep monitoring feature importance trends.",
            DriftLevel::Moderate => {
                "Moderate drift: review recent input data and model behaviour for changes."
            }
            DriftLevel::High => {
                "Significant drift: investigate upstream data changes and consider retraining."
            }
        }
    }
}

impl fmt::Display for DriftLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriftLevel::None => "NONE",
            DriftLevel::Low => "LOW",
            DriftLevel::Moderate => "MODERATE",
            DriftLevel::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// Importance mass of one feature in both batches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureShift {
    pub feature: String,
    pub baseline: f64,
    pub current: f64,
    /// `current - baseline`
    pub shift: f64,
}

/// Result of comparing two explanation batches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub js_divergence: f64,
    pub rank_correlation: f64,
    pub entropy_change: f64,
    pub max_feature_shift: f64,
    /// `0.4 JS + 0.3 (1 - rho) + 0.2 entropy + 0.1 shift`
    pub overall_score: f64,
    pub level: DriftLevel,
    pub recommendation: String,
    /// Per-feature shifts, largest magnitude first
    pub feature_shifts: Vec<FeatureShift>,
    pub baseline_size: usize,
    pub current_size: usize,
    pub timestamp: DateTime<Utc>,
}

impl DriftReport {
    /// Whether any drift beyond `None` was found
    pub fn has_drift(&self) -> bool {
        self.level > DriftLevel::None
    }

    /// Features whose mass moved by more than `min_shift`
    pub fn shifted_features(&self, min_shift: f64) -> Vec<&str> {
        self.feature_shifts
            .iter()
            .filter(|s| s.shift.abs() > min_shift)
            .map(|s| s.feature.as_str())
            .collect()
    }

    /// Generate summary string
    pub fn summary(&self) -> String {
        let mut s = String::new();
        s.push_str("Explanation Drift Report\n");
        s.push_str("========================\n");
        s.push_str(&format!("Baseline batch: {}\n", self.baseline_size));
        s.push_str(&format!("Current batch: {}\n", self.current_size));
        s.push_str(&format!("JS divergence: {:.4}\n", self.js_divergence));
        s.push_str(&format!("Rank correlation: {:.4}\n", self.rank_correlation));
        s.push_str(&format!("Entropy change: {:.4}\n", self.entropy_change));
        s.push_str(&format!("Max feature shift: {:.4}\n", self.max_feature_shift));
        s.push_str(&format!("Overall score: {:.4} [{}]\n", self.overall_score, self.level));
        s.push_str(&format!("{}\n", self.recommendation));

        let top: Vec<&FeatureShift> = self.feature_shifts.iter().take(5).collect();
        if !top.is_empty() && self.has_drift() {
            s.push_str("\nLargest shifts:\n");
            for shift in top {
                s.push_str(&format!(
                    "  - {}: {:.4} -> {:.4} ({:+.4})\n",
                    shift.feature, shift.baseline, shift.current, shift.shift
                ));
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(DriftLevel::High > DriftLevel::Moderate);
        assert!(DriftLevel::Moderate > DriftLevel::Low);
        assert!(DriftLevel::Low > DriftLevel::None);
        assert_eq!(DriftLevel::Moderate.to_string(), "MODERATE");
        assert_eq!(
            serde_json::to_string(&DriftLevel::High).unwrap(),
            "\"HIGH\""
        );
    }

    #[test]
    fn test_report_summary() {
        let report = DriftReport {
            js_divergence: 0.3,
            rank_correlation: -1.0,
            entropy_change: 0.0,
            max_feature_shift: 0.8,
            overall_score: 0.8,
            level: DriftLevel::High,
            recommendation: DriftLevel::High.recommendation().to_string(),
            feature_shifts: vec![FeatureShift {
                feature: "income".to_string(),
                baseline: 0.9,
                current: 0.1,
                shift: -0.8,
            }],
            baseline_size: 10,
            current_size: 5,
            timestamp: Utc::now(),
        };

        let summary = report.summary();
        assert!(summary.contains("[HIGH]"));
        assert!(summary.contains("income"));
        assert!(report.has_drift());
        assert_eq!(report.shifted_features(0.5), vec!["income"]);
    }
}
