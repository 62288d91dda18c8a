//! Feature-importance distributions and the statistics compared across them

use crate::error::{ExplainError, Result};
use crate::explain::Explanation;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Floor applied inside logarithms
const LOG_EPSILON: f64 = 1e-10;

/// Normalized importance mass per feature (sums to 1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceDistribution {
    weights: BTreeMap<String, f64>,
}

impl ImportanceDistribution {
    /// Aggregate a batch: mean `|importance|` per feature, then normalize
    ///
    /// The mean runs over the whole batch; an explanation without a feature
    /// contributes 0 for it.
    pub fn from_explanations(batch: &[Explanation]) -> Result<Self> {
        if batch.is_empty() {
            return Err(ExplainError::InvalidInput(
                "Explanation batch is empty".to_string(),
            ));
        }

        let mut totals: BTreeMap<String, f64> = BTreeMap::new();
        for explanation in batch {
            for attr in explanation.attributions() {
                *totals.entry(attr.feature().to_string()).or_insert(0.0) += attr.importance().abs();
            }
        }
        if totals.is_empty() {
            return Err(ExplainError::InvalidInput(
                "Explanation batch has no attributions".to_string(),
            ));
        }

        let n = batch.len() as f64;
        let means = totals
            .into_iter()
            .map(|(feature, sum)| (feature, sum / n))
            .collect();
        Self::from_weights(means)
    }

    /// Normalize arbitrary non-negative weights
    ///
    /// All-zero weights become the uniform distribution.
    pub fn from_weights(weights: BTreeMap<String, f64>) -> Result<Self> {
        if weights.is_empty() {
            return Err(ExplainError::InvalidInput(
                "Distribution needs at least one feature".to_string(),
            ));
        }
        if let Some((feature, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(ExplainError::NumericError(format!(
                "Weight for '{}' must be finite and non-negative ({})",
                feature, w
            )));
        }

        let total: f64 = weights.values().sum();
        let n = weights.len() as f64;
        let weights = weights
            .into_iter()
            .map(|(feature, w)| {
                let p = if total > 0.0 { w / total } else { 1.0 / n };
                (feature, p)
            })
            .collect();
        Ok(Self { weights })
    }

    /// Probability mass of `feature`, 0 when absent
    pub fn get(&self, feature: &str) -> f64 {
        self.weights.get(feature).copied().unwrap_or(0.0)
    }

    /// Features in name order with their mass
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of features
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// True when there are no features
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Shannon entropy in nats
    pub fn entropy(&self) -> f64 {
        -self
            .weights
            .values()
            .filter(|&&p| p > 0.0)
            .map(|&p| p * p.ln())
            .sum::<f64>()
    }

    /// Union of feature names of two distributions
    fn union<'a>(&'a self, other: &'a Self) -> BTreeSet<&'a str> {
        self.weights
            .keys()
            .chain(other.weights.keys())
            .map(String::as_str)
            .collect()
    }
}

/// 1-based ranks by descending mass, ties broken by name
fn ranks(dist: &ImportanceDistribution, features: &[&str]) -> BTreeMap<String, usize> {
    let mut ordered: Vec<(&str, f64)> = features.iter().map(|f| (*f, dist.get(f))).collect();
    ordered.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    ordered
        .into_iter()
        .enumerate()
        .map(|(i, (f, _))| (f.to_string(), i + 1))
        .collect()
}

/// Jensen-Shannon divergence (nats) over the union of features
pub fn js_divergence(p: &ImportanceDistribution, q: &ImportanceDistribution) -> f64 {
    let mut kl_pm = 0.0;
    let mut kl_qm = 0.0;
    for feature in p.union(q) {
        let pi = p.get(feature);
        let qi = q.get(feature);
        let mi = ((pi + qi) / 2.0).max(LOG_EPSILON);
        if pi > 0.0 {
            kl_pm += pi * (pi / mi).ln();
        }
        if qi > 0.0 {
            kl_qm += qi * (qi / mi).ln();
        }
    }
    ((kl_pm + kl_qm) / 2.0).max(0.0)
}

/// Spearman rank correlation over features present in both distributions
///
/// Fewer than two common features count as perfect agreement.
pub fn spearman_correlation(p: &ImportanceDistribution, q: &ImportanceDistribution) -> f64 {
    let common: Vec<&str> = p
        .weights
        .keys()
        .filter(|f| q.weights.contains_key(*f))
        .map(String::as_str)
        .collect();
    let n = common.len();
    if n < 2 {
        return 1.0;
    }

    let rank_p = ranks(p, &common);
    let rank_q = ranks(q, &common);
    let d_sq: f64 = common
        .iter()
        .map(|f| {
            let d = rank_p[*f] as f64 - rank_q[*f] as f64;
            d * d
        })
        .sum();

    let n = n as f64;
    1.0 - 6.0 * d_sq / (n * (n * n - 1.0))
}

/// Relative entropy change `|H_current - H_baseline| / H_baseline`
///
/// Falls back to the absolute change when the baseline entropy is zero.
pub fn entropy_change(baseline: &ImportanceDistribution, current: &ImportanceDistribution) -> f64 {
    let h_base = baseline.entropy();
    let h_curr = current.entropy();
    let diff = (h_curr - h_base).abs();
    if h_base < LOG_EPSILON {
        diff
    } else {
        diff / h_base
    }
}

/// Signed per-feature shift `current - baseline` over the union of features
pub fn feature_shifts(
    baseline: &ImportanceDistribution,
    current: &ImportanceDistribution,
) -> Vec<(String, f64, f64)> {
    baseline
        .union(current)
        .into_iter()
        .map(|f| (f.to_string(), baseline.get(f), current.get(f)))
        .collect()
}

/// Largest absolute per-feature shift
pub fn max_feature_shift(baseline: &ImportanceDistribution, current: &ImportanceDistribution) -> f64 {
    feature_shifts(baseline, current)
        .into_iter()
        .map(|(_, b, c)| (c - b).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(pairs: &[(&str, f64)]) -> ImportanceDistribution {
        ImportanceDistribution::from_weights(
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_normalization() {
        let d = dist(&[("a", 3.0), ("b", 1.0)]);
        assert!((d.get("a") - 0.75).abs() < 1e-12);
        assert!((d.get("b") - 0.25).abs() < 1e-12);
        assert_eq!(d.get("missing"), 0.0);

        let uniform = dist(&[("a", 0.0), ("b", 0.0)]);
        assert_eq!(uniform.get("a"), 0.5);

        assert!(ImportanceDistribution::from_weights(BTreeMap::new()).is_err());
        assert!(ImportanceDistribution::from_weights(
            [("a".to_string(), -1.0)].into_iter().collect()
        )
        .is_err());
    }

    #[test]
    fn test_missing_features_count_as_zero() {
        use crate::explain::{ExplanationMetadata, FeatureAttribution};
        let build = |pairs: &[(&str, f64)]| {
            let attrs = pairs
                .iter()
                .map(|(f, v)| FeatureAttribution::new(*f, *v, 1.0).unwrap())
                .collect();
            Explanation::new(0.0, 0.0, attrs, ExplanationMetadata::new("t", 0, 1)).unwrap()
        };
        let batch = vec![build(&[("a", 1.0), ("b", 1.0)]), build(&[("a", -1.0)])];
        let d = ImportanceDistribution::from_explanations(&batch).unwrap();
        assert!((d.get("a") - 2.0 / 3.0).abs() < 1e-12);
        assert!((d.get("b") - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_js_divergence() {
        let p = dist(&[("a", 0.5), ("b", 0.5)]);
        assert_eq!(js_divergence(&p, &p), 0.0);

        // Disjoint support reaches the ln(2) bound
        let q = dist(&[("a", 1.0)]);
        let r = dist(&[("b", 1.0)]);
        assert!((js_divergence(&q, &r) - 2.0f64.ln()).abs() < 1e-9);
        assert!((js_divergence(&p, &q) - js_divergence(&q, &p)).abs() < 1e-12);
    }

    #[test]
    fn test_spearman() {
        let p = dist(&[("a", 3.0), ("b", 2.0), ("c", 1.0)]);
        let reversed = dist(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        assert_eq!(spearman_correlation(&p, &p), 1.0);
        assert!((spearman_correlation(&p, &reversed) + 1.0).abs() < 1e-12);

        let single = dist(&[("a", 1.0), ("z", 1.0)]);
        assert_eq!(spearman_correlation(&p, &single), 1.0);
    }

    #[test]
    fn test_entropy_and_shift() {
        let uniform = dist(&[("a", 1.0), ("b", 1.0)]);
        assert!((uniform.entropy() - 2.0f64.ln()).abs() < 1e-12);

        let point = dist(&[("a", 1.0)]);
        assert_eq!(point.entropy(), 0.0);
        assert!((entropy_change(&uniform, &point) - 1.0).abs() < 1e-12);
        assert!((entropy_change(&point, &uniform) - 2.0f64.ln()).abs() < 1e-12);

        assert!((max_feature_shift(&uniform, &point) - 0.5).abs() < 1e-12);
        assert_eq!(feature_shifts(&uniform, &point).len(), 2);
    }
}
