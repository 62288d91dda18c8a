//! Robustness evaluator

use crate::error::{ExplainError, Result};
use crate::explain::Explainer;
use crate::model::{ModelContext, Predictor};
use crate::monitoring::StatsSummary;
use crate::robustness::{PerturbationType, RobustnessConfig, RobustnessReport};
use crate::utils::SimdOps;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Uniform};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

/// Attribution norms below this are treated as zero
const ZERO_NORM: f64 = 1e-10;

/// Compares an instance's explanation with explanations of noisy copies
#[derive(Debug, Clone, Default)]
pub struct RobustnessEvaluator {
    config: RobustnessConfig,
}

impl RobustnessEvaluator {
    /// Create an evaluator
    pub fn new(config: RobustnessConfig) -> Self {
        Self { config }
    }

    /// Current configuration
    pub fn config(&self) -> &RobustnessConfig {
        &self.config
    }

    /// Evaluate with the stored configuration
    pub fn evaluate(
        &self,
        model: &dyn Predictor,
        instance: &[f64],
        context: &ModelContext,
        explainer: &dyn Explainer,
    ) -> Result<RobustnessReport> {
        self.evaluate_with(model, instance, context, explainer, &self.config)
    }

    /// Evaluate with explicit settings
    pub fn evaluate_with(
        &self,
        model: &dyn Predictor,
        instance: &[f64],
        context: &ModelContext,
        explainer: &dyn Explainer,
        config: &RobustnessConfig,
    ) -> Result<RobustnessReport> {
        config.validate()?;
        let start = Instant::now();

        let perturbed = perturb_instances(instance, config)?;
        let baseline = explainer.explain(model, instance, context)?;
        let phi = baseline.importance_vector().to_vec();
        let phi_norm = SimdOps::norm(&phi);

        debug!(
            explainer = explainer.name(),
            perturbations = config.num_perturbations,
            magnitude = config.magnitude,
            kind = %config.perturbation_type,
            "Evaluating explanation robustness"
        );

        let drift_of = |idx: usize, copy: &Vec<f64>| -> Result<f64> {
            let explanation = explainer
                .explain(model, copy, context)
                .map_err(|e| ExplainError::task_failed(format!("perturbation {}", idx), e))?;
            let diff: Vec<f64> = explanation
                .importance_vector()
                .iter()
                .zip(&phi)
                .map(|(a, b)| a - b)
                .collect();
            let distance = SimdOps::norm(&diff);
            Ok(if phi_norm < ZERO_NORM {
                distance
            } else {
                distance / phi_norm
            })
        };

        let drifts: Vec<f64> = if config.parallel {
            perturbed
                .par_iter()
                .enumerate()
                .map(|(idx, copy)| drift_of(idx, copy))
                .collect::<Result<_>>()?
        } else {
            perturbed
                .iter()
                .enumerate()
                .map(|(idx, copy)| drift_of(idx, copy))
                .collect::<Result<_>>()?
        };

        let stabilities: Vec<f64> = drifts.iter().map(|d| 1.0 - d).collect();
        let summary = StatsSummary::from_values(&stabilities);
        let max_drift = drifts.iter().copied().fold(0.0, f64::max);

        let report = RobustnessReport {
            score: summary.avg,
            mean_stability: summary.avg,
            std_stability: summary.std_dev,
            min_stability: summary.min,
            max_drift,
            num_perturbations: config.num_perturbations,
            perturbation_magnitude: config.magnitude,
            perturbation_type: config.perturbation_type,
            elapsed: start.elapsed(),
        };

        info!(
            score = report.score,
            level = %report.level(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Robustness evaluated"
        );
        Ok(report)
    }
}

/// Noisy copies of `instance`, drawn in order from one seeded stream
fn perturb_instances(instance: &[f64], config: &RobustnessConfig) -> Result<Vec<Vec<f64>>> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);
    let n = config.num_perturbations;
    match config.perturbation_type {
        PerturbationType::Gaussian => {
            let dist = Normal::new(0.0, config.magnitude)
                .map_err(|e| ExplainError::invalid_parameter("magnitude", config.magnitude, &e.to_string()))?;
            Ok(draw(instance, n, &dist, &mut rng))
        }
        PerturbationType::Uniform => {
            let dist = Uniform::new_inclusive(-config.magnitude, config.magnitude);
            Ok(draw(instance, n, &dist, &mut rng))
        }
        PerturbationType::Adversarial => Err(ExplainError::Unsupported(
            "adversarial perturbations are not implemented".to_string(),
        )),
    }
}

fn draw<D: Distribution<f64>>(
    instance: &[f64],
    n: usize,
    dist: &D,
    rng: &mut Xoshiro256PlusPlus,
) -> Vec<Vec<f64>> {
    (0..n)
        .map(|_| instance.iter().map(|x| x + dist.sample(rng)).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::{PerturbationSampler, SamplerConfig};
    use crate::model::{FnModel, LinearModel};
    use crate::robustness::RobustnessLevel;

    fn sampler() -> PerturbationSampler {
        PerturbationSampler::new(SamplerConfig::new().with_samples(50))
    }

    #[test]
    fn test_constant_model_is_perfectly_robust() {
        let model = FnModel::new(|_: &[f64]| 3.0);
        let ctx = ModelContext::zeros(3).unwrap();
        for magnitude in [0.01, 0.5] {
            let evaluator = RobustnessEvaluator::new(
                RobustnessConfig::new()
                    .with_perturbations(20)
                    .with_magnitude(magnitude),
            );
            let report = evaluator
                .evaluate(&model, &[1.0, 2.0, 3.0], &ctx, &sampler())
                .unwrap();
            assert_eq!(report.score, 1.0);
            assert_eq!(report.max_drift, 0.0);
            assert_eq!(report.level(), RobustnessLevel::HighlyRobust);
        }
    }

    #[test]
    fn test_linear_model_small_noise() {
        let model = LinearModel::new(vec![0.3, 0.5, 0.2]);
        let ctx = ModelContext::zeros(3).unwrap();
        let evaluator = RobustnessEvaluator::new(
            RobustnessConfig::new()
                .with_perturbations(50)
                .with_magnitude(0.01),
        );
        let report = evaluator
            .evaluate(&model, &[1.0, 1.0, 1.0], &ctx, &sampler())
            .unwrap();
        assert!(report.score > 0.85, "score = {}", report.score);
        assert!(report.min_stability <= report.mean_stability);
        assert_eq!(report.num_perturbations, 50);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let model = LinearModel::new(vec![1.0, -2.0]);
        let ctx = ModelContext::zeros(2).unwrap();
        let config = RobustnessConfig::new()
            .with_perturbations(16)
            .with_type(PerturbationType::Uniform)
            .with_magnitude(0.1);
        let evaluator = RobustnessEvaluator::new(config.clone());
        let seq = evaluator.evaluate(&model, &[0.5, 0.5], &ctx, &sampler()).unwrap();
        let par = evaluator
            .evaluate_with(&model, &[0.5, 0.5], &ctx, &sampler(), &config.with_parallel(true))
            .unwrap();
        assert_eq!(seq.score, par.score);
        assert_eq!(seq.max_drift, par.max_drift);
    }

    #[test]
    fn test_adversarial_is_unsupported() {
        let model = LinearModel::new(vec![1.0]);
        let ctx = ModelContext::zeros(1).unwrap();
        let evaluator =
            RobustnessEvaluator::new(RobustnessConfig::new().with_type(PerturbationType::Adversarial));
        let err = evaluator.evaluate(&model, &[1.0], &ctx, &sampler()).unwrap_err();
        assert!(matches!(err, ExplainError::Unsupported(_)));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let model = LinearModel::new(vec![1.0]);
        let ctx = ModelContext::zeros(1).unwrap();
        let evaluator = RobustnessEvaluator::new(RobustnessConfig::new().with_perturbations(5));
        assert!(evaluator.evaluate(&model, &[1.0], &ctx, &sampler()).is_err());
    }
}
