//! Integration test: attribution engine end-to-end

use kolosal_explain::prelude::*;
use ndarray::Array2;
use std::sync::Arc;

fn linear_model() -> LinearModel {
    LinearModel::new(vec![0.3, 0.5, 0.2])
}

fn context() -> ModelContext {
    ModelContext::new(
        vec!["age".into(), "income".into(), "tenure".into()],
        vec![0.0, 0.0, 0.0],
    )
    .unwrap()
}

#[test]
fn test_linear_scenario_noise_free() {
    let sampler = PerturbationSampler::new(SamplerConfig::new().with_samples(100).with_noise(0.0));
    let exp = sampler
        .explain(&linear_model(), &[1.0, 1.0, 1.0], &context())
        .unwrap();

    let importances: Vec<f64> = exp.attributions().iter().map(|a| a.importance()).collect();
    for (got, want) in importances.iter().zip([0.3, 0.5, 0.2]) {
        assert!((got - want).abs() < 1e-9, "{} vs {}", got, want);
    }
    assert!(exp.attributions().iter().all(|a| a.stability_score() == 1.0));
    assert_eq!(exp.top_attributions()[0].feature(), "income");
    assert_eq!(exp.metadata().explainer_name, "perturbation");
    assert_eq!(exp.metadata().seed, 42);
}

#[test]
fn test_strategies_agree() {
    let model = FnModel::new(|x: &[f64]| x[0] * x[1] + (x[2] * 3.0).sin());
    let ctx = context();
    let input = [0.7, -1.2, 2.5];

    let reference = PerturbationSampler::new(
        SamplerConfig::new()
            .with_noise(0.2)
            .with_samples(257)
            .with_seed(9),
    )
    .explain(&model, &input, &ctx)
    .unwrap();

    for strategy in [ExecutionStrategy::Concurrent, ExecutionStrategy::Vectorized] {
        let other = PerturbationSampler::new(
            SamplerConfig::new()
                .with_noise(0.2)
                .with_samples(257)
                .with_seed(9)
                .with_strategy(strategy),
        )
        .explain(&model, &input, &ctx)
        .unwrap();

        for (a, b) in reference.attributions().iter().zip(other.attributions()) {
            let tol = 1e-6 * a.importance().abs().max(1.0);
            assert!(
                (a.importance() - b.importance()).abs() < tol,
                "{}: {} vs {}",
                strategy,
                a.importance(),
                b.importance()
            );
            assert!((a.stability_score() - b.stability_score()).abs() < 1e-6);
        }
    }
}

#[test]
fn test_shared_context_collects_stats() {
    let stats = Arc::new(ExplainStats::new());
    let exec = ExecutionContext::from_config(&ParallelConfig::new().with_threads(2))
        .unwrap()
        .with_stats(Arc::clone(&stats));
    let sampler = PerturbationSampler::new(
        SamplerConfig::new()
            .with_samples(20)
            .with_strategy(ExecutionStrategy::Concurrent),
    )
    .with_context(exec);

    sampler
        .explain(&linear_model(), &[1.0, 2.0, 3.0], &context())
        .unwrap();
    assert!(sampler.explain(&linear_model(), &[1.0], &context()).is_err());

    let snap = stats.snapshot();
    assert_eq!(snap.explanations, 1);
    assert_eq!(snap.failures, 1);
    assert!(snap.predictions >= 60);
}

#[test]
fn test_batch_explanations() {
    let sampler = PerturbationSampler::new(SamplerConfig::new().with_samples(30));
    let rows = Array2::from_shape_fn((8, 3), |(i, j)| (i + j) as f64 * 0.5);
    let batch = sampler.explain_batch(&linear_model(), &rows, &context()).unwrap();
    assert_eq!(batch.len(), 8);
    assert!(batch.iter().all(|e| e.len() == 3));
}

#[test]
fn test_coefficient_mismatch_rejected() {
    let model = LinearModel::new(vec![1.0, 2.0]);
    let err = PerturbationSampler::default()
        .explain(&model, &[1.0, 1.0, 1.0], &context())
        .unwrap_err();
    assert!(matches!(err, ExplainError::ShapeError { .. }));
}

#[test]
fn test_convergence_zero_variance() {
    let controller = ConvergenceController::new(
        PerturbationSampler::new(SamplerConfig::new().with_noise(0.0)),
        ConvergenceConfig::new().with_samples(10, 100),
    );
    let exp = controller
        .explain(&linear_model(), &[1.0, 1.0, 1.0], &context())
        .unwrap();
    assert!(exp.converged());
    assert_eq!(exp.metadata().trials, 10);
}

#[test]
fn test_convergence_always_terminates() {
    let model = FnModel::new(|x: &[f64]| (x[0] * 997.0).sin() * (x[1] * 131.0).cos());
    let ctx = ModelContext::zeros(2).unwrap();
    let config = ConvergenceConfig::new()
        .with_epsilon(1e-9)
        .with_samples(4, 40)
        .with_step(12);
    let controller = ConvergenceController::new(
        PerturbationSampler::new(SamplerConfig::new().with_noise(0.5)),
        config.clone(),
    );
    let exp = controller
        .explain_convergent(&model, &[0.3, 0.4], &ctx, &config)
        .unwrap();
    assert!(exp.metadata().trials <= 40);
    if !exp.converged() {
        assert_eq!(exp.metadata().trials, 40);
    }
}

#[test]
fn test_explanation_json_round_trip() {
    let exp = PerturbationSampler::default()
        .explain(&linear_model(), &[1.0, 1.0, 1.0], &context())
        .unwrap();
    let json = serde_json::to_string(&exp).unwrap();
    let back: Explanation = serde_json::from_str(&json).unwrap();
    assert_eq!(back, exp);
    assert!(back.validate().is_ok());
}

/// Adapter for a remote scoring service that stops answering after a request budget
struct BudgetedRemoteModel {
    weights: Vec<f64>,
    budget: usize,
    calls: std::sync::atomic::AtomicUsize,
}

impl BudgetedRemoteModel {
    fn new(weights: Vec<f64>, budget: usize) -> Self {
        Self {
            weights,
            budget,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

impl Predictor for BudgetedRemoteModel {
    fn predict(&self, features: &[f64]) -> Result<f64> {
        let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if call >= self.budget {
            return Err(ExplainError::ModelError(format!(
                "request budget of {} exhausted",
                self.budget
            )));
        }
        Ok(self.weights.iter().zip(features).map(|(w, x)| w * x).sum())
    }
}

#[test]
fn test_adapter_failure_surfaces_as_model_error() {
    let input = [1.0, 1.0, 1.0];

    let sequential = PerturbationSampler::new(
        SamplerConfig::new()
            .with_samples(20)
            .with_strategy(ExecutionStrategy::Sequential),
    );
    let model = BudgetedRemoteModel::new(vec![0.3, 0.5, 0.2], 10);
    let err = sequential.explain(&model, &input, &context()).unwrap_err();
    assert!(matches!(err, ExplainError::ModelError(_)), "{}", err);

    let concurrent = PerturbationSampler::new(
        SamplerConfig::new()
            .with_samples(20)
            .with_strategy(ExecutionStrategy::Concurrent),
    );
    let model = BudgetedRemoteModel::new(vec![0.3, 0.5, 0.2], 10);
    let err = concurrent.explain(&model, &input, &context()).unwrap_err();
    assert!(matches!(err, ExplainError::TaskFailed { .. }), "{}", err);
    assert!(matches!(err.root_cause(), ExplainError::ModelError(msg) if msg.contains("budget")));
}
