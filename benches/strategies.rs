use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kolosal_explain::prelude::*;
use rand::prelude::*;

fn create_model(n_features: usize) -> (LinearModel, ModelContext, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(7);
    let coefficients: Vec<f64> = (0..n_features).map(|_| rng.gen::<f64>() * 2.0 - 1.0).collect();
    let input: Vec<f64> = (0..n_features).map(|_| rng.gen::<f64>() * 10.0).collect();
    (
        LinearModel::new(coefficients),
        ModelContext::zeros(n_features).unwrap(),
        input,
    )
}

fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("strategies");
    group.sample_size(20);

    for n_features in [8, 64, 256].iter() {
        let (model, ctx, input) = create_model(*n_features);

        for strategy in ExecutionStrategy::ALL {
            let sampler = PerturbationSampler::new(
                SamplerConfig::new()
                    .with_samples(100)
                    .with_noise(0.05)
                    .with_strategy(strategy),
            );
            group.bench_with_input(
                BenchmarkId::new(strategy.to_string(), n_features),
                &input,
                |b, input| b.iter(|| sampler.explain(&model, black_box(input), &ctx).unwrap()),
            );
        }
    }

    group.finish();
}

fn bench_convergence(c: &mut Criterion) {
    let (model, ctx, input) = create_model(32);
    let controller = ConvergenceController::new(
        PerturbationSampler::new(SamplerConfig::new().with_noise(0.05)),
        ConvergenceConfig::default(),
    );

    c.bench_function("convergent_32_features", |b| {
        b.iter(|| controller.explain(&model, black_box(&input), &ctx).unwrap())
    });
}

fn bench_drift(c: &mut Criterion) {
    let (model, ctx, _) = create_model(16);
    let sampler = PerturbationSampler::new(SamplerConfig::new().with_samples(20));
    let mut rng = StdRng::seed_from_u64(11);
    let batch: Vec<Explanation> = (0..64)
        .map(|_| {
            let x: Vec<f64> = (0..16).map(|_| rng.gen::<f64>() * 5.0).collect();
            sampler.explain(&model, &x, &ctx).unwrap()
        })
        .collect();

    let mut detector = ExplanationDriftDetector::new();
    detector.set_baseline(&batch).unwrap();

    c.bench_function("drift_detect_64x16", |b| {
        b.iter(|| detector.detect(black_box(&batch)).unwrap())
    });
}

criterion_group!(benches, bench_strategies, bench_convergence, bench_drift);
criterion_main!(benches);
