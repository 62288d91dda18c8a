//! Kolosal Explain CLI Module
//!
//! Command-line interface for explaining, convergence runs, robustness
//! evaluation and drift detection over a linear model given on the command line.

use clap::{Args, Parser, Subcommand};
use colored::*;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{EngineConfig, ExplainerKind};
use crate::drift::{DriftLevel, DriftReport};
use crate::explain::{ConvergenceController, ExecutionStrategy, Explainer, Explanation};
use crate::model::{LinearModel, ModelContext};
use crate::robustness::{PerturbationType, RobustnessLevel, RobustnessReport};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn warn(s: &str) -> ColoredString   { s.truecolor(230, 190, 80) }
fn bad(s: &str) -> ColoredString    { s.truecolor(235, 100, 100) }

// Human-readable output goes to stderr so stdout stays pure JSON.
fn step_run(msg: &str) {
    eprint!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    eprintln!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    eprintln!();
    eprintln!("  {}", title.white().bold());
    eprintln!("  {}", dim(&"─".repeat(56)));
}

fn verdict(label: ColoredString, detail: &str) {
    eprintln!();
    eprintln!("  {} {}", label.bold(), detail);
    eprintln!();
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "kolosal-explain")]
#[command(author = "KolosalAI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Perturbation-based model explanations, drift and robustness checks")]
#[command(long_about = None)]
pub struct Cli {
    /// JSON engine configuration; flags override its values
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Linear model `y = intercept + sum(coefficients * x)` and the point to explain
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Model coefficients, comma separated
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
    pub coefficients: Vec<f64>,

    /// Model intercept
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    pub intercept: f64,

    /// Instance to explain, comma separated
    #[arg(short, long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
    pub input: Vec<f64>,

    /// Baseline values, comma separated (default: zeros)
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub baselines: Option<Vec<f64>>,

    /// Feature names, comma separated (default: x0, x1, ...)
    #[arg(long, value_delimiter = ',')]
    pub names: Option<Vec<String>>,
}

/// Sampler overrides
#[derive(Args, Debug, Clone, Default)]
pub struct SamplingArgs {
    /// Perturbation samples per feature
    #[arg(long)]
    pub samples: Option<usize>,

    /// Noise half-width around each baseline value
    #[arg(long)]
    pub noise: Option<f64>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Execution strategy (sequential, concurrent, vectorized)
    #[arg(long)]
    pub strategy: Option<ExecutionStrategy>,

    /// Worker threads for concurrent work
    #[arg(long)]
    pub threads: Option<usize>,
}

/// Where the JSON result goes
#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Write JSON to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Explain one prediction with a fixed sample count
    Explain {
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        sampling: SamplingArgs,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Explain one prediction, growing the sample count until estimates settle
    Converge {
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        sampling: SamplingArgs,

        /// Relative tolerance between consecutive iterations
        #[arg(long)]
        epsilon: Option<f64>,

        /// Samples in the first iteration
        #[arg(long)]
        min_samples: Option<usize>,

        /// Sample cap
        #[arg(long)]
        max_samples: Option<usize>,

        /// Samples added per iteration
        #[arg(long)]
        step: Option<usize>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Measure how much the explanation moves under small input noise
    Robustness {
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        sampling: SamplingArgs,

        /// Number of perturbed copies
        #[arg(long)]
        perturbations: Option<usize>,

        /// Noise scale in (0, 0.5]
        #[arg(long)]
        magnitude: Option<f64>,

        /// Noise kind (gaussian, uniform)
        #[arg(long)]
        perturbation_type: Option<PerturbationType>,

        /// Explain perturbed copies in parallel
        #[arg(long)]
        parallel: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Compare two JSON batches of explanations
    Drift {
        /// Baseline batch (JSON array of explanations)
        #[arg(short, long)]
        baseline: PathBuf,

        /// Current batch (JSON array of explanations)
        #[arg(long)]
        current: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },
}

// ─── Setup ─────────────────────────────────────────────────────────────────────

/// Load the configuration file, or the defaults
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(p) => Ok(EngineConfig::from_json_file(p)?),
        None => Ok(EngineConfig::default()),
    }
}

fn apply_sampling(config: &mut EngineConfig, args: &SamplingArgs) {
    if let Some(samples) = args.samples {
        config.sampler.samples = samples;
    }
    if let Some(noise) = args.noise {
        config.sampler.noise = noise;
    }
    if let Some(seed) = args.seed {
        config.sampler.seed = seed;
    }
    if let Some(strategy) = args.strategy {
        config.sampler.strategy = strategy;
    }
    if let Some(threads) = args.threads {
        config.parallel.n_threads = Some(threads);
    }
}

fn build_model(args: &ModelArgs) -> anyhow::Result<(LinearModel, ModelContext)> {
    let n = args.coefficients.len();
    let model = LinearModel::new(args.coefficients.clone()).with_intercept(args.intercept);
    let names = args
        .names
        .clone()
        .unwrap_or_else(|| (0..n).map(|i| format!("x{}", i)).collect());
    let baselines = args.baselines.clone().unwrap_or_else(|| vec![0.0; n]);
    let context = ModelContext::new(names, baselines)?;
    Ok((model, context))
}

fn emit<T: Serialize>(value: &T, output: &OutputArgs) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match &output.output {
        Some(path) => {
            std::fs::write(path, json)?;
            eprintln!("  {} {}", muted("Wrote"), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", json)?;
        }
    }
    Ok(())
}

fn load_batch(path: &Path) -> anyhow::Result<Vec<Explanation>> {
    let json = std::fs::read_to_string(path)?;
    let batch: Vec<Explanation> = serde_json::from_str(&json)?;
    for explanation in &batch {
        explanation.validate()?;
    }
    Ok(batch)
}

fn print_attributions(explanation: &Explanation) {
    eprintln!();
    eprintln!(
        "  {:<16} {:>12} {:>10}",
        muted("Feature"),
        muted("Importance"),
        muted("Stability")
    );
    eprintln!("  {}", dim(&"─".repeat(40)));
    for attr in explanation.top_attributions() {
        eprintln!(
            "  {:<16} {:>12.6} {:>10.4}",
            attr.feature(),
            attr.importance(),
            attr.stability_score()
        );
    }
}

fn stability_verdict(explanation: &Explanation) {
    let stability = explanation.overall_stability();
    let detail = format!("overall stability {:.4}", stability);
    let label = if stability >= 0.9 {
        ok("STABLE")
    } else if stability >= 0.5 {
        warn("NOISY")
    } else {
        bad("UNSTABLE")
    };
    verdict(label, &detail);
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_explain(
    config: EngineConfig,
    model_args: &ModelArgs,
    sampling: &SamplingArgs,
    output: &OutputArgs,
) -> anyhow::Result<()> {
    let mut config = config.with_explainer(ExplainerKind::Perturbation);
    apply_sampling(&mut config, sampling);
    config.validate()?;

    section("Explain");
    let (model, context) = build_model(model_args)?;
    let explainer = config.build_explainer(config.execution_context()?);

    step_run(&format!(
        "Sampling {} perturbations per feature ({})",
        config.sampler.samples,
        config.sampler.strategy.to_string().cyan()
    ));
    let start = Instant::now();
    let explanation = explainer.explain(&model, &model_args.input, &context)?;
    step_done(&format!("{:?}", start.elapsed()));

    print_attributions(&explanation);
    stability_verdict(&explanation);
    emit(&explanation, output)
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_converge(
    config: EngineConfig,
    model_args: &ModelArgs,
    sampling: &SamplingArgs,
    epsilon: Option<f64>,
    min_samples: Option<usize>,
    max_samples: Option<usize>,
    step: Option<usize>,
    output: &OutputArgs,
) -> anyhow::Result<()> {
    let mut config = config.with_explainer(ExplainerKind::Convergent);
    apply_sampling(&mut config, sampling);
    if let Some(epsilon) = epsilon {
        config.convergence.epsilon = epsilon;
    }
    if let Some(min) = min_samples {
        config.convergence.min_samples = min;
    }
    if let Some(max) = max_samples {
        config.convergence.max_samples = max;
    }
    if let Some(step) = step {
        config.convergence.step = step;
    }
    config.validate()?;

    section("Converge");
    let (model, context) = build_model(model_args)?;
    let controller = ConvergenceController::new(
        config.build_sampler(config.execution_context()?),
        config.convergence.clone(),
    );

    step_run(&format!(
        "Searching {}..{} samples (epsilon {})",
        config.convergence.min_samples, config.convergence.max_samples, config.convergence.epsilon
    ));
    let start = Instant::now();
    let explanation = controller.explain(&model, &model_args.input, &context)?;
    step_done(&format!("{:?}", start.elapsed()));

    print_attributions(&explanation);
    let trials = explanation.metadata().trials;
    if explanation.converged() {
        verdict(ok("CONVERGED"), &format!("after {} samples", trials));
    } else {
        verdict(warn("NOT CONVERGED"), &format!("stopped at the {} sample cap", trials));
    }
    emit(&explanation, output)
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_robustness(
    config: EngineConfig,
    model_args: &ModelArgs,
    sampling: &SamplingArgs,
    perturbations: Option<usize>,
    magnitude: Option<f64>,
    perturbation_type: Option<PerturbationType>,
    parallel: bool,
    output: &OutputArgs,
) -> anyhow::Result<()> {
    let mut config = config;
    apply_sampling(&mut config, sampling);
    if let Some(n) = perturbations {
        config.robustness.num_perturbations = n;
    }
    if let Some(m) = magnitude {
        config.robustness.magnitude = m;
    }
    if let Some(kind) = perturbation_type {
        config.robustness.perturbation_type = kind;
    }
    config.robustness.parallel |= parallel;
    config.validate()?;

    section("Robustness");
    let (model, context) = build_model(model_args)?;
    let explainer = config.build_explainer(config.execution_context()?);
    let evaluator = config.build_evaluator();

    step_run(&format!(
        "Explaining {} {} perturbations",
        config.robustness.num_perturbations,
        config.robustness.perturbation_type.to_string().cyan()
    ));
    let report: RobustnessReport =
        evaluator.evaluate(&model, &model_args.input, &context, explainer.as_ref())?;
    step_done(&format!("{:?}", report.elapsed));

    eprintln!();
    eprintln!("  {:<16} {:.4}", muted("Min stability"), report.min_stability);
    eprintln!("  {:<16} {:.4}", muted("Std stability"), report.std_stability);
    eprintln!("  {:<16} {:.4}", muted("Max drift"), report.max_drift);

    let label = match report.level() {
        RobustnessLevel::HighlyRobust => ok("HIGHLY ROBUST"),
        RobustnessLevel::ModeratelyRobust => warn("MODERATELY ROBUST"),
        RobustnessLevel::Unstable => bad("UNSTABLE"),
    };
    verdict(label, &format!("score {:.4}: {}", report.score, report.recommendation()));
    emit(&report, output)
}

pub fn cmd_drift(
    config: EngineConfig,
    baseline: &Path,
    current: &Path,
    output: &OutputArgs,
) -> anyhow::Result<()> {
    section("Drift");

    step_run("Loading explanation batches");
    let baseline_batch = load_batch(baseline)?;
    let current_batch = load_batch(current)?;
    step_done(&format!(
        "{} baseline, {} current",
        baseline_batch.len(),
        current_batch.len()
    ));

    let mut detector = config.build_drift_detector()?;
    detector.set_baseline(&baseline_batch)?;
    let report: DriftReport = detector.detect(&current_batch)?;

    eprintln!();
    eprintln!("  {:<18} {:.4}", muted("JS divergence"), report.js_divergence);
    eprintln!("  {:<18} {:.4}", muted("Rank correlation"), report.rank_correlation);
    eprintln!("  {:<18} {:.4}", muted("Entropy change"), report.entropy_change);
    eprintln!("  {:<18} {:.4}", muted("Max feature shift"), report.max_feature_shift);

    let label = match report.level {
        DriftLevel::None => ok("NO DRIFT"),
        DriftLevel::Low => warn("LOW DRIFT"),
        DriftLevel::Moderate => warn("MODERATE DRIFT"),
        DriftLevel::High => bad("HIGH DRIFT"),
    };
    verdict(label, &format!("score {:.4}: {}", report.overall_score, report.recommendation));
    emit(&report, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_args() -> ModelArgs {
        ModelArgs {
            coefficients: vec![0.3, 0.5, 0.2],
            intercept: 0.0,
            input: vec![1.0, 1.0, 1.0],
            baselines: None,
            names: Some(vec!["age".into(), "income".into(), "tenure".into()]),
        }
    }

    #[test]
    fn test_cli_parses_negative_values() {
        let cli = Cli::try_parse_from([
            "kolosal-explain",
            "explain",
            "--coefficients",
            "0.5,-1.5",
            "--intercept",
            "-2",
            "--input",
            "1,-1",
            "--strategy",
            "vectorized",
        ])
        .unwrap();
        match cli.command {
            Commands::Explain { model, sampling, .. } => {
                assert_eq!(model.coefficients, vec![0.5, -1.5]);
                assert_eq!(model.intercept, -2.0);
                assert_eq!(model.input, vec![1.0, -1.0]);
                assert_eq!(sampling.strategy, Some(ExecutionStrategy::Vectorized));
            }
            _ => panic!("expected explain"),
        }
    }

    #[test]
    fn test_build_model_defaults() {
        let mut args = model_args();
        args.names = None;
        let (model, context) = build_model(&args).unwrap();
        assert_eq!(model.n_features(), 3);
        assert_eq!(context.feature_names()[2], "x2");
        assert_eq!(context.baselines(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_explain_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("explanation.json");
        let output = OutputArgs {
            output: Some(path.clone()),
        };
        let sampling = SamplingArgs {
            noise: Some(0.0),
            ..Default::default()
        };
        cmd_explain(EngineConfig::default(), &model_args(), &sampling, &output).unwrap();

        let batch = load_batch_from_single(&path);
        let income = batch.attribution("income").unwrap();
        assert!((income.importance() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_drift_command_on_files() {
        let dir = tempfile::tempdir().unwrap();
        let sampling = SamplingArgs::default();
        let explanation = {
            let (model, context) = build_model(&model_args()).unwrap();
            let mut config = EngineConfig::default();
            apply_sampling(&mut config, &sampling);
            config
                .build_explainer(config.execution_context().unwrap())
                .explain(&model, &[1.0, 1.0, 1.0], &context)
                .unwrap()
        };
        let batch_path = dir.path().join("batch.json");
        std::fs::write(
            &batch_path,
            serde_json::to_string(&vec![explanation.clone(), explanation]).unwrap(),
        )
        .unwrap();

        let report_path = dir.path().join("report.json");
        let output = OutputArgs {
            output: Some(report_path.clone()),
        };
        cmd_drift(EngineConfig::default(), &batch_path, &batch_path, &output).unwrap();

        let report: DriftReport =
            serde_json::from_str(&std::fs::read_to_string(report_path).unwrap()).unwrap();
        assert_eq!(report.level, DriftLevel::None);
    }

    fn load_batch_from_single(path: &Path) -> Explanation {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }
}
