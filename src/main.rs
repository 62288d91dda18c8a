//! Kolosal Explain - Main Entry Point
//!
//! Perturbation-based explanations, drift and robustness checks from the command line.

use clap::Parser;
use kolosal_explain::cli::{
    cmd_converge, cmd_drift, cmd_explain, cmd_robustness, load_config, Cli, Commands,
};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kolosal_explain=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Explain { model, sampling, output } => {
            cmd_explain(config, &model, &sampling, &output)?;
        }
        Commands::Converge {
            model,
            sampling,
            epsilon,
            min_samples,
            max_samples,
            step,
            output,
        } => {
            cmd_converge(
                config,
                &model,
                &sampling,
                epsilon,
                min_samples,
                max_samples,
                step,
                &output,
            )?;
        }
        Commands::Robustness {
            model,
            sampling,
            perturbations,
            magnitude,
            perturbation_type,
            parallel,
            output,
        } => {
            cmd_robustness(
                config,
                &model,
                &sampling,
                perturbations,
                magnitude,
                perturbation_type,
                parallel,
                &output,
            )?;
        }
        Commands::Drift { baseline, current, output } => {
            cmd_drift(config, &baseline, &current, &output)?;
        }
    }

    Ok(())
}
