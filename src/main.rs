//! Stockcast - Main Entry Point
//!
//! Trains, evaluates, and inspects single-asset price forecasting models.

use clap::Parser;
use stockcast::cli::{cmd_evaluate, cmd_info, cmd_train, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockcast=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            symbol,
            model,
            data,
            years,
            samples,
            artifacts,
        } => {
            cmd_train(symbol, model, data.as_ref(), years, samples, &artifacts)?;
        }
        Commands::Evaluate {
            symbol,
            model,
            data,
            years,
            artifacts,
        } => {
            cmd_evaluate(symbol, model, data.as_ref(), years, &artifacts)?;
        }
        Commands::Info { data } => {
            cmd_info(&data)?;
        }
    }

    Ok(())
}
