//! Stockcast CLI Module
//!
//! Command-line interface for training, evaluating, and inspecting data.
//! Flags fall back to the environment (`STOCK_SYMBOL`, `MODEL_NAME`,
//! `DATA_YEARS`, `PARAM_SAMPLES`) so runs can be driven entirely from an
//! env file.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::time::Instant;

use crate::artifact::ArtifactStore;
use crate::data::{date_range, load_csv, synthetic_series, Dataset};
use crate::models::ModelRegistry;
use crate::train::{regression_report, ModelTrain, TrainConfig, TrainReport};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString {
    s.truecolor(100, 100, 100)
}
fn accent(s: &str) -> ColoredString {
    s.truecolor(120, 170, 255)
}
fn muted(s: &str) -> ColoredString {
    s.truecolor(140, 140, 140)
}
fn ok(s: &str) -> ColoredString {
    s.truecolor(100, 210, 120)
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "stockcast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Price-series forecasting trainer")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Tune and train a model, then persist it to the artifact library
    Train {
        /// Ticker symbol (falls back to STOCK_SYMBOL)
        #[arg(short, long)]
        symbol: Option<String>,

        /// Model family: xgboost or lstm (falls back to MODEL_NAME)
        #[arg(short, long)]
        model: Option<String>,

        /// Daily price CSV with date and close columns; synthetic data
        /// when omitted
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Years of history to keep (falls back to DATA_YEARS)
        #[arg(long)]
        years: Option<u32>,

        /// Hyperparameter candidates to evaluate (falls back to
        /// PARAM_SAMPLES)
        #[arg(long)]
        samples: Option<usize>,

        /// Artifact library root
        #[arg(long, default_value = "artifacts")]
        artifacts: PathBuf,
    },

    /// Score a persisted model on the held-out test partition
    Evaluate {
        /// Ticker symbol (falls back to STOCK_SYMBOL)
        #[arg(short, long)]
        symbol: Option<String>,

        /// Model family: xgboost or lstm (falls back to MODEL_NAME)
        #[arg(short, long)]
        model: Option<String>,

        /// Daily price CSV the model was trained on; synthetic data when
        /// omitted
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Years of history to keep (falls back to DATA_YEARS)
        #[arg(long)]
        years: Option<u32>,

        /// Artifact library root
        #[arg(long, default_value = "artifacts")]
        artifacts: PathBuf,
    },

    /// Show basic information about a price CSV
    Info {
        /// Daily price CSV
        #[arg(short, long)]
        data: PathBuf,
    },
}

// ─── Argument resolution ───────────────────────────────────────────────────────

fn resolve_text(cli: Option<String>, env_key: &str, flag: &str) -> anyhow::Result<String> {
    cli.or_else(|| std::env::var(env_key).ok())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("pass --{flag} or set {env_key}"))
}

fn resolve_count<T>(cli: Option<T>, env_key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
{
    if let Some(value) = cli {
        return Ok(value);
    }
    match std::env::var(env_key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{env_key} must be a number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

/// Number of synthetic days generated when no CSV is supplied.
const SYNTHETIC_DAYS: usize = 2500;
const SYNTHETIC_SEED: u64 = 7;

fn stage_dataset(data: Option<&PathBuf>, config: &TrainConfig) -> anyhow::Result<Dataset> {
    let raw = match data {
        Some(path) => {
            step_run(&format!("Loading {}", path.display()));
            let start = Instant::now();
            let df = load_csv(path)?;
            step_done(&format!("{} rows in {:?}", df.height(), start.elapsed()));
            df
        }
        None => {
            step_ok(&format!(
                "No CSV given, generating {SYNTHETIC_DAYS} synthetic days"
            ));
            synthetic_series(SYNTHETIC_DAYS, SYNTHETIC_SEED)
        }
    };

    step_run("Engineering features");
    let start = Instant::now();
    let dataset = Dataset::from_raw(&config.symbol, config.span_years, &raw, config.test_pct)?;
    step_done(&format!(
        "{} rows × {} features in {:?}",
        dataset.n_rows(),
        dataset.n_features(),
        start.elapsed()
    ));
    Ok(dataset)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(
    symbol: Option<String>,
    model: Option<String>,
    data: Option<&PathBuf>,
    years: Option<u32>,
    samples: Option<usize>,
    artifacts: &PathBuf,
) -> anyhow::Result<()> {
    section("Train");

    let mut config = TrainConfig::new(
        resolve_text(symbol, "STOCK_SYMBOL", "symbol")?,
        resolve_text(model, "MODEL_NAME", "model")?,
    );
    config.span_years = resolve_count(years, "DATA_YEARS", config.span_years)?;
    config.budget = resolve_count(samples, "PARAM_SAMPLES", config.budget)?;

    let dataset = stage_dataset(data, &config)?;
    let store = ArtifactStore::new(artifacts);

    step_run(&format!(
        "Tuning {} over {} candidates",
        config.model_name.as_str().cyan(),
        config.budget
    ));
    let trainer = ModelTrain::new(config, dataset, store)?;
    let report = trainer.train()?;
    step_done(&format!("{:.1}s", report.elapsed_seconds));

    print_report(&report);
    Ok(())
}

pub fn cmd_evaluate(
    symbol: Option<String>,
    model: Option<String>,
    data: Option<&PathBuf>,
    years: Option<u32>,
    artifacts: &PathBuf,
) -> anyhow::Result<()> {
    section("Evaluate");

    let mut config = TrainConfig::new(
        resolve_text(symbol, "STOCK_SYMBOL", "symbol")?,
        resolve_text(model, "MODEL_NAME", "model")?,
    );
    config.span_years = resolve_count(years, "DATA_YEARS", config.span_years)?;

    let mut dataset = stage_dataset(data, &config)?;
    let registry = ModelRegistry::standard();
    if registry.kind(&config.model_name)?.needs_calendar_encoding() {
        dataset.encode_calendar()?;
    }

    step_run(&format!("Loading {} artifact", config.model_name.as_str().cyan()));
    let store = ArtifactStore::new(artifacts);
    let artifact = store.load(&config.symbol, &config.model_name)?;
    step_done(&format!("cv score {:.6}", artifact.cv_score));

    let preds = artifact.pipeline.predict(dataset.x_test())?;
    let truth = crate::data::to_target_vector(dataset.y_test())?;
    let scored = regression_report(&truth, &preds)?;

    println!();
    println!("  {:<16} {}", muted("Test MSE"), format!("{:.6}", scored.mse).white());
    println!("  {:<16} {}", muted("Test RMSE"), format!("{:.6}", scored.rmse).white());
    println!("  {:<16} {}", muted("Test MAE"), format!("{:.6}", scored.mae).white());
    println!(
        "  {:<16} {}",
        muted("Test R²"),
        format!("{:.4}", scored.r2).white().bold()
    );
    println!();
    Ok(())
}

pub fn cmd_info(data: &PathBuf) -> anyhow::Result<()> {
    section("Data Info");

    let df = load_csv(data)?;
    let (first, last) = date_range(&df)?;

    println!("  {:<12} {}", muted("File"), data.display());
    println!("  {:<12} {}", muted("Rows"), df.height());
    println!("  {:<12} {}", muted("Columns"), df.width());
    println!("  {:<12} {} → {}", muted("Dates"), first, last);
    println!();

    println!(
        "  {:<20} {:<12} {:>6}",
        muted("Column"),
        muted("Type"),
        muted("Nulls")
    );
    println!("  {}", dim(&"─".repeat(42)));
    for col in df.get_columns() {
        println!(
            "  {:<20} {:<12} {:>6}",
            col.name(),
            format!("{:?}", col.dtype()).truecolor(140, 140, 140),
            col.null_count()
        );
    }

    println!();
    Ok(())
}

fn print_report(report: &TrainReport) {
    section("Results");
    println!(
        "  {:<16} {}",
        muted("Symbol"),
        report.symbol.as_str().white().bold()
    );
    println!("  {:<16} {}", muted("Model"), report.model_name.as_str().white());
    println!("  {:<16} {}", muted("Trials"), report.trials);
    println!(
        "  {:<16} {}",
        muted("CV score"),
        format!("{:.6}", report.cv_score).white()
    );
    println!(
        "  {:<16} {}",
        muted("Train R²"),
        format!("{:.4}", report.train.r2).white()
    );
    println!(
        "  {:<16} {}",
        muted("Test R²"),
        format!("{:.4}", report.test.r2).white().bold()
    );
    println!(
        "  {:<16} {}",
        muted("Test RMSE"),
        format!("{:.6}", report.test.rmse).white()
    );
    println!(
        "  {:<16} {}",
        muted("Time"),
        format!("{:.1}s", report.elapsed_seconds).white()
    );
    println!();
}
