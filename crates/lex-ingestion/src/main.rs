//! CLI entry point for the data ingestion pipeline.

use anyhow::{Result, anyhow};
use clap::Parser;
use lex_ingestion::io::{read_structured, write_data};
use lex_ingestion::{DataConfig, DataIngestionPipeline, IngestionError};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(
    author = "Lex Machina Team",
    version,
    about = "Split, preprocess and label-map datasets for model training",
    long_about = "Runs the data ingestion pipeline described by the `data` section of an \
                  experiment config.\n\n\
                  EXAMPLES:\n  \
                  # Run all phases, writing artifacts to ./experiment\n  \
                  lex-ingestion -c config.yaml\n\n  \
                  # Custom experiment directory, machine-readable output\n  \
                  lex-ingestion -c config.yaml -d runs/pbmc --json"
)]
struct Args {
    /// Path to the experiment config (YAML or JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Experiment directory receiving all artifacts
    #[arg(short, long, default_value = "./experiment")]
    dirpath: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings and errors)
    #[arg(short, long)]
    quiet: bool,

    /// Output JSON to stdout instead of a human-readable summary
    ///
    /// Disables all logs; prints the updated config or the error.
    #[arg(long)]
    json: bool,

    /// Ignore the configured preprocessing steps
    #[arg(long)]
    skip_preprocess: bool,

    /// Where to write the updated config
    ///
    /// The whole input document is written with its `data` section updated.
    /// Defaults to <dirpath>/config.yaml
    #[arg(long)]
    output_config: Option<PathBuf>,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.quiet, args.json);

    if !args.config.exists() {
        return Err(anyhow!("Config file not found: {}", args.config.display()));
    }

    match run(&args) {
        Ok(config) => {
            if args.json {
                let output = json!({ "status": "success", "config": config });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else if !args.quiet {
                print_summary(&config, &args.dirpath);
            }
            Ok(())
        }
        Err(e) => {
            if args.json {
                let output = json!({ "status": "error", "error": e });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            Err(anyhow!("Data ingestion failed: {}", e))
        }
    }
}

fn run(args: &Args) -> std::result::Result<DataConfig, IngestionError> {
    info!("Loading config from: {}", args.config.display());
    let document: serde_json::Value = read_structured(&args.config)?;
    let mut config = DataConfig::from_document(document.clone())?;

    if args.skip_preprocess && !config.preprocess.is_empty() {
        warn!(
            "Skipping {} configured preprocessing step(s)",
            config.preprocess.len()
        );
        config.preprocess.clear();
    }

    let mut pipeline = DataIngestionPipeline::builder()
        .config(config)
        .dirpath(&args.dirpath)
        .on_progress(|update| {
            debug!(
                "[{:>3.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        })
        .build()?;
    let updated = pipeline.run()?.clone();

    let output_config = args
        .output_config
        .clone()
        .unwrap_or_else(|| args.dirpath.join("config.yaml"));
    write_data(&updated.merge_into(document)?, &output_config)?;
    info!("Updated config written to: {}", output_config.display());

    Ok(updated)
}

/// Print a human-readable summary of the derived paths.
///
/// Uses `println!` intentionally: this is the CLI's primary output.
fn print_summary(config: &DataConfig, dirpath: &Path) {
    let tvt = &config.train_val_test;
    let show = |path: Option<&Path>| {
        path.map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    println!("\n{}", "=".repeat(60));
    println!("DATA INGESTION COMPLETE");
    println!("{}", "=".repeat(60));
    println!("  Experiment dir:   {}", dirpath.display());
    println!("  Split data:       {}", show(tvt.split_datapaths()));
    println!("  Final data:       {}", show(tvt.final_datapaths()));
    println!("  Label mappings:   {}", show(config.label_mappings.as_deref()));
    if !config.preprocess.is_empty() {
        let steps: Vec<&str> = config.preprocess.iter().map(|s| s.name.as_str()).collect();
        println!("  Preprocessing:    {}", steps.join(" -> "));
    }
    println!();
}
