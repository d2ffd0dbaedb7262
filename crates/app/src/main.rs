use anyhow::Context;
use billscan::config::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "billscan", version, about = "Extract fields from Indian electricity bills")]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML config file (default: ./billscan.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every bill in the input directory (the default)
    Run {
        #[arg(short, long)]
        input: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        ground_truth: Option<PathBuf>,
        /// Files processed concurrently
        #[arg(short, long)]
        workers: Option<usize>,
        /// Regex extraction only
        #[arg(long)]
        no_llm: bool,
        /// Write per-stage intermediates under debug_logs/
        #[arg(long)]
        debug_artifacts: bool,
    },
    /// Re-score saved *_extracted.json records against ground truth
    Evaluate {
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        ground_truth: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Run {
        input: None,
        output: None,
        ground_truth: None,
        workers: None,
        no_llm: false,
        debug_artifacts: false,
    }) {
        Commands::Run { input, output, ground_truth, workers, no_llm, debug_artifacts } => {
            if let Some(p) = input {
                config.paths.input = p;
            }
            if let Some(p) = output {
                config.paths.output = p;
            }
            if let Some(p) = ground_truth {
                config.paths.ground_truth = p;
            }
            if let Some(n) = workers {
                config.batch.workers = n;
            }
            if no_llm {
                config.llm.enabled = false;
            }
            config.batch.debug_artifacts |= debug_artifacts;

            let pipeline = billscan::build_pipeline(&config).context("Failed to set up pipeline")?;
            let (summary, path) = billscan::run(&config, &pipeline).await.context("Batch run failed")?;
            tracing::info!(summary = %path.display(), failed = summary.failed, "Wrote batch summary");
        }
        Commands::Evaluate { output, ground_truth } => {
            if let Some(p) = output {
                config.paths.output = p;
            }
            if let Some(p) = ground_truth {
                config.paths.ground_truth = p;
            }
            billscan::rescore(&config).context("Evaluation failed")?;
        }
    }

    Ok(())
}
