//! Strata CLI
//!
//! Command-line host for the strata training core: reads rows from CSV files,
//! streams them through training, evaluation or scoring, and writes the output rows
//! as CSV or JSON lines on stdout (or to a file). Logs go to stderr.

mod commands;
mod config;
mod io;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Strata - streaming training and evaluation of predictive models
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "Train, evaluate and score models over row streams", long_about = None)]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train (and optionally evaluate) a model from a CSV file
    ///
    /// The run file holds a `[training]` table with the training configuration
    /// and a `[learner]` table naming the learner and its options.
    Train {
        /// TOML run file
        #[arg(short, long)]
        config: PathBuf,

        /// Training rows (CSV with a header line)
        #[arg(short, long)]
        input: PathBuf,

        /// Separate test set rows (CSV with a header line)
        #[arg(short, long)]
        test: Option<PathBuf>,

        /// Write output rows here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write JSON lines instead of CSV
        #[arg(long)]
        json: bool,
    },

    /// Score rows with a saved model
    Score {
        /// Saved model (path or file: URI)
        #[arg(short, long)]
        model: String,

        /// Rows to score (CSV with a header line)
        #[arg(short, long)]
        input: PathBuf,

        /// Append the predicted distribution and its maximum
        #[arg(long)]
        probabilities: bool,

        /// Update incremental models with labelled rows after predicting
        #[arg(long)]
        update: bool,

        /// Score in batches of this many rows
        #[arg(long)]
        batch_size: Option<usize>,

        /// Evaluate the model on labelled rows instead of appending predictions
        #[arg(long, conflicts_with = "probabilities")]
        evaluate: bool,

        /// With --evaluate, add per-class TP/FP rate, precision, recall, F-measure and MCC
        #[arg(long, requires = "evaluate")]
        ir_metrics: bool,

        /// With --evaluate, add per-class AUC and PRC
        #[arg(long, requires = "evaluate")]
        auc_metrics: bool,

        /// Write output rows here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write JSON lines instead of CSV
        #[arg(long)]
        json: bool,
    },

    /// Show the schema and summary of a saved model
    Inspect {
        /// Saved model (path or file: URI)
        #[arg(short, long)]
        model: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Train { config, input, test, output, json } => {
            commands::train::execute(&config, &input, test.as_deref(), output.as_deref(), json)?;
        }
        Command::Score {
            model,
            input,
            probabilities,
            update,
            batch_size,
            evaluate,
            ir_metrics,
            auc_metrics,
            output,
            json,
        } => {
            let request = commands::score::ScoreRequest {
                model,
                input,
                probabilities,
                update,
                batch_size,
                evaluate,
                ir_metrics,
                auc_metrics,
                output,
                json,
            };
            commands::score::execute(&request)?;
        }
        Command::Inspect { model, json } => {
            commands::inspect::execute(&model, json)?;
        }
    }

    Ok(())
}
