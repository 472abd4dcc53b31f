use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Clone, ValueEnum, Debug)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "mlhelper")]
#[command(version)]
#[command(about = "Tabular data preparation and classifier training", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase logging verbosity (Info -> Debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Silence all logs
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format (text or json)
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a pipeline from a YAML configuration file
    Train {
        /// Path to the pipeline YAML file
        #[arg(value_name = "PIPELINE_FILE")]
        pipeline: PathBuf,
    },
    /// Score one JSON record with a saved artifact
    Predict {
        /// Artifact written by `train`
        #[arg(long, value_name = "FILE")]
        artifact: PathBuf,

        /// JSON file holding one flat object
        #[arg(long, value_name = "FILE")]
        record: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.quiet {
        Level::ERROR
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // MLHELPER_LOG takes precedence over the CLI flags
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var("MLHELPER_LOG")
        .from_env_lossy();

    let run_id = Uuid::new_v4();

    // stdout is reserved for command output
    match cli.log_format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .with_span_list(false)
                .with_current_span(false)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    let _span = tracing::info_span!("root", run_id = %run_id).entered();

    match &cli.command {
        Commands::Train { pipeline } => {
            let report = mlhelper::runner::train_pipeline(pipeline, run_id)?;
            if let Some(evaluation) = &report.evaluation {
                println!(
                    "{}",
                    serde_json::to_string_pretty(evaluation).into_diagnostic()?
                );
            }
        }
        Commands::Predict { artifact, record } => {
            let prediction = mlhelper::runner::predict_file(artifact, record)?;
            println!("{}", serde_json::to_string(&prediction).into_diagnostic()?);
        }
    }

    Ok(())
}
