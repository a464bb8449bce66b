// Rehearsal command-line front end
// Compares a recorded performance against a reference recording

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rehearsal_lib::commands::{self, CompareInput};

#[derive(Parser)]
#[command(name = "rehearsal", about = "Find missed notes, wrong pitches and timing slips in a performance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare a performance against a reference recording
    Compare {
        /// Reference WAV file
        reference: PathBuf,

        /// Performed WAV file
        performed: PathBuf,

        /// Engine configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Append a JSONL trace of the run to this file
        #[arg(short, long)]
        trace: Option<PathBuf>,

        /// Score tempo; adds beat positions to each error
        #[arg(long)]
        bpm: Option<f64>,

        /// Print the full comparison instead of only the errors
        #[arg(long)]
        full: bool,
    },
    /// Print the analysis of a single recording
    Inspect {
        /// WAV file to analyze
        file: PathBuf,

        /// Engine configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let output = match cli.command {
        Commands::Compare {
            reference,
            performed,
            config,
            trace,
            bpm,
            full,
        } => {
            commands::compare(CompareInput {
                reference_path: reference,
                performed_path: performed,
                config_path: config,
                trace_path: trace,
                bpm,
                full,
            })
            .await
        }
        Commands::Inspect { file, config } => commands::inspect(file, config)
            .await
            .and_then(|analysis| Ok(serde_json::to_value(analysis)?)),
    };

    let rendered = output.and_then(|value| Ok(serde_json::to_string_pretty(&value)?));

    match rendered {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e.message());
            ExitCode::FAILURE
        }
    }
}
