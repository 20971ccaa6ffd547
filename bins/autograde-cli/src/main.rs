mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "autograde-cli")]
#[command(about = "Autograde CLI - Preview test suites and grade submissions locally", long_about = None)]
struct Cli {
    /// Language table (falls back to GRADER_LANGUAGES, then built-in defaults)
    #[arg(long, global = true)]
    languages: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a test suite into units and show how it would be published
    Split {
        /// Test suite source file
        #[arg(short, long)]
        suite: PathBuf,

        /// Suite language (python, java, rust, cpp)
        #[arg(short, long)]
        language: String,

        /// Declared assignment total to validate against
        #[arg(short, long)]
        total: Option<u32>,
    },

    /// Grade a submission against a suite through the sandbox (no attempt is recorded)
    Grade {
        /// Test suite source file
        #[arg(short, long)]
        suite: PathBuf,

        /// Student submission file
        #[arg(short = 'f', long)]
        submission: PathBuf,

        /// Suite language (python, java, rust, cpp)
        #[arg(short, long)]
        language: String,

        /// Print the full report as JSON
        #[arg(long, default_value = "false")]
        json: bool,

        /// Print stderr of units that did not pass
        #[arg(long, default_value = "false")]
        show_output: bool,
    },

    /// List configured languages
    Languages,

    /// Write the built-in language table to a file for editing
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "config/languages.json")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long, default_value = "false")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Split { suite, language, total } => {
            commands::split_suite(cli.languages.as_deref(), &suite, &language, total)?;
        }
        Commands::Grade {
            suite,
            submission,
            language,
            json,
            show_output,
        } => {
            commands::grade_local(
                cli.languages.as_deref(),
                &suite,
                &submission,
                &language,
                json,
                show_output,
            )
            .await?;
        }
        Commands::Languages => {
            commands::list_languages(cli.languages.as_deref())?;
        }
        Commands::InitConfig { path, force } => {
            commands::init_config(&path, force)?;
        }
    }

    Ok(())
}
