//! iatscore CLI — hosts IAT sessions and scores response logs.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "iatscore", version, about = "IAT session engine and D-Score analysis")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve newline-delimited JSON requests on stdin, one reply line each on stdout
    Serve {
        /// Settings file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Handle a single JSON request read from stdin
    Request {
        /// Settings file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Analyze a `{ "responses": [...] }` document
    Analyze {
        /// Response log (JSON)
        #[arg(long)]
        input: PathBuf,

        /// Output format: json, text, markdown, html
        #[arg(long, default_value = "text")]
        format: String,

        /// Write the rendered report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Settings file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Re-render a report saved with `analyze --format json --output`
    Render {
        /// Saved report (JSON)
        #[arg(long)]
        report: PathBuf,

        /// Output format: json, text, markdown, html
        #[arg(long, default_value = "text")]
        format: String,

        /// Write the rendered report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate a test configuration file (.json or .toml)
    Validate {
        /// Path to the test configuration
        #[arg(long)]
        test_config: PathBuf,
    },

    /// Create starter settings and an example test configuration
    Init,
}

#[tokio::main]
async fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("iatscore=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config } => commands::serve::execute(config).await,
        Commands::Request { config } => commands::request::execute(config).await,
        Commands::Analyze {
            input,
            format,
            output,
            config,
        } => commands::analyze::execute(input, format, output, config).await,
        Commands::Render {
            report,
            format,
            output,
        } => commands::render::execute(report, format, output),
        Commands::Validate { test_config } => commands::validate::execute(test_config),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
