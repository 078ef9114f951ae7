mod cmd;
mod http;
mod output;
mod settings;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "assist",
    about = "Workbench assistant: slash commands, mode-aware actions and proactive nudges",
    version,
    propagate_version = true
)]
struct Cli {
    /// Engine config file (default: ~/.assist/config.yaml)
    #[arg(long, global = true, env = "ASSIST_CONFIG")]
    config: Option<PathBuf>,

    /// Project the session works on
    #[arg(long, global = true, env = "ASSIST_PROJECT", default_value = "default")]
    project: String,

    /// Base URL of the project backend (default: in-memory store)
    #[arg(long, global = true, env = "ASSIST_BACKEND_URL")]
    backend_url: Option<String>,

    /// Completion endpoint for free-text messages
    #[arg(long, global = true, env = "ASSIST_COMPLETION_URL")]
    completion_url: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log engine activity to stderr
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive session. Lines starting with ':' are host events (:help lists them)
    Repl,

    /// Parse one line of input and print the resolved command
    Parse {
        /// Input line, e.g. '/create-stakeholder "John Smith"'
        input: String,
    },

    /// List the built-in commands
    Commands,

    /// Show which mode each view resolves to
    Modes,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let opts = settings::Settings {
        config_path: settings::config_path(cli.config.as_deref()),
        project: cli.project,
        backend_url: cli.backend_url,
        completion_url: cli.completion_url,
    };

    let result = match cli.command {
        Commands::Repl => cmd::repl::run(&opts, cli.json),
        Commands::Parse { input } => cmd::parse::run(&opts, &input, cli.json),
        Commands::Commands => cmd::commands::run(&opts, cli.json),
        Commands::Modes => cmd::modes::run(cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
