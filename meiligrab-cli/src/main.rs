//! meiligrab CLI - provision prebuilt Meilisearch binaries.

mod commands;
mod error;
mod ui;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use console::style;
use meiligrab::logging::{init_logging, LoggingConfig};

use commands::common::LogLevel;
use commands::fetch::FetchArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "meiligrab")]
#[command(version, about = "Provision prebuilt Meilisearch binaries for every supported platform", long_about = None)]
struct Cli {
    /// Config file (default: ./meiligrab.ini, then the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log verbosity (RUST_LOG takes precedence)
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download (or refresh) the binaries for a release
    Fetch(FetchArgs),

    /// List supported targets and what is on disk
    Targets {
        /// Repository root containing packages/
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Print the path of the binary for this machine
    Which {
        /// Repository root containing packages/
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", style("error:").red().bold(), e);
        process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    // Progress bars own the terminal in interactive mode; keep logs to warnings.
    let interactive = matches!(&cli.command, Commands::Fetch(args) if args.interactive);
    let filter = match cli.log_level {
        Some(level) => Some(level.directive()),
        None if interactive => Some(LogLevel::Warn.directive()),
        None => None,
    };
    let _guard = init_logging(&LoggingConfig {
        filter,
        file: cli.log_file.clone(),
        ansi: console::colors_enabled_stderr(),
    })?;

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Fetch(args) => commands::fetch::run(args, config_path),
        Commands::Targets { root } => commands::targets::run(root, config_path),
        Commands::Which { root } => commands::which::run(root, config_path),
    }
}
