//! Stratum CLI
//!
//! Resolve layered configuration files from the command line

mod commands;
mod output;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stratum")]
#[command(about = "Resolve layered JSON configuration files")]
#[command(version = stratum_core::VERSION)]
#[command(
    long_about = "Stratum loads a configuration file from a project, follows its \"extends\" chain,\n\
merges every level and validates the result.\n\
\n\
Examples:\n  \
stratum resolve . --file config/build.json            # Print the merged configuration\n  \
stratum resolve . -f config/build.json --rig          # Fall back to the project's rig\n  \
stratum trace . -f config/build.json --append plugins # Show where each value comes from"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved configuration as JSON
    Resolve {
        #[command(flatten)]
        load: LoadArgs,

        /// Print on a single line
        #[arg(long)]
        compact: bool,
    },

    /// Print every resolved value with the file it came from
    Trace {
        #[command(flatten)]
        load: LoadArgs,
    },

    /// Show version information
    Version,
}

/// How to find and merge the configuration file
#[derive(Args, Debug, Clone)]
pub struct LoadArgs {
    /// Project folder (default: current directory)
    #[arg(default_value = ".")]
    pub project: PathBuf,

    /// Configuration file path, relative to the project folder
    #[arg(short, long, env = "STRATUM_CONFIG_FILE")]
    pub file: PathBuf,

    /// JSON Schema the resolved configuration must satisfy
    #[arg(short, long, env = "STRATUM_SCHEMA")]
    pub schema: Option<PathBuf>,

    /// Use the project's rig (config/rig.json) when the file is missing
    #[arg(long)]
    pub rig: bool,

    /// Append inherited arrays for this top-level property
    #[arg(long, value_name = "PROPERTY")]
    pub append: Vec<String>,

    /// Merge inherited objects for this top-level property
    #[arg(long, value_name = "PROPERTY")]
    pub merge: Vec<String>,

    /// Let the child value replace the inherited one for this property
    #[arg(long, value_name = "PROPERTY")]
    pub replace: Vec<String>,

    /// Resolve matched paths relative to the declaring file
    #[arg(long, value_name = "SELECTOR")]
    pub relative_path: Vec<String>,

    /// Resolve matched paths relative to the project root
    #[arg(long, value_name = "SELECTOR")]
    pub project_root_path: Vec<String>,

    /// Resolve matched values as module references
    #[arg(long, value_name = "SELECTOR")]
    pub node_resolve: Vec<String>,

    /// Succeed with no output when the file does not exist
    #[arg(long)]
    pub optional: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let use_colors = !cli.no_color && std::env::var_os("NO_COLOR").is_none();
    colored::control::set_override(use_colors);

    let log_level = match cli.verbose {
        0 => "stratum=error",
        1 => "stratum=warn",
        2 => "stratum=info",
        3 => "stratum=debug",
        _ => "stratum=trace",
    };
    stratum_core::init_tracing_with(log_level);

    let result = match cli.command {
        Commands::Resolve { load, compact } => commands::resolve(&load, compact).await,
        Commands::Trace { load } => commands::trace(&load).await,
        Commands::Version => {
            commands::version();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
