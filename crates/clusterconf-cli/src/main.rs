//! clusterconf CLI - validate cluster configuration and check changes for safety

use clap::{Parser, Subcommand};
use clusterconf_core::OperationPhase;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::StoreArgs;

#[derive(Parser)]
#[command(name = "clusterconf")]
#[command(version)]
#[command(about = "Validate Kubernetes cluster configuration and check changes for safety", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Schema descriptor directories
    #[arg(
        long = "schemas",
        global = true,
        env = "CLUSTERCONF_SCHEMAS_DIR",
        value_delimiter = ':'
    )]
    schemas: Vec<PathBuf>,

    /// Module directories holding openapi/config-values.yaml
    #[arg(
        long = "modules",
        global = true,
        env = "CLUSTERCONF_MODULES_DIR",
        value_delimiter = ':'
    )]
    modules: Vec<PathBuf>,

    /// Store configuration file (default: ~/.config/clusterconf/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration files against the loaded schemas
    Validate {
        /// Configuration file(s) holding multi-document YAML
        #[arg(short = 'f', long = "file", required = true)]
        files: Vec<PathBuf>,

        /// Output validation results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that replacing a running configuration is safe
    CheckChanges {
        /// Configuration the cluster currently runs with
        #[arg(long)]
        old: PathBuf,

        /// Proposed configuration
        #[arg(long)]
        new: PathBuf,

        /// Lifecycle phase the change is applied in
        #[arg(long, default_value = "AllNodes")]
        phase: OperationPhase,
    },

    /// List loaded schemas and modules
    Schemas {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = if err.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            std::process::exit(code);
        }
    };

    init_tracing(cli.debug);

    let store_args = StoreArgs {
        schemas: cli.schemas,
        modules: cli.modules,
        config: cli.config,
    };

    let result = match cli.command {
        Commands::Validate { files, json } => commands::validate::run(&store_args, &files, json),
        Commands::CheckChanges { old, new, phase } => {
            commands::check_changes::run(&store_args, &old, &new, phase)
        }
        Commands::Schemas { json } => commands::schemas::run(&store_args, json),
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
