mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use playbook_core::config::{ExecutorConfig, LogFormat};
use playbook_runner::ExecutionError;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "playbook-exec",
    about = "Render playbook definitions and execute them through ansible-playbook",
    version,
    propagate_version = true
)]
struct Cli {
    /// Executor config file (default: built-in defaults)
    #[arg(long, global = true, env = "PLAYBOOK_EXEC_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the YAML a playbook (and optionally an inventory) serializes to
    Render {
        /// Playbook definition (.yaml, .yml or .json)
        #[arg(long)]
        playbook: PathBuf,
        /// Inventory definition (.yaml, .yml or .json)
        #[arg(long)]
        inventory: Option<PathBuf>,
    },

    /// Execute a playbook against an inventory, streaming runner output
    Run {
        #[arg(long)]
        playbook: PathBuf,
        #[arg(long)]
        inventory: PathBuf,
        /// Run ID (default: the playbook's id, else a random UUID)
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Inspect the executor config
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match ExecutorConfig::load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&cli.command, &config);

    let result = match cli.command {
        Commands::Render {
            playbook,
            inventory,
        } => cmd::render::run(&playbook, inventory.as_deref(), cli.json),
        Commands::Run {
            playbook,
            inventory,
            run_id,
        } => cmd::run::run(&config, &playbook, &inventory, run_id.as_deref(), cli.json),
        Commands::Config { subcommand } => cmd::config::run(&config, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        let cancelled = e
            .downcast_ref::<ExecutionError>()
            .is_some_and(ExecutionError::is_cancellation);
        std::process::exit(if cancelled { 130 } else { 1 });
    }
}

/// `RUST_LOG` wins; otherwise `run` logs at the configured level and the
/// other commands only log warnings.
fn init_tracing(command: &Commands, config: &ExecutorConfig) {
    let default_level = match command {
        Commands::Run { .. } => config.log.level.as_str(),
        _ => "warn",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.log.format {
        LogFormat::Text => builder.with_target(false).init(),
        LogFormat::Json => builder.json().init(),
    }
}
