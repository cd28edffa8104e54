use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use hatch::logging::{LogOptions, init_tracing};

mod cmd;

#[derive(Parser)]
#[command(name = "hatch")]
#[command(version, about = "Hatch deployment orchestrator")]
pub struct Cli {
    /// Path to hatch.toml
    #[arg(long, global = true, env = "HATCH_CONFIG", default_value = "hatch.toml")]
    pub config: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Skip confirmation prompts
    #[arg(long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy a hatch: three template transactions, then address collection
    Deploy {
        /// Network section from hatch.toml, or `simulated`
        #[arg(short, long, env = "HATCH_NETWORK")]
        network: String,

        /// Run identifier; generated when omitted
        #[arg(long)]
        run_id: Option<String>,

        /// Resolve and print parameters without sending transactions
        #[arg(long)]
        dry_run: bool,
    },
    /// Collect app addresses of an existing organization
    Apps {
        #[arg(short, long, env = "HATCH_NETWORK")]
        network: String,

        /// Organization (kernel) address
        #[arg(long)]
        dao: String,
    },
    /// Print the resolved deployment parameters as TOML
    Params {
        #[arg(short, long, env = "HATCH_NETWORK")]
        network: String,
    },
    /// List the deployment records kept for a network
    Runs {
        #[arg(short, long, env = "HATCH_NETWORK")]
        network: String,
    },
    /// View, validate or create hatch.toml
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and list every problem
    Validate,
    /// Write a starter hatch.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_options = LogOptions {
        verbose: cli.verbose,
        json: cli.log_json,
        file: cli.log_file.clone(),
    }
    .with_env();
    let _guard = init_tracing(&log_options)?;

    match &cli.command {
        Commands::Deploy {
            network,
            run_id,
            dry_run,
        } => {
            cmd::cmd_deploy(&cli, network, run_id.as_deref(), *dry_run).await?;
        }
        Commands::Apps { network, dao } => cmd::cmd_apps(&cli, network, dao).await?,
        Commands::Params { network } => cmd::cmd_params(&cli, network)?,
        Commands::Runs { network } => cmd::cmd_runs(&cli, network)?,
        Commands::Config { command } => cmd::cmd_config(&cli.config, command.clone())?,
    }

    Ok(())
}
