//! Configuration view and validation commands: `hatch config`.

use anyhow::Result;
use std::path::Path;

use super::super::ConfigCommands;

pub fn cmd_config(config_path: &Path, command: Option<ConfigCommands>) -> Result<()> {
    use hatch::hatch_config::HatchToml;
    use hatch::params::ParameterProvider;
    use hatch::params::StandardParameters;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Hatch Configuration");
            println!("===================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                HatchToml::load(config_path)?
            } else {
                println!("No hatch.toml found at {}", config_path.display());
                println!("Using default configuration.");
                HatchToml::default()
            };
            println!();

            for name in toml.network_names() {
                let network = toml.network(&name)?;
                println!("[networks.{}]", name);
                println!("  kind = \"{}\"", network.kind);
                if let Some(url) = &network.rpc_url {
                    println!("  rpc_url = \"{}\"", url);
                }
                if let Some(chain_id) = network.chain_id {
                    println!("  chain_id = {}", chain_id);
                }
                if let Some(factory) = network.factory {
                    println!("  factory = \"{:?}\"", factory);
                }
                println!("  block_time_secs = {}", network.block_time_secs);
                println!("  confirmations = {}", network.confirmations);
                println!("  private_key_env = \"{}\"", network.private_key_env);
                println!();
            }

            println!("[timeouts]");
            println!("  event_secs = {}", toml.timeouts.event_secs);
            println!("  receipt_secs = {}", toml.timeouts.receipt_secs);
            println!("  poll_interval_ms = {}", toml.timeouts.poll_interval_ms);
            println!();
            println!("[output]");
            println!(
                "  deployments_dir = \"{}\"",
                toml.output.deployments_dir.display()
            );
            println!();

            if !config_path.exists() {
                println!("Run 'hatch config init' to create a hatch.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No hatch.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = HatchToml::load(config_path)?;
            let mut problems = toml.validate();

            // Parameter overrides are only checked against complete networks.
            for name in toml.network_names() {
                let network = toml.network(&name)?;
                let Ok(tokens) = network.tokens() else {
                    continue;
                };
                if let Err(e) = StandardParameters::new(tokens, toml.params.clone())
                    .resolve(network.block_time_secs)
                {
                    problems.push(format!("networks.{}: {}", name, e));
                }
            }

            if problems.is_empty() {
                println!("Configuration is valid.");
                println!();
            } else {
                println!("Configuration problems:");
                for problem in &problems {
                    println!("  - {}", problem);
                }
                println!();
                anyhow::bail!("{} configuration problem(s)", problems.len());
            }
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("hatch.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if let Some(parent) = config_path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                std::fs::create_dir_all(parent)?;
            }

            HatchToml::template().save(config_path)?;

            println!("Created hatch.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [networks.<name>] rpc_url, chain_id, factory and token addresses");
            println!("  - [timeouts] event, receipt and polling waits");
            println!("  - [params] overrides of the deployment defaults");
            println!();
        }
    }

    Ok(())
}
