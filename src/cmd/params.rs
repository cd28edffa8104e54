//! Parameter preview: `hatch params`.

use anyhow::{Context, Result};

use crate::Cli;

pub fn cmd_params(cli: &Cli, network: &str) -> Result<()> {
    use hatch::config::Config;
    use hatch::params::ParameterProvider;

    let config = Config::load(&cli.config, network)?;
    let params = config
        .parameter_provider()?
        .resolve(config.network.block_time_secs)?;

    let toml = toml::to_string_pretty(&params).context("Failed to serialize parameters")?;
    println!("# network: {} ({})", config.network_name, config.network.kind);
    print!("{}", toml);
    Ok(())
}
