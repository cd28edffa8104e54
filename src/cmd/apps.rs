//! Read-only address collection: `hatch apps`.

use anyhow::{Context, Result};
use ethers::types::Address;

use crate::Cli;

pub async fn cmd_apps(cli: &Cli, network: &str, dao: &str) -> Result<()> {
    use hatch::config::Config;
    use hatch::deploy::collect_app_addresses;

    let dao: Address = dao
        .parse()
        .with_context(|| format!("Invalid organization address: {}", dao))?;
    let config = Config::load(&cli.config, network)?;
    let chain = config.connect().await?;

    let ids = chain
        .app_ids()
        .await
        .context("Failed to read app ids from the template")?;
    let addresses = collect_app_addresses(chain.as_ref(), dao, &ids).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&addresses).context("Failed to serialize addresses")?
    );
    Ok(())
}
