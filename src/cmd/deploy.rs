//! Full deployment: `hatch deploy`.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::Cli;

pub async fn cmd_deploy(
    cli: &Cli,
    network: &str,
    run_id: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    use dialoguer::Confirm;
    use hatch::config::Config;
    use hatch::deploy::{HatchDeployer, RunId, args::dao_id};
    use hatch::params::ParameterProvider;
    use hatch::record::{DeploymentRecord, RecordListener, RecordLogger};
    use hatch::ui::DeployUI;

    let config = Config::load(&cli.config, network)?;
    let params = config
        .parameter_provider()?
        .resolve(config.network.block_time_secs)?;
    let run_id = match run_id {
        Some(id) => RunId::parse(id)?,
        None => RunId::generate(),
    };
    let dao_id = dao_id(&params.dao_id_prefix, &run_id);

    if dry_run {
        println!("# network: {} ({})", config.network_name, config.network.kind);
        println!("# run id: {}", run_id);
        println!("# dao id: {}", dao_id);
        print!(
            "{}",
            toml::to_string_pretty(&params).context("Failed to serialize parameters")?
        );
        return Ok(());
    }

    if config.is_live() && !cli.yes {
        let proceed = Confirm::new()
            .with_prompt(format!(
                "Send three transactions to network '{}' to create {}?",
                config.network_name, dao_id
            ))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !proceed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let chain = config.connect().await?;

    let mut logger = RecordLogger::new(&config.record_dir());
    logger.start_run(DeploymentRecord::new(
        run_id.clone(),
        &config.network_name,
        dao_id,
        params.clone(),
    ))?;
    let record = Arc::new(RecordListener::new(logger));
    let ui = Arc::new(DeployUI::new(cli.verbose));

    let mut deployer = HatchDeployer::new(chain, params, run_id, config.timeouts)?
        .with_listener(ui)
        .with_listener(record.clone());
    let outcome = deployer.run().await?;

    if let Some(path) = record.archived() {
        info!(record = %path.display(), "deployment record written");
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?
    );
    Ok(())
}
