//! Deployment record listing: `hatch runs`.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::Cli;

pub fn cmd_runs(cli: &Cli, network: &str) -> Result<()> {
    use hatch::config::Config;
    use hatch::record::{DeploymentRecord, RecordLogger};

    let config = Config::load(&cli.config, network)?;
    let record_dir = config.record_dir();
    let mut logger = RecordLogger::new(&record_dir);

    println!("Deployments for '{}' in {}", network, record_dir.display());
    println!();

    if logger.load_current()?
        && let Some(current) = logger.current()
    {
        println!("Current run:");
        println!("  {}", summary(current));
        if let Some(error) = &current.error {
            println!("    error: {}", error);
        }
        println!();
    }

    let runs = logger.list_runs()?;
    if runs.is_empty() {
        println!("No completed deployments.");
        return Ok(());
    }

    println!("Completed runs:");
    for path in runs {
        let record = read_record(&path)?;
        println!("  {}", summary(&record));
        if let Some(addresses) = &record.addresses {
            println!("    dao: {:?}", addresses.dao);
        }
    }

    fn read_record(path: &Path) -> Result<DeploymentRecord> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn summary(record: &DeploymentRecord) -> String {
        format!(
            "{}  {}  {:?}  step: {}  started {}",
            record.run_id,
            record.dao_id,
            record.status,
            record.step,
            record.started_at.format("%Y-%m-%d %H:%M:%S")
        )
    }

    Ok(())
}
