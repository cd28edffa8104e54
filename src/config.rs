use anyhow::{Context, Result, bail};
use ethers::types::{Address, U256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::chain::{EthersChain, HatchChain, InMemoryChain, RpcSettings};
use crate::deploy::DeployTimeouts;
use crate::hatch_config::{HatchToml, NetworkConfig, NetworkKind};
use crate::params::{ParamsOverrides, StandardParameters, one_token};

/// Supply the simulated contribution token starts with.
const SIMULATED_SUPPLY_TOKENS: u64 = 1_000_000;

/// Runtime configuration for one network.
///
/// Bridges `hatch.toml` with the environment and command line: file values first, then
/// `HATCH_*` variables, then CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub network_name: String,
    pub network: NetworkConfig,
    pub timeouts: DeployTimeouts,
    pub poll_interval: Duration,
    pub params: ParamsOverrides,
    pub deployments_dir: PathBuf,
}

impl Config {
    /// Load `hatch.toml` (or defaults) and resolve `network` with environment overrides.
    pub fn load(config_path: &Path, network: &str) -> Result<Self> {
        let file = HatchToml::load_or_default(config_path)?;
        let mut config = Self::from_file(&file, network)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(file: &HatchToml, network: &str) -> Result<Self> {
        let resolved = file.network(network)?;
        Ok(Self {
            network_name: network.to_string(),
            network: resolved,
            timeouts: DeployTimeouts {
                event: Duration::from_secs(file.timeouts.event_secs),
                receipt: Duration::from_secs(file.timeouts.receipt_secs),
            },
            poll_interval: Duration::from_millis(file.timeouts.poll_interval_ms),
            params: file.params.clone(),
            deployments_dir: file.output.deployments_dir.clone(),
        })
    }

    /// Apply `HATCH_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("HATCH_RPC_URL") {
            self.network.rpc_url = Some(url);
        }
        if let Some(factory) = lookup("HATCH_FACTORY") {
            let factory: Address = factory
                .parse()
                .with_context(|| format!("HATCH_FACTORY is not an address: {}", factory))?;
            self.network.factory = Some(factory);
        }
        if let Some(dir) = lookup("HATCH_DEPLOYMENTS_DIR") {
            self.deployments_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("HATCH_EVENT_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("HATCH_EVENT_TIMEOUT_SECS is not a number: {}", secs))?;
            self.timeouts.event = Duration::from_secs(secs);
        }
        if let Some(secs) = lookup("HATCH_RECEIPT_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().with_context(|| {
                format!("HATCH_RECEIPT_TIMEOUT_SECS is not a number: {}", secs)
            })?;
            self.timeouts.receipt = Duration::from_secs(secs);
        }
        Ok(())
    }

    /// Whether transactions leave the machine.
    pub fn is_live(&self) -> bool {
        self.network.kind == NetworkKind::Rpc
    }

    pub fn parameter_provider(&self) -> Result<StandardParameters> {
        let tokens = self
            .network
            .tokens()
            .with_context(|| format!("Network '{}' is incomplete", self.network_name))?;
        Ok(StandardParameters::new(tokens, self.params.clone()))
    }

    /// `<deployments_dir>/<network>`
    pub fn record_dir(&self) -> PathBuf {
        self.deployments_dir.join(&self.network_name)
    }

    /// Signer key from the variable named by `private_key_env`.
    pub fn private_key(&self) -> Result<String> {
        let var = &self.network.private_key_env;
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => bail!(
                "Signer key not found: set {} (or change private_key_env for network '{}')",
                var,
                self.network_name
            ),
        }
    }

    pub fn rpc_settings(&self) -> Result<RpcSettings> {
        let name = &self.network_name;
        Ok(RpcSettings {
            rpc_url: self
                .network
                .rpc_url
                .clone()
                .with_context(|| format!("networks.{}: rpc_url is required", name))?,
            chain_id: self
                .network
                .chain_id
                .with_context(|| format!("networks.{}: chain_id is required", name))?,
            factory: self
                .network
                .factory
                .with_context(|| format!("networks.{}: factory is required", name))?,
            confirmations: self.network.confirmations,
            poll_interval: self.poll_interval,
        })
    }

    /// Build the chain client for this network.
    pub async fn connect(&self) -> Result<Arc<dyn HatchChain>> {
        match self.network.kind {
            NetworkKind::Simulated => {
                let mut chain = match self.network.factory {
                    Some(factory) => InMemoryChain::with_factory(factory),
                    None => InMemoryChain::new(),
                };
                if let Some(token) = self.network.contribution_token {
                    chain = chain.with_token_supply(
                        token,
                        U256::from(SIMULATED_SUPPLY_TOKENS) * one_token(),
                    );
                }
                debug!(network = %self.network_name, "using simulated chain");
                Ok(Arc::new(chain))
            }
            NetworkKind::Rpc => {
                let settings = self.rpc_settings()?;
                let key = self.private_key()?;
                let chain = EthersChain::connect(&settings, &key)
                    .await
                    .with_context(|| format!("Failed to connect to {}", settings.rpc_url))?;
                debug!(network = %self.network_name, chain_id = settings.chain_id, "connected");
                Ok(Arc::new(chain))
            }
        }
    }
}
