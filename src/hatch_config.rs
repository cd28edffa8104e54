//! The `hatch.toml` configuration file.
//!
//! Layering is file → environment → CLI: this module only knows the file. Environment and
//! command-line overrides are applied by [`crate::config::Config`].
//!
//! # Configuration File Format
//!
//! ```toml
//! [networks.rinkeby]
//! kind = "rpc"
//! rpc_url = "https://rinkeby.example/v3/KEY"
//! chain_id = 4
//! factory = "0x0000000000000000000000000000000000000001"
//! block_time_secs = 15
//! confirmations = 1
//! private_key_env = "HATCH_PRIVATE_KEY"
//! collateral_token = "0x..."
//! contribution_token = "0x..."
//! score_token = "0x..."
//!
//! [timeouts]
//! event_secs = 120
//! receipt_secs = 600
//! poll_interval_ms = 2000
//!
//! [params]
//! org_token_name = "Test"
//! org_token_symbol = "TST"
//!
//! [output]
//! deployments_dir = "deployments"
//! ```
//!
//! A network named `simulated` is always available and backed by the in-process chain.

use anyhow::{Context, Result, bail};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::params::{NetworkTokens, ParamsOverrides};

/// Name of the built-in in-process network.
pub const SIMULATED: &str = "simulated";

/// How a network is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    /// JSON-RPC endpoint with a local signer
    #[default]
    Rpc,
    /// In-process chain; nothing leaves the machine
    Simulated,
}

impl std::fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkKind::Rpc => write!(f, "rpc"),
            NetworkKind::Simulated => write!(f, "simulated"),
        }
    }
}

impl std::str::FromStr for NetworkKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rpc" => Ok(NetworkKind::Rpc),
            "simulated" => Ok(NetworkKind::Simulated),
            _ => bail!("Invalid network kind '{}'. Valid values: rpc, simulated", s),
        }
    }
}

/// One `[networks.<name>]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub kind: NetworkKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Hatch template address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    #[serde(default = "default_block_time_secs")]
    pub block_time_secs: u64,
    #[serde(default = "default_confirmations")]
    pub confirmations: usize,
    /// Environment variable holding the signer key
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collateral_token: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contribution_token: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_token: Option<Address>,
}

fn default_block_time_secs() -> u64 {
    15
}

fn default_confirmations() -> usize {
    1
}

fn default_private_key_env() -> String {
    "HATCH_PRIVATE_KEY".to_string()
}

impl NetworkConfig {
    /// The built-in `simulated` network.
    pub fn simulated() -> Self {
        Self {
            kind: NetworkKind::Simulated,
            rpc_url: None,
            chain_id: None,
            factory: None,
            block_time_secs: default_block_time_secs(),
            confirmations: default_confirmations(),
            private_key_env: default_private_key_env(),
            collateral_token: Some(Address::repeat_byte(0xc0)),
            contribution_token: Some(Address::repeat_byte(0xc1)),
            score_token: Some(Address::repeat_byte(0xc2)),
        }
    }

    /// Token addresses, all of which must be configured.
    pub fn tokens(&self) -> Result<NetworkTokens> {
        let require = |name: &str, value: Option<Address>| {
            value.with_context(|| format!("{} is not configured", name))
        };
        Ok(NetworkTokens {
            collateral_token: require("collateral_token", self.collateral_token)?,
            contribution_token: require("contribution_token", self.contribution_token)?,
            score_token: require("score_token", self.score_token)?,
        })
    }

    fn problems(&self, name: &str) -> Vec<String> {
        let mut problems = Vec::new();
        if self.block_time_secs == 0 {
            problems.push(format!("networks.{}: block_time_secs must be > 0", name));
        }
        if self.kind == NetworkKind::Simulated {
            return problems;
        }
        if self.rpc_url.as_deref().is_none_or(str::is_empty) {
            problems.push(format!("networks.{}: rpc_url is required", name));
        }
        if self.chain_id.is_none() {
            problems.push(format!("networks.{}: chain_id is required", name));
        }
        if self.factory.is_none_or(|a| a.is_zero()) {
            problems.push(format!("networks.{}: factory is required", name));
        }
        if self.confirmations == 0 {
            problems.push(format!("networks.{}: confirmations must be >= 1", name));
        }
        for (field, value) in [
            ("collateral_token", self.collateral_token),
            ("contribution_token", self.contribution_token),
            ("score_token", self.score_token),
        ] {
            if value.is_none() {
                problems.push(format!("networks.{}: {} is required", name, field));
            }
        }
        problems
    }
}

/// Waits and polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Seconds to wait for the organization event after tx one
    #[serde(default = "default_event_secs")]
    pub event_secs: u64,
    /// Seconds to wait for each transaction to confirm
    #[serde(default = "default_receipt_secs")]
    pub receipt_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_event_secs() -> u64 {
    120
}

fn default_receipt_secs() -> u64 {
    600
}

fn default_poll_interval_ms() -> u64 {
    2000
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            event_secs: default_event_secs(),
            receipt_secs: default_receipt_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root of the per-network deployment records
    #[serde(default = "default_deployments_dir")]
    pub deployments_dir: PathBuf,
}

fn default_deployments_dir() -> PathBuf {
    PathBuf::from("deployments")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            deployments_dir: default_deployments_dir(),
        }
    }
}

/// Root of `hatch.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HatchToml {
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub params: ParamsOverrides,
    #[serde(default)]
    pub output: OutputConfig,
}

impl HatchToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse hatch.toml")
    }

    /// Returns default configuration if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize hatch.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Look up a network. `simulated` falls back to the built-in definition.
    pub fn network(&self, name: &str) -> Result<NetworkConfig> {
        if let Some(network) = self.networks.get(name) {
            return Ok(network.clone());
        }
        if name == SIMULATED {
            return Ok(NetworkConfig::simulated());
        }
        let known = self.network_names().join(", ");
        bail!("Unknown network '{}'. Configured networks: {}", name, known)
    }

    /// Configured network names plus the built-in one, sorted.
    pub fn network_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.networks.keys().cloned().collect();
        if !self.networks.contains_key(SIMULATED) {
            names.push(SIMULATED.to_string());
            names.sort();
        }
        names
    }

    /// Validate the configuration and return every problem found.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (name, network) in &self.networks {
            problems.extend(network.problems(name));
        }
        if self.timeouts.event_secs == 0 {
            problems.push("timeouts.event_secs must be > 0".to_string());
        }
        if self.timeouts.receipt_secs == 0 {
            problems.push("timeouts.receipt_secs must be > 0".to_string());
        }
        if self.timeouts.poll_interval_ms == 0 {
            problems.push("timeouts.poll_interval_ms must be > 0".to_string());
        }
        problems
    }

    /// Starting point written by `hatch config init`.
    pub fn template() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert(
            "local".to_string(),
            NetworkConfig {
                kind: NetworkKind::Rpc,
                rpc_url: Some("http://127.0.0.1:8545".to_string()),
                chain_id: Some(1337),
                factory: None,
                block_time_secs: 1,
                confirmations: default_confirmations(),
                private_key_env: default_private_key_env(),
                collateral_token: None,
                contribution_token: None,
                score_token: None,
            },
        );
        Self {
            networks,
            ..Self::default()
        }
    }
}
