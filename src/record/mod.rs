//! Deployment records written under `<deployments_dir>/<network>/`.

pub mod logger;

use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::chain::TxHash;
use crate::deploy::{DeployProgress, DeployStep, HatchAddresses, RunId};
use crate::params::DeploymentParameters;

pub use logger::{RecordListener, RecordLogger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
    Failed,
}

/// One submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub step: DeployStep,
    pub tx_hash: TxHash,
    /// Set once the transaction is confirmed.
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub run_id: RunId,
    pub network: String,
    pub dao_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    /// Last step entered.
    pub step: DeployStep,
    pub parameters: DeploymentParameters,
    pub transactions: Vec<TxRecord>,
    pub dao: Option<Address>,
    #[serde(default, with = "crate::params::amount::option")]
    pub total_supply: Option<U256>,
    #[serde(default, with = "crate::params::amount::option")]
    pub expected_raise: Option<U256>,
    pub addresses: Option<HatchAddresses>,
    pub error: Option<String>,
}

impl DeploymentRecord {
    pub fn new(run_id: RunId, network: &str, dao_id: String, parameters: DeploymentParameters) -> Self {
        Self {
            run_id,
            network: network.to_string(),
            dao_id,
            started_at: Utc::now(),
            ended_at: None,
            status: RunStatus::InProgress,
            step: DeployStep::TxOne,
            parameters,
            transactions: Vec::new(),
            dao: None,
            total_supply: None,
            expected_raise: None,
            addresses: None,
            error: None,
        }
    }

    /// Fold one progress notification into the record.
    pub fn apply(&mut self, event: &DeployProgress) {
        match event {
            DeployProgress::Started { .. } => {}
            DeployProgress::StepStarted { step } => self.step = *step,
            DeployProgress::TxSubmitted { step, tx_hash } => self.transactions.push(TxRecord {
                step: *step,
                tx_hash: *tx_hash,
                block_number: None,
            }),
            DeployProgress::TxConfirmed { receipt, .. } => {
                if let Some(tx) = self
                    .transactions
                    .iter_mut()
                    .find(|tx| tx.tx_hash == receipt.tx_hash)
                {
                    tx.block_number = Some(receipt.block_number);
                }
            }
            DeployProgress::DaoDeployed { dao } => self.dao = Some(*dao),
            DeployProgress::ExpectedRaise {
                total_supply,
                expected_raise,
            } => {
                self.total_supply = Some(*total_supply);
                self.expected_raise = Some(*expected_raise);
            }
            DeployProgress::Finished { addresses } => {
                self.addresses = Some(addresses.clone());
                self.status = RunStatus::Completed;
                self.ended_at = Some(Utc::now());
            }
            DeployProgress::Failed { step, error } => {
                self.step = *step;
                self.error = Some(error.clone());
                self.status = RunStatus::Failed;
                self.ended_at = Some(Utc::now());
            }
        }
    }
}
