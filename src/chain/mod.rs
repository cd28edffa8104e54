//! Chain client seam.
//!
//! The orchestrator talks to the chain only through [`HatchChain`]. Real implementation:
//! [`EthersChain`] (JSON-RPC over HTTP with a local signer). Test double and `simulated`
//! network: [`InMemoryChain`].

pub mod memory;
pub mod rpc;

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

use crate::deploy::{AppId, AppIds, TxOneArgs, TxThreeArgs, TxTwoArgs};
use crate::errors::ChainError;

pub use memory::InMemoryChain;
pub use rpc::{EthersChain, RpcSettings};

/// Hash identifying one submitted transaction.
pub type TxHash = H256;

/// Confirmation of a finalized, successful transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// Events the orchestrator knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    /// `DeployDao(address dao)`, emitted by the hatch template.
    DeployDao,
    /// `NewAppProxy(address proxy, bool isUpgradeable, bytes32 appId)`, emitted by the kernel.
    NewAppProxy,
}

impl EventName {
    pub fn signature(self) -> &'static str {
        match self {
            EventName::DeployDao => "DeployDao(address)",
            EventName::NewAppProxy => "NewAppProxy(address,bool,bytes32)",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventName::DeployDao => write!(f, "DeployDao"),
            EventName::NewAppProxy => write!(f, "NewAppProxy"),
        }
    }
}

/// Decoded arguments of a known event, fields named as in the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventArgs {
    DeployDao {
        dao: Address,
    },
    NewAppProxy {
        proxy: Address,
        is_upgradeable: bool,
        app_id: AppId,
    },
}

impl EventArgs {
    pub fn name(&self) -> EventName {
        match self {
            EventArgs::DeployDao { .. } => EventName::DeployDao,
            EventArgs::NewAppProxy { .. } => EventName::NewAppProxy,
        }
    }

    /// The address carried by the first event field.
    pub fn first_address(&self) -> Address {
        match self {
            EventArgs::DeployDao { dao } => *dao,
            EventArgs::NewAppProxy { proxy, .. } => *proxy,
        }
    }
}

/// One emission observed in a contract's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub args: EventArgs,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub log_index: u64,
}

impl EventRecord {
    /// Canonical log position, used to order records.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// A live log filter. Must be torn down with [`EventSubscription::unsubscribe`].
#[async_trait]
pub trait EventSubscription: Send {
    /// Wait for the next non-empty batch of matching records.
    async fn next_batch(&mut self) -> Result<Vec<EventRecord>, ChainError>;

    async fn unsubscribe(self: Box<Self>) -> Result<(), ChainError>;
}

/// Everything the deployment needs from the chain.
#[async_trait]
pub trait HatchChain: Send + Sync {
    /// Address of the hatch template the transactions are sent to.
    fn factory(&self) -> Address;

    async fn send_tx_one(&self, args: &TxOneArgs) -> Result<TxHash, ChainError>;

    async fn send_tx_two(&self, args: &TxTwoArgs) -> Result<TxHash, ChainError>;

    async fn send_tx_three(&self, args: &TxThreeArgs) -> Result<TxHash, ChainError>;

    /// Wait until the transaction is included. A failed status is `ChainError::Reverted`.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<Receipt, ChainError>;

    /// Read the six app ids from the template's accessors.
    async fn app_ids(&self) -> Result<AppIds, ChainError>;

    /// `totalSupply()` of an ERC-20 token, read at call time.
    async fn total_supply(&self, token: Address) -> Result<U256, ChainError>;

    /// Open a filter for `event` on `contract`, delivering records from `from_block` onwards
    /// (including ones already mined).
    async fn subscribe(
        &self,
        contract: Address,
        event: EventName,
        from_block: u64,
    ) -> Result<Box<dyn EventSubscription>, ChainError>;

    /// All `event` emissions of `contract`, from genesis to the latest block, in log order.
    async fn query_events(
        &self,
        contract: Address,
        event: EventName,
    ) -> Result<Vec<EventRecord>, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_address_reads_leading_field() {
        let dao = Address::repeat_byte(0x01);
        assert_eq!(EventArgs::DeployDao { dao }.first_address(), dao);

        let proxy = Address::repeat_byte(0x02);
        let args = EventArgs::NewAppProxy {
            proxy,
            is_upgradeable: true,
            app_id: AppId::from([7u8; 32]),
        };
        assert_eq!(args.first_address(), proxy);
        assert_eq!(args.name(), EventName::NewAppProxy);
    }

    #[test]
    fn event_signatures_match_abi() {
        assert_eq!(EventName::DeployDao.signature(), "DeployDao(address)");
        assert_eq!(
            EventName::NewAppProxy.signature(),
            "NewAppProxy(address,bool,bytes32)"
        );
    }

    #[test]
    fn records_order_by_block_then_log_index() {
        let record = |block, index| EventRecord {
            args: EventArgs::DeployDao {
                dao: Address::zero(),
            },
            tx_hash: H256::zero(),
            block_number: block,
            log_index: index,
        };
        let mut records = vec![record(2, 0), record(1, 5), record(1, 2)];
        records.sort_by_key(EventRecord::position);
        let positions: Vec<_> = records.iter().map(EventRecord::position).collect();
        assert_eq!(positions, vec![(1, 2), (1, 5), (2, 0)]);
    }
}
