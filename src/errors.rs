//! Typed error hierarchy for the hatch orchestrator.
//!
//! Two top-level enums cover the two layers:
//! - `ChainError`: failures reported by a `HatchChain` implementation
//! - `DeployError`: orchestration failures, wrapping `ChainError`

use ethers::types::{Address, H256};
use std::time::Duration;
use thiserror::Error;

use crate::chain::EventName;
use crate::deploy::{AppKind, DeployStep};

/// Errors from a chain client (RPC, signer, contract calls).
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("Contract call {method} failed: {message}")]
    Contract { method: String, message: String },

    #[error("Transaction {tx_hash:?} reverted")]
    Reverted { tx_hash: H256 },

    #[error("Transaction {tx_hash:?} dropped from the mempool")]
    Dropped { tx_hash: H256 },

    #[error("Failed to decode {event} log: {message}")]
    Decode { event: EventName, message: String },

    #[error("Unknown filter subscription {0}")]
    UnknownSubscription(u64),
}

/// Errors from a deployment run.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Invalid deployment parameters: {0}")]
    Params(String),

    #[error("{step} failed: {source}")]
    Chain {
        step: DeployStep,
        #[source]
        source: ChainError,
    },

    #[error("No {event} event for transaction {tx_hash:?} after {timeout:?}")]
    EventTimeout {
        event: EventName,
        tx_hash: H256,
        timeout: Duration,
    },

    #[error("Transaction {tx_hash:?} not confirmed after {timeout:?}")]
    ReceiptTimeout { tx_hash: H256, timeout: Duration },

    #[error("Transaction {tx_hash:?} emitted {count} {event} events, expected exactly one")]
    AmbiguousEvent {
        event: EventName,
        tx_hash: H256,
        count: usize,
    },

    #[error("No {app} proxy was created by organization {dao:?}")]
    MissingApp { app: AppKind, dao: Address },

    #[error("Expected raise overflows uint256 (total supply {total_supply})")]
    RaiseOverflow { total_supply: ethers::types::U256 },

    #[error("{step} cannot run after {current}")]
    OutOfOrder { step: DeployStep, current: DeployStep },

    #[error("Run already failed at {step}; start a new run")]
    RunAborted { step: DeployStep },
}

impl DeployError {
    pub fn chain(step: DeployStep, source: ChainError) -> Self {
        DeployError::Chain { step, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_error_reverted_carries_hash() {
        let tx_hash = H256::repeat_byte(0x11);
        let err = ChainError::Reverted { tx_hash };
        match &err {
            ChainError::Reverted { tx_hash: h } => assert_eq!(*h, tx_hash),
            _ => panic!("Expected Reverted"),
        }
        assert!(err.to_string().contains("reverted"));
    }

    #[test]
    fn deploy_error_chain_keeps_source() {
        use std::error::Error as _;

        let err = DeployError::chain(DeployStep::TxTwo, ChainError::Rpc("timeout".to_string()));
        assert!(err.to_string().starts_with("tx two failed"));
        let source = err.source().expect("chain error has a source");
        assert!(source.to_string().contains("timeout"));
    }

    #[test]
    fn event_timeout_reports_duration() {
        let err = DeployError::EventTimeout {
            event: EventName::DeployDao,
            tx_hash: H256::zero(),
            timeout: Duration::from_secs(90),
        };
        let msg = err.to_string();
        assert!(msg.contains("DeployDao"));
        assert!(msg.contains("90s"));
    }

    #[test]
    fn missing_app_names_the_app() {
        let err = DeployError::MissingApp {
            app: AppKind::Tollgate,
            dao: Address::repeat_byte(0xda),
        };
        assert!(err.to_string().contains("tollgate"));
    }

    #[test]
    fn receipt_timeout_keeps_sub_second_precision() {
        let err = DeployError::ReceiptTimeout {
            tx_hash: H256::zero(),
            timeout: Duration::from_millis(250),
        };
        assert!(err.to_string().ends_with("not confirmed after 250ms"));
    }
}
