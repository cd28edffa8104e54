//! Progress notifications emitted while a deployment runs.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::chain::{Receipt, TxHash};

use super::{DeployStep, HatchAddresses, RunId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeployProgress {
    Started {
        run_id: RunId,
        dao_id: String,
    },
    StepStarted {
        step: DeployStep,
    },
    TxSubmitted {
        step: DeployStep,
        tx_hash: TxHash,
    },
    TxConfirmed {
        step: DeployStep,
        receipt: Receipt,
    },
    DaoDeployed {
        dao: Address,
    },
    ExpectedRaise {
        total_supply: U256,
        expected_raise: U256,
    },
    Finished {
        addresses: HatchAddresses,
    },
    Failed {
        step: DeployStep,
        error: String,
    },
}

/// Receives every [`DeployProgress`] in emission order.
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, event: &DeployProgress);
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct CollectingListener {
    events: Mutex<Vec<DeployProgress>>,
}

impl CollectingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DeployProgress> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ProgressListener for CollectingListener {
    fn on_progress(&self, event: &DeployProgress) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_serializes_with_event_tag() {
        let json = serde_json::to_value(DeployProgress::StepStarted {
            step: DeployStep::TxTwo,
        })
        .unwrap();
        assert_eq!(json["event"], "step_started");
        assert_eq!(json["step"], "tx_two");
    }

    #[test]
    fn collecting_listener_keeps_order() {
        let listener = CollectingListener::new();
        listener.on_progress(&DeployProgress::StepStarted {
            step: DeployStep::TxOne,
        });
        listener.on_progress(&DeployProgress::DaoDeployed {
            dao: Address::repeat_byte(1),
        });
        let events = listener.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], DeployProgress::DaoDeployed { .. }));
    }
}
