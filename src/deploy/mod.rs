//! Hatch deployment: the three-transaction orchestrator, the event address resolver and the
//! app address aggregator.

pub mod aggregator;
pub mod apps;
pub mod args;
pub mod orchestrator;
pub mod progress;
pub mod resolver;

use serde::{Deserialize, Serialize};

pub use aggregator::{collect_app_addresses, group_app_proxies, project_addresses};
pub use apps::{AppAddress, AppAddressMap, AppId, AppIds, AppKind, HatchAddresses};
pub use args::{RunId, TxOneArgs, TxThreeArgs, TxTwoArgs, VotingSettings, expected_raise};
pub use orchestrator::{DeployTimeouts, DeploymentOutcome, HatchDeployer, StepReceipts};
pub use progress::{CollectingListener, DeployProgress, ProgressListener};
pub use resolver::resolve_event_address;

/// Orchestrator state. Transitions only move forward, one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStep {
    TxOne,
    TxTwo,
    TxThree,
    Done,
}

impl DeployStep {
    pub fn next(self) -> DeployStep {
        match self {
            DeployStep::TxOne => DeployStep::TxTwo,
            DeployStep::TxTwo => DeployStep::TxThree,
            DeployStep::TxThree | DeployStep::Done => DeployStep::Done,
        }
    }

    /// 1-based position for progress display; `Done` counts as the fourth stage.
    pub fn ordinal(self) -> u64 {
        match self {
            DeployStep::TxOne => 1,
            DeployStep::TxTwo => 2,
            DeployStep::TxThree => 3,
            DeployStep::Done => 4,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            DeployStep::TxOne => "create organization, voting and token manager",
            DeployStep::TxTwo => "install hatch and impact hours",
            DeployStep::TxThree => "install redemptions, tollgate and migration tools",
            DeployStep::Done => "collect app addresses",
        }
    }
}

impl std::fmt::Display for DeployStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeployStep::TxOne => write!(f, "tx one"),
            DeployStep::TxTwo => write!(f, "tx two"),
            DeployStep::TxThree => write!(f, "tx three"),
            DeployStep::Done => write!(f, "address collection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_advance_in_order() {
        let mut step = DeployStep::TxOne;
        let mut seen = vec![step];
        while step != DeployStep::Done {
            step = step.next();
            seen.push(step);
        }
        assert_eq!(
            seen,
            vec![
                DeployStep::TxOne,
                DeployStep::TxTwo,
                DeployStep::TxThree,
                DeployStep::Done
            ]
        );
        assert_eq!(DeployStep::Done.next(), DeployStep::Done);
    }

    #[test]
    fn steps_are_ordered() {
        assert!(DeployStep::TxOne < DeployStep::TxTwo);
        assert!(DeployStep::TxThree < DeployStep::Done);
        assert_eq!(DeployStep::TxThree.ordinal(), 3);
    }
}
