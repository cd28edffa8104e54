//! Sequential hatch deployment: tx one → tx two → tx three → address collection.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

use crate::chain::{EventName, HatchChain, Receipt, TxHash};
use crate::errors::DeployError;
use crate::params::DeploymentParameters;

use super::aggregator::collect_app_addresses;
use super::args::{TxOneArgs, TxThreeArgs, TxTwoArgs, dao_id, expected_raise};
use super::progress::{DeployProgress, ProgressListener};
use super::resolver::resolve_event_address;
use super::{DeployStep, HatchAddresses, RunId};

/// Upper bounds on the two open-ended waits of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployTimeouts {
    /// Waiting for the `DeployDao` event after tx one is confirmed.
    pub event: Duration,
    /// Waiting for each transaction to be confirmed.
    pub receipt: Duration,
}

impl Default for DeployTimeouts {
    fn default() -> Self {
        Self {
            event: Duration::from_secs(120),
            receipt: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReceipts {
    pub tx_one: Receipt,
    pub tx_two: Receipt,
    pub tx_three: Receipt,
}

/// Everything a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentOutcome {
    pub run_id: RunId,
    pub dao_id: String,
    pub receipts: StepReceipts,
    #[serde(with = "crate::params::amount")]
    pub expected_raise: U256,
    pub addresses: HatchAddresses,
}

/// Drives one deployment run. A deployer is single-use: once a step fails, the run is over
/// and a new deployer with a fresh [`RunId`] is needed.
pub struct HatchDeployer<C: HatchChain + ?Sized> {
    chain: Arc<C>,
    params: Arc<DeploymentParameters>,
    run_id: RunId,
    timeouts: DeployTimeouts,
    listeners: Vec<Arc<dyn ProgressListener>>,
    step: DeployStep,
    failed: bool,
    dao: Option<Address>,
    tx_one: Option<Receipt>,
    tx_two: Option<Receipt>,
    tx_three: Option<Receipt>,
    expected_raise: Option<U256>,
}

impl<C: HatchChain + ?Sized> HatchDeployer<C> {
    /// Validates the parameters up front so a bad set never reaches the chain.
    pub fn new(
        chain: Arc<C>,
        params: DeploymentParameters,
        run_id: RunId,
        timeouts: DeployTimeouts,
    ) -> Result<Self, DeployError> {
        params.validate()?;
        Ok(Self {
            chain,
            params: Arc::new(params),
            run_id,
            timeouts,
            listeners: Vec::new(),
            step: DeployStep::TxOne,
            failed: false,
            dao: None,
            tx_one: None,
            tx_two: None,
            tx_three: None,
            expected_raise: None,
        })
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn step(&self) -> DeployStep {
        self.step
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Organization address, known once tx one has been resolved.
    pub fn dao(&self) -> Option<Address> {
        self.dao
    }

    pub fn dao_id(&self) -> String {
        dao_id(&self.params.dao_id_prefix, &self.run_id)
    }

    /// Run every remaining step in order and collect the app addresses.
    #[instrument(skip_all, fields(run_id = %self.run_id))]
    pub async fn run(&mut self) -> Result<DeploymentOutcome, DeployError> {
        self.emit(DeployProgress::Started {
            run_id: self.run_id.clone(),
            dao_id: self.dao_id(),
        });

        let result = self.run_steps().await;
        if let Err(e) = &result {
            error!(step = %self.step, error = %e, "deployment failed");
            self.emit(DeployProgress::Failed {
                step: self.step,
                error: e.to_string(),
            });
        }
        result
    }

    async fn run_steps(&mut self) -> Result<DeploymentOutcome, DeployError> {
        if self.step == DeployStep::TxOne {
            self.tx_one().await?;
        }
        if self.step == DeployStep::TxTwo {
            self.tx_two().await?;
        }
        if self.step == DeployStep::TxThree {
            self.tx_three().await?;
        }
        self.finish().await
    }

    /// Create the organization and learn its address from `DeployDao`.
    pub async fn tx_one(&mut self) -> Result<Address, DeployError> {
        self.enter(DeployStep::TxOne)?;
        let args = TxOneArgs::from_params(&self.params);
        let step = DeployStep::TxOne;

        let outcome = async {
            let tx_hash = self
                .chain
                .send_tx_one(&args)
                .await
                .map_err(|e| DeployError::chain(step, e))?;
            self.emit(DeployProgress::TxSubmitted { step, tx_hash });

            let receipt = self.confirm(step, tx_hash).await?;
            let dao = resolve_event_address(
                self.chain.as_ref(),
                self.chain.factory(),
                EventName::DeployDao,
                &receipt,
                self.timeouts.event,
                step,
            )
            .await?;
            Ok::<_, DeployError>((receipt, dao))
        }
        .await;

        let (receipt, dao) = self.leave(outcome)?;
        self.tx_one = Some(receipt);
        self.dao = Some(dao);
        info!(?dao, "organization deployed");
        self.emit(DeployProgress::DaoDeployed { dao });
        Ok(dao)
    }

    /// Install the hatch, sized by the contribution token's current supply.
    pub async fn tx_two(&mut self) -> Result<Receipt, DeployError> {
        self.enter(DeployStep::TxTwo)?;
        let step = DeployStep::TxTwo;

        let outcome = async {
            let total_supply = self
                .chain
                .total_supply(self.params.contribution_token)
                .await
                .map_err(|e| DeployError::chain(step, e))?;
            let raise = expected_raise(
                self.params.expected_raise_per_contribution_token,
                total_supply,
                self.params.one_token,
            )?;
            info!(%total_supply, expected_raise = %raise, "expected raise computed");
            self.emit(DeployProgress::ExpectedRaise {
                total_supply,
                expected_raise: raise,
            });

            let args = TxTwoArgs::from_params(&self.params, raise);
            let tx_hash = self
                .chain
                .send_tx_two(&args)
                .await
                .map_err(|e| DeployError::chain(step, e))?;
            self.emit(DeployProgress::TxSubmitted { step, tx_hash });

            let receipt = self.confirm(step, tx_hash).await?;
            Ok::<_, DeployError>((receipt, raise))
        }
        .await;

        let (receipt, raise) = self.leave(outcome)?;
        self.tx_two = Some(receipt);
        self.expected_raise = Some(raise);
        Ok(receipt)
    }

    /// Install redemptions, tollgate and migration tools and register the organization id.
    pub async fn tx_three(&mut self) -> Result<Receipt, DeployError> {
        self.enter(DeployStep::TxThree)?;
        let step = DeployStep::TxThree;
        let args = TxThreeArgs::from_params(&self.params, &self.run_id);

        let outcome = async {
            let tx_hash = self
                .chain
                .send_tx_three(&args)
                .await
                .map_err(|e| DeployError::chain(step, e))?;
            self.emit(DeployProgress::TxSubmitted { step, tx_hash });
            self.confirm(step, tx_hash).await
        }
        .await;

        let receipt = self.leave(outcome)?;
        self.tx_three = Some(receipt);
        Ok(receipt)
    }

    async fn finish(&mut self) -> Result<DeploymentOutcome, DeployError> {
        if self.failed {
            return Err(DeployError::RunAborted { step: self.step });
        }
        if self.step != DeployStep::Done {
            return Err(DeployError::OutOfOrder {
                step: DeployStep::Done,
                current: self.step,
            });
        }
        let (Some(dao), Some(tx_one), Some(tx_two), Some(tx_three), Some(raise)) = (
            self.dao,
            self.tx_one,
            self.tx_two,
            self.tx_three,
            self.expected_raise,
        ) else {
            return Err(DeployError::OutOfOrder {
                step: DeployStep::Done,
                current: self.step,
            });
        };

        self.emit(DeployProgress::StepStarted {
            step: DeployStep::Done,
        });
        let chain = self.chain.as_ref();
        let outcome = async {
            let ids = chain
                .app_ids()
                .await
                .map_err(|e| DeployError::chain(DeployStep::Done, e))?;
            collect_app_addresses(chain, dao, &ids).await
        }
        .await;
        if outcome.is_err() {
            self.failed = true;
        }
        let addresses = outcome?;

        self.emit(DeployProgress::Finished {
            addresses: addresses.clone(),
        });
        Ok(DeploymentOutcome {
            run_id: self.run_id.clone(),
            dao_id: self.dao_id(),
            receipts: StepReceipts {
                tx_one,
                tx_two,
                tx_three,
            },
            expected_raise: raise,
            addresses,
        })
    }

    /// Guard a step: it must be the current one and the run must not have failed.
    fn enter(&self, step: DeployStep) -> Result<(), DeployError> {
        if self.failed {
            return Err(DeployError::RunAborted { step: self.step });
        }
        if self.step != step {
            return Err(DeployError::OutOfOrder {
                step,
                current: self.step,
            });
        }
        info!(%step, description = step.description(), "step started");
        self.emit(DeployProgress::StepStarted { step });
        Ok(())
    }

    /// Advance on success; mark the run failed otherwise.
    fn leave<T>(&mut self, outcome: Result<T, DeployError>) -> Result<T, DeployError> {
        match outcome {
            Ok(value) => {
                self.step = self.step.next();
                Ok(value)
            }
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    async fn confirm(&self, step: DeployStep, tx_hash: TxHash) -> Result<Receipt, DeployError> {
        let receipt =
            match tokio::time::timeout(self.timeouts.receipt, self.chain.wait_for_receipt(tx_hash))
                .await
            {
                Err(_) => {
                    return Err(DeployError::ReceiptTimeout {
                        tx_hash,
                        timeout: self.timeouts.receipt,
                    });
                }
                Ok(result) => result.map_err(|e| DeployError::chain(step, e))?,
            };
        info!(%step, ?tx_hash, block = receipt.block_number, "transaction confirmed");
        self.emit(DeployProgress::TxConfirmed { step, receipt });
        Ok(receipt)
    }

    fn emit(&self, event: DeployProgress) {
        for listener in &self.listeners {
            listener.on_progress(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::memory::{ChainOp, FactoryCall, InMemoryChain};
    use crate::deploy::{AppAddress, AppKind, CollectingListener, VotingSettings};
    use crate::params::{NetworkTokens, ParameterProvider, ParamsOverrides, StandardParameters};
    use std::collections::HashSet;

    fn tokens() -> NetworkTokens {
        NetworkTokens {
            collateral_token: Address::repeat_byte(0xab),
            contribution_token: Address::repeat_byte(0xc1),
            score_token: Address::repeat_byte(0xc2),
        }
    }

    fn params() -> DeploymentParameters {
        StandardParameters::new(tokens(), ParamsOverrides::default())
            .resolve(15)
            .unwrap()
    }

    fn supply() -> U256 {
        U256::exp10(18) * U256::from(1500u64)
    }

    fn chain() -> InMemoryChain {
        InMemoryChain::new().with_token_supply(tokens().contribution_token, supply())
    }

    fn fast() -> DeployTimeouts {
        DeployTimeouts {
            event: Duration::from_millis(200),
            receipt: Duration::from_secs(2),
        }
    }

    fn deployer(chain: &InMemoryChain, run: &str) -> HatchDeployer<InMemoryChain> {
        HatchDeployer::new(
            Arc::new(chain.clone()),
            params(),
            RunId::parse(run).unwrap(),
            fast(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn full_run_produces_seven_distinct_addresses() {
        let chain = chain();
        let outcome = deployer(&chain, "run-1").run().await.unwrap();

        let all = outcome.addresses.all_addresses();
        assert_eq!(all.len(), 7);
        assert!(all.iter().all(|a| !a.is_zero()));
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(unique.len(), 7);
        assert_eq!(outcome.dao_id, "hatch-run-1");
    }

    #[tokio::test]
    async fn dao_matches_tx_one_deploy_event() {
        let chain = chain();
        let outcome = deployer(&chain, "run-2").run().await.unwrap();

        let events = chain
            .query_events(chain.factory(), EventName::DeployDao)
            .await
            .unwrap();
        let from_tx_one: Vec<_> = events
            .iter()
            .filter(|r| r.tx_hash == outcome.receipts.tx_one.tx_hash)
            .collect();
        assert_eq!(from_tx_one.len(), 1);
        assert_eq!(from_tx_one[0].args.first_address(), outcome.addresses.dao);
    }

    #[tokio::test]
    async fn tx_one_carries_exact_arguments_in_order() {
        let chain = chain();
        let mut params = params();
        params.org_token_name = "Test".to_string();
        params.org_token_symbol = "TST".to_string();
        params.voting = VotingSettings {
            support_required: 500000,
            min_accept_quorum: 150000,
            vote_duration_blocks: 3000,
            vote_buffer_blocks: 300,
            vote_execution_delay_blocks: 1000,
        };
        let collateral: Address = "0xabc0000000000000000000000000000000000abc".parse().unwrap();
        params.collateral_token = collateral;

        let mut deployer = HatchDeployer::new(
            Arc::new(chain.clone()),
            params,
            RunId::parse("args").unwrap(),
            fast(),
        )
        .unwrap();
        deployer.tx_one().await.unwrap();

        let calls = chain.calls();
        let FactoryCall::TxOne(args) = &calls[0] else {
            panic!("Expected tx one call");
        };
        assert_eq!(args.token_name, "Test");
        assert_eq!(args.token_symbol, "TST");
        assert_eq!(args.voting.as_array(), [500000, 150000, 3000, 300, 1000]);
        assert_eq!(args.collateral_token, collateral);
    }

    #[tokio::test]
    async fn tx_two_uses_live_total_supply() {
        let chain = chain();
        let mut deployer = deployer(&chain, "run-3");
        deployer.tx_one().await.unwrap();

        // Supply changes after parameters were resolved.
        let later = U256::exp10(18) * U256::from(2000u64);
        chain.set_total_supply(tokens().contribution_token, later);
        deployer.tx_two().await.unwrap();

        let calls = chain.calls();
        let FactoryCall::TxTwo(args) = &calls[1] else {
            panic!("Expected tx two call");
        };
        let p = params();
        let expected = p.expected_raise_per_contribution_token * later / p.one_token;
        assert_eq!(args.expected_raise, expected);
        assert_eq!(args.contribution_token, tokens().contribution_token);
    }

    #[tokio::test]
    async fn tx_three_registers_run_unique_id() {
        let chain = chain();
        deployer(&chain, "run-4").run().await.unwrap();

        let calls = chain.calls();
        let FactoryCall::TxThree(args) = &calls[2] else {
            panic!("Expected tx three call");
        };
        assert_eq!(args.dao_id, "hatch-run-4");
        assert_eq!(args.redeemable_tokens, vec![tokens().collateral_token]);
        assert_eq!(args.tollgate_fee_token, tokens().collateral_token);
        assert_eq!(args.score_token, tokens().score_token);
    }

    #[tokio::test]
    async fn each_transaction_waits_for_its_predecessor() {
        let chain = chain();
        deployer(&chain, "run-5").run().await.unwrap();

        let ops = chain.operations();
        let sent: Vec<usize> = ops
            .iter()
            .enumerate()
            .filter(|(_, op)| matches!(op, ChainOp::Sent(_)))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(sent.len(), 3);
        for pair in sent.windows(2) {
            let between = &ops[pair[0]..pair[1]];
            assert!(
                between.iter().any(|op| matches!(op, ChainOp::Confirmed(_))),
                "no confirmation between sends: {between:?}"
            );
        }
        // The supply is read between tx one and tx two.
        let supply_at = ops
            .iter()
            .position(|op| matches!(op, ChainOp::TotalSupply(_)))
            .unwrap();
        assert!(supply_at > sent[0] && supply_at < sent[1]);
        // The proxy log is queried exactly once, after tx three.
        let queries: Vec<usize> = ops
            .iter()
            .enumerate()
            .filter(|(_, op)| matches!(op, ChainOp::Queried(EventName::NewAppProxy)))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(queries.len(), 1);
        assert!(queries[0] > sent[2]);
        assert_eq!(chain.open_subscriptions(), 0);
    }

    #[tokio::test]
    async fn progress_is_reported_in_order() {
        let chain = chain();
        let listener = Arc::new(CollectingListener::new());
        let mut deployer = deployer(&chain, "run-6").with_listener(listener.clone());
        let outcome = deployer.run().await.unwrap();

        let events = listener.events();
        assert!(matches!(events.first(), Some(DeployProgress::Started { .. })));
        let dao_at = events
            .iter()
            .position(|e| matches!(e, DeployProgress::DaoDeployed { dao } if *dao == outcome.addresses.dao))
            .unwrap();
        let raise_at = events
            .iter()
            .position(|e| matches!(e, DeployProgress::ExpectedRaise { .. }))
            .unwrap();
        assert!(dao_at < raise_at);
        assert!(matches!(events.last(), Some(DeployProgress::Finished { .. })));
        assert_eq!(deployer.step(), DeployStep::Done);
    }

    #[tokio::test]
    async fn revert_in_tx_two_stops_the_run() {
        let chain = chain().reverting_at(DeployStep::TxTwo);
        let listener = Arc::new(CollectingListener::new());
        let mut deployer = deployer(&chain, "run-7").with_listener(listener.clone());

        let err = deployer.run().await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::Chain {
                step: DeployStep::TxTwo,
                source: crate::errors::ChainError::Reverted { .. }
            }
        ));
        // The organization exists, configuration is incomplete.
        assert!(deployer.dao().is_some());
        assert_eq!(deployer.step(), DeployStep::TxTwo);
        let sent = chain
            .operations()
            .iter()
            .filter(|op| matches!(op, ChainOp::Sent(_)))
            .count();
        assert_eq!(sent, 2);
        assert!(matches!(
            listener.events().last(),
            Some(DeployProgress::Failed {
                step: DeployStep::TxTwo,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn failed_run_cannot_be_resumed() {
        let chain = chain().reverting_at(DeployStep::TxThree);
        let mut deployer = deployer(&chain, "run-8");
        assert!(deployer.run().await.is_err());

        let err = deployer.tx_three().await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::RunAborted {
                step: DeployStep::TxThree
            }
        ));
    }

    #[tokio::test]
    async fn unconfirmed_transaction_times_out_and_aborts_run() {
        let chain = chain().stalling_at(DeployStep::TxOne);
        let mut deployer = HatchDeployer::new(
            Arc::new(chain.clone()),
            params(),
            RunId::parse("run-stall").unwrap(),
            DeployTimeouts {
                event: Duration::from_millis(200),
                receipt: Duration::from_millis(50),
            },
        )
        .unwrap();

        let err = deployer.run().await.unwrap_err();
        assert!(matches!(err, DeployError::ReceiptTimeout { .. }));
        assert!(err.to_string().contains("not confirmed after 50ms"));
        assert_eq!(deployer.step(), DeployStep::TxOne);
        assert!(deployer.dao().is_none());

        let err = deployer.tx_two().await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::RunAborted {
                step: DeployStep::TxOne
            }
        ));
        assert_eq!(chain.calls().len(), 1);
    }

    #[tokio::test]
    async fn steps_cannot_be_skipped() {
        let chain = chain();
        let mut deployer = deployer(&chain, "run-9");
        let err = deployer.tx_two().await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::OutOfOrder {
                step: DeployStep::TxTwo,
                current: DeployStep::TxOne
            }
        ));
        assert!(chain.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_dao_event_times_out() {
        let chain = chain().without_dao_event();
        let err = deployer(&chain, "run-10").run().await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::EventTimeout {
                event: EventName::DeployDao,
                ..
            }
        ));
        assert_eq!(chain.open_subscriptions(), 0);
        assert_eq!(chain.calls().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_dao_event_is_rejected() {
        let chain = chain().with_duplicate_dao_event();
        let err = deployer(&chain, "run-11").run().await.unwrap_err();
        assert!(matches!(err, DeployError::AmbiguousEvent { count: 2, .. }));
    }

    #[tokio::test]
    async fn missing_app_fails_collection() {
        let chain = chain().without_app(AppKind::Redemptions);
        let err = deployer(&chain, "run-12").run().await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::MissingApp {
                app: AppKind::Redemptions,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn extra_proxy_is_reported_as_list() {
        let chain = chain().with_extra_proxy(AppKind::Hatch);
        let outcome = deployer(&chain, "run-13").run().await.unwrap();
        match &outcome.addresses.hatch {
            AppAddress::Many(list) => assert_eq!(list.len(), 2),
            other => panic!("Expected Many, got {other:?}"),
        }
        assert!(matches!(outcome.addresses.tollgate, AppAddress::Single(_)));
    }

    #[tokio::test]
    async fn aggregation_is_idempotent() {
        let chain = chain();
        let outcome = deployer(&chain, "run-14").run().await.unwrap();
        let ids = chain.app_ids().await.unwrap();

        let first = collect_app_addresses(&chain, outcome.addresses.dao, &ids)
            .await
            .unwrap();
        let second = collect_app_addresses(&chain, outcome.addresses.dao, &ids)
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
        assert_eq!(first, outcome.addresses);
    }

    #[tokio::test]
    async fn reused_run_id_fails_at_tx_three() {
        let chain = chain();
        deployer(&chain, "same").run().await.unwrap();
        let err = deployer(&chain, "same").run().await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::Chain {
                step: DeployStep::TxThree,
                ..
            }
        ));
    }

    #[test]
    fn invalid_parameters_are_rejected_before_any_transaction() {
        let chain = chain();
        let mut bad = params();
        bad.org_token_symbol = String::new();
        let result = HatchDeployer::new(
            Arc::new(chain.clone()),
            bad,
            RunId::parse("bad").unwrap(),
            fast(),
        );
        assert!(matches!(result, Err(DeployError::Params(_))));
        assert!(chain.calls().is_empty());
    }
}
