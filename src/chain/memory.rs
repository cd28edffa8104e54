//! Deterministic in-process hatch template.
//!
//! Mines one block per transaction, emits the same events the real template and kernel emit,
//! and records every interaction so tests can assert ordering. Fault injection covers the
//! failure paths the orchestrator must handle.

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

use crate::chain::{
    EventArgs, EventName, EventRecord, EventSubscription, HatchChain, Receipt, TxHash,
};
use crate::deploy::{AppId, AppIds, AppKind, DeployStep, TxOneArgs, TxThreeArgs, TxTwoArgs};
use crate::errors::ChainError;

/// A factory call as the template received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactoryCall {
    TxOne(TxOneArgs),
    TxTwo(TxTwoArgs),
    TxThree(TxThreeArgs),
}

/// One chain interaction, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOp {
    Sent(DeployStep),
    Confirmed(TxHash),
    TotalSupply(Address),
    AppIds,
    Subscribed(EventName),
    Unsubscribed(EventName),
    Queried(EventName),
}

struct MinedTx {
    step: DeployStep,
    receipt: Receipt,
    success: bool,
}

#[derive(Default)]
struct State {
    block_number: u64,
    nonce: u64,
    logs: Vec<(Address, EventRecord)>,
    txs: HashMap<TxHash, MinedTx>,
    supplies: HashMap<Address, U256>,
    current_dao: Option<Address>,
    used_dao_ids: HashSet<String>,
    calls: Vec<FactoryCall>,
    ops: Vec<ChainOp>,
    next_subscription: u64,
    open_subscriptions: HashSet<u64>,
}

#[derive(Default, Clone)]
struct Faults {
    revert: Option<DeployStep>,
    stall: Option<DeployStep>,
    suppress_dao_event: bool,
    duplicate_dao_event: bool,
    missing_apps: Vec<AppKind>,
    extra_proxies: Vec<AppKind>,
}

struct Shared {
    state: Mutex<State>,
    notify: Notify,
}

/// Simulated hatch template and kernel.
#[derive(Clone)]
pub struct InMemoryChain {
    factory: Address,
    shared: Arc<Shared>,
    faults: Faults,
}

impl Default for InMemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic app id for a kind, in the style of an aragonpm namehash.
pub fn simulated_app_id(kind: AppKind) -> AppId {
    AppId::from(keccak256(format!("{}.hatch.aragonpm.eth", kind.as_str())))
}

fn untracked_app_id(name: &str) -> AppId {
    AppId::from(keccak256(format!("{}.aragonpm.eth", name)))
}

impl InMemoryChain {
    pub fn new() -> Self {
        Self::with_factory(Address::repeat_byte(0xfa))
    }

    pub fn with_factory(factory: Address) -> Self {
        Self {
            factory,
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
            }),
            faults: Faults::default(),
        }
    }

    pub fn with_token_supply(self, token: Address, supply: U256) -> Self {
        self.set_total_supply(token, supply);
        self
    }

    /// Mine the transaction for `step` with a failed status.
    pub fn reverting_at(mut self, step: DeployStep) -> Self {
        self.faults.revert = Some(step);
        self
    }

    /// Never confirm the transaction for `step`; receipt waits on it stay pending.
    pub fn stalling_at(mut self, step: DeployStep) -> Self {
        self.faults.stall = Some(step);
        self
    }

    /// Mine tx one without emitting `DeployDao`.
    pub fn without_dao_event(mut self) -> Self {
        self.faults.suppress_dao_event = true;
        self
    }

    /// Emit `DeployDao` twice from tx one.
    pub fn with_duplicate_dao_event(mut self) -> Self {
        self.faults.duplicate_dao_event = true;
        self
    }

    /// Never create a proxy for `kind`.
    pub fn without_app(mut self, kind: AppKind) -> Self {
        self.faults.missing_apps.push(kind);
        self
    }

    /// Create one more proxy for `kind` in tx three.
    pub fn with_extra_proxy(mut self, kind: AppKind) -> Self {
        self.faults.extra_proxies.push(kind);
        self
    }

    pub fn set_total_supply(&self, token: Address, supply: U256) {
        self.lock().supplies.insert(token, supply);
    }

    /// Append a record to `contract`'s log and wake subscribers.
    pub fn emit(&self, contract: Address, record: EventRecord) {
        self.lock().logs.push((contract, record));
        self.shared.notify.notify_waiters();
    }

    pub fn calls(&self) -> Vec<FactoryCall> {
        self.lock().calls.clone()
    }

    pub fn operations(&self) -> Vec<ChainOp> {
        self.lock().ops.clone()
    }

    pub fn open_subscriptions(&self) -> usize {
        self.lock().open_subscriptions.len()
    }

    pub fn subscriptions_opened(&self) -> u64 {
        self.lock().next_subscription
    }

    pub fn app_ids_now(&self) -> AppIds {
        AppIds {
            dandelion_voting: simulated_app_id(AppKind::DandelionVoting),
            hatch: simulated_app_id(AppKind::Hatch),
            impact_hours: simulated_app_id(AppKind::ImpactHours),
            redemptions: simulated_app_id(AppKind::Redemptions),
            tollgate: simulated_app_id(AppKind::Tollgate),
            migration_tools: simulated_app_id(AppKind::MigrationTools),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock only happens in a failing test.
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mine one transaction. `effects` emits its logs and returns false to revert.
    fn mine<F>(&self, step: DeployStep, call: FactoryCall, effects: F) -> TxHash
    where
        F: FnOnce(&mut State, &Faults, TxHash, u64) -> bool,
    {
        let mut state = self.lock();
        state.ops.push(ChainOp::Sent(step));
        state.calls.push(call);
        state.block_number += 1;
        state.nonce += 1;
        let block_number = state.block_number;
        let tx_hash = H256::from(keccak256(format!("tx-{}", state.nonce)));

        let success =
            self.faults.revert != Some(step) && effects(&mut *state, &self.faults, tx_hash, block_number);

        state.txs.insert(
            tx_hash,
            MinedTx {
                step,
                receipt: Receipt {
                    tx_hash,
                    block_number,
                },
                success,
            },
        );
        drop(state);
        self.shared.notify.notify_waiters();
        tx_hash
    }
}

fn new_address(state: &mut State, label: &str) -> Address {
    state.nonce += 1;
    Address::from_slice(&keccak256(format!("{}-{}", label, state.nonce))[12..])
}

fn push_log(state: &mut State, contract: Address, args: EventArgs, tx_hash: TxHash, block: u64) {
    let log_index = state
        .logs
        .iter()
        .filter(|(_, r)| r.block_number == block)
        .count() as u64;
    state.logs.push((
        contract,
        EventRecord {
            args,
            tx_hash,
            block_number: block,
            log_index,
        },
    ));
}

fn install_app(
    state: &mut State,
    faults: &Faults,
    dao: Address,
    kind: Option<AppKind>,
    app_id: AppId,
    tx_hash: TxHash,
    block: u64,
) {
    if let Some(kind) = kind
        && faults.missing_apps.contains(&kind)
    {
        return;
    }
    let proxy = new_address(state, "proxy");
    push_log(
        state,
        dao,
        EventArgs::NewAppProxy {
            proxy,
            is_upgradeable: true,
            app_id,
        },
        tx_hash,
        block,
    );
}

#[async_trait]
impl HatchChain for InMemoryChain {
    fn factory(&self) -> Address {
        self.factory
    }

    async fn send_tx_one(&self, args: &TxOneArgs) -> Result<TxHash, ChainError> {
        let factory = self.factory;
        Ok(self.mine(
            DeployStep::TxOne,
            FactoryCall::TxOne(args.clone()),
            |state, faults, tx_hash, block| {
                let dao = new_address(state, "dao");
                state.current_dao = Some(dao);
                if !faults.suppress_dao_event {
                    let copies = if faults.duplicate_dao_event { 2 } else { 1 };
                    for _ in 0..copies {
                        push_log(state, factory, EventArgs::DeployDao { dao }, tx_hash, block);
                    }
                }
                let voting = simulated_app_id(AppKind::DandelionVoting);
                install_app(state, faults, dao, Some(AppKind::DandelionVoting), voting, tx_hash, block);
                let token_manager = untracked_app_id("token-manager");
                install_app(state, faults, dao, None, token_manager, tx_hash, block);
                true
            },
        ))
    }

    async fn send_tx_two(&self, args: &TxTwoArgs) -> Result<TxHash, ChainError> {
        Ok(self.mine(
            DeployStep::TxTwo,
            FactoryCall::TxTwo(args.clone()),
            |state, faults, tx_hash, block| {
                let Some(dao) = state.current_dao else {
                    return false;
                };
                for kind in [AppKind::Hatch, AppKind::ImpactHours] {
                    install_app(state, faults, dao, Some(kind), simulated_app_id(kind), tx_hash, block);
                }
                let oracle = untracked_app_id("hatch-oracle");
                install_app(state, faults, dao, None, oracle, tx_hash, block);
                true
            },
        ))
    }

    async fn send_tx_three(&self, args: &TxThreeArgs) -> Result<TxHash, ChainError> {
        let dao_id = args.dao_id.clone();
        Ok(self.mine(
            DeployStep::TxThree,
            FactoryCall::TxThree(args.clone()),
            |state, faults, tx_hash, block| {
                let Some(dao) = state.current_dao else {
                    return false;
                };
                if !state.used_dao_ids.insert(dao_id) {
                    return false;
                }
                for kind in [AppKind::Redemptions, AppKind::Tollgate, AppKind::MigrationTools] {
                    install_app(state, faults, dao, Some(kind), simulated_app_id(kind), tx_hash, block);
                }
                install_app(state, faults, dao, None, untracked_app_id("agent"), tx_hash, block);
                for kind in faults.extra_proxies.clone() {
                    install_app(state, faults, dao, Some(kind), simulated_app_id(kind), tx_hash, block);
                }
                state.current_dao = None;
                true
            },
        ))
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<Receipt, ChainError> {
        let stalled = {
            let state = self.lock();
            state
                .txs
                .get(&tx_hash)
                .is_some_and(|tx| self.faults.stall == Some(tx.step))
        };
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.lock();
        state.ops.push(ChainOp::Confirmed(tx_hash));
        match state.txs.get(&tx_hash) {
            Some(tx) if tx.success => Ok(tx.receipt),
            Some(_) => Err(ChainError::Reverted { tx_hash }),
            None => Err(ChainError::Dropped { tx_hash }),
        }
    }

    async fn app_ids(&self) -> Result<AppIds, ChainError> {
        self.lock().ops.push(ChainOp::AppIds);
        Ok(self.app_ids_now())
    }

    async fn total_supply(&self, token: Address) -> Result<U256, ChainError> {
        let mut state = self.lock();
        state.ops.push(ChainOp::TotalSupply(token));
        state
            .supplies
            .get(&token)
            .copied()
            .ok_or_else(|| ChainError::Contract {
                method: "totalSupply".to_string(),
                message: format!("no token deployed at {:?}", token),
            })
    }

    async fn subscribe(
        &self,
        contract: Address,
        event: EventName,
        from_block: u64,
    ) -> Result<Box<dyn EventSubscription>, ChainError> {
        let mut state = self.lock();
        let id = state.next_subscription;
        state.next_subscription += 1;
        state.open_subscriptions.insert(id);
        state.ops.push(ChainOp::Subscribed(event));
        Ok(Box::new(MemorySubscription {
            id,
            contract,
            event,
            from_block,
            cursor: 0,
            chain: self.clone(),
        }))
    }

    async fn query_events(
        &self,
        contract: Address,
        event: EventName,
    ) -> Result<Vec<EventRecord>, ChainError> {
        let mut state = self.lock();
        state.ops.push(ChainOp::Queried(event));
        Ok(state
            .logs
            .iter()
            .filter(|(c, r)| *c == contract && r.args.name() == event)
            .map(|(_, r)| r.clone())
            .collect())
    }
}

struct MemorySubscription {
    id: u64,
    contract: Address,
    event: EventName,
    from_block: u64,
    cursor: usize,
    chain: InMemoryChain,
}

#[async_trait]
impl EventSubscription for MemorySubscription {
    async fn next_batch(&mut self) -> Result<Vec<EventRecord>, ChainError> {
        loop {
            let notified = self.chain.shared.notify.notified();
            {
                let state = self.chain.lock();
                if !state.open_subscriptions.contains(&self.id) {
                    return Err(ChainError::UnknownSubscription(self.id));
                }
                let batch: Vec<EventRecord> = state.logs[self.cursor..]
                    .iter()
                    .filter(|(c, r)| {
                        *c == self.contract
                            && r.args.name() == self.event
                            && r.block_number >= self.from_block
                    })
                    .map(|(_, r)| r.clone())
                    .collect();
                self.cursor = state.logs.len();
                if !batch.is_empty() {
                    return Ok(batch);
                }
            }
            notified.await;
        }
    }

    async fn unsubscribe(self: Box<Self>) -> Result<(), ChainError> {
        let mut state = self.chain.lock();
        state.ops.push(ChainOp::Unsubscribed(self.event));
        if state.open_subscriptions.remove(&self.id) {
            Ok(())
        } else {
            Err(ChainError::UnknownSubscription(self.id))
        }
    }
}
