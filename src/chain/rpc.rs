//! JSON-RPC chain client: a local signer in front of an HTTP provider.

use async_trait::async_trait;
use ethers::contract::{ContractError, abigen, parse_log};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{FilterKind, Http, Middleware, PendingTransaction, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, BlockNumber, Filter, H256, Log, U64, U256};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::chain::{
    EventArgs, EventName, EventRecord, EventSubscription, HatchChain, Receipt, TxHash,
};
use crate::deploy::{AppId, AppIds, AppKind, TxOneArgs, TxThreeArgs, TxTwoArgs};
use crate::errors::ChainError;

abigen!(
    HatchTemplate,
    r#"[
        function createDaoTxOne(string orgTokenName, string orgTokenSymbol, uint64[5] votingSettings, address collateralToken)
        function createDaoTxTwo(uint256 minGoal, uint256 maxGoal, uint64 period, uint256 exchangeRate, uint64 vestingCliffPeriod, uint64 vestingCompletePeriod, uint256 tributePct, uint64 openDate, address contributionToken, uint256 maxContributionTokenRate, uint256 expectedRaise)
        function createDaoTxThree(string id, address[] redeemableTokens, address tollgateFeeToken, uint256 tollgateFeeAmount, address scoreToken, uint256 hatchOracleRatio)
        function dandelionVotingAppId() view returns (bytes32)
        function hatchAppId() view returns (bytes32)
        function impactHoursAppId() view returns (bytes32)
        function redemptionsAppId() view returns (bytes32)
        function tollgateAppId() view returns (bytes32)
        function migrationToolsAppId() view returns (bytes32)
        event DeployDao(address dao)
    ]"#
);

abigen!(
    Kernel,
    r#"[
        event NewAppProxy(address proxy, bool isUpgradeable, bytes32 appId)
    ]"#
);

abigen!(
    Erc20,
    r#"[
        function totalSupply() view returns (uint256)
    ]"#
);

type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Connection settings for one network.
#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub rpc_url: String,
    pub chain_id: u64,
    pub factory: Address,
    pub confirmations: usize,
    pub poll_interval: Duration,
}

/// [`HatchChain`] over JSON-RPC.
pub struct EthersChain {
    client: Arc<Client>,
    factory: Address,
    confirmations: usize,
    poll_interval: Duration,
}

impl EthersChain {
    /// Connect and check that the node serves the configured chain id.
    pub async fn connect(settings: &RpcSettings, private_key: &str) -> Result<Self, ChainError> {
        let provider = Provider::<Http>::try_from(settings.rpc_url.as_str())
            .map_err(|e| ChainError::Rpc(format!("invalid RPC url {}: {}", settings.rpc_url, e)))?
            .interval(settings.poll_interval);

        let remote = provider.get_chainid().await.map_err(rpc_error)?;
        if remote != U256::from(settings.chain_id) {
            return Err(ChainError::Rpc(format!(
                "node serves chain id {}, configured {}",
                remote, settings.chain_id
            )));
        }

        let wallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| ChainError::Rpc(format!("invalid signer key: {}", e)))?
            .with_chain_id(settings.chain_id);
        debug!(signer = ?wallet.address(), chain_id = settings.chain_id, "signer ready");

        Ok(Self {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
            factory: settings.factory,
            confirmations: settings.confirmations,
            poll_interval: settings.poll_interval,
        })
    }

    fn template(&self) -> HatchTemplate<Client> {
        HatchTemplate::new(self.factory, self.client.clone())
    }

    fn filter(contract: Address, event: EventName, from_block: u64) -> Filter {
        Filter::new()
            .address(contract)
            .event(event.signature())
            .from_block(from_block)
            .to_block(BlockNumber::Latest)
    }
}

fn rpc_error<E: std::fmt::Display>(e: E) -> ChainError {
    ChainError::Rpc(e.to_string())
}

fn contract_error(method: &str, e: ContractError<Client>) -> ChainError {
    ChainError::Contract {
        method: method.to_string(),
        message: e.to_string(),
    }
}

fn decode(event: EventName, log: Log) -> Result<EventRecord, ChainError> {
    let missing = |field: &str| ChainError::Decode {
        event,
        message: format!("log has no {}", field),
    };
    let tx_hash = log.transaction_hash.ok_or_else(|| missing("transaction hash"))?;
    let block_number = log
        .block_number
        .map(|n| n.as_u64())
        .ok_or_else(|| missing("block number"))?;
    let log_index = log
        .log_index
        .map(|i| i.as_u64())
        .ok_or_else(|| missing("log index"))?;

    let bad = |e: ethers::abi::Error| ChainError::Decode {
        event,
        message: e.to_string(),
    };
    let args = match event {
        EventName::DeployDao => {
            let decoded: DeployDaoFilter = parse_log(log).map_err(bad)?;
            EventArgs::DeployDao { dao: decoded.dao }
        }
        EventName::NewAppProxy => {
            let decoded: NewAppProxyFilter = parse_log(log).map_err(bad)?;
            EventArgs::NewAppProxy {
                proxy: decoded.proxy,
                is_upgradeable: decoded.is_upgradeable,
                app_id: AppId::from(decoded.app_id),
            }
        }
    };

    Ok(EventRecord {
        args,
        tx_hash,
        block_number,
        log_index,
    })
}

#[async_trait]
impl HatchChain for EthersChain {
    fn factory(&self) -> Address {
        self.factory
    }

    async fn send_tx_one(&self, args: &TxOneArgs) -> Result<TxHash, ChainError> {
        let template = self.template();
        let call = template.create_dao_tx_one(
            args.token_name.clone(),
            args.token_symbol.clone(),
            args.voting.as_array(),
            args.collateral_token,
        );
        let pending = call
            .send()
            .await
            .map_err(|e| contract_error("createDaoTxOne", e))?;
        debug!(tx_hash = ?*pending, "createDaoTxOne submitted");
        Ok(*pending)
    }

    async fn send_tx_two(&self, args: &TxTwoArgs) -> Result<TxHash, ChainError> {
        let template = self.template();
        let call = template.create_dao_tx_two(
            args.min_goal,
            args.max_goal,
            args.period,
            args.exchange_rate,
            args.vesting_cliff_period,
            args.vesting_complete_period,
            args.tribute_pct,
            args.open_date,
            args.contribution_token,
            args.max_contribution_token_rate,
            args.expected_raise,
        );
        let pending = call
            .send()
            .await
            .map_err(|e| contract_error("createDaoTxTwo", e))?;
        debug!(tx_hash = ?*pending, "createDaoTxTwo submitted");
        Ok(*pending)
    }

    async fn send_tx_three(&self, args: &TxThreeArgs) -> Result<TxHash, ChainError> {
        let template = self.template();
        let call = template.create_dao_tx_three(
            args.dao_id.clone(),
            args.redeemable_tokens.clone(),
            args.tollgate_fee_token,
            args.tollgate_fee_amount,
            args.score_token,
            args.hatch_oracle_ratio,
        );
        let pending = call
            .send()
            .await
            .map_err(|e| contract_error("createDaoTxThree", e))?;
        debug!(tx_hash = ?*pending, "createDaoTxThree submitted");
        Ok(*pending)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<Receipt, ChainError> {
        let receipt = PendingTransaction::new(tx_hash, self.client.provider())
            .interval(self.poll_interval)
            .confirmations(self.confirmations)
            .await
            .map_err(rpc_error)?
            .ok_or(ChainError::Dropped { tx_hash })?;

        if receipt.status == Some(U64::zero()) {
            return Err(ChainError::Reverted { tx_hash });
        }
        let block_number = receipt
            .block_number
            .map(|n| n.as_u64())
            .ok_or(ChainError::Dropped { tx_hash })?;
        Ok(Receipt {
            tx_hash,
            block_number,
        })
    }

    async fn app_ids(&self) -> Result<AppIds, ChainError> {
        let template = self.template();
        let mut ids = [AppId(H256::zero()); 6];
        for (slot, kind) in ids.iter_mut().zip(AppKind::ALL) {
            let call = template
                .method::<_, [u8; 32]>(kind.accessor(), ())
                .map_err(|e| ChainError::Contract {
                    method: kind.accessor().to_string(),
                    message: e.to_string(),
                })?;
            let id = call
                .call()
                .await
                .map_err(|e| contract_error(kind.accessor(), e))?;
            *slot = AppId::from(id);
        }
        let [dandelion_voting, hatch, impact_hours, redemptions, tollgate, migration_tools] = ids;
        Ok(AppIds {
            dandelion_voting,
            hatch,
            impact_hours,
            redemptions,
            tollgate,
            migration_tools,
        })
    }

    async fn total_supply(&self, token: Address) -> Result<U256, ChainError> {
        Erc20::new(token, self.client.clone())
            .total_supply()
            .call()
            .await
            .map_err(|e| contract_error("totalSupply", e))
    }

    async fn subscribe(
        &self,
        contract: Address,
        event: EventName,
        from_block: u64,
    ) -> Result<Box<dyn EventSubscription>, ChainError> {
        let filter = Self::filter(contract, event, from_block);
        let filter_id = self
            .client
            .new_filter(FilterKind::Logs(&filter))
            .await
            .map_err(rpc_error)?;
        // Installed first, so nothing mined after this point is missed by the backfill.
        let backfill = self.client.get_logs(&filter).await.map_err(rpc_error);
        let backfill = match backfill {
            Ok(logs) => logs,
            Err(e) => {
                let _ = self.client.uninstall_filter(filter_id).await;
                return Err(e);
            }
        };
        debug!(%event, ?contract, from_block, backlog = backfill.len(), "filter installed");

        Ok(Box::new(EthersSubscription {
            client: self.client.clone(),
            filter_id,
            event,
            pending: backfill,
            seen: HashSet::new(),
            poll_interval: self.poll_interval,
        }))
    }

    async fn query_events(
        &self,
        contract: Address,
        event: EventName,
    ) -> Result<Vec<EventRecord>, ChainError> {
        let logs = self
            .client
            .get_logs(&Self::filter(contract, event, 0))
            .await
            .map_err(rpc_error)?;
        let mut records = logs
            .into_iter()
            .map(|log| decode(event, log))
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by_key(EventRecord::position);
        Ok(records)
    }
}

/// Log filter polled with `eth_getFilterChanges`, seeded with a `eth_getLogs` backfill.
struct EthersSubscription {
    client: Arc<Client>,
    filter_id: U256,
    event: EventName,
    pending: Vec<Log>,
    seen: HashSet<(H256, u64)>,
    poll_interval: Duration,
}

impl EthersSubscription {
    /// Decode and drop records already delivered (backfill and filter can overlap).
    fn fresh(&mut self, logs: Vec<Log>) -> Result<Vec<EventRecord>, ChainError> {
        let mut batch = Vec::new();
        for log in logs {
            if log.removed == Some(true) {
                continue;
            }
            let record = decode(self.event, log)?;
            if self.seen.insert((record.tx_hash, record.log_index)) {
                batch.push(record);
            }
        }
        Ok(batch)
    }
}

#[async_trait]
impl EventSubscription for EthersSubscription {
    async fn next_batch(&mut self) -> Result<Vec<EventRecord>, ChainError> {
        let backlog = std::mem::take(&mut self.pending);
        let batch = self.fresh(backlog)?;
        if !batch.is_empty() {
            return Ok(batch);
        }
        loop {
            let changes: Vec<Log> = self
                .client
                .get_filter_changes(self.filter_id)
                .await
                .map_err(rpc_error)?;
            let batch = self.fresh(changes)?;
            if !batch.is_empty() {
                return Ok(batch);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn unsubscribe(self: Box<Self>) -> Result<(), ChainError> {
        let removed = self
            .client
            .uninstall_filter(self.filter_id)
            .await
            .map_err(rpc_error)?;
        debug!(event = %self.event, filter_id = %self.filter_id, removed, "filter uninstalled");
        Ok(())
    }
}
