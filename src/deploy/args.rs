//! Named argument sets for the three template transactions.
//!
//! Each struct lists its fields in the exact order the template function takes them; the
//! chain client is the only place they are flattened into positional call arguments.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::params::DeploymentParameters;

/// Identifier that makes one deployment run unique (it ends up in the organization id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Parse a run id; only lowercase ASCII letters, digits and `-` are accepted.
    pub fn parse(value: &str) -> Result<Self, DeployError> {
        let valid = !value.is_empty()
            && value
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid {
            return Err(DeployError::Params(format!(
                "run id '{}' must be non-empty and contain only [a-z0-9-]",
                value
            )));
        }
        Ok(Self(value.to_string()))
    }

    /// A fresh random run id.
    pub fn generate() -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self(id[..12].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunId::parse(s)
    }
}

/// Dandelion voting settings; every value is `uint64` on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingSettings {
    pub support_required: u64,
    pub min_accept_quorum: u64,
    pub vote_duration_blocks: u64,
    pub vote_buffer_blocks: u64,
    pub vote_execution_delay_blocks: u64,
}

impl VotingSettings {
    /// The `uint64[5]` argument, in template order.
    pub fn as_array(&self) -> [u64; 5] {
        [
            self.support_required,
            self.min_accept_quorum,
            self.vote_duration_blocks,
            self.vote_buffer_blocks,
            self.vote_execution_delay_blocks,
        ]
    }
}

/// `createDaoTxOne(string,string,uint64[5],address)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOneArgs {
    pub token_name: String,
    pub token_symbol: String,
    pub voting: VotingSettings,
    pub collateral_token: Address,
}

impl TxOneArgs {
    pub fn from_params(params: &DeploymentParameters) -> Self {
        Self {
            token_name: params.org_token_name.clone(),
            token_symbol: params.org_token_symbol.clone(),
            voting: params.voting,
            collateral_token: params.collateral_token,
        }
    }
}

/// `createDaoTxTwo(uint256,uint256,uint64,uint256,uint64,uint64,uint256,uint64,address,uint256,uint256)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxTwoArgs {
    pub min_goal: U256,
    pub max_goal: U256,
    pub period: u64,
    pub exchange_rate: U256,
    pub vesting_cliff_period: u64,
    pub vesting_complete_period: u64,
    pub tribute_pct: U256,
    pub open_date: u64,
    pub contribution_token: Address,
    pub max_contribution_token_rate: U256,
    pub expected_raise: U256,
}

impl TxTwoArgs {
    pub fn from_params(params: &DeploymentParameters, expected_raise: U256) -> Self {
        Self {
            min_goal: params.hatch_min_goal,
            max_goal: params.hatch_max_goal,
            period: params.hatch_period,
            exchange_rate: params.hatch_exchange_rate,
            vesting_cliff_period: params.vesting_cliff_period,
            vesting_complete_period: params.vesting_complete_period,
            tribute_pct: params.hatch_tribute_pct,
            open_date: params.hatch_open_date,
            contribution_token: params.contribution_token,
            max_contribution_token_rate: params.max_contribution_token_rate,
            expected_raise,
        }
    }
}

/// `createDaoTxThree(string,address[],address,uint256,address,uint256)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxThreeArgs {
    pub dao_id: String,
    pub redeemable_tokens: Vec<Address>,
    pub tollgate_fee_token: Address,
    pub tollgate_fee_amount: U256,
    pub score_token: Address,
    pub hatch_oracle_ratio: U256,
}

impl TxThreeArgs {
    pub fn from_params(params: &DeploymentParameters, run_id: &RunId) -> Self {
        Self {
            dao_id: dao_id(&params.dao_id_prefix, run_id),
            redeemable_tokens: vec![params.collateral_token],
            tollgate_fee_token: params.collateral_token,
            tollgate_fee_amount: params.tollgate_fee_amount,
            score_token: params.score_token,
            hatch_oracle_ratio: params.hatch_oracle_ratio,
        }
    }
}

/// Organization id registered for a run.
pub fn dao_id(prefix: &str, run_id: &RunId) -> String {
    format!("{}-{}", prefix, run_id)
}

/// `raise_per_token × total_supply / one_token`, truncating.
pub fn expected_raise(
    raise_per_token: U256,
    total_supply: U256,
    one_token: U256,
) -> Result<U256, DeployError> {
    let product = raise_per_token
        .checked_mul(total_supply)
        .ok_or(DeployError::RaiseOverflow { total_supply })?;
    product
        .checked_div(one_token)
        .ok_or_else(|| DeployError::Params("one_token must be non-zero".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voting_array_keeps_template_order() {
        let voting = VotingSettings {
            support_required: 500000,
            min_accept_quorum: 150000,
            vote_duration_blocks: 3000,
            vote_buffer_blocks: 300,
            vote_execution_delay_blocks: 1000,
        };
        assert_eq!(voting.as_array(), [500000, 150000, 3000, 300, 1000]);
    }

    #[test]
    fn expected_raise_truncates() {
        let one = U256::exp10(18);
        let supply = one / U256::from(2u64) + U256::one();
        let raise = expected_raise(U256::from(3u64), supply, one).unwrap();
        // 3 * (0.5e18 + 1) / 1e18 = 1.500...003 -> 1
        assert_eq!(raise, U256::from(1u64));
    }

    #[test]
    fn expected_raise_scales_by_one_token() {
        let one = U256::exp10(18);
        let per_token = U256::exp10(18) * U256::from(2u64);
        let supply = U256::exp10(18) * U256::from(1500u64);
        assert_eq!(
            expected_raise(per_token, supply, one).unwrap(),
            U256::exp10(18) * U256::from(3000u64)
        );
    }

    #[test]
    fn expected_raise_overflow_is_an_error() {
        let err = expected_raise(U256::MAX, U256::from(2u64), U256::one()).unwrap_err();
        assert!(matches!(err, DeployError::RaiseOverflow { .. }));
    }

    #[test]
    fn expected_raise_zero_unit_is_an_error() {
        let err = expected_raise(U256::one(), U256::one(), U256::zero()).unwrap_err();
        assert!(matches!(err, DeployError::Params(_)));
    }

    #[test]
    fn run_id_rejects_invalid_characters() {
        assert!(RunId::parse("abc-123").is_ok());
        assert!(RunId::parse("").is_err());
        assert!(RunId::parse("Has Space").is_err());
        assert!(RunId::parse("UPPER").is_err());
    }

    #[test]
    fn generated_run_ids_are_valid_and_distinct() {
        let a = RunId::generate();
        let b = RunId::generate();
        assert_ne!(a, b);
        assert!(RunId::parse(a.as_str()).is_ok());
        assert_eq!(a.as_str().len(), 12);
    }

    #[test]
    fn dao_id_joins_prefix_and_run() {
        let run = RunId::parse("r1").unwrap();
        assert_eq!(dao_id("hatch", &run), "hatch-r1");
    }
}
