//! Deployment parameters.
//!
//! [`StandardParameters`] is the stock [`ParameterProvider`]: it derives every value from the
//! network's block time, fills in the network's token addresses, then applies the optional
//! `[params]` overrides from `hatch.toml`.
//!
//! Scales used throughout:
//! - percentages: `PCT_BASE` (1e18 = 100%)
//! - token amounts: `ONE_TOKEN` (1e18)
//! - rates: `PPM` (1e6)

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::deploy::VotingSettings;
use crate::errors::DeployError;

pub const PCT_BASE: u64 = 1_000_000_000_000_000_000;
pub const PPM: u64 = 1_000_000;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;

pub fn one_token() -> U256 {
    U256::exp10(18)
}

fn tokens(amount: u64) -> U256 {
    U256::from(amount) * one_token()
}

fn pct(percent: u64) -> U256 {
    U256::from(PCT_BASE / 100 * percent)
}

/// Convert a wall-clock duration to a block count (never less than one block).
pub fn blocks(secs: u64, block_time_secs: u64) -> u64 {
    (secs / block_time_secs.max(1)).max(1)
}

/// Every value the three template transactions need, resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentParameters {
    /// Block time the durations below were derived from.
    pub block_time_secs: u64,
    pub dao_id_prefix: String,
    pub org_token_name: String,
    pub org_token_symbol: String,
    pub voting: VotingSettings,
    pub collateral_token: Address,
    #[serde(with = "amount")]
    pub hatch_min_goal: U256,
    #[serde(with = "amount")]
    pub hatch_max_goal: U256,
    /// Seconds the hatch stays open.
    pub hatch_period: u64,
    #[serde(with = "amount")]
    pub hatch_exchange_rate: U256,
    pub vesting_cliff_period: u64,
    pub vesting_complete_period: u64,
    #[serde(with = "amount")]
    pub hatch_tribute_pct: U256,
    /// Unix timestamp; 0 opens the hatch at deployment.
    pub hatch_open_date: u64,
    pub contribution_token: Address,
    #[serde(with = "amount")]
    pub max_contribution_token_rate: U256,
    #[serde(with = "amount")]
    pub expected_raise_per_contribution_token: U256,
    /// Scaling constant for `expected_raise_per_contribution_token`.
    #[serde(with = "amount")]
    pub one_token: U256,
    #[serde(with = "amount")]
    pub tollgate_fee_amount: U256,
    pub score_token: Address,
    #[serde(with = "amount")]
    pub hatch_oracle_ratio: U256,
}

impl DeploymentParameters {
    /// Reject parameter sets the template would accept but that make no sense.
    pub fn validate(&self) -> Result<(), DeployError> {
        let mut problems = Vec::new();

        if self.org_token_name.trim().is_empty() {
            problems.push("org_token_name is empty".to_string());
        }
        if self.org_token_symbol.trim().is_empty() {
            problems.push("org_token_symbol is empty".to_string());
        }
        if self.dao_id_prefix.is_empty()
            || !self
                .dao_id_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            problems.push(format!(
                "dao_id_prefix '{}' must be non-empty [a-z0-9-]",
                self.dao_id_prefix
            ));
        }
        if self.voting.support_required > PCT_BASE {
            problems.push("voting.support_required exceeds 100%".to_string());
        }
        if self.voting.min_accept_quorum > self.voting.support_required {
            problems.push("voting.min_accept_quorum exceeds support_required".to_string());
        }
        if self.hatch_min_goal > self.hatch_max_goal {
            problems.push("hatch_min_goal exceeds hatch_max_goal".to_string());
        }
        if self.vesting_cliff_period > self.vesting_complete_period {
            problems.push("vesting_cliff_period exceeds vesting_complete_period".to_string());
        }
        if self.hatch_tribute_pct > U256::from(PCT_BASE) {
            problems.push("hatch_tribute_pct exceeds 100%".to_string());
        }
        if self.one_token.is_zero() {
            problems.push("one_token is zero".to_string());
        }
        for (name, address) in [
            ("collateral_token", self.collateral_token),
            ("contribution_token", self.contribution_token),
            ("score_token", self.score_token),
        ] {
            if address.is_zero() {
                problems.push(format!("{} is not set", name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(DeployError::Params(problems.join("; ")))
        }
    }
}

/// Source of deployment parameters for a network with the given block time.
pub trait ParameterProvider: Send + Sync {
    fn resolve(&self, block_time_secs: u64) -> Result<DeploymentParameters, DeployError>;
}

/// Token addresses that differ per network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTokens {
    pub collateral_token: Address,
    pub contribution_token: Address,
    pub score_token: Address,
}

/// Optional per-field overrides from the `[params]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamsOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dao_id_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_token_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_token_symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_required: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_accept_quorum: Option<u64>,
    /// Seconds; converted to blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_duration_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_buffer_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_execution_delay_secs: Option<u64>,
    #[serde(default, with = "amount::option", skip_serializing_if = "Option::is_none")]
    pub hatch_min_goal: Option<U256>,
    #[serde(default, with = "amount::option", skip_serializing_if = "Option::is_none")]
    pub hatch_max_goal: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hatch_period: Option<u64>,
    #[serde(default, with = "amount::option", skip_serializing_if = "Option::is_none")]
    pub hatch_exchange_rate: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vesting_cliff_period: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vesting_complete_period: Option<u64>,
    #[serde(default, with = "amount::option", skip_serializing_if = "Option::is_none")]
    pub hatch_tribute_pct: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hatch_open_date: Option<u64>,
    #[serde(default, with = "amount::option", skip_serializing_if = "Option::is_none")]
    pub max_contribution_token_rate: Option<U256>,
    #[serde(default, with = "amount::option", skip_serializing_if = "Option::is_none")]
    pub expected_raise_per_contribution_token: Option<U256>,
    #[serde(default, with = "amount::option", skip_serializing_if = "Option::is_none")]
    pub one_token: Option<U256>,
    #[serde(default, with = "amount::option", skip_serializing_if = "Option::is_none")]
    pub tollgate_fee_amount: Option<U256>,
    #[serde(default, with = "amount::option", skip_serializing_if = "Option::is_none")]
    pub hatch_oracle_ratio: Option<U256>,
}

/// Block-time derived defaults plus network tokens plus overrides.
#[derive(Debug, Clone, Default)]
pub struct StandardParameters {
    tokens: NetworkTokens,
    overrides: ParamsOverrides,
}

impl StandardParameters {
    pub fn new(tokens: NetworkTokens, overrides: ParamsOverrides) -> Self {
        Self { tokens, overrides }
    }

    fn defaults(&self, block_time_secs: u64) -> DeploymentParameters {
        DeploymentParameters {
            block_time_secs,
            dao_id_prefix: "hatch".to_string(),
            org_token_name: "Hatch Token".to_string(),
            org_token_symbol: "HATCH".to_string(),
            voting: VotingSettings {
                support_required: PCT_BASE / 100 * 50,
                min_accept_quorum: PCT_BASE / 100 * 10,
                vote_duration_blocks: blocks(3 * DAY, block_time_secs),
                vote_buffer_blocks: blocks(8 * HOUR, block_time_secs),
                vote_execution_delay_blocks: blocks(DAY, block_time_secs),
            },
            collateral_token: self.tokens.collateral_token,
            hatch_min_goal: tokens(1_000),
            hatch_max_goal: tokens(1_000_000),
            hatch_period: 30 * DAY,
            hatch_exchange_rate: U256::from(PPM),
            vesting_cliff_period: 8 * WEEK,
            vesting_complete_period: 52 * WEEK,
            hatch_tribute_pct: pct(5),
            hatch_open_date: 0,
            contribution_token: self.tokens.contribution_token,
            max_contribution_token_rate: tokens(10),
            expected_raise_per_contribution_token: tokens(2),
            one_token: one_token(),
            tollgate_fee_amount: tokens(100),
            score_token: self.tokens.score_token,
            hatch_oracle_ratio: U256::from(PPM / 200),
        }
    }
}

impl ParameterProvider for StandardParameters {
    fn resolve(&self, block_time_secs: u64) -> Result<DeploymentParameters, DeployError> {
        if block_time_secs == 0 {
            return Err(DeployError::Params(
                "block_time_secs must be greater than zero".to_string(),
            ));
        }

        let o = &self.overrides;
        let mut p = self.defaults(block_time_secs);

        if let Some(v) = &o.dao_id_prefix {
            p.dao_id_prefix = v.clone();
        }
        if let Some(v) = &o.org_token_name {
            p.org_token_name = v.clone();
        }
        if let Some(v) = &o.org_token_symbol {
            p.org_token_symbol = v.clone();
        }
        if let Some(v) = o.support_required {
            p.voting.support_required = v;
        }
        if let Some(v) = o.min_accept_quorum {
            p.voting.min_accept_quorum = v;
        }
        if let Some(v) = o.vote_duration_secs {
            p.voting.vote_duration_blocks = blocks(v, block_time_secs);
        }
        if let Some(v) = o.vote_buffer_secs {
            p.voting.vote_buffer_blocks = blocks(v, block_time_secs);
        }
        if let Some(v) = o.vote_execution_delay_secs {
            p.voting.vote_execution_delay_blocks = blocks(v, block_time_secs);
        }
        p.hatch_min_goal = o.hatch_min_goal.unwrap_or(p.hatch_min_goal);
        p.hatch_max_goal = o.hatch_max_goal.unwrap_or(p.hatch_max_goal);
        p.hatch_period = o.hatch_period.unwrap_or(p.hatch_period);
        p.hatch_exchange_rate = o.hatch_exchange_rate.unwrap_or(p.hatch_exchange_rate);
        p.vesting_cliff_period = o.vesting_cliff_period.unwrap_or(p.vesting_cliff_period);
        p.vesting_complete_period = o
            .vesting_complete_period
            .unwrap_or(p.vesting_complete_period);
        p.hatch_tribute_pct = o.hatch_tribute_pct.unwrap_or(p.hatch_tribute_pct);
        p.hatch_open_date = o.hatch_open_date.unwrap_or(p.hatch_open_date);
        p.max_contribution_token_rate = o
            .max_contribution_token_rate
            .unwrap_or(p.max_contribution_token_rate);
        p.expected_raise_per_contribution_token = o
            .expected_raise_per_contribution_token
            .unwrap_or(p.expected_raise_per_contribution_token);
        p.one_token = o.one_token.unwrap_or(p.one_token);
        p.tollgate_fee_amount = o.tollgate_fee_amount.unwrap_or(p.tollgate_fee_amount);
        p.hatch_oracle_ratio = o.hatch_oracle_ratio.unwrap_or(p.hatch_oracle_ratio);

        p.validate()?;
        Ok(p)
    }
}

/// Serde helpers writing `U256` as a decimal string and reading decimal, `0x` hex or a
/// plain integer.
pub mod amount {
    use ethers::types::U256;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Text(String),
    }

    pub fn parse(text: &str) -> Result<U256, String> {
        let text = text.trim().replace('_', "");
        let parsed = match text.strip_prefix("0x") {
            Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
            None => U256::from_dec_str(&text).map_err(|e| e.to_string()),
        };
        parsed.map_err(|e| format!("invalid amount '{}': {}", text, e))
    }

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Int(v) => Ok(U256::from(v)),
            Raw::Text(s) => parse(&s).map_err(D::Error::custom),
        }
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<U256>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => super::serialize(v, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<U256>, D::Error> {
            match Option::<Raw>::deserialize(deserializer)? {
                None => Ok(None),
                Some(Raw::Int(v)) => Ok(Some(U256::from(v))),
                Some(Raw::Text(s)) => parse(&s).map(Some).map_err(D::Error::custom),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens_set() -> NetworkTokens {
        NetworkTokens {
            collateral_token: Address::repeat_byte(0xc0),
            contribution_token: Address::repeat_byte(0xc1),
            score_token: Address::repeat_byte(0xc2),
        }
    }

    #[test]
    fn test_blocks_conversion() {
        assert_eq!(blocks(DAY, 15), 5760);
        assert_eq!(blocks(10, 15), 1);
        assert_eq!(blocks(60, 0), 60);
    }

    #[test]
    fn test_defaults_follow_block_time() {
        let provider = StandardParameters::new(tokens_set(), ParamsOverrides::default());
        let slow = provider.resolve(15).unwrap();
        let fast = provider.resolve(5).unwrap();
        assert_eq!(slow.voting.vote_duration_blocks, 3 * 5760);
        assert_eq!(
            fast.voting.vote_duration_blocks,
            3 * slow.voting.vote_duration_blocks
        );
        assert_eq!(fast.block_time_secs, 5);
        assert_eq!(slow.collateral_token, Address::repeat_byte(0xc0));
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let provider = StandardParameters::new(tokens_set(), ParamsOverrides::default());
        assert_eq!(provider.resolve(5).unwrap(), provider.resolve(5).unwrap());
    }

    #[test]
    fn test_overrides_apply() {
        let overrides = ParamsOverrides {
            org_token_name: Some("Test".to_string()),
            org_token_symbol: Some("TST".to_string()),
            vote_duration_secs: Some(3000 * 5),
            hatch_min_goal: Some(U256::from(7u64)),
            ..Default::default()
        };
        let params = StandardParameters::new(tokens_set(), overrides)
            .resolve(5)
            .unwrap();
        assert_eq!(params.org_token_name, "Test");
        assert_eq!(params.org_token_symbol, "TST");
        assert_eq!(params.voting.vote_duration_blocks, 3000);
        assert_eq!(params.hatch_min_goal, U256::from(7u64));
    }

    #[test]
    fn test_zero_block_time_rejected() {
        let provider = StandardParameters::new(tokens_set(), ParamsOverrides::default());
        assert!(matches!(provider.resolve(0), Err(DeployError::Params(_))));
    }

    #[test]
    fn test_missing_token_addresses_rejected() {
        let provider = StandardParameters::default();
        let err = provider.resolve(15).unwrap_err().to_string();
        assert!(err.contains("collateral_token is not set"));
        assert!(err.contains("score_token is not set"));
    }

    #[test]
    fn test_inverted_goals_rejected() {
        let overrides = ParamsOverrides {
            hatch_min_goal: Some(tokens(10)),
            hatch_max_goal: Some(tokens(1)),
            ..Default::default()
        };
        let err = StandardParameters::new(tokens_set(), overrides)
            .resolve(15)
            .unwrap_err();
        assert!(err.to_string().contains("hatch_min_goal exceeds hatch_max_goal"));
    }

    #[test]
    fn test_overrides_parse_from_toml() {
        let overrides: ParamsOverrides = toml::from_str(
            r#"
            org_token_symbol = "TST"
            hatch_min_goal = "1000000000000000000000"
            hatch_max_goal = "0x3635c9adc5dea00000"
            tollgate_fee_amount = 5
            "#,
        )
        .unwrap();
        assert_eq!(overrides.org_token_symbol.as_deref(), Some("TST"));
        assert_eq!(overrides.hatch_min_goal, Some(tokens(1_000)));
        assert_eq!(overrides.hatch_max_goal, Some(tokens(1_000)));
        assert_eq!(overrides.tollgate_fee_amount, Some(U256::from(5u64)));
    }

    #[test]
    fn test_unknown_override_rejected() {
        let result: Result<ParamsOverrides, _> = toml::from_str("hatch_goal = 1");
        assert!(result.is_err());
    }

    #[test]
    fn test_parameters_round_trip_through_toml() {
        let params = StandardParameters::new(tokens_set(), ParamsOverrides::default())
            .resolve(15)
            .unwrap();
        let text = toml::to_string_pretty(&params).unwrap();
        assert!(text.contains("hatch_max_goal = \"1000000000000000000000000\""));
        let back: DeploymentParameters = toml::from_str(&text).unwrap();
        assert_eq!(back, params);
    }
}
