use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use crate::eligibility::RequiredTokenSet;
use crate::error::{AppError, AppResult};
use crate::export::{AmountRule, MAX_RECORDS_PER_FILE};
use crate::fetch::FetchConfig;
use crate::ledger::CreditPolicy;
use crate::types::parse_timestamp;

pub const REWARDS_SECRET_ENV: &str = "ACS_API_KEY";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub season: SeasonConfig,
    pub indexer: IndexerConfig,
    pub snapshot: SnapshotConfig,
    pub fetch: FetchConfig,
    pub rewards: RewardsConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeasonConfig {
    pub name: String,
    pub required_tokens: Vec<String>,
    /// RFC 3339, unix seconds or unix milliseconds. Inclusive.
    pub cutoff: String,
    pub contract: String,
    pub credit_policy: CreditPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum IndexerKind {
    #[default]
    BlockscoutRest,
    BlockscoutGraphql,
    Subgraph,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub kind: IndexerKind,
    pub url: String,
    pub page_size: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            kind: IndexerKind::BlockscoutRest,
            url: "https://soneium.blockscout.com/api/v2".to_string(),
            page_size: 50,
        }
    }
}

impl IndexerConfig {
    pub fn validate(&self) -> AppResult<()> {
        check_page_size("indexer.page_size", self.page_size)
    }
}

fn check_page_size(key: &str, size: usize) -> AppResult<()> {
    if size == 0 {
        return Err(AppError::Configuration(format!("{} must be positive", key)));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    #[default]
    Squid,
    Thegraph,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub kind: SnapshotKind,
    pub url: String,
    pub season: u32,
    /// Entity collection queried on The Graph, e.g. `season7Conditions_collection`.
    pub collection: String,
    pub page_size: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            kind: SnapshotKind::Squid,
            url: "http://localhost:4350/graphql".to_string(),
            season: 0,
            collection: String::new(),
            page_size: 1000,
        }
    }
}

impl SnapshotConfig {
    pub fn validate(&self) -> AppResult<()> {
        check_page_size("snapshot.page_size", self.page_size)?;
        match self.kind {
            SnapshotKind::Squid if self.season == 0 => Err(AppError::Configuration(
                "snapshot.season must be set for the Squid source".to_string(),
            )),
            SnapshotKind::Thegraph if self.collection.is_empty() => Err(AppError::Configuration(
                "snapshot.collection must be set for The Graph source".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    pub endpoint: String,
    pub defi_id: u64,
    pub amount_per_user: Option<u64>,
    /// Split evenly across qualified users when `amount_per_user` is unset.
    pub pool: Option<u64>,
    pub description: String,
    pub max_records_per_file: usize,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://acs-api.astar.network/acs/addDiscretionaryPointsBatch".to_string(),
            defi_id: 0,
            amount_per_user: None,
            pool: None,
            description: String::new(),
            max_records_per_file: MAX_RECORDS_PER_FILE,
        }
    }
}

impl RewardsConfig {
    pub fn amount_rule(&self) -> AppResult<AmountRule> {
        match (self.amount_per_user, self.pool) {
            (Some(amount), _) => Ok(AmountRule::PerUser(amount)),
            (None, Some(pool)) => Ok(AmountRule::Pool(pool)),
            (None, None) => Err(AppError::Configuration(
                "rewards.amount_per_user or rewards.pool must be set".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Unset keeps the client default (no timeout).
    pub timeout_secs: Option<u64>,
}

impl HttpConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Validated season parameters.
#[derive(Debug, Clone)]
pub struct Season {
    pub name: String,
    pub required: RequiredTokenSet,
    pub cutoff: DateTime<Utc>,
    pub contract: Address,
    pub credit_policy: CreditPolicy,
}

impl SeasonConfig {
    pub fn resolve(&self) -> AppResult<Season> {
        let required = RequiredTokenSet::parse(&self.required_tokens)?;
        if required.is_empty() {
            return Err(AppError::Configuration("season.required_tokens is empty".to_string()));
        }
        let cutoff = parse_timestamp(&self.cutoff)
            .map_err(|_| AppError::Configuration(format!("Invalid season.cutoff: '{}'", self.cutoff)))?;
        let contract = Address::from_str(self.contract.trim())
            .map_err(|e| AppError::Configuration(format!("Invalid season.contract '{}': {}", self.contract, e)))?;

        Ok(Season {
            name: if self.name.is_empty() { "unnamed".to_string() } else { self.name.clone() },
            required,
            cutoff,
            contract,
            credit_policy: self.credit_policy,
        })
    }
}

impl Config {
    /// `.env`, then `path` (optional), then `config.local`, then `YOKI__*` variables.
    pub fn load(path: &str) -> AppResult<Self> {
        dotenv::dotenv().ok();

        let builder = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::File::with_name("config.local").required(false))
            .add_source(
                config::Environment::with_prefix("YOKI")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("season.required_tokens"),
            )
            .build()
            .map_err(|e| AppError::Configuration(e.to_string()))?;

        builder
            .try_deserialize()
            .map_err(|e| AppError::Configuration(e.to_string()))
    }

    /// Shared secret for the rewards API, only ever read from the environment.
    pub fn rewards_secret(&self) -> AppResult<String> {
        std::env::var(REWARDS_SECRET_ENV)
            .ok()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| {
                AppError::Configuration(format!("{} environment variable not set", REWARDS_SECRET_ENV))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn season() -> SeasonConfig {
        SeasonConfig {
            name: "season7".to_string(),
            required_tokens: vec!["100".into(), "200".into(), "101".into()],
            cutoff: "1746104400000".to_string(),
            contract: "0x80E041b16a38f4caa1d0137565B37FD71b2f1E2b".to_string(),
            credit_policy: CreditPolicy::MintOnly,
        }
    }

    #[test]
    fn test_resolve_valid_season() {
        let season = season().resolve().unwrap();
        assert_eq!(season.required.len(), 3);
        assert_eq!(season.cutoff.timestamp(), 1746104400);
        assert_eq!(season.credit_policy, CreditPolicy::MintOnly);
    }

    #[test]
    fn test_empty_required_set_is_configuration_error() {
        let mut config = season();
        config.required_tokens.clear();
        assert!(matches!(config.resolve(), Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_bad_contract_is_configuration_error() {
        let mut config = season();
        config.contract = "0x80E0".to_string();
        assert!(matches!(config.resolve(), Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_amount_rule_prefers_fixed_amount() {
        let mut rewards = RewardsConfig {
            pool: Some(2_000_000),
            ..RewardsConfig::default()
        };
        assert_eq!(rewards.amount_rule().unwrap(), AmountRule::Pool(2_000_000));
        rewards.amount_per_user = Some(500);
        assert_eq!(rewards.amount_rule().unwrap(), AmountRule::PerUser(500));
        rewards.amount_per_user = None;
        rewards.pool = None;
        assert!(rewards.amount_rule().is_err());
    }

    #[test]
    fn test_zero_page_size_is_configuration_error() {
        let indexer = IndexerConfig {
            page_size: 0,
            ..IndexerConfig::default()
        };
        assert!(matches!(indexer.validate(), Err(AppError::Configuration(_))));
        assert!(IndexerConfig::default().validate().is_ok());

        let snapshot = SnapshotConfig {
            season: 9,
            page_size: 0,
            ..SnapshotConfig::default()
        };
        assert!(matches!(snapshot.validate(), Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_snapshot_requires_season_or_collection() {
        let squid = SnapshotConfig::default();
        assert!(squid.validate().is_err());

        let graph = SnapshotConfig {
            kind: SnapshotKind::Thegraph,
            collection: "season7Conditions_collection".to_string(),
            ..SnapshotConfig::default()
        };
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_load_layers_prefixed_environment() {
        std::env::set_var("YOKI__SEASON__REQUIRED_TOKENS", "100,200,101");
        std::env::set_var("YOKI__SEASON__CREDIT_POLICY", "mint_only");
        std::env::set_var("YOKI__FETCH__PAGE_DELAY_MS", "5");
        std::env::set_var("YOKI__SNAPSHOT__PAGE_SIZE", "250");

        let config = Config::load("yoki-drops-missing-config").unwrap();

        assert_eq!(config.season.required_tokens, vec!["100", "200", "101"]);
        assert_eq!(config.season.credit_policy, CreditPolicy::MintOnly);
        assert_eq!(config.fetch.page_delay_ms, 5);
        assert_eq!(config.snapshot.page_size, 250);
        assert_eq!(config.indexer.page_size, 50);
    }

    #[test]
    fn test_credit_policy_names() {
        let policy: CreditPolicy = serde_json::from_str("\"mint_only\"").unwrap();
        assert_eq!(policy, CreditPolicy::MintOnly);
    }
}
