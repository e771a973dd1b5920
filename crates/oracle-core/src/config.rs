//! deployment state and client settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::{Address, TxHash};
use crate::projection::SourceStrategy;
use crate::view::CollapsePolicy;
use crate::{OracleError, Result};

/// default question fee in private tokens
pub const DEFAULT_FEE: u64 = 1000;

/// tokens minted per mint action
pub const MINT_AMOUNT: u128 = 1000;

/// balance polling period
pub const BALANCE_POLL_MS: u64 = 1000;

pub const ENV_ORACLE: &str = "ORACLE";
pub const ENV_TOKEN: &str = "TOKEN";
pub const ENV_FEE: &str = "FEE";
pub const ENV_TX_HASH: &str = "TX_HASH";

/// addresses and parameters of a deployed oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub oracle: Address,
    pub token: Address,
    pub fee: u64,
    /// deployment transaction, anchors the registered notes
    pub tx_hash: TxHash,
}

impl DeploymentConfig {
    /// read `ORACLE`, `TOKEN`, `FEE`, `TX_HASH` from the process environment
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// deployed only when all four values are present and the fee is nonzero;
    /// present values must parse
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let oracle = get(ENV_ORACLE)
            .map(|v| Address::parse(&v).map_err(|e| config_error(ENV_ORACLE, e)))
            .transpose()?;
        let token = get(ENV_TOKEN)
            .map(|v| Address::parse(&v).map_err(|e| config_error(ENV_TOKEN, e)))
            .transpose()?;
        let fee = get(ENV_FEE)
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .map_err(|e| OracleError::Config(format!("{}: {}", ENV_FEE, e)))
            })
            .transpose()?;
        let tx_hash = get(ENV_TX_HASH)
            .map(|v| TxHash::parse(&v).map_err(|e| config_error(ENV_TX_HASH, e)))
            .transpose()?;

        match (oracle, token, fee, tx_hash) {
            (Some(_), Some(_), Some(0), Some(_)) => {
                tracing::debug!("deployment env has zero fee, starting undeployed");
                Ok(None)
            }
            (Some(oracle), Some(token), Some(fee), Some(tx_hash)) => Ok(Some(Self {
                oracle,
                token,
                fee,
                tx_hash,
            })),
            _ => {
                tracing::debug!("deployment env incomplete, starting undeployed");
                Ok(None)
            }
        }
    }
}

fn config_error(key: &str, err: OracleError) -> OracleError {
    OracleError::Config(format!("{}: {}", key, err))
}

/// deployment lifecycle: set once at startup or by a deploy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentState {
    #[default]
    Undeployed,
    Deployed(DeploymentConfig),
}

impl DeploymentState {
    pub fn from_config(config: Option<DeploymentConfig>) -> Self {
        config.map_or(Self::Undeployed, Self::Deployed)
    }

    pub fn is_deployed(&self) -> bool {
        matches!(self, Self::Deployed(_))
    }

    pub fn deployment(&self) -> Option<&DeploymentConfig> {
        match self {
            Self::Deployed(config) => Some(config),
            Self::Undeployed => None,
        }
    }

    pub fn require(&self) -> Result<&DeploymentConfig> {
        self.deployment().ok_or(OracleError::NotDeployed)
    }

    /// the only transition: undeployed -> deployed
    pub fn mark_deployed(&mut self, config: DeploymentConfig) -> Result<()> {
        match self {
            Self::Undeployed => {
                *self = Self::Deployed(config);
                Ok(())
            }
            Self::Deployed(_) => Err(OracleError::AlreadyDeployed),
        }
    }
}

/// client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    /// how question/answer records are sourced
    pub strategy: SourceStrategy,
    /// duplicate request id handling
    pub collapse: CollapsePolicy,
    pub balance_poll_ms: u64,
    /// periodic record refresh, disabled when `None`
    pub refresh_poll_ms: Option<u64>,
    /// fee proposed when deploying
    pub default_fee: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            strategy: SourceStrategy::default(),
            collapse: CollapsePolicy::default(),
            balance_poll_ms: BALANCE_POLL_MS,
            refresh_poll_ms: None,
            default_fee: DEFAULT_FEE,
        }
    }
}

impl OracleSettings {
    pub fn balance_poll_interval(&self) -> Duration {
        Duration::from_millis(self.balance_poll_ms.max(1))
    }

    pub fn refresh_poll_interval(&self) -> Option<Duration> {
        self.refresh_poll_ms.map(|ms| Duration::from_millis(ms.max(1)))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| OracleError::Config(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| OracleError::Config(e.to_string()))
    }
}
