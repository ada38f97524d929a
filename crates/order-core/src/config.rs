//! Engine configuration.
//!
//! The domain parameters here are bound once when the engine is built and
//! never change afterwards.

use crate::signing::Domain;
use crate::{Error, Result};
use alloy_primitives::Address;
use serde::Deserialize;
use std::env;
use std::path::Path;

/// Default domain name used by off-chain signing tools.
pub const DEFAULT_DOMAIN_NAME: &str = "SMv3: OrderBook";

/// Default domain version.
pub const DEFAULT_DOMAIN_VERSION: &str = "1";

/// Default upper bound on conditions per order.
pub const DEFAULT_MAX_CONDITIONS: usize = 8;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub domain: DomainConfig,
    #[serde(default = "default_max_conditions")]
    pub max_conditions: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DomainConfig {
    #[serde(default = "default_domain_name")]
    pub name: String,
    #[serde(default = "default_domain_version")]
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl DomainConfig {
    /// Bind these parameters into an immutable [`Domain`].
    pub fn bind(&self) -> Result<Domain> {
        Domain::new(
            self.name.clone(),
            self.version.clone(),
            self.chain_id,
            self.verifying_contract,
        )
    }
}

fn default_domain_name() -> String {
    DEFAULT_DOMAIN_NAME.to_string()
}

fn default_domain_version() -> String {
    DEFAULT_DOMAIN_VERSION.to_string()
}

fn default_max_conditions() -> usize {
    DEFAULT_MAX_CONDITIONS
}

fn parse_max_conditions(raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(Error::Config {
            message: "ENGINE_MAX_CONDITIONS must be at least 1".to_string(),
        }),
        Ok(max) => Ok(max),
        Err(e) => Err(Error::Config {
            message: format!("ENGINE_MAX_CONDITIONS is not a valid count: {}", e),
        }),
    }
}

impl EngineConfig {
    /// Configuration for a local devnet deployment at `verifying_contract`.
    pub fn local(chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            domain: DomainConfig {
                name: default_domain_name(),
                version: default_domain_version(),
                chain_id,
                verifying_contract,
            },
            max_conditions: DEFAULT_MAX_CONDITIONS,
        }
    }

    /// Load configuration from environment variables.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let chain_id = env::var("ENGINE_CHAIN_ID")
            .map_err(|_| Error::Config {
                message: "ENGINE_CHAIN_ID environment variable not set".to_string(),
            })?
            .parse::<u64>()
            .map_err(|e| Error::Config {
                message: format!("ENGINE_CHAIN_ID is not a valid chain id: {}", e),
            })?;

        let verifying_contract = env::var("ENGINE_VERIFYING_CONTRACT")
            .map_err(|_| Error::Config {
                message: "ENGINE_VERIFYING_CONTRACT environment variable not set".to_string(),
            })?
            .parse::<Address>()
            .map_err(|e| Error::Config {
                message: format!("ENGINE_VERIFYING_CONTRACT is not a valid address: {}", e),
            })?;

        Ok(Self {
            domain: DomainConfig {
                name: env::var("ENGINE_DOMAIN_NAME").unwrap_or_else(|_| default_domain_name()),
                version: env::var("ENGINE_DOMAIN_VERSION")
                    .unwrap_or_else(|_| default_domain_version()),
                chain_id,
                verifying_contract,
            },
            max_conditions: match env::var("ENGINE_MAX_CONDITIONS") {
                Ok(raw) => parse_max_conditions(&raw)?,
                Err(_) => DEFAULT_MAX_CONDITIONS,
            },
        })
    }

    /// Load configuration from a file, with `ENGINE_*` environment overrides
    /// (nested keys separated by `__`, e.g. `ENGINE_DOMAIN__CHAIN_ID`).
    #[allow(clippy::result_large_err)]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("ENGINE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        if config.max_conditions == 0 {
            return Err(Error::Config {
                message: "max_conditions must be at least 1".to_string(),
            });
        }
        Ok(config)
    }
}
