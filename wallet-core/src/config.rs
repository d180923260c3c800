use crate::errors::{WalletError, WalletResult};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const KEY_RPC_URL: &str = "RPC_URL";
const KEY_ACCOUNT_CLASS_HASH: &str = "ACCOUNT_CLASS_HASH";
const KEY_FEE_TOKEN_ADDRESS: &str = "FEE_TOKEN_ADDRESS";
const KEY_GAME_CONTRACT_ADDRESS: &str = "GAME_CONTRACT_ADDRESS";
const KEY_L1_GAS_MAX_AMOUNT: &str = "L1_GAS_MAX_AMOUNT";
const KEY_L1_GAS_MAX_PRICE: &str = "L1_GAS_MAX_PRICE";
const KEY_L2_GAS_MAX_AMOUNT: &str = "L2_GAS_MAX_AMOUNT";
const KEY_L2_GAS_MAX_PRICE: &str = "L2_GAS_MAX_PRICE";
const KEY_RECEIPT_POLL_MS: &str = "RECEIPT_POLL_MS";
const KEY_RECEIPT_TIMEOUT_SECS: &str = "RECEIPT_TIMEOUT_SECS";
const KEY_REQUEST_TIMEOUT_SECS: &str = "REQUEST_TIMEOUT_SECS";

/// OpenZeppelin account v0.8.1 class hash, declared on mainnet and Sepolia.
const DEFAULT_ACCOUNT_CLASS_HASH: &str =
    "0x061dac032f228abef9c6626f995015233097ae253a7f72d68552db02f2971b8f";
/// STRK fee token, same address on mainnet and Sepolia.
const STRK_TOKEN_ADDRESS: &str =
    "0x04718f5a0fc34cc1af16a1cdee98ffb20c31f5cd61d6ab07201858f4287c938d";

static FELT_HEX_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{1,64}$").expect("felt hex pattern is valid"));

/// Deployment environment the wallet core is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn from_env() -> Self {
        let env_str =
            std::env::var("PET_WALLET_ENV").unwrap_or_else(|_| "development".to_string());
        match env_str.to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "test" | "testing" => Environment::Test,
            _ => Environment::Development,
        }
    }
}

/// Upper bounds for one resource in a V3 transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBound {
    pub max_amount: u64,
    pub max_price_per_unit: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBounds {
    pub l1_gas: ResourceBound,
    pub l2_gas: ResourceBound,
}

/// Read-only chain settings consumed by the wallet core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub environment: Environment,
    pub rpc_url: String,
    pub account_class_hash: String,
    pub fee_token_address: String,
    pub game_contract_address: String,
    pub resource_bounds: ResourceBounds,
    pub receipt_poll_interval: Duration,
    pub receipt_timeout: Duration,
    pub request_timeout: Duration,
}

impl ChainConfig {
    /// Build a configuration from environment defaults and `PET_WALLET_*` overrides.
    pub fn from_env() -> WalletResult<Self> {
        Self::from_environment(Environment::from_env())
    }

    pub fn from_environment(environment: Environment) -> WalletResult<Self> {
        let mut settings = ConfigMap::with_defaults(environment);
        settings.load_from_env_vars();
        settings.build(environment)
    }

    /// Build a configuration from explicit key/value overrides on top of the
    /// environment defaults. Environment variables are not consulted.
    pub fn with_overrides(
        environment: Environment,
        overrides: &[(&str, &str)],
    ) -> WalletResult<Self> {
        let mut settings = ConfigMap::with_defaults(environment);
        for (key, value) in overrides {
            settings.set(key, value);
        }
        settings.build(environment)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

#[derive(Debug, Clone)]
struct ConfigMap {
    values: HashMap<String, String>,
}

impl ConfigMap {
    fn with_defaults(environment: Environment) -> Self {
        let mut map = ConfigMap {
            values: HashMap::new(),
        };

        // Defaults shared across environments
        map.set(KEY_ACCOUNT_CLASS_HASH, DEFAULT_ACCOUNT_CLASS_HASH);
        map.set(KEY_FEE_TOKEN_ADDRESS, STRK_TOKEN_ADDRESS);
        map.set(KEY_L1_GAS_MAX_AMOUNT, "20000");
        map.set(KEY_L1_GAS_MAX_PRICE, "100000000000000");
        map.set(KEY_L2_GAS_MAX_AMOUNT, "0");
        map.set(KEY_L2_GAS_MAX_PRICE, "0");
        map.set(KEY_REQUEST_TIMEOUT_SECS, "30");

        match environment {
            Environment::Production => {
                map.set(
                    KEY_RPC_URL,
                    "https://starknet-mainnet.public.blastapi.io/rpc/v0_7",
                );
                map.set(KEY_RECEIPT_POLL_MS, "3000");
                map.set(KEY_RECEIPT_TIMEOUT_SECS, "300");
            }
            Environment::Development => {
                map.set(
                    KEY_RPC_URL,
                    "https://starknet-sepolia.public.blastapi.io/rpc/v0_7",
                );
                map.set(KEY_RECEIPT_POLL_MS, "2000");
                map.set(KEY_RECEIPT_TIMEOUT_SECS, "180");
            }
            Environment::Test => {
                map.set(KEY_RPC_URL, "http://127.0.0.1:5050/rpc");
                map.set(KEY_GAME_CONTRACT_ADDRESS, "0x1234");
                map.set(KEY_RECEIPT_POLL_MS, "1");
                map.set(KEY_RECEIPT_TIMEOUT_SECS, "2");
            }
        }
        map
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    fn get_required(&self, key: &str) -> WalletResult<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| WalletError::ConfigError(format!("Required key '{}' not found", key)))
    }

    fn get_felt_hex(&self, key: &str) -> WalletResult<String> {
        let value = self.get_required(key)?.trim();
        if !FELT_HEX_PATTERN.is_match(value) {
            return Err(WalletError::ConfigError(format!(
                "Configuration key '{}' must be a 0x-prefixed hex felt, got '{}'",
                key, value
            )));
        }
        Ok(value.to_ascii_lowercase())
    }

    /// Like [`Self::get_felt_hex`], but zero is not an address.
    fn get_address(&self, key: &str) -> WalletResult<String> {
        let value = self.get_felt_hex(key)?;
        if value[2..].bytes().all(|digit| digit == b'0') {
            return Err(WalletError::ConfigError(format!(
                "Configuration key '{}' must be a deployed contract address, got {}",
                key, value
            )));
        }
        Ok(value)
    }

    fn get_u64(&self, key: &str) -> WalletResult<u64> {
        let value = self.get_required(key)?;
        value.trim().parse::<u64>().map_err(|_| {
            WalletError::ConfigError(format!(
                "Invalid numeric value '{}' for key '{}'",
                value, key
            ))
        })
    }

    fn get_u128(&self, key: &str) -> WalletResult<u128> {
        let value = self.get_required(key)?;
        value.trim().parse::<u128>().map_err(|_| {
            WalletError::ConfigError(format!(
                "Invalid numeric value '{}' for key '{}'",
                value, key
            ))
        })
    }

    fn bound(&self, amount_key: &str, price_key: &str) -> WalletResult<ResourceBound> {
        Ok(ResourceBound {
            max_amount: self.get_u64(amount_key)?,
            max_price_per_unit: self.get_u128(price_key)?,
        })
    }

    fn build(&self, environment: Environment) -> WalletResult<ChainConfig> {
        let rpc_url = self.get_required(KEY_RPC_URL)?.trim().to_string();
        if !(rpc_url.starts_with("https://") || rpc_url.starts_with("http://")) {
            return Err(WalletError::ConfigError(format!(
                "RPC URL must use http or https: {}",
                rpc_url
            )));
        }
        if environment == Environment::Production && !rpc_url.starts_with("https://") {
            return Err(WalletError::ConfigError(
                "Production RPC URL must use https".to_string(),
            ));
        }

        let config = ChainConfig {
            environment,
            rpc_url,
            account_class_hash: self.get_felt_hex(KEY_ACCOUNT_CLASS_HASH)?,
            fee_token_address: self.get_address(KEY_FEE_TOKEN_ADDRESS)?,
            game_contract_address: self.get_address(KEY_GAME_CONTRACT_ADDRESS)?,
            resource_bounds: ResourceBounds {
                l1_gas: self.bound(KEY_L1_GAS_MAX_AMOUNT, KEY_L1_GAS_MAX_PRICE)?,
                l2_gas: self.bound(KEY_L2_GAS_MAX_AMOUNT, KEY_L2_GAS_MAX_PRICE)?,
            },
            receipt_poll_interval: Duration::from_millis(self.get_u64(KEY_RECEIPT_POLL_MS)?.max(1)),
            receipt_timeout: Duration::from_secs(self.get_u64(KEY_RECEIPT_TIMEOUT_SECS)?.max(1)),
            request_timeout: Duration::from_secs(self.get_u64(KEY_REQUEST_TIMEOUT_SECS)?.max(1)),
        };
        log::debug!(
            "Chain configuration built for {:?} environment ({})",
            environment,
            config.rpc_url
        );
        Ok(config)
    }

    fn load_from_env_vars(&mut self) {
        let env_mappings = [
            ("PET_WALLET_RPC_URL", KEY_RPC_URL),
            ("PET_WALLET_ACCOUNT_CLASS_HASH", KEY_ACCOUNT_CLASS_HASH),
            ("PET_WALLET_FEE_TOKEN_ADDRESS", KEY_FEE_TOKEN_ADDRESS),
            ("PET_WALLET_GAME_CONTRACT_ADDRESS", KEY_GAME_CONTRACT_ADDRESS),
            ("PET_WALLET_L1_GAS_MAX_AMOUNT", KEY_L1_GAS_MAX_AMOUNT),
            ("PET_WALLET_L1_GAS_MAX_PRICE", KEY_L1_GAS_MAX_PRICE),
            ("PET_WALLET_L2_GAS_MAX_AMOUNT", KEY_L2_GAS_MAX_AMOUNT),
            ("PET_WALLET_L2_GAS_MAX_PRICE", KEY_L2_GAS_MAX_PRICE),
            ("PET_WALLET_RECEIPT_POLL_MS", KEY_RECEIPT_POLL_MS),
            ("PET_WALLET_RECEIPT_TIMEOUT_SECS", KEY_RECEIPT_TIMEOUT_SECS),
            ("PET_WALLET_REQUEST_TIMEOUT_SECS", KEY_REQUEST_TIMEOUT_SECS),
        ];

        for (env_var, config_key) in &env_mappings {
            if let Ok(value) = std::env::var(env_var) {
                if value.trim().is_empty() {
                    log::warn!("Environment variable {} is empty", env_var);
                    continue;
                }

                if value.chars().any(|c| c.is_control()) {
                    log::warn!(
                        "Environment variable {} contains control characters, ignoring",
                        env_var
                    );
                    continue;
                }

                self.values.insert(config_key.to_string(), value);
                log::debug!(
                    "Loaded configuration {} from environment variable {}",
                    config_key,
                    env_var
                );
            }
        }
    }
}

/// Process-wide configuration for hosts that prefer a global over threading
/// the config through explicitly.
static CHAIN_CONFIG: OnceCell<ChainConfig> = OnceCell::new();

pub fn init_chain_config(environment: Environment) -> WalletResult<&'static ChainConfig> {
    CHAIN_CONFIG.get_or_try_init(|| {
        let config = ChainConfig::from_environment(environment)?;
        log::info!(
            "Chain configuration initialized for {:?} environment",
            config.environment
        );
        Ok(config)
    })
}

pub fn get_chain_config() -> WalletResult<&'static ChainConfig> {
    CHAIN_CONFIG
        .get()
        .ok_or_else(|| WalletError::ConfigError("Chain configuration not initialized".into()))
}
