// lib.rs - Core library structure for the pet wallet

pub mod account;
pub mod app_state;
pub mod auth;
pub mod blockchain_client;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod game;
pub mod session;
pub mod storage;
pub mod validation;

pub mod wallet {
    //! Process-level initialization for hosts.

    use crate::config::{init_chain_config, ChainConfig, Environment};
    use crate::errors::WalletResult;

    /// Install the process-wide chain configuration for the environment
    /// named by `PET_WALLET_ENV`.
    pub fn init() -> WalletResult<&'static ChainConfig> {
        log::info!("Initializing wallet subsystem");
        let config = init_chain_config(Environment::from_env())?;
        log::info!("Chain configuration initialized for {}", config.rpc_url);
        Ok(config)
    }
}

// Re-export common types
pub use account::{AccountHandle, DeployReceipt};
pub use app_state::{SharedWalletContext, WalletContext};
pub use auth::{
    AuthGate, BiometricAuthenticator, BiometricCapabilities, BiometricFactor, BiometricOutcome,
    NoBiometrics,
};
pub use blockchain_client::{ChainProvider, StarknetClient, TransactionReceipt};
pub use codec::{
    BattleRecord, BattleStatus, BattleWinner, Call, ComputerOpponentRecord, MealRecord,
    NutritionAnalysis, PetRecord, SessionLimits, U256,
};
pub use config::{ChainConfig, Environment, ResourceBound, ResourceBounds};
pub use errors::{FailureKind, WalletError, WalletResult};
pub use session::BattleMoveOutcome;
pub use storage::{MemoryStore, SecureStore, VaultStore, WalletPaths, WalletRecord};
pub use validation::InputValidator;
