use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use starknet_crypto::Felt;
use zeroize::Zeroizing;

use crate::account::{
    self, submit_deploy_account, submit_invoke, wait_for_transaction, AccountHandle,
    DeployReceipt,
};
use crate::auth::{AuthGate, BiometricAuthenticator};
use crate::blockchain_client::{ChainProvider, StarknetClient, TransactionReceipt};
use crate::codec::calls::{self, Call, BALANCE_OF};
use crate::codec::primitives::{felt_from_hex, felt_to_padded_hex, U256};
use crate::codec::records::decode_balance;
use crate::config::ChainConfig;
use crate::crypto::{derive_account, generate_mnemonic, hash_pin, StarkKeyPair};
use crate::errors::{FailureKind, WalletError, WalletResult};
use crate::storage::{self, SecureStore, VaultStore, WalletPaths, WalletRecord};
use crate::validation::InputValidator;

pub const DEFAULT_MNEMONIC_WORDS: u32 = 12;

/// Everything a wallet operation needs, injected by the host.
pub struct WalletContext {
    config: ChainConfig,
    store: Arc<dyn SecureStore>,
    provider: Arc<dyn ChainProvider>,
    gate: AuthGate,
    validator: InputValidator,
    account: Mutex<Option<AccountHandle>>,
}

impl WalletContext {
    pub fn new(
        config: ChainConfig,
        store: Arc<dyn SecureStore>,
        provider: Arc<dyn ChainProvider>,
        biometrics: Arc<dyn BiometricAuthenticator>,
    ) -> WalletResult<Self> {
        let gate = AuthGate::new(store.clone(), biometrics);
        Ok(Self {
            config,
            store,
            provider,
            gate,
            validator: InputValidator::new()?,
            account: Mutex::new(None),
        })
    }

    /// Production wiring: encrypted on-disk store under `paths` and the
    /// JSON-RPC client from `config`.
    pub fn open(
        config: ChainConfig,
        paths: WalletPaths,
        device_identity: SecretString,
        biometrics: Arc<dyn BiometricAuthenticator>,
    ) -> WalletResult<Self> {
        paths.ensure_directories()?;
        let store = Arc::new(VaultStore::new(paths, device_identity));
        let provider = Arc::new(StarknetClient::from_config(&config)?);
        log::info!(
            "Opening wallet context for {:?} against {}",
            config.environment,
            provider.rpc_url()
        );
        Self::new(config, store, provider, biometrics)
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn SecureStore {
        self.store.as_ref()
    }

    pub fn provider(&self) -> &dyn ChainProvider {
        self.provider.as_ref()
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    pub fn validator(&self) -> &InputValidator {
        &self.validator
    }

    pub(crate) fn class_hash(&self) -> WalletResult<Felt> {
        config_felt("account class hash", &self.config.account_class_hash)
    }

    pub(crate) fn game_contract(&self) -> WalletResult<Felt> {
        config_felt("game contract address", &self.config.game_contract_address)
    }

    pub(crate) fn fee_token(&self) -> WalletResult<Felt> {
        config_felt("fee token address", &self.config.fee_token_address)
    }

    pub fn has_wallet(&self) -> WalletResult<bool> {
        WalletRecord::exists(self.store())
    }

    /// Derive the account from `mnemonic`, hash the PIN and persist the
    /// wallet. A partial write is rolled back.
    pub fn setup_wallet(
        &self,
        mnemonic: &SecretString,
        pin: &SecretString,
    ) -> WalletResult<WalletRecord> {
        self.validator.validate_pin(pin.expose_secret())?;
        let normalized = Zeroizing::new(
            mnemonic
                .expose_secret()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
        );
        self.validator.validate_mnemonic_format(&normalized)?;

        if self.has_wallet()? {
            return Err(WalletError::ValidationError(
                "A wallet already exists on this device; clear it before restoring".to_string(),
            ));
        }

        let keypair = derive_account(&normalized)?;
        let pin_hash = hash_pin(pin)?;
        let record = WalletRecord::new(keypair.public_key(), self.class_hash()?);
        record.persist_new(self.store(), keypair.private_key_hex(), &pin_hash)?;
        self.reset_account_cache();

        log::info!("Wallet set up at {}", record.contract_address_hex());
        Ok(record)
    }

    /// Generate a fresh recovery phrase and set the wallet up with it. The
    /// phrase is returned once and never stored.
    pub fn create_wallet(&self, pin: &SecretString) -> WalletResult<SecretString> {
        let mnemonic = generate_mnemonic(DEFAULT_MNEMONIC_WORDS)?;
        self.setup_wallet(&mnemonic, pin)?;
        Ok(mnemonic)
    }

    pub fn load_record(&self) -> WalletResult<WalletRecord> {
        WalletRecord::load(self.store(), self.class_hash()?)
    }

    pub async fn authenticate(&self, pin: Option<&SecretString>, prefer_biometric: bool) -> bool {
        self.gate.authenticate(pin, prefer_biometric).await
    }

    pub async fn get_private_key(&self, pin: Option<&SecretString>) -> WalletResult<SecretString> {
        self.gate.get_private_key(pin).await
    }

    /// Key pair for one signing operation. The derived public key must match
    /// the stored record.
    pub(crate) async fn signing_keypair(
        &self,
        record: &WalletRecord,
        pin: Option<&SecretString>,
    ) -> WalletResult<StarkKeyPair> {
        let private_key = self.gate.get_private_key(pin).await?;
        let keypair = StarkKeyPair::from_private_key_hex(private_key.expose_secret())?;
        if keypair.public_key() != record.public_key {
            return Err(WalletError::IntegrityMismatch {
                stored: record.public_key_hex(),
                computed: keypair.public_key_hex(),
            });
        }
        Ok(keypair)
    }

    /// Address and chain id, fetched once and cached.
    pub async fn account_handle(&self) -> WalletResult<AccountHandle> {
        let cached = *self.account.lock();
        if let Some(handle) = cached {
            return Ok(handle);
        }

        let record = self.load_record()?;
        let chain_id = self.provider.chain_id().await?;
        let handle = AccountHandle {
            address: record.contract_address,
            chain_id,
        };
        *self.account.lock() = Some(handle);
        Ok(handle)
    }

    fn reset_account_cache(&self) {
        *self.account.lock() = None;
    }

    /// Deploy the account contract at its precomputed address.
    pub async fn deploy(&self, pin: Option<&SecretString>) -> WalletResult<DeployReceipt> {
        let mut record = self.load_record()?;
        let contract_address = record.contract_address_hex();

        if record.is_deployed {
            log::info!("Account {} already marked deployed", contract_address);
            return Ok(DeployReceipt {
                transaction_hash: None,
                contract_address,
            });
        }

        if account::check_deployed_on_chain(self.provider(), record.contract_address)
            .await
            .map_err(WalletError::into_deployment_failure)?
        {
            log::info!("Account {} found on chain, marking deployed", contract_address);
            record.mark_deployed(self.store())?;
            return Ok(DeployReceipt {
                transaction_hash: None,
                contract_address,
            });
        }

        let keypair = self.signing_keypair(&record, pin).await?;
        let chain_id = self
            .provider
            .chain_id()
            .await
            .map_err(WalletError::into_deployment_failure)?;

        let transaction_hash = submit_deploy_account(
            self.provider(),
            &keypair,
            self.class_hash()?,
            record.constructor_calldata.clone(),
            self.config.resource_bounds,
            chain_id,
        )
        .await
        .map_err(WalletError::into_deployment_failure)?;
        drop(keypair);

        self.wait_for(transaction_hash)
            .await
            .map_err(WalletError::into_deployment_failure)?;

        record.mark_deployed(self.store())?;
        log::info!("Account {} deployed", contract_address);
        Ok(DeployReceipt {
            transaction_hash: Some(felt_to_padded_hex(&transaction_hash)),
            contract_address,
        })
    }

    /// Sign and submit `calls` as one multicall from the wallet account,
    /// then wait for inclusion.
    pub async fn execute(
        &self,
        calls: &[Call],
        pin: Option<&SecretString>,
    ) -> WalletResult<TransactionReceipt> {
        let record = self.load_record()?;
        if !record.is_deployed {
            return Err(WalletError::TransactionFailure {
                kind: FailureKind::ValidationError,
                detail: "Account is not deployed yet".to_string(),
            });
        }

        let keypair = self.signing_keypair(&record, pin).await?;
        let handle = self
            .account_handle()
            .await
            .map_err(WalletError::into_transaction_failure)?;

        let transaction_hash = submit_invoke(
            self.provider(),
            &keypair,
            &handle,
            calls,
            self.config.resource_bounds,
        )
        .await
        .map_err(WalletError::into_transaction_failure)?;
        drop(keypair);

        self.wait_for(transaction_hash)
            .await
            .map_err(WalletError::into_transaction_failure)
    }

    pub async fn wait_for(&self, transaction_hash: Felt) -> WalletResult<TransactionReceipt> {
        wait_for_transaction(
            self.provider(),
            transaction_hash,
            self.config.receipt_poll_interval,
            self.config.receipt_timeout,
        )
        .await
    }

    pub async fn check_deployed_on_chain(&self) -> WalletResult<bool> {
        let record = self.load_record()?;
        account::check_deployed_on_chain(self.provider(), record.contract_address).await
    }

    /// Fee-token balance of the wallet account.
    pub async fn get_balance(&self) -> WalletResult<U256> {
        let record = self.load_record()?;
        let call = Call::new(
            self.fee_token()?,
            BALANCE_OF,
            calls::balance_of(record.contract_address),
        );
        let response = self.view(&call).await?;
        decode_balance(&response).ok_or_else(|| {
            WalletError::UnknownContractError(format!(
                "balance_of returned {} felts",
                response.len()
            ))
        })
    }

    /// Run a view call. Node-side errors become contract errors.
    pub(crate) async fn view(&self, call: &Call) -> WalletResult<Vec<Felt>> {
        self.provider
            .call(call.contract_address, call.selector()?, &call.calldata)
            .await
            .map_err(|e| match e {
                WalletError::RpcError { code, message } => WalletError::UnknownContractError(
                    format!("{} failed ({}): {}", call.entrypoint, code, message),
                ),
                other => other,
            })
    }

    pub fn set_pet_type(&self, pet_type: serde_json::Value) -> WalletResult<()> {
        let mut record = self.load_record()?;
        record.save_pet_type(self.store(), pet_type)
    }

    /// Remove every wallet key from the store and forget the cached account.
    pub fn clear_all_data(&self) -> WalletResult<()> {
        storage::clear_all_data(self.store())?;
        self.reset_account_cache();
        log::info!("Cleared all wallet data");
        Ok(())
    }
}

impl std::fmt::Debug for WalletContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletContext")
            .field("environment", &self.config.environment)
            .field("account", &*self.account.lock())
            .finish()
    }
}

fn config_felt(label: &str, value: &str) -> WalletResult<Felt> {
    felt_from_hex(value)
        .map_err(|e| WalletError::ConfigError(format!("Invalid {} '{}': {}", label, value, e)))
}

/// Shared wallet context handed to host commands.
#[derive(Clone)]
pub struct SharedWalletContext(pub Arc<WalletContext>);

impl SharedWalletContext {
    pub fn new(inner: WalletContext) -> Self {
        Self(Arc::new(inner))
    }
}

impl Deref for SharedWalletContext {
    type Target = WalletContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{DeployAccountTransactionV3, InvokeTransactionV3};
    use crate::auth::NoBiometrics;
    use crate::blockchain_client::DeployAccountSubmission;
    use crate::config::Environment;
    use crate::storage::{keys, MemoryStore};
    use async_trait::async_trait;

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    struct OfflineProvider;

    #[async_trait]
    impl ChainProvider for OfflineProvider {
        async fn chain_id(&self) -> WalletResult<Felt> {
            Err(WalletError::NetworkFailure("offline".into()))
        }
        async fn call(
            &self,
            _contract: Felt,
            _selector: Felt,
            _calldata: &[Felt],
        ) -> WalletResult<Vec<Felt>> {
            Err(WalletError::NetworkFailure("offline".into()))
        }
        async fn get_nonce(&self, _address: Felt) -> WalletResult<Felt> {
            Err(WalletError::NetworkFailure("offline".into()))
        }
        async fn get_class_hash_at(&self, _address: Felt) -> WalletResult<Option<Felt>> {
            Err(WalletError::NetworkFailure("offline".into()))
        }
        async fn add_invoke_transaction(&self, _tx: &InvokeTransactionV3) -> WalletResult<Felt> {
            Err(WalletError::NetworkFailure("offline".into()))
        }
        async fn add_deploy_account_transaction(
            &self,
            _tx: &DeployAccountTransactionV3,
        ) -> WalletResult<DeployAccountSubmission> {
            Err(WalletError::NetworkFailure("offline".into()))
        }
        async fn get_transaction_receipt(
            &self,
            _hash: Felt,
        ) -> WalletResult<Option<TransactionReceipt>> {
            Err(WalletError::NetworkFailure("offline".into()))
        }
    }

    fn context() -> WalletContext {
        let config = ChainConfig::from_environment(Environment::Test).unwrap();
        WalletContext::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(OfflineProvider),
            Arc::new(NoBiometrics),
        )
        .unwrap()
    }

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[test]
    fn setup_is_deterministic_across_clears() {
        let ctx = context();
        let first = ctx.setup_wallet(&secret(PHRASE), &secret("123456")).unwrap();
        ctx.clear_all_data().unwrap();
        assert!(!ctx.has_wallet().unwrap());

        let second = ctx
            .setup_wallet(&secret(&format!("  {}  ", PHRASE.to_uppercase())), &secret("123456"))
            .unwrap();
        assert_eq!(first.public_key, second.public_key);
        assert_eq!(first.contract_address, second.contract_address);
        assert_eq!(ctx.load_record().unwrap(), second);
    }

    #[test]
    fn setup_rejects_bad_input_and_existing_wallet() {
        let ctx = context();
        assert!(matches!(
            ctx.setup_wallet(&secret(PHRASE), &secret("12")),
            Err(WalletError::ValidationError(_))
        ));
        assert!(!ctx.has_wallet().unwrap());

        ctx.setup_wallet(&secret(PHRASE), &secret("123456")).unwrap();
        assert!(matches!(
            ctx.setup_wallet(&secret(PHRASE), &secret("123456")),
            Err(WalletError::ValidationError(_))
        ));
    }

    #[test]
    fn create_wallet_returns_restorable_phrase() {
        let ctx = context();
        let phrase = ctx.create_wallet(&secret("2468")).unwrap();
        let created = ctx.load_record().unwrap();
        assert_eq!(phrase.expose_secret().split_whitespace().count(), 12);

        ctx.clear_all_data().unwrap();
        let restored = ctx.setup_wallet(&phrase, &secret("2468")).unwrap();
        assert_eq!(created.contract_address, restored.contract_address);
    }

    #[tokio::test]
    async fn private_key_is_gated() {
        let ctx = context();
        ctx.setup_wallet(&secret(PHRASE), &secret("123456")).unwrap();

        assert!(!ctx.authenticate(Some(&secret("654321")), false).await);
        assert!(matches!(
            ctx.get_private_key(Some(&secret("654321"))).await,
            Err(WalletError::AuthenticationFailure(_))
        ));

        let key = ctx.get_private_key(Some(&secret("123456"))).await.unwrap();
        let keypair = StarkKeyPair::from_private_key_hex(key.expose_secret()).unwrap();
        assert_eq!(keypair.public_key(), ctx.load_record().unwrap().public_key);
    }

    #[tokio::test]
    async fn tampered_address_is_fatal() {
        let ctx = context();
        ctx.setup_wallet(&secret(PHRASE), &secret("123456")).unwrap();
        ctx.store().put(keys::CONTRACT_ADDRESS, "0x1").unwrap();

        assert!(matches!(
            ctx.load_record(),
            Err(WalletError::IntegrityMismatch { .. })
        ));
        assert!(matches!(
            ctx.deploy(Some(&secret("123456"))).await,
            Err(WalletError::IntegrityMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn offline_deploy_is_classified_as_network_error() {
        let ctx = context();
        ctx.setup_wallet(&secret(PHRASE), &secret("123456")).unwrap();

        match ctx.deploy(Some(&secret("123456"))).await {
            Err(WalletError::DeploymentFailure { kind, .. }) => {
                assert_eq!(kind, FailureKind::NetworkError)
            }
            other => panic!("unexpected deploy result: {:?}", other),
        }
        assert!(!ctx.load_record().unwrap().is_deployed);
    }

    #[tokio::test]
    async fn execute_requires_deployed_account() {
        let ctx = context();
        ctx.setup_wallet(&secret(PHRASE), &secret("123456")).unwrap();
        let call = Call::new(Felt::from(0x1234u64), calls::MINT_PET, calls::mint_pet(1));

        match ctx.execute(&[call], Some(&secret("123456"))).await {
            Err(WalletError::TransactionFailure { kind, .. }) => {
                assert_eq!(kind, FailureKind::ValidationError)
            }
            other => panic!("unexpected execute result: {:?}", other),
        }
    }

    #[test]
    fn pet_type_round_trips_through_store() {
        let ctx = context();
        ctx.setup_wallet(&secret(PHRASE), &secret("123456")).unwrap();
        ctx.set_pet_type(serde_json::json!({ "species": 2, "name": "Rex" }))
            .unwrap();
        let record = ctx.load_record().unwrap();
        assert_eq!(record.pet_type.unwrap()["name"], "Rex");
    }
}
