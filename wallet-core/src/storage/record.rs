use secrecy::SecretString;
use starknet_crypto::Felt;

use super::store::{keys, SecureStore, FLAG_FALSE, FLAG_TRUE};
use crate::account::compute_account_address;
use crate::codec::primitives::{felt_from_hex, felt_to_padded_hex};
use crate::errors::{WalletError, WalletResult};

/// Persisted, non-secret wallet state.
///
/// The private key and PIN hash live beside it in the same store but are
/// only read through the authentication gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletRecord {
    pub public_key: Felt,
    pub contract_address: Felt,
    pub constructor_calldata: Vec<Felt>,
    pub is_deployed: bool,
    pub is_minted: bool,
    pub pet_type: Option<serde_json::Value>,
}

impl WalletRecord {
    /// Fresh record for a newly derived key. The constructor calldata is
    /// `[public_key]`.
    pub fn new(public_key: Felt, class_hash: Felt) -> Self {
        let constructor_calldata = vec![public_key];
        let contract_address =
            compute_account_address(public_key, class_hash, &constructor_calldata);
        Self {
            public_key,
            contract_address,
            constructor_calldata,
            is_deployed: false,
            is_minted: false,
            pet_type: None,
        }
    }

    /// Whether a wallet has been set up in this store.
    pub fn exists(store: &dyn SecureStore) -> WalletResult<bool> {
        Ok(store.get(keys::PUBLIC_KEY)?.is_some())
    }

    /// Load and validate the record, recomputing the contract address.
    pub fn load(store: &dyn SecureStore, class_hash: Felt) -> WalletResult<Self> {
        let public_key = felt_from_hex(&required(store, keys::PUBLIC_KEY)?)
            .map_err(|e| WalletError::StorageError(format!("Stored public key: {}", e)))?;
        let contract_address = felt_from_hex(&required(store, keys::CONTRACT_ADDRESS)?)
            .map_err(|e| WalletError::StorageError(format!("Stored contract address: {}", e)))?;
        let constructor_calldata =
            decode_calldata(&required(store, keys::CONSTRUCTOR_CALLDATA)?)?;

        let record = Self {
            public_key,
            contract_address,
            constructor_calldata,
            is_deployed: read_flag(store, keys::IS_ACCOUNT_DEPLOYED)?,
            is_minted: read_flag(store, keys::IS_MINTED)?,
            pet_type: read_pet_type(store)?,
        };
        record.verify_integrity(class_hash)?;
        Ok(record)
    }

    /// The stored address must equal the recomputation from the stored key
    /// material. A mismatch is never repaired.
    pub fn verify_integrity(&self, class_hash: Felt) -> WalletResult<()> {
        let computed =
            compute_account_address(self.public_key, class_hash, &self.constructor_calldata);
        if computed != self.contract_address {
            log::error!(
                "Wallet integrity check failed: stored {} recomputed {}",
                self.contract_address_hex(),
                felt_to_padded_hex(&computed)
            );
            return Err(WalletError::IntegrityMismatch {
                stored: self.contract_address_hex(),
                computed: felt_to_padded_hex(&computed),
            });
        }
        Ok(())
    }

    /// Persist a new wallet. Either every key is written or, on failure,
    /// everything written so far is removed again.
    pub fn persist_new(
        &self,
        store: &dyn SecureStore,
        private_key_hex: &SecretString,
        pin_hash: &str,
    ) -> WalletResult<()> {
        use secrecy::ExposeSecret;

        let public_key = self.public_key_hex();
        let address = self.contract_address_hex();
        let calldata = encode_calldata(&self.constructor_calldata);
        let entries: [(&str, &str); 7] = [
            (keys::PRIVATE_KEY, private_key_hex.expose_secret()),
            (keys::PIN, pin_hash),
            (keys::PUBLIC_KEY, &public_key),
            (keys::CONTRACT_ADDRESS, &address),
            (keys::CONSTRUCTOR_CALLDATA, &calldata),
            (keys::IS_ACCOUNT_DEPLOYED, flag(self.is_deployed)),
            (keys::IS_MINTED, flag(self.is_minted)),
        ];

        for (index, (key, value)) in entries.iter().enumerate() {
            if let Err(e) = store.put(key, value) {
                log::error!("Failed to persist '{}', rolling back wallet setup", key);
                for (written, _) in entries.iter().take(index + 1) {
                    if let Err(cleanup) = store.delete(written) {
                        log::error!("Rollback could not delete '{}': {}", written, cleanup);
                    }
                }
                return Err(e);
            }
        }

        log::info!("Persisted wallet record for {}", address);
        Ok(())
    }

    pub fn mark_deployed(&mut self, store: &dyn SecureStore) -> WalletResult<()> {
        store.put(keys::IS_ACCOUNT_DEPLOYED, FLAG_TRUE)?;
        self.is_deployed = true;
        Ok(())
    }

    pub fn mark_minted(&mut self, store: &dyn SecureStore) -> WalletResult<()> {
        store.put(keys::IS_MINTED, FLAG_TRUE)?;
        self.is_minted = true;
        Ok(())
    }

    pub fn save_pet_type(
        &mut self,
        store: &dyn SecureStore,
        pet_type: serde_json::Value,
    ) -> WalletResult<()> {
        store.put(keys::PET_TYPE, &serde_json::to_string(&pet_type)?)?;
        self.pet_type = Some(pet_type);
        Ok(())
    }

    pub fn public_key_hex(&self) -> String {
        felt_to_padded_hex(&self.public_key)
    }

    pub fn contract_address_hex(&self) -> String {
        felt_to_padded_hex(&self.contract_address)
    }
}

/// Stored PIN hash, if one was ever set.
pub(crate) fn read_pin_hash(store: &dyn SecureStore) -> WalletResult<Option<String>> {
    store.get(keys::PIN)
}

/// Raw private key. Callers must have passed the authentication gate.
pub(crate) fn read_private_key(store: &dyn SecureStore) -> WalletResult<SecretString> {
    store
        .get(keys::PRIVATE_KEY)?
        .map(SecretString::from)
        .ok_or_else(|| WalletError::StorageAbsent(keys::PRIVATE_KEY.to_string()))
}

/// Comma-separated `0x` felts, as stored under the constructor calldata key.
pub fn encode_calldata(calldata: &[Felt]) -> String {
    calldata
        .iter()
        .map(felt_to_padded_hex)
        .collect::<Vec<_>>()
        .join(",")
}

pub fn decode_calldata(stored: &str) -> WalletResult<Vec<Felt>> {
    if stored.trim().is_empty() {
        return Ok(Vec::new());
    }
    stored
        .split(',')
        .map(|item| {
            felt_from_hex(item)
                .map_err(|e| WalletError::StorageError(format!("Stored calldata: {}", e)))
        })
        .collect()
}

fn required(store: &dyn SecureStore, key: &str) -> WalletResult<String> {
    store
        .get(key)?
        .ok_or_else(|| WalletError::StorageAbsent(key.to_string()))
}

fn flag(value: bool) -> &'static str {
    if value {
        FLAG_TRUE
    } else {
        FLAG_FALSE
    }
}

fn read_flag(store: &dyn SecureStore, key: &str) -> WalletResult<bool> {
    match store.get(key)?.as_deref() {
        None | Some(FLAG_FALSE) => Ok(false),
        Some(FLAG_TRUE) => Ok(true),
        Some(other) => Err(WalletError::StorageError(format!(
            "Flag '{}' has unexpected value '{}'",
            key, other
        ))),
    }
}

fn read_pet_type(store: &dyn SecureStore) -> WalletResult<Option<serde_json::Value>> {
    let raw = match store.get(keys::PET_TYPE)? {
        Some(value) => Some(value),
        None => store.get(keys::PET_TYPE_LEGACY)?,
    };
    match raw {
        Some(json) => match serde_json::from_str(&json) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log::warn!("Ignoring unreadable pet type: {}", e);
                Ok(None)
            }
        },
        None => Ok(None),
    }
}
