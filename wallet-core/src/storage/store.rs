use std::collections::HashMap;

use parking_lot::Mutex;

use crate::errors::WalletResult;

/// Keys under which wallet state is persisted.
pub mod keys {
    pub const PRIVATE_KEY: &str = "private_key";
    pub const PIN: &str = "pin";
    pub const PUBLIC_KEY: &str = "public_key";
    pub const IS_ACCOUNT_DEPLOYED: &str = "is_account_deployed";
    pub const CONTRACT_ADDRESS: &str = "OZcontractAddress";
    pub const CONSTRUCTOR_CALLDATA: &str = "OZaccountConstructorCallData";
    pub const PET_TYPE: &str = "pet_type";
    /// Older installs wrote the pet descriptor under this name.
    pub const PET_TYPE_LEGACY: &str = "petType";
    pub const IS_MINTED: &str = "is_minted";
    pub const SESSION_PRIVATE_KEY: &str = "session_private_key";
    pub const SESSION_PUBLIC_KEY: &str = "session_public_key";

    pub const ALL: [&str; 11] = [
        PRIVATE_KEY,
        PIN,
        PUBLIC_KEY,
        IS_ACCOUNT_DEPLOYED,
        CONTRACT_ADDRESS,
        CONSTRUCTOR_CALLDATA,
        PET_TYPE,
        PET_TYPE_LEGACY,
        IS_MINTED,
        SESSION_PRIVATE_KEY,
        SESSION_PUBLIC_KEY,
    ];
}

pub const FLAG_TRUE: &str = "true";
pub const FLAG_FALSE: &str = "false";

/// Platform-backed key/value storage for wallet secrets. Each call is atomic
/// for its key; there are no cross-key transactions.
pub trait SecureStore: Send + Sync {
    fn get(&self, key: &str) -> WalletResult<Option<String>>;
    fn put(&self, key: &str, value: &str) -> WalletResult<()>;
    fn delete(&self, key: &str) -> WalletResult<()>;
}

/// Delete every key the wallet knows about. Irreversible.
pub fn clear_all_data(store: &dyn SecureStore) -> WalletResult<()> {
    for key in keys::ALL {
        store.delete(key)?;
    }
    log::info!("Cleared all wallet data from secure storage");
    Ok(())
}

/// In-process store for tests and hosts that inject their own persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SecureStore for MemoryStore {
    fn get(&self, key: &str) -> WalletResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> WalletResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> WalletResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get(keys::PIN).unwrap(), None);
        store.put(keys::PIN, "salt:hash").unwrap();
        assert_eq!(store.get(keys::PIN).unwrap().as_deref(), Some("salt:hash"));
        store.delete(keys::PIN).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn clear_all_data_removes_every_known_key() {
        let store = MemoryStore::new();
        for key in keys::ALL {
            store.put(key, "x").unwrap();
        }
        store.put("unrelated", "kept").unwrap();
        clear_all_data(&store).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("unrelated").unwrap().as_deref(), Some("kept"));
    }
}
