pub mod paths;
pub mod record;
pub mod store;
pub mod vault;

pub use paths::WalletPaths;
pub use record::WalletRecord;
pub use store::{clear_all_data, keys, MemoryStore, SecureStore};
pub use vault::{KdfCost, VaultStore};
