use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use argon2::{Algorithm, Argon2, Params, Version};
use blake3::Hasher as Blake3;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::store::SecureStore;
use super::WalletPaths;
use crate::errors::{WalletError, WalletResult};

const VAULT_MAGIC: &[u8; 8] = b"PETWALLT";
const VAULT_VERSION: u16 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

type Entries = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultFile {
    magic: [u8; 8],
    version: u16,
    nonce: [u8; NONCE_LEN],
    kdf: KdfParameters,
    checksum: [u8; 32],
    ciphertext: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct KdfParameters {
    m_cost_kib: u32,
    t_cost: u32,
    p_cost: u32,
    salt: [u8; SALT_LEN],
}

/// Argon2id cost used when a new store file is created. Existing files keep
/// the cost they were written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfCost {
    pub m_cost_kib: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfCost {
    fn default() -> Self {
        Self {
            m_cost_kib: 64 * 1024, // 64 MiB
            t_cost: 3,
            p_cost: 1,
        }
    }
}

struct CachedKey {
    kdf: KdfParameters,
    key: Zeroizing<[u8; KEY_LEN]>,
}

/// Encrypted-at-rest [`SecureStore`] backed by a single file.
///
/// The whole key/value map is sealed with AES-256-GCM under a key derived
/// from the app identity secret. Every mutation rewrites the file through a
/// staging file and a rename.
pub struct VaultStore {
    paths: WalletPaths,
    identity: SecretString,
    cost: KdfCost,
    key_cache: Mutex<Option<CachedKey>>,
    write_lock: Mutex<()>,
}

impl VaultStore {
    pub fn new(paths: WalletPaths, identity: SecretString) -> Self {
        Self::with_cost(paths, identity, KdfCost::default())
    }

    pub fn with_cost(paths: WalletPaths, identity: SecretString, cost: KdfCost) -> Self {
        Self {
            paths,
            identity,
            cost,
            key_cache: Mutex::new(None),
            write_lock: Mutex::new(()),
        }
    }

    pub fn exists(&self) -> bool {
        self.paths.store_file().exists()
    }

    pub fn paths(&self) -> &WalletPaths {
        &self.paths
    }

    fn load(&self) -> WalletResult<Option<(KdfParameters, Entries)>> {
        if !self.exists() {
            return Ok(None);
        }

        let vault_file = self.read_vault_file()?;
        let key = self.key_for(&vault_file.kdf)?;
        let nonce = Nonce::assume_unique_for_key(vault_file.nonce);
        let plaintext = decrypt_aes_gcm(&key, nonce, &vault_file.ciphertext)?;

        if blake3_checksum(&plaintext) != vault_file.checksum {
            return Err(WalletError::ValidationError(
                "Vault integrity verification failed".to_string(),
            ));
        }

        let entries: Entries = serde_json::from_slice(&plaintext)?;
        Ok(Some((vault_file.kdf, entries)))
    }

    fn save(&self, kdf: KdfParameters, entries: &Entries) -> WalletResult<()> {
        let key = self.key_for(&kdf)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let plaintext = Zeroizing::new(serde_json::to_vec(entries)?);
        let checksum = blake3_checksum(&plaintext);
        let ciphertext = encrypt_aes_gcm(&key, nonce, &plaintext)?;

        let vault_file = VaultFile {
            magic: *VAULT_MAGIC,
            version: VAULT_VERSION,
            nonce: nonce_bytes,
            kdf,
            checksum,
            ciphertext,
        };

        let mut file = create_atomic_file(&self.paths)?;
        file.write_all(&serde_json::to_vec(&vault_file)?)?;
        file.sync_all()?;
        finalize_atomic_file(file, &self.paths)
    }

    /// Load, apply `mutate`, and write back under the write lock.
    fn update<F>(&self, mutate: F) -> WalletResult<()>
    where
        F: FnOnce(&mut Entries) -> bool,
    {
        let _guard = self.write_lock.lock();
        let (kdf, mut entries) = match self.load()? {
            Some(loaded) => loaded,
            None => (self.fresh_kdf(), Entries::new()),
        };
        if mutate(&mut entries) {
            self.save(kdf, &entries)?;
        }
        Ok(())
    }

    fn fresh_kdf(&self) -> KdfParameters {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        KdfParameters {
            m_cost_kib: self.cost.m_cost_kib,
            t_cost: self.cost.t_cost,
            p_cost: self.cost.p_cost,
            salt,
        }
    }

    fn key_for(&self, kdf: &KdfParameters) -> WalletResult<Zeroizing<[u8; KEY_LEN]>> {
        let mut cache = self.key_cache.lock();
        if let Some(cached) = cache.as_ref() {
            if cached.kdf == *kdf {
                return Ok(cached.key.clone());
            }
        }
        let key = derive_key(&self.identity, kdf)?;
        *cache = Some(CachedKey {
            kdf: *kdf,
            key: key.clone(),
        });
        Ok(key)
    }

    fn read_vault_file(&self) -> WalletResult<VaultFile> {
        let bytes = fs::read(self.paths.store_file())?;
        let vault_file: VaultFile = serde_json::from_slice(&bytes)?;

        if &vault_file.magic != VAULT_MAGIC {
            return Err(WalletError::ValidationError(
                "Invalid vault magic marker".to_string(),
            ));
        }

        if vault_file.version != VAULT_VERSION {
            return Err(WalletError::ValidationError(format!(
                "Unsupported vault version: {}",
                vault_file.version
            )));
        }

        Ok(vault_file)
    }
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("store_file", &self.paths.store_file())
            .field("identity", &"<redacted>")
            .finish()
    }
}

impl SecureStore for VaultStore {
    fn get(&self, key: &str) -> WalletResult<Option<String>> {
        let _guard = self.write_lock.lock();
        Ok(self
            .load()?
            .and_then(|(_, entries)| entries.get(key).cloned()))
    }

    fn put(&self, key: &str, value: &str) -> WalletResult<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn delete(&self, key: &str) -> WalletResult<()> {
        if !self.exists() {
            return Ok(());
        }
        self.update(|entries| entries.remove(key).is_some())
    }
}

fn derive_key(
    identity: &SecretString,
    params: &KdfParameters,
) -> WalletResult<Zeroizing<[u8; KEY_LEN]>> {
    let argon_params = Params::new(
        params.m_cost_kib,
        params.t_cost,
        params.p_cost,
        Some(KEY_LEN),
    )
    .map_err(|e| WalletError::CryptoError(format!("Invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(
            identity.expose_secret().as_bytes(),
            &params.salt,
            &mut key[..],
        )
        .map_err(|e| WalletError::CryptoError(format!("KDF failed: {e}")))?;
    Ok(key)
}

fn encrypt_aes_gcm(
    key: &Zeroizing<[u8; KEY_LEN]>,
    nonce: Nonce,
    plaintext: &[u8],
) -> WalletResult<Vec<u8>> {
    let unbound_key = UnboundKey::new(&aead::AES_256_GCM, &key[..])
        .map_err(|e| WalletError::CryptoError(format!("Invalid encryption key: {e}")))?;
    let key = LessSafeKey::new(unbound_key);

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| WalletError::CryptoError("Encryption failure".to_string()))?;
    Ok(in_out)
}

fn decrypt_aes_gcm(
    key: &Zeroizing<[u8; KEY_LEN]>,
    nonce: Nonce,
    ciphertext: &[u8],
) -> WalletResult<Zeroizing<Vec<u8>>> {
    let unbound_key = UnboundKey::new(&aead::AES_256_GCM, &key[..])
        .map_err(|e| WalletError::CryptoError(format!("Invalid encryption key: {e}")))?;
    let key = LessSafeKey::new(unbound_key);

    if ciphertext.len() < aead::AES_256_GCM.tag_len() {
        return Err(WalletError::CryptoError(
            "Ciphertext shorter than authentication tag".to_string(),
        ));
    }

    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let plaintext_len = key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| WalletError::CryptoError("Decryption failure".to_string()))?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}

fn blake3_checksum(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake3::new();
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

fn create_atomic_file(paths: &WalletPaths) -> WalletResult<File> {
    paths.ensure_directories()?;
    Ok(File::create(paths.staging_file())?)
}

fn finalize_atomic_file(mut file: File, paths: &WalletPaths) -> WalletResult<()> {
    file.flush()?;
    drop(file);
    rename_into_place(&paths.staging_file(), paths.store_file())
}

fn rename_into_place(from: &Path, to: &Path) -> WalletResult<()> {
    fs::rename(from, to)?;
    Ok(())
}
