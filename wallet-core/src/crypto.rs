//! Key derivation and signing for the game wallet.
//!
//! An account key is derived from a BIP-39 phrase in two stages: a standard
//! BIP-32 secp256k1 derivation along the Ethereum path, then a SHA-256 based
//! mapping of that key onto the STARK curve scalar field.

use crate::errors::{WalletError, WalletResult};
use bip39::{Language, Mnemonic};
use hmac::{Hmac, Mac};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::SecretKey;
use num_bigint::BigUint;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256, Sha512};
use starknet_crypto::Felt;
use zeroize::Zeroizing;

/// Derivation path shared with Ethereum wallets.
pub const ACCOUNT_DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

/// Order of the STARK curve generator, big-endian.
pub const STARK_CURVE_ORDER_BYTES: [u8; 32] = [
    0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xb7, 0x81, 0x12, 0x6d, 0xca, 0xe7, 0xb2, 0x32, 0x1e, 0x66, 0xa2, 0x41, 0xad, 0xc6, 0x4d, 0x2f,
];

const STARK_KEY_SUFFIX: &str = "starknet";
const BIP32_SEED_KEY: &[u8] = b"Bitcoin seed";
const HARDENED_OFFSET: u32 = 0x8000_0000;
const PIN_SALT_LEN: usize = 16;
const PIN_HASH_LEN: usize = 32;

static STARK_CURVE_ORDER: Lazy<BigUint> =
    Lazy::new(|| BigUint::from_bytes_be(&STARK_CURVE_ORDER_BYTES));

type HmacSha512 = Hmac<Sha512>;

/// STARK keypair. The private half is only ever held in secret memory.
pub struct StarkKeyPair {
    private_key: SecretString,
    public_key: Felt,
}

impl StarkKeyPair {
    /// Rebuild a keypair from a stored `0x` private key.
    pub fn from_private_key_hex(private_key_hex: &str) -> WalletResult<Self> {
        let scalar = parse_private_scalar(private_key_hex)?;
        Self::from_scalar_bytes(&scalar)
    }

    fn from_scalar_bytes(scalar: &[u8; 32]) -> WalletResult<Self> {
        let private_felt = Felt::from_bytes_be(scalar);
        let public_key = starknet_crypto::get_public_key(&private_felt);
        if public_key == Felt::ZERO {
            return Err(WalletError::CryptoError(
                "Derived STARK public key is the point at infinity".to_string(),
            ));
        }
        Ok(Self {
            private_key: SecretString::from(format!("0x{}", hex::encode(scalar))),
            public_key,
        })
    }

    /// 64-digit `0x` hex of the private scalar.
    pub fn private_key_hex(&self) -> &SecretString {
        &self.private_key
    }

    pub fn public_key(&self) -> Felt {
        self.public_key
    }

    pub fn public_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.public_key.to_bytes_be()))
    }

    /// Sign a message hash with this key.
    pub fn sign(&self, message_hash: &Felt) -> WalletResult<StarkSignature> {
        let private_felt = private_felt_from_hex(self.private_key.expose_secret())?;
        sign_hash(&private_felt, message_hash)
    }
}

impl std::fmt::Debug for StarkKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StarkKeyPair")
            .field("public_key", &self.public_key_hex())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// ECDSA signature over the STARK curve, serialized as `[r, s]` on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StarkSignature {
    pub r: Felt,
    pub s: Felt,
}

impl StarkSignature {
    pub fn to_felts(&self) -> Vec<Felt> {
        vec![self.r, self.s]
    }
}

/// Generate a BIP39 mnemonic with specified word count
pub fn generate_mnemonic(word_count: u32) -> WalletResult<SecretString> {
    let entropy_bits = match word_count {
        12 => 128,
        15 => 160,
        18 => 192,
        21 => 224,
        24 => 256,
        _ => {
            return Err(WalletError::ValidationError(
                "Invalid word count: must be 12, 15, 18, 21, or 24".to_string(),
            ))
        }
    };

    let mut entropy = Zeroizing::new(vec![0u8; entropy_bits / 8]);
    OsRng
        .try_fill_bytes(&mut entropy)
        .map_err(|e| WalletError::CryptoError(format!("Failed to generate entropy: {}", e)))?;

    let mnemonic = Mnemonic::from_entropy(&entropy)
        .map_err(|e| WalletError::CryptoError(format!("Failed to create mnemonic: {}", e)))?;

    Ok(SecretString::from(mnemonic.to_string()))
}

/// Validate a BIP39 mnemonic phrase
pub fn validate_mnemonic(mnemonic: &str) -> WalletResult<()> {
    Mnemonic::parse_in_normalized(Language::English, mnemonic)
        .map_err(|e| WalletError::ValidationError(format!("Invalid mnemonic: {}", e)))?;
    Ok(())
}

/// Derive the account keypair for a recovery phrase. The same phrase always
/// yields the same pair.
pub fn derive_account(mnemonic: &str) -> WalletResult<StarkKeyPair> {
    let parsed = Mnemonic::parse_in_normalized(Language::English, mnemonic)
        .map_err(|e| WalletError::CryptoError(format!("Invalid mnemonic: {}", e)))?;
    let seed = Zeroizing::new(parsed.to_seed(""));

    let path = parse_derivation_path(ACCOUNT_DERIVATION_PATH)?;
    let entropy = derive_bip32_private_key(&seed[..], &path)?;
    let scalar = stark_scalar_from_entropy(&entropy)?;
    let keypair = StarkKeyPair::from_scalar_bytes(&scalar)?;

    log::debug!("Derived account key {}", keypair.public_key_hex());
    Ok(keypair)
}

/// Map 32 bytes of secp256k1 key material onto a non-zero STARK scalar:
/// `SHA-256(hex(entropy) ++ "starknet")`, reduced modulo the curve order.
pub fn stark_scalar_from_entropy(entropy: &[u8; 32]) -> WalletResult<Zeroizing<[u8; 32]>> {
    let mut preimage = Zeroizing::new(hex::encode(entropy));
    preimage.push_str(STARK_KEY_SUFFIX);
    let digest = Sha256::digest(preimage.as_bytes());
    reduce_to_stark_scalar(&digest)
}

/// Reduce a 256-bit candidate into `[1, order)`.
fn reduce_to_stark_scalar(candidate: &[u8]) -> WalletResult<Zeroizing<[u8; 32]>> {
    let mut value = BigUint::from_bytes_be(candidate);
    if value >= *STARK_CURVE_ORDER {
        value %= &*STARK_CURVE_ORDER;
    }
    if value == BigUint::default() {
        return Err(WalletError::CryptoError(
            "Derived STARK scalar is zero".to_string(),
        ));
    }

    let bytes = Zeroizing::new(value.to_bytes_be());
    let mut out = Zeroizing::new([0u8; 32]);
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}

/// Parse a `m/a'/b/..` path into child indices.
pub fn parse_derivation_path(path: &str) -> WalletResult<Vec<u32>> {
    let mut segments = path.split('/');
    if segments.next() != Some("m") {
        return Err(WalletError::ValidationError(format!(
            "Derivation path must start with 'm': {}",
            path
        )));
    }

    segments
        .map(|segment| {
            let (digits, hardened) = match segment.strip_suffix('\'') {
                Some(stripped) => (stripped, true),
                None => (segment, false),
            };
            let index: u32 = digits.parse().map_err(|_| {
                WalletError::ValidationError(format!("Invalid path segment '{}'", segment))
            })?;
            if index >= HARDENED_OFFSET {
                return Err(WalletError::ValidationError(format!(
                    "Path index {} out of range",
                    index
                )));
            }
            Ok(if hardened { index | HARDENED_OFFSET } else { index })
        })
        .collect()
}

/// BIP-32 private key derivation on secp256k1.
pub fn derive_bip32_private_key(seed: &[u8], path: &[u32]) -> WalletResult<Zeroizing<[u8; 32]>> {
    let (mut key, mut chain_code) = hmac_split(BIP32_SEED_KEY, seed)?;
    let mut secret = secp_secret(&key)?;

    for &index in path {
        let mut data = Zeroizing::new(Vec::with_capacity(37));
        if index & HARDENED_OFFSET != 0 {
            data.push(0);
            data.extend_from_slice(&key[..]);
        } else {
            let public = secret.public_key().to_encoded_point(true);
            data.extend_from_slice(public.as_bytes());
        }
        data.extend_from_slice(&index.to_be_bytes());

        let (tweak, next_chain) = hmac_split(&chain_code[..], &data)?;
        let tweak = secp_secret(&tweak)?;
        let child = *tweak.to_nonzero_scalar() + *secret.to_nonzero_scalar();
        secret = SecretKey::from_bytes(&child.to_bytes()).map_err(|_| {
            WalletError::CryptoError(format!("Invalid child key at index {}", index))
        })?;

        key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&secret.to_bytes());
        chain_code = next_chain;
    }

    Ok(key)
}

type KeyAndChainCode = (Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>);

fn hmac_split(key: &[u8], data: &[u8]) -> WalletResult<KeyAndChainCode> {
    let mut mac = HmacSha512::new_from_slice(key)
        .map_err(|e| WalletError::CryptoError(format!("HMAC error: {}", e)))?;
    Mac::update(&mut mac, data);
    let output = mac.finalize().into_bytes();

    let mut left = Zeroizing::new([0u8; 32]);
    let mut right = Zeroizing::new([0u8; 32]);
    left.copy_from_slice(&output[..32]);
    right.copy_from_slice(&output[32..]);
    Ok((left, right))
}

fn secp_secret(bytes: &[u8; 32]) -> WalletResult<SecretKey> {
    SecretKey::from_slice(bytes)
        .map_err(|_| WalletError::CryptoError("Derived secp256k1 key is out of range".to_string()))
}

/// Fresh random STARK keypair for battle sessions.
pub fn generate_session_keypair() -> WalletResult<StarkKeyPair> {
    let mut candidate = Zeroizing::new([0u8; 32]);
    OsRng
        .try_fill_bytes(&mut candidate[..])
        .map_err(|e| WalletError::CryptoError(format!("Failed to generate entropy: {}", e)))?;
    let scalar = reduce_to_stark_scalar(&candidate[..])?;
    StarkKeyPair::from_scalar_bytes(&scalar)
}

/// Sign a hash with a deterministic RFC 6979 nonce.
pub fn sign_hash(private_key: &Felt, message_hash: &Felt) -> WalletResult<StarkSignature> {
    let k = starknet_crypto::rfc6979_generate_k(message_hash, private_key, None);
    let signature = starknet_crypto::sign(private_key, message_hash, &k)
        .map_err(|e| WalletError::CryptoError(format!("Signing failed: {:?}", e)))?;
    Ok(StarkSignature {
        r: signature.r,
        s: signature.s,
    })
}

pub fn verify_signature(
    public_key: &Felt,
    message_hash: &Felt,
    signature: &StarkSignature,
) -> WalletResult<bool> {
    starknet_crypto::verify(public_key, message_hash, &signature.r, &signature.s)
        .map_err(|e| WalletError::CryptoError(format!("Verification failed: {:?}", e)))
}

/// Parse and range-check a stored private key.
fn parse_private_scalar(private_key_hex: &str) -> WalletResult<Zeroizing<[u8; 32]>> {
    let digits = private_key_hex
        .trim()
        .strip_prefix("0x")
        .unwrap_or(private_key_hex.trim());
    if digits.is_empty() || digits.len() > 64 {
        return Err(WalletError::CryptoError(
            "Private key must be at most 32 bytes of hex".to_string(),
        ));
    }
    let padded = Zeroizing::new(format!("{:0>64}", digits));
    let bytes = Zeroizing::new(
        hex::decode(padded.as_bytes())
            .map_err(|_| WalletError::CryptoError("Private key is not valid hex".to_string()))?,
    );

    let value = BigUint::from_bytes_be(&bytes);
    if value == BigUint::default() || value >= *STARK_CURVE_ORDER {
        return Err(WalletError::CryptoError(
            "Private key is outside the STARK scalar range".to_string(),
        ));
    }

    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Private scalar as a felt, for a single signing operation.
pub(crate) fn private_felt_from_hex(private_key_hex: &str) -> WalletResult<Felt> {
    let scalar = parse_private_scalar(private_key_hex)?;
    Ok(Felt::from_bytes_be(&scalar))
}

/// Hash a PIN with a fresh random salt. Output format: `salt_hex:hash_hex`.
pub fn hash_pin(pin: &SecretString) -> WalletResult<String> {
    let mut salt = [0u8; PIN_SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| WalletError::CryptoError(format!("Failed to generate salt: {}", e)))?;
    let hash = hash_pin_with_salt(pin, &salt)?;
    Ok(format!("{}:{}", hex::encode(salt), hex::encode(&hash[..])))
}

/// Argon2id over the PIN bytes with the given salt.
pub fn hash_pin_with_salt(
    pin: &SecretString,
    salt: &[u8],
) -> WalletResult<Zeroizing<[u8; PIN_HASH_LEN]>> {
    use argon2::Argon2;

    let mut output = Zeroizing::new([0u8; PIN_HASH_LEN]);
    Argon2::default()
        .hash_password_into(pin.expose_secret().as_bytes(), salt, &mut output[..])
        .map_err(|e| WalletError::CryptoError(format!("PIN hashing failed: {}", e)))?;
    Ok(output)
}

/// Check a PIN against a stored `salt_hex:hash_hex` value.
pub fn verify_pin(pin: &SecretString, stored: &str) -> WalletResult<bool> {
    let (salt_hex, hash_hex) = stored
        .split_once(':')
        .ok_or_else(|| WalletError::StorageError("Stored PIN hash is malformed".to_string()))?;
    let salt = hex::decode(salt_hex)
        .map_err(|_| WalletError::StorageError("Stored PIN salt is not hex".to_string()))?;
    let expected = hex::decode(hash_hex)
        .map_err(|_| WalletError::StorageError("Stored PIN hash is not hex".to_string()))?;

    let computed = hash_pin_with_salt(pin, &salt)?;
    Ok(constant_time_eq(&computed[..], &expected))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
