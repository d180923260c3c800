//! Authentication gate in front of every private-key read.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::crypto::verify_pin;
use crate::errors::{WalletError, WalletResult};
use crate::storage::record::{read_pin_hash, read_private_key};
use crate::storage::SecureStore;

pub const PROMPT_FACE: &str = "Use Face ID to unlock your pet wallet";
pub const PROMPT_FINGERPRINT: &str = "Scan your fingerprint to unlock your pet wallet";
pub const PROMPT_GENERIC: &str = "Authenticate to unlock your pet wallet";

/// Biometric modalities the wallet can name in its prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BiometricFactor {
    Fingerprint,
    Face,
}

/// What the device reports about its biometric hardware.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiometricCapabilities {
    pub available: bool,
    pub enrolled: bool,
    pub supported: Vec<BiometricFactor>,
}

impl BiometricCapabilities {
    pub fn usable(&self) -> bool {
        self.available && self.enrolled
    }

    /// Prompt text for the strongest modality: face, then fingerprint,
    /// then a generic prompt.
    pub fn prompt_text(&self) -> &'static str {
        if self.supported.contains(&BiometricFactor::Face) {
            PROMPT_FACE
        } else if self.supported.contains(&BiometricFactor::Fingerprint) {
            PROMPT_FINGERPRINT
        } else {
            PROMPT_GENERIC
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BiometricOutcome {
    Success,
    Cancelled,
    Failed(String),
}

/// Platform biometric prompt, supplied by the host.
#[async_trait]
pub trait BiometricAuthenticator: Send + Sync {
    fn capabilities(&self) -> BiometricCapabilities;
    async fn prompt(&self, text: &str) -> BiometricOutcome;
}

/// Host without biometric hardware.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBiometrics;

#[async_trait]
impl BiometricAuthenticator for NoBiometrics {
    fn capabilities(&self) -> BiometricCapabilities {
        BiometricCapabilities::default()
    }

    async fn prompt(&self, _text: &str) -> BiometricOutcome {
        BiometricOutcome::Failed("Biometric hardware unavailable".to_string())
    }
}

/// Decides whether the current user may read the wallet's private key.
#[derive(Clone)]
pub struct AuthGate {
    store: Arc<dyn SecureStore>,
    biometrics: Arc<dyn BiometricAuthenticator>,
}

impl AuthGate {
    pub fn new(store: Arc<dyn SecureStore>, biometrics: Arc<dyn BiometricAuthenticator>) -> Self {
        Self { store, biometrics }
    }

    pub fn biometric_capabilities(&self) -> BiometricCapabilities {
        self.biometrics.capabilities()
    }

    /// A supplied PIN is always checked against the stored hash. Without a
    /// PIN, only a successful biometric prompt passes; a cancelled or
    /// failed prompt never falls back to anything else.
    pub async fn authenticate(&self, pin: Option<&SecretString>, prefer_biometric: bool) -> bool {
        match pin {
            Some(pin) => self.check_pin(pin),
            None if prefer_biometric => self.check_biometric().await,
            None => {
                log::warn!("Authentication requested without PIN or biometric preference");
                false
            }
        }
    }

    /// The only path to the private key. A missing PIN selects biometrics.
    pub async fn get_private_key(&self, pin: Option<&SecretString>) -> WalletResult<SecretString> {
        if !self.authenticate(pin, pin.is_none()).await {
            return Err(WalletError::AuthenticationFailure(
                "Authentication failed".to_string(),
            ));
        }
        read_private_key(self.store.as_ref())
    }

    fn check_pin(&self, pin: &SecretString) -> bool {
        let stored = match read_pin_hash(self.store.as_ref()) {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                log::warn!("PIN supplied but no PIN hash is stored");
                return false;
            }
            Err(e) => {
                log::error!("Could not read stored PIN hash: {}", e);
                return false;
            }
        };
        match verify_pin(pin, &stored) {
            Ok(true) => true,
            Ok(false) => {
                log::info!("PIN authentication rejected");
                false
            }
            Err(e) => {
                log::error!("PIN verification failed: {}", e);
                false
            }
        }
    }

    async fn check_biometric(&self) -> bool {
        let capabilities = self.biometrics.capabilities();
        if !capabilities.usable() {
            log::info!("Biometric authentication unavailable or not enrolled");
            return false;
        }
        match self.biometrics.prompt(capabilities.prompt_text()).await {
            BiometricOutcome::Success => true,
            BiometricOutcome::Cancelled => {
                log::info!("Biometric prompt cancelled");
                false
            }
            BiometricOutcome::Failed(reason) => {
                log::warn!("Biometric prompt failed: {}", reason);
                false
            }
        }
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("biometrics", &self.biometrics.capabilities())
            .finish()
    }
}
