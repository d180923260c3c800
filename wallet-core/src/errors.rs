use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed taxonomy for failed write-path operations (deploy, mint, feed, battle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    InsufficientBalance,
    InvalidClassHash,
    NetworkError,
    ValidationError,
    GasError,
    NonceError,
    UnknownError,
}

impl FailureKind {
    /// Fixed remediation text shown to the player for each tag.
    pub fn message(&self) -> &'static str {
        match self {
            FailureKind::InsufficientBalance => {
                "Insufficient balance. Please fund your account with STRK before continuing."
            }
            FailureKind::InvalidClassHash => {
                "The account contract class is not declared on this network."
            }
            FailureKind::NetworkError => {
                "Network error. Please check your connection and try again."
            }
            FailureKind::ValidationError => {
                "The transaction failed validation. Please verify your wallet and try again."
            }
            FailureKind::GasError => {
                "Transaction fee estimation failed. Please try again later."
            }
            FailureKind::NonceError => {
                "Transaction nonce is out of sync. Please wait a moment and retry."
            }
            FailureKind::UnknownError => "An unexpected error occurred. Please try again.",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InsufficientBalance => "INSUFFICIENT_BALANCE",
            FailureKind::InvalidClassHash => "INVALID_CLASS_HASH",
            FailureKind::NetworkError => "NETWORK_ERROR",
            FailureKind::ValidationError => "VALIDATION_ERROR",
            FailureKind::GasError => "GAS_ERROR",
            FailureKind::NonceError => "NONCE_ERROR",
            FailureKind::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Map a Starknet JSON-RPC error code to a tag, if the code is one we recognise.
    pub fn from_rpc_code(code: i64) -> Option<Self> {
        match code {
            28 => Some(FailureKind::InvalidClassHash),
            52 => Some(FailureKind::NonceError),
            53 => Some(FailureKind::GasError),
            54 => Some(FailureKind::InsufficientBalance),
            55 => Some(FailureKind::ValidationError),
            _ => None,
        }
    }

    /// Substring heuristic over node error text. Used only when no structured
    /// code is available; wording changes upstream will fall through to
    /// `UnknownError`.
    pub fn from_message(message: &str) -> Self {
        let lowered = message.to_ascii_lowercase();
        let contains_any = |needles: &[&str]| needles.iter().any(|n| lowered.contains(n));

        if contains_any(&["exceed balance", "insufficient balance", "insufficient funds"]) {
            FailureKind::InsufficientBalance
        } else if contains_any(&["class hash", "class_hash", "not declared"]) {
            FailureKind::InvalidClassHash
        } else if contains_any(&["nonce"]) {
            FailureKind::NonceError
        } else if contains_any(&["gas", "resource bounds", "max fee", "fee"]) {
            FailureKind::GasError
        } else if contains_any(&["validate", "validation"]) {
            FailureKind::ValidationError
        } else if contains_any(&[
            "network",
            "timeout",
            "timed out",
            "connection",
            "econnrefused",
            "fetch failed",
        ]) {
            FailureKind::NetworkError
        } else {
            FailureKind::UnknownError
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletError {
    // Gate and custody errors
    AuthenticationFailure(String),
    StorageAbsent(String),
    IntegrityMismatch { stored: String, computed: String },

    // Classified write-path failures
    DeploymentFailure { kind: FailureKind, detail: String },
    TransactionFailure { kind: FailureKind, detail: String },

    // Chain errors
    NetworkFailure(String),
    RpcError { code: i64, message: String },
    UnknownContractError(String),

    // Ambient errors
    CryptoError(String),
    ValidationError(String),
    StorageError(String),
    ConfigError(String),
}

impl WalletError {
    /// Classify any error raised while submitting or awaiting a transaction.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            WalletError::DeploymentFailure { kind, .. }
            | WalletError::TransactionFailure { kind, .. } => *kind,
            WalletError::NetworkFailure(_) => FailureKind::NetworkError,
            WalletError::RpcError { code, message } => FailureKind::from_rpc_code(*code)
                .unwrap_or_else(|| FailureKind::from_message(message)),
            WalletError::UnknownContractError(message) => FailureKind::from_message(message),
            _ => FailureKind::UnknownError,
        }
    }

    /// Wrap a chain-side error as a deployment failure. Errors that never
    /// reached the chain are returned unchanged.
    pub fn into_deployment_failure(self) -> Self {
        match self {
            WalletError::NetworkFailure(_)
            | WalletError::RpcError { .. }
            | WalletError::UnknownContractError(_)
            | WalletError::TransactionFailure { .. } => WalletError::DeploymentFailure {
                kind: self.failure_kind(),
                detail: self.to_string(),
            },
            other => other,
        }
    }

    /// Wrap a chain-side error as a classified transaction failure.
    pub fn into_transaction_failure(self) -> Self {
        match self {
            WalletError::NetworkFailure(_)
            | WalletError::RpcError { .. }
            | WalletError::UnknownContractError(_) => WalletError::TransactionFailure {
                kind: self.failure_kind(),
                detail: self.to_string(),
            },
            other => other,
        }
    }

    /// Text suitable for the player, without internal detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            WalletError::AuthenticationFailure(_) => "Authentication failed. Please try again.",
            WalletError::StorageAbsent(_) => "No wallet found on this device.",
            WalletError::IntegrityMismatch { .. } => {
                "Wallet data is corrupted. Restore the wallet from your recovery phrase."
            }
            WalletError::DeploymentFailure { kind, .. }
            | WalletError::TransactionFailure { kind, .. } => kind.message(),
            WalletError::NetworkFailure(_) => FailureKind::NetworkError.message(),
            WalletError::RpcError { .. } | WalletError::UnknownContractError(_) => {
                self.failure_kind().message()
            }
            WalletError::ValidationError(_) => "Some of the provided values are invalid.",
            WalletError::CryptoError(_)
            | WalletError::StorageError(_)
            | WalletError::ConfigError(_) => FailureKind::UnknownError.message(),
        }
    }
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WalletError::AuthenticationFailure(msg) => write!(f, "Authentication failed: {}", msg),
            WalletError::StorageAbsent(key) => {
                write!(f, "Wallet not initialized: missing '{}'", key)
            }
            WalletError::IntegrityMismatch { stored, computed } => write!(
                f,
                "Stored contract address {} does not match recomputed {}",
                stored, computed
            ),

            WalletError::DeploymentFailure { kind, detail } => {
                write!(f, "Deployment failed ({}): {}", kind, detail)
            }
            WalletError::TransactionFailure { kind, detail } => {
                write!(f, "Transaction failed ({}): {}", kind, detail)
            }

            WalletError::NetworkFailure(msg) => write!(f, "Network error: {}", msg),
            WalletError::RpcError { code, message } => {
                write!(f, "RPC error {}: {}", code, message)
            }
            WalletError::UnknownContractError(msg) => write!(f, "Contract error: {}", msg),

            WalletError::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),
            WalletError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            WalletError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            WalletError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for WalletError {}

pub type WalletResult<T> = Result<T, WalletError>;

// Conversion helpers
impl From<std::io::Error> for WalletError {
    fn from(error: std::io::Error) -> Self {
        WalletError::StorageError(error.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(error: serde_json::Error) -> Self {
        WalletError::ValidationError(format!("JSON error: {}", error))
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            WalletError::NetworkFailure(format!("request timed out: {}", error))
        } else {
            WalletError::NetworkFailure(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_codes_take_precedence_over_text() {
        let err = WalletError::RpcError {
            code: 54,
            message: "nonce something".to_string(),
        };
        assert_eq!(err.failure_kind(), FailureKind::InsufficientBalance);
    }

    #[test]
    fn substring_fallback_classifies_known_messages() {
        assert_eq!(
            FailureKind::from_message(
                "Account balance is smaller than the transaction's max_fee: exceed balance"
            ),
            FailureKind::InsufficientBalance
        );
        assert_eq!(
            FailureKind::from_message("Class hash 0x123 is not declared"),
            FailureKind::InvalidClassHash
        );
        assert_eq!(
            FailureKind::from_message("Invalid transaction nonce"),
            FailureKind::NonceError
        );
        assert_eq!(
            FailureKind::from_message("Insufficient max L2Gas"),
            FailureKind::GasError
        );
        assert_eq!(
            FailureKind::from_message("__validate__ returned an invalid value"),
            FailureKind::ValidationError
        );
        assert_eq!(
            FailureKind::from_message("connect ECONNREFUSED 127.0.0.1:5050"),
            FailureKind::NetworkError
        );
    }

    #[test]
    fn unmatched_errors_are_unknown() {
        assert_eq!(
            FailureKind::from_message("something odd happened"),
            FailureKind::UnknownError
        );
        let err = WalletError::RpcError {
            code: 63,
            message: "weird".into(),
        };
        assert_eq!(err.failure_kind(), FailureKind::UnknownError);
    }

    #[test]
    fn deployment_wrapping_keeps_pre_chain_errors() {
        let auth = WalletError::AuthenticationFailure("wrong pin".into());
        assert_eq!(auth.clone().into_deployment_failure(), auth);

        let net = WalletError::NetworkFailure("timed out".into()).into_deployment_failure();
        assert!(matches!(
            net,
            WalletError::DeploymentFailure {
                kind: FailureKind::NetworkError,
                ..
            }
        ));
    }

    #[test]
    fn every_kind_has_a_distinct_tag() {
        let kinds = [
            FailureKind::InsufficientBalance,
            FailureKind::InvalidClassHash,
            FailureKind::NetworkError,
            FailureKind::ValidationError,
            FailureKind::GasError,
            FailureKind::NonceError,
            FailureKind::UnknownError,
        ];
        let tags: std::collections::HashSet<_> = kinds.iter().map(|k| k.as_str()).collect();
        assert_eq!(tags.len(), kinds.len());
        assert!(kinds.iter().all(|k| !k.message().is_empty()));
    }
}
