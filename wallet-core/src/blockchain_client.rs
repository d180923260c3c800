//! Starknet JSON-RPC client used by the wallet core.
//!
//! Everything above this module talks to the chain through the
//! [`ChainProvider`] trait so hosts and tests can substitute their own
//! transport. Request and response bodies are the `starknet-core` RPC types.

use crate::account::{DeployAccountTransactionV3, InvokeTransactionV3};
use crate::config::{ChainConfig, ResourceBound, ResourceBounds};
use crate::errors::{WalletError, WalletResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use starknet_core::types::requests::{
    AddDeployAccountTransactionRequest, AddInvokeTransactionRequest, CallRequest, ChainIdRequest,
    GetClassHashAtRequest, GetNonceRequest, GetTransactionReceiptRequest,
};
use starknet_core::types::{
    BlockId, BlockTag, BroadcastedDeployAccountTransaction, BroadcastedDeployAccountTransactionV3,
    BroadcastedInvokeTransaction, BroadcastedInvokeTransactionV3, DataAvailabilityMode,
    DeployAccountTransactionResult, ExecutionResult, FunctionCall, InvokeTransactionResult,
    ResourceBoundsMapping,
};
use starknet_crypto::Felt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// `CONTRACT_NOT_FOUND`
pub const RPC_CONTRACT_NOT_FOUND: i64 = 20;
/// `TXN_HASH_NOT_FOUND`
pub const RPC_TXN_HASH_NOT_FOUND: i64 = 29;

const BLOCK_ID: BlockId = BlockId::Tag(BlockTag::Latest);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Succeeded,
    Reverted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalityStatus {
    #[serde(rename = "RECEIVED")]
    Received,
    #[serde(rename = "PRE_CONFIRMED", alias = "PENDING")]
    PreConfirmed,
    #[serde(rename = "ACCEPTED_ON_L2")]
    AcceptedOnL2,
    #[serde(rename = "ACCEPTED_ON_L1")]
    AcceptedOnL1,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: Felt,
    pub execution_status: ExecutionStatus,
    pub finality_status: FinalityStatus,
    pub revert_reason: Option<String>,
}

/// Node response to `starknet_addDeployAccountTransaction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployAccountSubmission {
    pub transaction_hash: Felt,
    pub contract_address: Felt,
}

/// Read and write access to a Starknet node.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn chain_id(&self) -> WalletResult<Felt>;

    /// Execute a view function against the latest block.
    async fn call(
        &self,
        contract_address: Felt,
        selector: Felt,
        calldata: &[Felt],
    ) -> WalletResult<Vec<Felt>>;

    async fn get_nonce(&self, address: Felt) -> WalletResult<Felt>;

    /// `None` when nothing is deployed at `address`.
    async fn get_class_hash_at(&self, address: Felt) -> WalletResult<Option<Felt>>;

    async fn add_invoke_transaction(&self, tx: &InvokeTransactionV3) -> WalletResult<Felt>;

    async fn add_deploy_account_transaction(
        &self,
        tx: &DeployAccountTransactionV3,
    ) -> WalletResult<DeployAccountSubmission>;

    /// `None` while the node does not know the transaction yet.
    async fn get_transaction_receipt(
        &self,
        transaction_hash: Felt,
    ) -> WalletResult<Option<TransactionReceipt>>;
}

/// JSON-RPC request structure
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a P,
    id: u64,
}

/// JSON-RPC response structure
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC error structure
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl JsonRpcError {
    fn into_wallet_error(self) -> WalletError {
        let message = match self.data {
            Some(Value::String(detail)) => format!("{}: {}", self.message, detail),
            Some(Value::Null) | None => self.message,
            Some(other) => format!("{}: {}", self.message, other),
        };
        WalletError::RpcError {
            code: self.code,
            message,
        }
    }
}

/// The receipt fields the wallet reads. Full receipts vary by transaction
/// type and RPC version, so everything else is ignored.
#[derive(Debug, Deserialize)]
struct ReceiptSummary {
    transaction_hash: Felt,
    finality_status: FinalityStatus,
    #[serde(flatten)]
    execution: ExecutionResult,
}

impl From<ReceiptSummary> for TransactionReceipt {
    fn from(summary: ReceiptSummary) -> Self {
        let (execution_status, revert_reason) = match summary.execution {
            ExecutionResult::Succeeded => (ExecutionStatus::Succeeded, None),
            ExecutionResult::Reverted { reason } => (ExecutionStatus::Reverted, Some(reason)),
        };
        TransactionReceipt {
            transaction_hash: summary.transaction_hash,
            execution_status,
            finality_status: summary.finality_status,
            revert_reason,
        }
    }
}

/// HTTP client for a Starknet JSON-RPC endpoint
pub struct StarknetClient {
    client: Client,
    rpc_url: String,
    next_id: AtomicU64,
}

impl StarknetClient {
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> WalletResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            WalletError::NetworkFailure(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(StarknetClient {
            client,
            rpc_url: rpc_url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &ChainConfig) -> WalletResult<Self> {
        Self::new(config.rpc_url.clone(), config.request_timeout)
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Make a JSON-RPC call to the node
    async fn rpc_call<P: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        params: &P,
    ) -> WalletResult<T> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        log::debug!("RPC {} -> {}", method, self.rpc_url);
        let response = self.client.post(&self.rpc_url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(WalletError::NetworkFailure(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let rpc_response: JsonRpcResponse<T> = response.json().await.map_err(|e| {
            WalletError::NetworkFailure(format!("Failed to parse response: {}", e))
        })?;

        if let Some(error) = rpc_response.error {
            log::warn!("RPC {} failed with code {}", method, error.code);
            return Err(error.into_wallet_error());
        }

        rpc_response
            .result
            .ok_or_else(|| WalletError::NetworkFailure("No result in RPC response".to_string()))
    }
}

#[async_trait]
impl ChainProvider for StarknetClient {
    async fn chain_id(&self) -> WalletResult<Felt> {
        self.rpc_call("starknet_chainId", &ChainIdRequest).await
    }

    async fn call(
        &self,
        contract_address: Felt,
        selector: Felt,
        calldata: &[Felt],
    ) -> WalletResult<Vec<Felt>> {
        let request = CallRequest {
            request: FunctionCall {
                contract_address,
                entry_point_selector: selector,
                calldata: calldata.to_vec(),
            },
            block_id: BLOCK_ID,
        };
        self.rpc_call("starknet_call", &request).await
    }

    async fn get_nonce(&self, address: Felt) -> WalletResult<Felt> {
        let request = GetNonceRequest {
            block_id: BLOCK_ID,
            contract_address: address,
        };
        self.rpc_call("starknet_getNonce", &request).await
    }

    async fn get_class_hash_at(&self, address: Felt) -> WalletResult<Option<Felt>> {
        let request = GetClassHashAtRequest {
            block_id: BLOCK_ID,
            contract_address: address,
        };
        match self.rpc_call("starknet_getClassHashAt", &request).await {
            Ok(hash) => Ok(Some(hash)),
            Err(WalletError::RpcError { code, .. }) if code == RPC_CONTRACT_NOT_FOUND => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn add_invoke_transaction(&self, tx: &InvokeTransactionV3) -> WalletResult<Felt> {
        let request = invoke_request(tx);
        let result: InvokeTransactionResult = self
            .rpc_call("starknet_addInvokeTransaction", &request)
            .await?;
        Ok(result.transaction_hash)
    }

    async fn add_deploy_account_transaction(
        &self,
        tx: &DeployAccountTransactionV3,
    ) -> WalletResult<DeployAccountSubmission> {
        let request = deploy_account_request(tx);
        let result: DeployAccountTransactionResult = self
            .rpc_call("starknet_addDeployAccountTransaction", &request)
            .await?;
        Ok(DeployAccountSubmission {
            transaction_hash: result.transaction_hash,
            contract_address: result.contract_address,
        })
    }

    async fn get_transaction_receipt(
        &self,
        transaction_hash: Felt,
    ) -> WalletResult<Option<TransactionReceipt>> {
        let request = GetTransactionReceiptRequest { transaction_hash };
        match self
            .rpc_call::<_, ReceiptSummary>("starknet_getTransactionReceipt", &request)
            .await
        {
            Ok(summary) => Ok(Some(summary.into())),
            Err(WalletError::RpcError { code, .. }) if code == RPC_TXN_HASH_NOT_FOUND => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn resource_bounds_mapping(bounds: &ResourceBounds) -> ResourceBoundsMapping {
    let bound = |b: &ResourceBound| starknet_core::types::ResourceBounds {
        max_amount: b.max_amount,
        max_price_per_unit: b.max_price_per_unit,
    };
    ResourceBoundsMapping {
        l1_gas: bound(&bounds.l1_gas),
        l2_gas: bound(&bounds.l2_gas),
    }
}

fn invoke_request(tx: &InvokeTransactionV3) -> AddInvokeTransactionRequest {
    AddInvokeTransactionRequest {
        invoke_transaction: BroadcastedInvokeTransaction::V3(BroadcastedInvokeTransactionV3 {
            sender_address: tx.sender_address,
            calldata: tx.calldata.clone(),
            signature: tx.signature.clone(),
            nonce: tx.nonce,
            resource_bounds: resource_bounds_mapping(&tx.resource_bounds),
            tip: tx.tip,
            paymaster_data: Vec::new(),
            account_deployment_data: Vec::new(),
            nonce_data_availability_mode: DataAvailabilityMode::L1,
            fee_data_availability_mode: DataAvailabilityMode::L1,
            is_query: false,
        }),
    }
}

fn deploy_account_request(tx: &DeployAccountTransactionV3) -> AddDeployAccountTransactionRequest {
    AddDeployAccountTransactionRequest {
        deploy_account_transaction: BroadcastedDeployAccountTransaction::V3(
            BroadcastedDeployAccountTransactionV3 {
                signature: tx.signature.clone(),
                nonce: tx.nonce,
                contract_address_salt: tx.contract_address_salt,
                constructor_calldata: tx.constructor_calldata.clone(),
                class_hash: tx.class_hash,
                resource_bounds: resource_bounds_mapping(&tx.resource_bounds),
                tip: tx.tip,
                paymaster_data: Vec::new(),
                nonce_data_availability_mode: DataAvailabilityMode::L1,
                fee_data_availability_mode: DataAvailabilityMode::L1,
                is_query: false,
            },
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use serde_json::json;

    fn bounds() -> ResourceBounds {
        ResourceBounds {
            l1_gas: ResourceBound {
                max_amount: 0,
                max_price_per_unit: 255,
            },
            l2_gas: ResourceBound {
                max_amount: 16,
                max_price_per_unit: 1,
            },
        }
    }

    #[test]
    fn invoke_payload_uses_canonical_hex() {
        let tx = InvokeTransactionV3 {
            sender_address: Felt::from(0xabcu64),
            calldata: vec![Felt::ONE, Felt::ZERO],
            nonce: Felt::from(2u64),
            resource_bounds: bounds(),
            tip: 0,
            signature: vec![Felt::from(3u64), Felt::from(4u64)],
        };
        let params = serde_json::to_value(invoke_request(&tx)).unwrap();
        let payload = &params[0];
        assert_eq!(payload["type"], "INVOKE");
        assert_eq!(payload["version"], "0x3");
        assert_eq!(payload["sender_address"], "0xabc");
        assert_eq!(payload["calldata"], json!(["0x1", "0x0"]));
        assert_eq!(payload["signature"], json!(["0x3", "0x4"]));
        assert_eq!(payload["resource_bounds"]["l1_gas"]["max_price_per_unit"], "0xff");
        assert_eq!(payload["resource_bounds"]["l2_gas"]["max_amount"], "0x10");
        assert_eq!(payload["nonce_data_availability_mode"], "L1");
    }

    #[test]
    fn deploy_payload_carries_salt_and_class() {
        let tx = DeployAccountTransactionV3::new(
            Felt::from(0xc1u64),
            Felt::from(0x5au64),
            vec![Felt::from(0x5au64)],
            bounds(),
        );
        let params = serde_json::to_value(deploy_account_request(&tx)).unwrap();
        let payload = &params[0];
        assert_eq!(payload["contract_address_salt"], "0x5a");
        assert_eq!(payload["class_hash"], "0xc1");
        assert_eq!(payload["constructor_calldata"], json!(["0x5a"]));
        assert_eq!(payload["type"], "DEPLOY_ACCOUNT");
    }

    #[test]
    fn call_targets_latest_block() {
        let request = CallRequest {
            request: FunctionCall {
                contract_address: Felt::from(0x1234u64),
                entry_point_selector: Felt::from(0x99u64),
                calldata: vec![Felt::from(7u64)],
            },
            block_id: BLOCK_ID,
        };
        let params = serde_json::to_value(&request).unwrap();
        assert_eq!(params[0]["contract_address"], "0x1234");
        assert_eq!(params[0]["calldata"], json!(["0x7"]));
        assert_eq!(params[1], "latest");
    }

    #[test]
    fn receipts_parse_statuses() {
        let reverted: ReceiptSummary = serde_json::from_value(json!({
            "type": "INVOKE",
            "transaction_hash": "0x12",
            "execution_status": "REVERTED",
            "finality_status": "ACCEPTED_ON_L2",
            "revert_reason": "u256_sub Overflow",
            "events": []
        }))
        .unwrap();
        let receipt = TransactionReceipt::from(reverted);
        assert_eq!(receipt.transaction_hash, Felt::from(0x12u64));
        assert_eq!(receipt.execution_status, ExecutionStatus::Reverted);
        assert_eq!(receipt.finality_status, FinalityStatus::AcceptedOnL2);
        assert_eq!(receipt.revert_reason.as_deref(), Some("u256_sub Overflow"));

        let pending: ReceiptSummary = serde_json::from_value(json!({
            "transaction_hash": "0x12",
            "execution_status": "SUCCEEDED",
            "finality_status": "PENDING"
        }))
        .unwrap();
        let receipt = TransactionReceipt::from(pending);
        assert_eq!(receipt.execution_status, ExecutionStatus::Succeeded);
        assert_eq!(receipt.finality_status, FinalityStatus::PreConfirmed);

        let odd = serde_json::from_value::<ReceiptSummary>(json!({
            "transaction_hash": "0x12",
            "execution_status": "MAYBE",
            "finality_status": "ACCEPTED_ON_L2"
        }));
        assert!(odd.is_err());
    }

    #[test]
    fn rpc_errors_keep_code_and_detail() {
        let error: JsonRpcError = serde_json::from_value(json!({
            "code": 55,
            "message": "Account validation failed",
            "data": "invalid signature"
        }))
        .unwrap();
        match error.into_wallet_error() {
            WalletError::RpcError { code, message } => {
                assert_eq!(code, 55);
                assert_eq!(message, "Account validation failed: invalid signature");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    #[ignore = "requires a Starknet devnet at 127.0.0.1:5050"]
    async fn test_real_chain_id_call() {
        let config = ChainConfig::with_overrides(Environment::Test, &[]).unwrap();
        let client = StarknetClient::from_config(&config).unwrap();
        let result = client.chain_id().await;
        assert!(result.is_ok(), "Chain id call should succeed");
    }
}
