//! Account contract lifecycle: counterfactual address, V3 transaction
//! hashing and signing, submission, and inclusion tracking.

use std::time::Duration;

use serde::Serialize;
use starknet_core::utils::get_contract_address;
use starknet_crypto::{poseidon_hash_many, Felt};

use crate::blockchain_client::{ChainProvider, ExecutionStatus, TransactionReceipt};
use crate::codec::calls::{encode_multicall, Call};
use crate::codec::primitives::{encode_short_string, felt_to_padded_hex};
use crate::config::{ResourceBound, ResourceBounds};
use crate::crypto::StarkKeyPair;
use crate::errors::{FailureKind, WalletError, WalletResult};

const INVOKE_PREFIX: &str = "invoke";
const DEPLOY_ACCOUNT_PREFIX: &str = "deploy_account";
const TRANSACTION_VERSION: u64 = 3;

/// Counterfactual address of a contract deployed via `deploy_account` or
/// the universal deployer.
pub fn compute_contract_address(
    salt: Felt,
    class_hash: Felt,
    constructor_calldata: &[Felt],
    deployer_address: Felt,
) -> Felt {
    get_contract_address(salt, class_hash, constructor_calldata, deployer_address)
}

/// Address of the wallet's own account: self-deployed, salted with its
/// public key.
pub fn compute_account_address(
    public_key: Felt,
    class_hash: Felt,
    constructor_calldata: &[Felt],
) -> Felt {
    compute_contract_address(public_key, class_hash, constructor_calldata, Felt::ZERO)
}

/// Cached per-context account identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountHandle {
    pub address: Felt,
    pub chain_id: Felt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeTransactionV3 {
    pub sender_address: Felt,
    pub calldata: Vec<Felt>,
    pub nonce: Felt,
    pub resource_bounds: ResourceBounds,
    pub tip: u64,
    pub signature: Vec<Felt>,
}

impl InvokeTransactionV3 {
    pub fn new(
        sender_address: Felt,
        calls: &[Call],
        nonce: Felt,
        resource_bounds: ResourceBounds,
    ) -> WalletResult<Self> {
        Ok(Self {
            sender_address,
            calldata: encode_multicall(calls)?,
            nonce,
            resource_bounds,
            tip: 0,
            signature: Vec::new(),
        })
    }

    pub fn transaction_hash(&self, chain_id: Felt) -> WalletResult<Felt> {
        Ok(poseidon_hash_many(&[
            encode_short_string(INVOKE_PREFIX)?,
            Felt::from(TRANSACTION_VERSION),
            self.sender_address,
            fee_fields_hash(self.tip, &self.resource_bounds)?,
            empty_array_hash(),
            chain_id,
            self.nonce,
            data_availability_modes(),
            empty_array_hash(),
            poseidon_hash_many(&self.calldata),
        ]))
    }

    pub fn sign(&mut self, keypair: &StarkKeyPair, chain_id: Felt) -> WalletResult<Felt> {
        let hash = self.transaction_hash(chain_id)?;
        self.signature = keypair.sign(&hash)?.to_felts();
        Ok(hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployAccountTransactionV3 {
    pub class_hash: Felt,
    pub contract_address_salt: Felt,
    pub constructor_calldata: Vec<Felt>,
    pub nonce: Felt,
    pub resource_bounds: ResourceBounds,
    pub tip: u64,
    pub signature: Vec<Felt>,
}

impl DeployAccountTransactionV3 {
    pub fn new(
        class_hash: Felt,
        public_key: Felt,
        constructor_calldata: Vec<Felt>,
        resource_bounds: ResourceBounds,
    ) -> Self {
        Self {
            class_hash,
            contract_address_salt: public_key,
            constructor_calldata,
            nonce: Felt::ZERO,
            resource_bounds,
            tip: 0,
            signature: Vec::new(),
        }
    }

    pub fn contract_address(&self) -> Felt {
        compute_contract_address(
            self.contract_address_salt,
            self.class_hash,
            &self.constructor_calldata,
            Felt::ZERO,
        )
    }

    pub fn transaction_hash(&self, chain_id: Felt) -> WalletResult<Felt> {
        Ok(poseidon_hash_many(&[
            encode_short_string(DEPLOY_ACCOUNT_PREFIX)?,
            Felt::from(TRANSACTION_VERSION),
            self.contract_address(),
            fee_fields_hash(self.tip, &self.resource_bounds)?,
            empty_array_hash(),
            chain_id,
            data_availability_modes(),
            self.nonce,
            poseidon_hash_many(&self.constructor_calldata),
            self.class_hash,
            self.contract_address_salt,
        ]))
    }

    pub fn sign(&mut self, keypair: &StarkKeyPair, chain_id: Felt) -> WalletResult<Felt> {
        let hash = self.transaction_hash(chain_id)?;
        self.signature = keypair.sign(&hash)?.to_felts();
        Ok(hash)
    }
}

/// `poseidon(tip, L1_GAS, L2_GAS)` where each bound is packed as
/// `name << 192 | max_amount << 128 | max_price_per_unit`.
fn fee_fields_hash(tip: u64, bounds: &ResourceBounds) -> WalletResult<Felt> {
    Ok(poseidon_hash_many(&[
        Felt::from(tip),
        pack_resource_bound("L1_GAS", &bounds.l1_gas)?,
        pack_resource_bound("L2_GAS", &bounds.l2_gas)?,
    ]))
}

fn pack_resource_bound(name: &str, bound: &ResourceBound) -> WalletResult<Felt> {
    let name_bytes = name.as_bytes();
    if name_bytes.len() > 8 {
        return Err(WalletError::ValidationError(format!(
            "Resource name '{}' is too long",
            name
        )));
    }
    let mut packed = [0u8; 32];
    packed[8 - name_bytes.len()..8].copy_from_slice(name_bytes);
    packed[8..16].copy_from_slice(&bound.max_amount.to_be_bytes());
    packed[16..32].copy_from_slice(&bound.max_price_per_unit.to_be_bytes());
    Ok(Felt::from_bytes_be(&packed))
}

/// Hash of an empty list, used for paymaster data and account deployment data.
fn empty_array_hash() -> Felt {
    poseidon_hash_many(&Vec::<Felt>::new())
}

/// Nonce and fee data availability both on L1.
fn data_availability_modes() -> Felt {
    Felt::ZERO
}

/// Result of a confirmed account deployment. `transaction_hash` is `None`
/// when the account was found already deployed and nothing was submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployReceipt {
    pub transaction_hash: Option<String>,
    pub contract_address: String,
}

/// Build, sign and submit the account's `DEPLOY_ACCOUNT` transaction.
/// Returns the transaction hash reported by the node.
pub async fn submit_deploy_account(
    provider: &dyn ChainProvider,
    keypair: &StarkKeyPair,
    class_hash: Felt,
    constructor_calldata: Vec<Felt>,
    resource_bounds: ResourceBounds,
    chain_id: Felt,
) -> WalletResult<Felt> {
    let mut tx = DeployAccountTransactionV3::new(
        class_hash,
        keypair.public_key(),
        constructor_calldata,
        resource_bounds,
    );
    let local_hash = tx.sign(keypair, chain_id)?;
    log::info!(
        "Submitting account deployment for {}",
        felt_to_padded_hex(&tx.contract_address())
    );

    let submitted = provider.add_deploy_account_transaction(&tx).await?;
    if submitted.contract_address != tx.contract_address() {
        log::warn!(
            "Node reported deployed address {} but {} was expected",
            felt_to_padded_hex(&submitted.contract_address),
            felt_to_padded_hex(&tx.contract_address())
        );
    }
    if submitted.transaction_hash != local_hash {
        log::debug!("Node transaction hash differs from locally computed hash");
    }
    Ok(submitted.transaction_hash)
}

/// Build, sign and submit an `INVOKE` carrying `calls` from `account`.
pub async fn submit_invoke(
    provider: &dyn ChainProvider,
    keypair: &StarkKeyPair,
    account: &AccountHandle,
    calls: &[Call],
    resource_bounds: ResourceBounds,
) -> WalletResult<Felt> {
    let nonce = provider.get_nonce(account.address).await?;
    let mut tx = InvokeTransactionV3::new(account.address, calls, nonce, resource_bounds)?;
    tx.sign(keypair, account.chain_id)?;
    for call in calls {
        log::debug!("Invoking {:?}", call.describe());
    }
    provider.add_invoke_transaction(&tx).await
}

/// Poll the receipt until the transaction is included. A reverted
/// transaction is a classified failure; running out of time is a network
/// failure.
pub async fn wait_for_transaction(
    provider: &dyn ChainProvider,
    transaction_hash: Felt,
    poll_interval: Duration,
    timeout: Duration,
) -> WalletResult<TransactionReceipt> {
    let started = tokio::time::Instant::now();
    loop {
        if let Some(receipt) = provider.get_transaction_receipt(transaction_hash).await? {
            return match receipt.execution_status {
                ExecutionStatus::Succeeded => {
                    log::info!(
                        "Transaction {} included ({:?})",
                        felt_to_padded_hex(&transaction_hash),
                        receipt.finality_status
                    );
                    Ok(receipt)
                }
                ExecutionStatus::Reverted => {
                    let reason = receipt
                        .revert_reason
                        .clone()
                        .unwrap_or_else(|| "reverted".to_string());
                    log::warn!(
                        "Transaction {} reverted: {}",
                        felt_to_padded_hex(&transaction_hash),
                        reason
                    );
                    Err(WalletError::TransactionFailure {
                        kind: FailureKind::from_message(&reason),
                        detail: reason,
                    })
                }
            };
        }

        if started.elapsed() >= timeout {
            return Err(WalletError::NetworkFailure(format!(
                "Timed out after {:?} waiting for transaction {}",
                timeout,
                felt_to_padded_hex(&transaction_hash)
            )));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Whether any class is deployed at `address`.
pub async fn check_deployed_on_chain(
    provider: &dyn ChainProvider,
    address: Felt,
) -> WalletResult<bool> {
    Ok(provider.get_class_hash_at(address).await?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::primitives::{felt_from_hex, felt_to_biguint, felt_to_hex};
    use crate::crypto::{derive_account, verify_signature};
    use num_bigint::BigUint;
    use rand::Rng;
    use std::collections::HashSet;

    const MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn bounds() -> ResourceBounds {
        ResourceBounds {
            l1_gas: ResourceBound {
                max_amount: 100_000,
                max_price_per_unit: 0x5af3107a4000,
            },
            l2_gas: ResourceBound {
                max_amount: 0,
                max_price_per_unit: 0,
            },
        }
    }

    fn class_hash() -> Felt {
        felt_from_hex("0x061dac032f228abef9c6626f995015233097ae253a7f72d68552db02f2971b8f").unwrap()
    }

    fn sepolia() -> Felt {
        encode_short_string("SN_SEPOLIA").unwrap()
    }

    // Vector generated with cairo-lang's `calculate_contract_address_from_hash`.
    #[test]
    fn contract_address_matches_cairo_lang() {
        let address = compute_contract_address(
            felt_from_hex("0x0018a7a329d1d85b621350f2b5fc9c64b2e57dfe708525f0aff2c90de1e5b9c8")
                .unwrap(),
            felt_from_hex("0x0750cd490a7cd1572411169eaa8be292325990d33c5d4733655fe6b926985062")
                .unwrap(),
            &[Felt::ONE],
            Felt::ZERO,
        );
        assert_eq!(
            felt_to_hex(&address),
            "0xda27ef7c3869c3a6cc6a0f7bf07a51c3e590825adba8a51cae27d815839eec"
        );
    }

    #[test]
    fn invoke_hash_matches_known_vector() {
        let tx = InvokeTransactionV3 {
            sender_address: Felt::from(0x5a11ceu64),
            calldata: vec![
                Felt::ONE,
                Felt::from(0x1234u64),
                Felt::from(7u64),
                Felt::ONE,
                Felt::from(3u64),
            ],
            nonce: Felt::from(5u64),
            resource_bounds: bounds(),
            tip: 0,
            signature: Vec::new(),
        };
        assert_eq!(
            felt_to_hex(&tx.transaction_hash(sepolia()).unwrap()),
            "0x4aff165d181a9e697b104c08cb87557a8ff67c33ab25d3061be2a71ed6adf7"
        );
    }

    #[test]
    fn deploy_account_hash_matches_known_vector() {
        let tx = DeployAccountTransactionV3::new(
            felt_from_hex("0x0750cd490a7cd1572411169eaa8be292325990d33c5d4733655fe6b926985062")
                .unwrap(),
            felt_from_hex("0x0018a7a329d1d85b621350f2b5fc9c64b2e57dfe708525f0aff2c90de1e5b9c8")
                .unwrap(),
            vec![Felt::ONE],
            bounds(),
        );
        assert_eq!(
            felt_to_hex(&tx.contract_address()),
            "0xda27ef7c3869c3a6cc6a0f7bf07a51c3e590825adba8a51cae27d815839eec"
        );
        assert_eq!(
            felt_to_hex(&tx.transaction_hash(sepolia()).unwrap()),
            "0x501d9d4063858b3d5d9caaaf0edc5e29972f0fc8b30129bfa470669c84ae23"
        );
    }

    #[test]
    fn address_is_deterministic_and_sensitive() {
        let pk = Felt::from(0x1234u64);
        let a = compute_account_address(pk, class_hash(), &[pk]);
        let b = compute_account_address(pk, class_hash(), &[pk]);
        assert_eq!(a, b);

        let other_key = Felt::from(0x1235u64);
        assert_ne!(a, compute_account_address(other_key, class_hash(), &[other_key]));
        assert_ne!(a, compute_account_address(pk, Felt::from(1u64), &[pk]));
        assert_ne!(a, compute_account_address(pk, class_hash(), &[pk, Felt::ONE]));
    }

    #[test]
    fn addresses_do_not_collide_and_stay_in_range() {
        let bound = (BigUint::from(1u8) << 251u32) - BigUint::from(256u32);
        let mut rng = rand::thread_rng();
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let mut bytes = [0u8; 32];
            rng.fill(&mut bytes[1..]);
            let pk = Felt::from_bytes_be(&bytes);
            let address = compute_account_address(pk, class_hash(), &[pk]);
            assert!(felt_to_biguint(&address) < bound);
            assert!(seen.insert(address), "address collision");
        }
    }

    #[test]
    fn resource_bound_packing() {
        let packed = pack_resource_bound("L1_GAS", &bounds().l1_gas).unwrap();
        assert_eq!(
            felt_to_hex(&packed),
            "0x4c315f47415300000000000186a0000000000000000000005af3107a4000"
        );
        assert!(pack_resource_bound("L1_DATA_GAS", &bounds().l1_gas).is_err());
    }

    #[test]
    fn deploy_transaction_targets_counterfactual_address() {
        let keypair = derive_account(MNEMONIC).unwrap();
        let pk = keypair.public_key();
        let tx = DeployAccountTransactionV3::new(class_hash(), pk, vec![pk], bounds());
        assert_eq!(
            tx.contract_address(),
            compute_account_address(pk, class_hash(), &[pk])
        );
    }

    #[test]
    fn signed_transactions_verify() {
        let keypair = derive_account(MNEMONIC).unwrap();
        let pk = keypair.public_key();

        let mut deploy = DeployAccountTransactionV3::new(class_hash(), pk, vec![pk], bounds());
        let deploy_hash = deploy.sign(&keypair, sepolia()).unwrap();
        let signature = crate::crypto::StarkSignature {
            r: deploy.signature[0],
            s: deploy.signature[1],
        };
        assert!(verify_signature(&pk, &deploy_hash, &signature).unwrap());

        let address = deploy.contract_address();
        let calls = vec![Call::new(Felt::from(0x1234u64), "mint_pet", vec![Felt::ONE])];
        let mut invoke = InvokeTransactionV3::new(address, &calls, Felt::ONE, bounds()).unwrap();
        let invoke_hash = invoke.sign(&keypair, sepolia()).unwrap();
        assert_eq!(invoke.signature.len(), 2);
        assert_ne!(invoke_hash, deploy_hash);
    }

    #[test]
    fn transaction_hash_depends_on_chain_and_nonce() {
        let calls = vec![Call::new(Felt::from(0x1234u64), "mint_pet", vec![Felt::ONE])];
        let mainnet = encode_short_string("SN_MAIN").unwrap();
        let tx = InvokeTransactionV3::new(Felt::from(9u64), &calls, Felt::ZERO, bounds()).unwrap();
        let base = tx.transaction_hash(sepolia()).unwrap();
        assert_ne!(base, tx.transaction_hash(mainnet).unwrap());

        let mut next = tx.clone();
        next.nonce = Felt::ONE;
        assert_ne!(base, next.transaction_hash(sepolia()).unwrap());

        let mut pricier = tx;
        pricier.resource_bounds.l2_gas.max_amount += 1;
        assert_ne!(base, pricier.transaction_hash(sepolia()).unwrap());
    }
}
