//! Calldata builders for every game and token entrypoint the wallet uses.

use serde::Serialize;
use starknet_crypto::Felt;

use super::primitives::{
    encode_byte_array, encode_felt_array, felt_to_hex, selector_from_name, to_decimal_strings,
    U256,
};
use crate::crypto::StarkSignature;
use crate::errors::WalletResult;

pub const MINT_PET: &str = "mint_pet";
pub const GET_PETS_BY_OWNER: &str = "get_pets_by_owner";
pub const SCAN_AND_FEED_MEAL: &str = "scan_and_feed_meal";
pub const GET_MEALS_BY_PET: &str = "get_meals_by_pet";
pub const INITIATE_BATTLE_VS_COMPUTER: &str = "initiate_battle_vs_computer";
pub const EXECUTE_BATTLE_WITH_SESSION: &str = "execute_battle_with_session";
pub const GET_BATTLE: &str = "get_battle";
pub const GET_COMPUTER_OPPONENT: &str = "get_computer_opponent";
pub const CREATE_SESSION_KEY: &str = "create_session_key";
pub const BALANCE_OF: &str = "balance_of";

/// Session permission bit allowing battle actions only.
pub const PERMISSION_BATTLE: u64 = 0b1;
pub const DEFAULT_MAX_ENERGY_PER_BATTLE: u8 = 20;

/// A single contract invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub contract_address: Felt,
    pub entrypoint: &'static str,
    pub calldata: Vec<Felt>,
}

impl Call {
    pub fn new(contract_address: Felt, entrypoint: &'static str, calldata: Vec<Felt>) -> Self {
        Self {
            contract_address,
            entrypoint,
            calldata,
        }
    }

    pub fn selector(&self) -> WalletResult<Felt> {
        selector_from_name(self.entrypoint)
    }

    pub fn decimal_calldata(&self) -> Vec<String> {
        to_decimal_strings(&self.calldata)
    }

    pub fn describe(&self) -> CallSummary {
        CallSummary {
            contract_address: felt_to_hex(&self.contract_address),
            entrypoint: self.entrypoint.to_string(),
            calldata: self.decimal_calldata(),
        }
    }
}

/// Printable form of a call, for logs and host display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSummary {
    pub contract_address: String,
    pub entrypoint: String,
    pub calldata: Vec<String>,
}

/// Cairo 1 account `__execute__` calldata:
/// `[n_calls, (to, selector, calldata_len, calldata..)*]`.
pub fn encode_multicall(calls: &[Call]) -> WalletResult<Vec<Felt>> {
    let mut out = vec![Felt::from(calls.len() as u64)];
    for call in calls {
        out.push(call.contract_address);
        out.push(call.selector()?);
        out.extend(encode_felt_array(&call.calldata));
    }
    Ok(out)
}

/// Nutrition values produced by the food classifier for one meal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct NutritionAnalysis {
    pub calories: u16,
    pub protein: u8,
    pub carbs: u8,
    pub fats: u8,
    pub vitamins: u8,
    pub minerals: u8,
    pub fiber: u8,
}

pub fn mint_pet(species: u8) -> Vec<Felt> {
    vec![Felt::from(species)]
}

pub fn get_pets_by_owner(owner: Felt) -> Vec<Felt> {
    vec![owner]
}

pub fn scan_and_feed_meal(
    pet_id: U256,
    meal_hash: Felt,
    nutrition: &NutritionAnalysis,
    ipfs_uri: &str,
) -> Vec<Felt> {
    let mut calldata = Vec::with_capacity(13);
    calldata.extend(pet_id.to_felts());
    calldata.push(meal_hash);
    calldata.push(Felt::from(nutrition.calories));
    calldata.extend(
        [
            nutrition.protein,
            nutrition.carbs,
            nutrition.fats,
            nutrition.vitamins,
            nutrition.minerals,
            nutrition.fiber,
        ]
        .into_iter()
        .map(Felt::from),
    );
    calldata.extend(encode_byte_array(ipfs_uri));
    calldata
}

pub fn get_meals_by_pet(pet_id: U256) -> Vec<Felt> {
    pet_id.to_felts().to_vec()
}

pub fn initiate_battle_vs_computer(pet_id: U256, opponent_id: u64) -> Vec<Felt> {
    let mut calldata = pet_id.to_felts().to_vec();
    calldata.push(Felt::from(opponent_id));
    calldata
}

/// Hash the session key signs for one battle move:
/// `poseidon(battle_id, cards_len, cards..)`.
pub fn battle_move_hash(battle_id: u64, card_indices: &[u8]) -> Felt {
    let mut payload = vec![Felt::from(battle_id)];
    payload.extend(encode_felt_array(&cards_to_felts(card_indices)));
    starknet_crypto::poseidon_hash_many(&payload)
}

/// `session_sig` is `[session_public_key, r, s]`.
pub fn execute_battle_with_session(
    battle_id: u64,
    card_indices: &[u8],
    session_public_key: Felt,
    signature: &StarkSignature,
) -> Vec<Felt> {
    let mut calldata = vec![Felt::from(battle_id)];
    calldata.extend(encode_felt_array(&cards_to_felts(card_indices)));
    calldata.extend(encode_felt_array(&[
        session_public_key,
        signature.r,
        signature.s,
    ]));
    calldata
}

fn cards_to_felts(card_indices: &[u8]) -> Vec<Felt> {
    card_indices.iter().map(|c| Felt::from(*c)).collect()
}

pub fn get_battle(battle_id: u64) -> Vec<Felt> {
    vec![Felt::from(battle_id)]
}

pub fn get_computer_opponent(opponent_id: u64) -> Vec<Felt> {
    vec![Felt::from(opponent_id)]
}

/// Session registration arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct SessionLimits {
    pub permissions: u64,
    pub duration_hours: u32,
    pub max_battles: u32,
    pub max_energy_per_battle: u8,
}

impl SessionLimits {
    pub fn battle_only(duration_hours: u32, max_battles: u32) -> Self {
        Self {
            permissions: PERMISSION_BATTLE,
            duration_hours,
            max_battles,
            max_energy_per_battle: DEFAULT_MAX_ENERGY_PER_BATTLE,
        }
    }
}

pub fn create_session_key(session_public_key: Felt, limits: &SessionLimits) -> Vec<Felt> {
    vec![
        session_public_key,
        Felt::from(limits.permissions),
        Felt::from(limits.duration_hours),
        Felt::from(limits.max_battles),
        Felt::from(limits.max_energy_per_battle),
    ]
}

pub fn balance_of(account: Felt) -> Vec<Felt> {
    vec![account]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::primitives::{felt_from_hex, felt_to_decimal};

    fn sample_nutrition() -> NutritionAnalysis {
        NutritionAnalysis {
            calories: 180,
            protein: 5,
            carbs: 80,
            fats: 15,
            vitamins: 5,
            minerals: 10,
            fiber: 2,
        }
    }

    #[test]
    fn feed_calldata_layout() {
        let meal_hash = felt_from_hex("0xdeadbeef").unwrap();
        let calldata = scan_and_feed_meal(
            U256::from(1u64),
            meal_hash,
            &sample_nutrition(),
            "ipfs://meal",
        );
        let strings = to_decimal_strings(&calldata);
        let expected_hash = felt_to_decimal(&meal_hash);
        assert_eq!(
            &strings[..10],
            &["1", "0", expected_hash.as_str(), "180", "5", "80", "15", "5", "10", "2"]
        );
        assert_eq!(&calldata[10..], encode_byte_array("ipfs://meal").as_slice());
    }

    #[test]
    fn multicall_layout() {
        let game = Felt::from(0x1234u64);
        let calls = vec![
            Call::new(game, MINT_PET, mint_pet(3)),
            Call::new(game, GET_BATTLE, get_battle(8)),
        ];
        let encoded = encode_multicall(&calls).unwrap();
        assert_eq!(encoded[0], Felt::from(2u64));
        assert_eq!(encoded[1], game);
        assert_eq!(encoded[2], selector_from_name("mint_pet").unwrap());
        assert_eq!(encoded[3], Felt::ONE);
        assert_eq!(encoded[4], Felt::from(3u64));
        assert_eq!(encoded.len(), 1 + 4 + 4);
    }

    #[test]
    fn battle_calldata_carries_session_signature() {
        let signature = StarkSignature {
            r: Felt::from(11u64),
            s: Felt::from(22u64),
        };
        let calldata = execute_battle_with_session(5, &[0, 2], Felt::from(99u64), &signature);
        assert_eq!(
            to_decimal_strings(&calldata),
            vec!["5", "2", "0", "2", "3", "99", "11", "22"]
        );
    }

    #[test]
    fn battle_hash_depends_on_cards() {
        assert_ne!(battle_move_hash(1, &[0, 1]), battle_move_hash(1, &[1, 0]));
        assert_ne!(battle_move_hash(1, &[0]), battle_move_hash(2, &[0]));
    }

    #[test]
    fn session_registration_uses_battle_permission() {
        let limits = SessionLimits::battle_only(24, 10);
        let calldata = create_session_key(Felt::from(7u64), &limits);
        assert_eq!(
            to_decimal_strings(&calldata),
            vec!["7", "1", "24", "10", "20"]
        );
    }

    #[test]
    fn call_summary_renders_decimal_calldata() {
        let call = Call::new(
            Felt::from(0x1234u64),
            INITIATE_BATTLE_VS_COMPUTER,
            initiate_battle_vs_computer(U256::from_limbs(4, 1), 3),
        );
        let summary = call.describe();
        assert_eq!(summary.contract_address, "0x1234");
        assert_eq!(summary.calldata, vec!["4", "1", "3"]);
    }
}
