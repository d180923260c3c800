//! Typed views over felt arrays returned by the game contract.
//!
//! Decoding is tolerant: a response shorter than a record's minimum length
//! yields `None`, and a single malformed field falls back to its default
//! instead of failing the whole record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use starknet_crypto::Felt;

use super::primitives::{
    byte_array_span, decode_byte_array, decode_short_string, felt_to_hex, felt_to_u16,
    felt_to_u32, felt_to_u64, felt_to_u8, U256,
};

pub const PET_FELTS: usize = 10;
pub const MEAL_FIXED_FELTS: usize = 11;
/// Empty ByteArray: word count, pending word, pending length.
pub const BYTE_ARRAY_MIN_FELTS: usize = 3;
pub const OPPONENT_FELTS: usize = 4;
pub const BATTLE_FIXED_FELTS: usize = 10;

pub const UNKNOWN_SPECIES: &str = "Unknown";

const PET_SPECIES: [(u8, &str); 4] = [(1, "Cat"), (2, "Dog"), (3, "Bunny"), (4, "Dragon")];
const OPPONENT_SPECIES: [(u8, &str); 3] = [
    (1, "Junk Food Goblin"),
    (2, "Sugar Slime"),
    (3, "Greasy Golem"),
];

pub fn pet_species_name(species: u8) -> &'static str {
    lookup_species(&PET_SPECIES, species)
}

pub fn opponent_species_name(species: u8) -> &'static str {
    lookup_species(&OPPONENT_SPECIES, species)
}

fn lookup_species(table: &[(u8, &'static str)], species: u8) -> &'static str {
    table
        .iter()
        .find(|(id, _)| *id == species)
        .map(|(_, name)| *name)
        .unwrap_or(UNKNOWN_SPECIES)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetRecord {
    pub id: U256,
    pub species: u8,
    pub level: u32,
    pub experience: U256,
    pub health: u8,
    pub energy: u8,
    pub nutrition_score: U256,
}

impl PetRecord {
    pub fn species_name(&self) -> &'static str {
        pet_species_name(self.species)
    }

    fn decode(felts: &[Felt]) -> Self {
        Self {
            id: u256_field(felts, 0, "pet.id"),
            species: u8_field(felts, 2, "pet.species"),
            level: u32_field(felts, 3, "pet.level"),
            experience: u256_field(felts, 4, "pet.experience"),
            health: u8_field(felts, 6, "pet.health"),
            energy: u8_field(felts, 7, "pet.energy"),
            nutrition_score: u256_field(felts, 8, "pet.nutrition_score"),
        }
    }
}

/// Decode `get_pets_by_owner`. Returns `None` when the response cannot hold
/// a single pet.
pub fn decode_pets(response: &[Felt]) -> Option<Vec<PetRecord>> {
    if response.len() < 1 + PET_FELTS {
        return None;
    }
    let declared = felt_to_u64(&response[0]).unwrap_or(0) as usize;
    let body = &response[1..];
    let available = body.len() / PET_FELTS;
    if declared > available {
        log::warn!(
            "Pet list declares {} entries but only {} are present",
            declared,
            available
        );
    }

    let pets = body
        .chunks_exact(PET_FELTS)
        .take(declared.min(available))
        .map(PetRecord::decode)
        .collect::<Vec<_>>();
    if pets.is_empty() {
        None
    } else {
        Some(pets)
    }
}

/// First pet of a `get_pets_by_owner` response.
pub fn decode_first_pet(response: &[Felt]) -> Option<PetRecord> {
    decode_pets(response).and_then(|pets| pets.into_iter().next())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealRecord {
    pub meal_id: U256,
    /// `0x` hex of the meal hash felt.
    pub meal_hash: String,
    pub calories: u16,
    pub protein: u8,
    pub carbs: u8,
    pub fats: u8,
    pub vitamins: u8,
    pub minerals: u8,
    pub fiber: u8,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub ipfs_uri: String,
}

impl MealRecord {
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.timestamp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// Decode one meal starting at `felts[0]`, returning the record and the
    /// number of felts consumed.
    fn decode(felts: &[Felt]) -> Option<(Self, usize)> {
        if felts.len() < MEAL_FIXED_FELTS + BYTE_ARRAY_MIN_FELTS {
            return None;
        }
        let (ipfs_uri, uri_len) = decode_uri(&felts[MEAL_FIXED_FELTS..])?;
        let meal = Self {
            meal_id: u256_field(felts, 0, "meal.meal_id"),
            meal_hash: felt_to_hex(&felts[2]),
            calories: u16_field(felts, 3, "meal.calories"),
            protein: u8_field(felts, 4, "meal.protein"),
            carbs: u8_field(felts, 5, "meal.carbs"),
            fats: u8_field(felts, 6, "meal.fats"),
            vitamins: u8_field(felts, 7, "meal.vitamins"),
            minerals: u8_field(felts, 8, "meal.minerals"),
            fiber: u8_field(felts, 9, "meal.fiber"),
            timestamp: felt_to_u64(&felts[10]).unwrap_or_else(|| {
                log::warn!("meal.timestamp out of range, using 0");
                0
            }),
            ipfs_uri,
        };
        Some((meal, MEAL_FIXED_FELTS + uri_len))
    }
}

/// Decode `get_meals_by_pet`. Meals are variable width because of the URI,
/// so decoding stops at the first meal that does not fit.
pub fn decode_meals(response: &[Felt]) -> Option<Vec<MealRecord>> {
    if response.len() < 1 + MEAL_FIXED_FELTS + BYTE_ARRAY_MIN_FELTS {
        return None;
    }
    let declared = felt_to_u64(&response[0]).unwrap_or(0) as usize;
    let mut meals = Vec::with_capacity(declared.min(64));
    let mut offset = 1;
    while meals.len() < declared {
        match MealRecord::decode(&response[offset..]) {
            Some((meal, consumed)) => {
                meals.push(meal);
                offset += consumed;
            }
            None => {
                log::warn!(
                    "Meal list truncated after {} of {} entries",
                    meals.len(),
                    declared
                );
                break;
            }
        }
    }
    if meals.is_empty() {
        None
    } else {
        Some(meals)
    }
}

/// Decode a URI stored as a ByteArray. A malformed array degrades to `""`
/// so the rest of the meal still decodes. Returns `None` only if the array
/// itself is truncated.
fn decode_uri(felts: &[Felt]) -> Option<(String, usize)> {
    let consumed = byte_array_span(felts)?;
    match decode_byte_array(felts) {
        Ok(decoded) => Some((decoded.value, decoded.consumed)),
        Err(e) => {
            log::warn!("Meal URI is malformed: {}", e);
            Some((String::new(), consumed))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputerOpponentRecord {
    pub id: u64,
    pub species: u8,
    pub level: u32,
    pub health: u8,
}

impl ComputerOpponentRecord {
    pub fn species_name(&self) -> &'static str {
        opponent_species_name(self.species)
    }
}

pub fn decode_computer_opponent(response: &[Felt]) -> Option<ComputerOpponentRecord> {
    if response.len() < OPPONENT_FELTS {
        return None;
    }
    Some(ComputerOpponentRecord {
        id: u64_field(response, 0, "opponent.id"),
        species: u8_field(response, 1, "opponent.species"),
        level: u32_field(response, 2, "opponent.level"),
        health: u8_field(response, 3, "opponent.health"),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleStatus {
    Pending,
    InProgress,
    Finished,
    Unknown(u8),
}

impl BattleStatus {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => BattleStatus::Pending,
            1 => BattleStatus::InProgress,
            2 => BattleStatus::Finished,
            other => BattleStatus::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleWinner {
    Undecided,
    Pet,
    Opponent,
}

impl BattleWinner {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => BattleWinner::Pet,
            2 => BattleWinner::Opponent,
            _ => BattleWinner::Undecided,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleRecord {
    pub battle_id: u64,
    pub pet_id: U256,
    pub opponent_id: u64,
    pub status: BattleStatus,
    pub winner: BattleWinner,
    pub turn: u32,
    pub pet_health: u8,
    pub opponent_health: u8,
    pub log: Vec<String>,
}

impl BattleRecord {
    pub fn is_finished(&self) -> bool {
        self.status == BattleStatus::Finished
    }
}

pub fn decode_battle(response: &[Felt]) -> Option<BattleRecord> {
    if response.len() < BATTLE_FIXED_FELTS {
        return None;
    }
    let declared = felt_to_u64(&response[9]).unwrap_or(0) as usize;
    let entries = &response[BATTLE_FIXED_FELTS..];
    if declared > entries.len() {
        log::warn!(
            "Battle log declares {} entries but only {} are present",
            declared,
            entries.len()
        );
    }
    let log = entries
        .iter()
        .take(declared)
        .map(|entry| {
            decode_short_string(entry).unwrap_or_else(|e| {
                log::warn!("Unreadable battle log entry: {}", e);
                String::new()
            })
        })
        .collect();

    Some(BattleRecord {
        battle_id: u64_field(response, 0, "battle.battle_id"),
        pet_id: u256_field(response, 1, "battle.pet_id"),
        opponent_id: u64_field(response, 3, "battle.opponent_id"),
        status: BattleStatus::from_code(u8_field(response, 4, "battle.status")),
        winner: BattleWinner::from_code(u8_field(response, 5, "battle.winner")),
        turn: u32_field(response, 6, "battle.turn"),
        pet_health: u8_field(response, 7, "battle.pet_health"),
        opponent_health: u8_field(response, 8, "battle.opponent_health"),
        log,
    })
}

/// ERC-20 `balance_of` result.
pub fn decode_balance(response: &[Felt]) -> Option<U256> {
    if response.len() < 2 {
        return None;
    }
    U256::from_felts(&response[0], &response[1]).ok()
}

fn u256_field(felts: &[Felt], offset: usize, name: &str) -> U256 {
    U256::from_felts(&felts[offset], &felts[offset + 1]).unwrap_or_else(|e| {
        log::warn!("{} could not be decoded ({}), using 0", name, e);
        U256::ZERO
    })
}

fn u8_field(felts: &[Felt], offset: usize, name: &str) -> u8 {
    felt_to_u8(&felts[offset]).unwrap_or_else(|| {
        log::warn!("{} out of range, using 0", name);
        0
    })
}

fn u16_field(felts: &[Felt], offset: usize, name: &str) -> u16 {
    felt_to_u16(&felts[offset]).unwrap_or_else(|| {
        log::warn!("{} out of range, using 0", name);
        0
    })
}

fn u32_field(felts: &[Felt], offset: usize, name: &str) -> u32 {
    felt_to_u32(&felts[offset]).unwrap_or_else(|| {
        log::warn!("{} out of range, using 0", name);
        0
    })
}

fn u64_field(felts: &[Felt], offset: usize, name: &str) -> u64 {
    felt_to_u64(&felts[offset]).unwrap_or_else(|| {
        log::warn!("{} out of range, using 0", name);
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::primitives::{encode_byte_array, encode_short_string};

    fn felts(values: &[u64]) -> Vec<Felt> {
        values.iter().map(|v| Felt::from(*v)).collect()
    }

    #[test]
    fn short_pet_response_is_none() {
        assert_eq!(decode_first_pet(&felts(&[1, 7, 0, 2, 3])), None);
        assert_eq!(decode_pets(&[]), None);
        assert_eq!(decode_pets(&felts(&[0])), None);
    }

    #[test]
    fn decodes_single_pet() {
        let response = felts(&[1, 7, 0, 2, 3, 150, 0, 90, 60, 42, 0]);
        let pet = decode_first_pet(&response).unwrap();
        assert_eq!(pet.id, U256::from(7u64));
        assert_eq!(pet.species, 2);
        assert_eq!(pet.species_name(), "Dog");
        assert_eq!(pet.level, 3);
        assert_eq!(pet.experience, U256::from(150u64));
        assert_eq!(pet.health, 90);
        assert_eq!(pet.energy, 60);
        assert_eq!(pet.nutrition_score, U256::from(42u64));
    }

    #[test]
    fn multiple_pets_respect_declared_length() {
        let mut response = felts(&[2]);
        response.extend(felts(&[1, 0, 1, 1, 0, 0, 100, 100, 0, 0]));
        response.extend(felts(&[2, 0, 4, 9, 10, 0, 80, 50, 5, 0]));
        let pets = decode_pets(&response).unwrap();
        assert_eq!(pets.len(), 2);
        assert_eq!(pets[1].species_name(), "Dragon");

        // Declared more than present: only complete records are returned.
        response[0] = Felt::from(5u64);
        assert_eq!(decode_pets(&response).unwrap().len(), 2);
    }

    #[test]
    fn out_of_range_field_degrades_to_default() {
        let mut response = felts(&[1, 7, 0, 2, 3, 150, 0, 90, 60, 42, 0]);
        response[7] = Felt::from(1000u64);
        let pet = decode_first_pet(&response).unwrap();
        assert_eq!(pet.health, 0);
        assert_eq!(pet.energy, 60);
    }

    #[test]
    fn unknown_species_names() {
        assert_eq!(pet_species_name(0), UNKNOWN_SPECIES);
        assert_eq!(pet_species_name(5), UNKNOWN_SPECIES);
        assert_eq!(opponent_species_name(3), "Greasy Golem");
        assert_eq!(opponent_species_name(4), UNKNOWN_SPECIES);
    }

    fn meal_felts(meal_id: u64, uri: &str) -> Vec<Felt> {
        let mut out = felts(&[meal_id, 0, 0xabc, 180, 5, 80, 15, 5, 10, 2, 1_700_000_000]);
        out.extend(encode_byte_array(uri));
        out
    }

    #[test]
    fn decodes_meals_with_variable_uris() {
        let long_uri = "ipfs://bafkreihdwdcefgh4dqkjv67uzcmw7ojee6xedzdetojuzjevtenxquvyku";
        let mut response = felts(&[2]);
        response.extend(meal_felts(1, "ipfs://a"));
        response.extend(meal_felts(2, long_uri));

        let meals = decode_meals(&response).unwrap();
        assert_eq!(meals.len(), 2);
        assert_eq!(meals[0].ipfs_uri, "ipfs://a");
        assert_eq!(meals[0].calories, 180);
        assert_eq!(meals[0].meal_hash, "0xabc");
        assert_eq!(meals[1].meal_id, U256::from(2u64));
        assert_eq!(meals[1].ipfs_uri, long_uri);
        assert_eq!(meals[0].recorded_at().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn short_meal_response_is_none() {
        let response = meal_felts(1, "ipfs://a");
        assert_eq!(decode_meals(&response[..5]), None);
        assert_eq!(decode_meals(&felts(&[0])), None);
    }

    #[test]
    fn malformed_uri_degrades_to_empty() {
        let mut response = felts(&[1]);
        let mut meal = meal_felts(1, &"z".repeat(40));
        // Replace the first full word with a value wider than 31 bytes.
        meal[MEAL_FIXED_FELTS + 1] = Felt::MAX;
        response.extend(meal);
        let meals = decode_meals(&response).unwrap();
        assert_eq!(meals[0].ipfs_uri, "");
        assert_eq!(meals[0].calories, 180);
    }

    #[test]
    fn uri_with_character_split_across_words() {
        let uri = format!("ipfs://{}\u{e9}/meal.png", "b".repeat(23));
        let mut response = felts(&[2]);
        response.extend(meal_felts(1, &uri));
        response.extend(meal_felts(2, "ipfs://c"));
        let meals = decode_meals(&response).unwrap();
        assert_eq!(meals[0].ipfs_uri, uri);
        assert_eq!(meals[1].ipfs_uri, "ipfs://c");
    }

    #[test]
    fn decodes_opponent() {
        assert_eq!(decode_computer_opponent(&felts(&[1, 2, 3])), None);
        let opponent = decode_computer_opponent(&felts(&[4, 2, 5, 120])).unwrap();
        assert_eq!(opponent.id, 4);
        assert_eq!(opponent.species_name(), "Sugar Slime");
        assert_eq!(opponent.level, 5);
        assert_eq!(opponent.health, 120);
    }

    #[test]
    fn decodes_battle_with_log() {
        let mut response = felts(&[9, 7, 0, 2, 2, 1, 4, 55, 0, 2]);
        response.push(encode_short_string("pet attacks").unwrap());
        response.push(encode_short_string("goblin faints").unwrap());
        let battle = decode_battle(&response).unwrap();
        assert_eq!(battle.battle_id, 9);
        assert_eq!(battle.pet_id, U256::from(7u64));
        assert!(battle.is_finished());
        assert_eq!(battle.winner, BattleWinner::Pet);
        assert_eq!(battle.log, vec!["pet attacks", "goblin faints"]);

        assert_eq!(decode_battle(&response[..9]), None);
    }

    #[test]
    fn balance_needs_two_limbs() {
        assert_eq!(decode_balance(&felts(&[5])), None);
        assert_eq!(decode_balance(&felts(&[5, 1])), Some(U256::from_limbs(5, 1)));
    }
}
