pub mod calls;
pub mod primitives;
pub mod records;

pub use calls::{Call, CallSummary, NutritionAnalysis, SessionLimits};
pub use primitives::{
    decode_byte_array, decode_short_string, encode_byte_array, encode_short_string,
    felt_from_hex, felt_to_hex, selector_from_name, to_decimal_strings, U256,
};
pub use records::{
    BattleRecord, BattleStatus, BattleWinner, ComputerOpponentRecord, MealRecord, PetRecord,
};
