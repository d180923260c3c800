use crate::codec::calls::NutritionAnalysis;
use crate::codec::records::pet_species_name;
use crate::codec::records::UNKNOWN_SPECIES;
use crate::errors::{WalletError, WalletResult};
use regex::Regex;

pub const MAX_CALORIES: u16 = 10_000;
pub const MAX_NUTRIENT_SCORE: u8 = 100;
pub const MAX_CARDS_PER_MOVE: usize = 5;
pub const MAX_URI_LENGTH: usize = 512;
pub const MAX_SESSION_HOURS: u32 = 24 * 7;
pub const MAX_SESSION_BATTLES: u32 = 1_000;

/// Input validation for values that end up in calldata or storage.
///
/// Out-of-range values are rejected, never clamped.
pub struct InputValidator {
    pin_pattern: Regex,
    uri_pattern: Regex,
    mnemonic_pattern: Regex,

    malicious_patterns: Vec<Regex>,
}

impl InputValidator {
    pub fn new() -> WalletResult<Self> {
        let pin_pattern = Regex::new(r"^\d{4,8}$")
            .map_err(|e| WalletError::ValidationError(format!("Invalid PIN regex: {}", e)))?;

        let uri_pattern = Regex::new(r"^(ipfs://|https://|http://)[\x21-\x7E]+$")
            .map_err(|e| WalletError::ValidationError(format!("Invalid URI regex: {}", e)))?;

        let mnemonic_pattern = Regex::new(r"^[a-z]+( [a-z]+)*$").map_err(|e| {
            WalletError::ValidationError(format!("Invalid mnemonic regex: {}", e))
        })?;

        let malicious_patterns = [
            r"<script",
            r"javascript:",
            r"data:text/html",
            r"vbscript:",
            r"onload=",
            r"onerror=",
        ]
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| {
                WalletError::ValidationError(format!("Invalid security regex: {}", e))
            })
        })
        .collect::<WalletResult<Vec<_>>>()?;

        Ok(InputValidator {
            pin_pattern,
            uri_pattern,
            mnemonic_pattern,
            malicious_patterns,
        })
    }

    /// PINs are 4 to 8 digits.
    pub fn validate_pin(&self, pin: &str) -> WalletResult<()> {
        if pin.is_empty() {
            return Err(WalletError::ValidationError("PIN cannot be empty".to_string()));
        }
        if !self.pin_pattern.is_match(pin) {
            return Err(WalletError::ValidationError(
                "PIN must be 4 to 8 digits".to_string(),
            ));
        }
        Ok(())
    }

    /// Shape check only; the BIP-39 checksum is verified during derivation.
    pub fn validate_mnemonic_format(&self, mnemonic: &str) -> WalletResult<()> {
        let words = mnemonic.split_whitespace().count();
        if ![12, 15, 18, 21, 24].contains(&words) {
            return Err(WalletError::ValidationError(format!(
                "Recovery phrase must have 12, 15, 18, 21 or 24 words, got {}",
                words
            )));
        }
        let normalized = mnemonic.split_whitespace().collect::<Vec<_>>().join(" ");
        if !self.mnemonic_pattern.is_match(&normalized.to_lowercase()) {
            return Err(WalletError::ValidationError(
                "Recovery phrase contains invalid characters".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_species(&self, species: u8) -> WalletResult<()> {
        if pet_species_name(species) == UNKNOWN_SPECIES {
            return Err(WalletError::ValidationError(format!(
                "Unknown pet species {}",
                species
            )));
        }
        Ok(())
    }

    pub fn validate_nutrition(&self, nutrition: &NutritionAnalysis) -> WalletResult<()> {
        if nutrition.calories > MAX_CALORIES {
            return Err(WalletError::ValidationError(format!(
                "Calories {} exceed the maximum of {}",
                nutrition.calories, MAX_CALORIES
            )));
        }

        let scores = [
            ("protein", nutrition.protein),
            ("carbs", nutrition.carbs),
            ("fats", nutrition.fats),
            ("vitamins", nutrition.vitamins),
            ("minerals", nutrition.minerals),
            ("fiber", nutrition.fiber),
        ];
        for (name, value) in scores {
            if value > MAX_NUTRIENT_SCORE {
                return Err(WalletError::ValidationError(format!(
                    "{} score {} exceeds {}",
                    name, value, MAX_NUTRIENT_SCORE
                )));
            }
        }
        Ok(())
    }

    /// Meal image URI as returned by the upload step.
    pub fn validate_image_uri(&self, uri: &str) -> WalletResult<()> {
        self.check_basic_security(uri)?;

        if uri.is_empty() {
            return Err(WalletError::ValidationError(
                "Image URI cannot be empty".to_string(),
            ));
        }
        if uri.len() > MAX_URI_LENGTH {
            return Err(WalletError::ValidationError("Image URI too long".to_string()));
        }
        if !self.uri_pattern.is_match(uri) {
            return Err(WalletError::ValidationError(
                "Image URI format is invalid".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_card_indices(&self, cards: &[u8]) -> WalletResult<()> {
        if cards.is_empty() {
            return Err(WalletError::ValidationError(
                "A battle move needs at least one card".to_string(),
            ));
        }
        if cards.len() > MAX_CARDS_PER_MOVE {
            return Err(WalletError::ValidationError(format!(
                "At most {} cards can be played per move",
                MAX_CARDS_PER_MOVE
            )));
        }
        Ok(())
    }

    pub fn validate_session_limits(
        &self,
        duration_hours: u32,
        max_battles: u32,
    ) -> WalletResult<()> {
        if duration_hours == 0 || duration_hours > MAX_SESSION_HOURS {
            return Err(WalletError::ValidationError(format!(
                "Session duration must be between 1 and {} hours",
                MAX_SESSION_HOURS
            )));
        }
        if max_battles == 0 || max_battles > MAX_SESSION_BATTLES {
            return Err(WalletError::ValidationError(format!(
                "Session battle limit must be between 1 and {}",
                MAX_SESSION_BATTLES
            )));
        }
        Ok(())
    }

    fn check_basic_security(&self, input: &str) -> WalletResult<()> {
        if input.len() > 1000 {
            return Err(WalletError::ValidationError("Input too long".to_string()));
        }

        let lowered = input.to_lowercase();
        for pattern in &self.malicious_patterns {
            if pattern.is_match(&lowered) {
                return Err(WalletError::ValidationError(
                    "Input contains potentially malicious content".to_string(),
                ));
            }
        }

        Ok(())
    }
}
