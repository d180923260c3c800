//! Pet game contract operations on top of the wallet account.

use secrecy::SecretString;
use starknet_crypto::Felt;

use crate::app_state::WalletContext;
use crate::blockchain_client::TransactionReceipt;
use crate::codec::calls::{
    self, Call, NutritionAnalysis, GET_BATTLE, GET_COMPUTER_OPPONENT, GET_MEALS_BY_PET,
    GET_PETS_BY_OWNER, INITIATE_BATTLE_VS_COMPUTER, MINT_PET, SCAN_AND_FEED_MEAL,
};
use crate::codec::primitives::U256;
use crate::codec::records::{
    decode_battle, decode_computer_opponent, decode_first_pet, decode_meals, decode_pets,
    BattleRecord, ComputerOpponentRecord, MealRecord, PetRecord,
};
use crate::errors::WalletResult;

impl WalletContext {
    fn game_call(&self, entrypoint: &'static str, calldata: Vec<Felt>) -> WalletResult<Call> {
        Ok(Call::new(self.game_contract()?, entrypoint, calldata))
    }

    /// Mint a pet of `species` and remember locally that the wallet minted.
    pub async fn mint_pet(
        &self,
        species: u8,
        pin: Option<&SecretString>,
    ) -> WalletResult<TransactionReceipt> {
        self.validator().validate_species(species)?;
        let call = self.game_call(MINT_PET, calls::mint_pet(species))?;
        let receipt = self.execute(&[call], pin).await?;

        let mut record = self.load_record()?;
        record.mark_minted(self.store())?;
        log::info!("Minted pet of species {}", species);
        Ok(receipt)
    }

    /// First pet owned by the wallet account.
    pub async fn get_pet(&self) -> WalletResult<Option<PetRecord>> {
        let response = self.pets_response().await?;
        Ok(decode_first_pet(&response))
    }

    pub async fn get_pets(&self) -> WalletResult<Vec<PetRecord>> {
        let response = self.pets_response().await?;
        Ok(decode_pets(&response).unwrap_or_default())
    }

    async fn pets_response(&self) -> WalletResult<Vec<Felt>> {
        let owner = self.load_record()?.contract_address;
        let call = self.game_call(GET_PETS_BY_OWNER, calls::get_pets_by_owner(owner))?;
        self.view(&call).await
    }

    /// Record a scanned meal for `pet_id`. Nothing is updated locally; the
    /// pet's new stats are read back from chain.
    pub async fn feed_pet(
        &self,
        pet_id: U256,
        meal_hash: Felt,
        nutrition: &NutritionAnalysis,
        image_uri: &str,
        pin: Option<&SecretString>,
    ) -> WalletResult<TransactionReceipt> {
        self.validator().validate_nutrition(nutrition)?;
        self.validator().validate_image_uri(image_uri)?;

        let call = self.game_call(
            SCAN_AND_FEED_MEAL,
            calls::scan_and_feed_meal(pet_id, meal_hash, nutrition, image_uri),
        )?;
        log::debug!("Feeding pet {} ({} kcal)", pet_id, nutrition.calories);
        self.execute(&[call], pin).await
    }

    pub async fn get_meals(&self, pet_id: U256) -> WalletResult<Vec<MealRecord>> {
        let call = self.game_call(GET_MEALS_BY_PET, calls::get_meals_by_pet(pet_id))?;
        let response = self.view(&call).await?;
        Ok(decode_meals(&response).unwrap_or_default())
    }

    pub async fn initiate_battle(
        &self,
        pet_id: U256,
        opponent_id: u64,
        pin: Option<&SecretString>,
    ) -> WalletResult<TransactionReceipt> {
        let call = self.game_call(
            INITIATE_BATTLE_VS_COMPUTER,
            calls::initiate_battle_vs_computer(pet_id, opponent_id),
        )?;
        log::info!("Starting battle: pet {} vs opponent {}", pet_id, opponent_id);
        self.execute(&[call], pin).await
    }

    pub async fn get_battle(&self, battle_id: u64) -> WalletResult<Option<BattleRecord>> {
        let call = self.game_call(GET_BATTLE, calls::get_battle(battle_id))?;
        let response = self.view(&call).await?;
        Ok(decode_battle(&response))
    }

    pub async fn get_computer_opponent(
        &self,
        opponent_id: u64,
    ) -> WalletResult<Option<ComputerOpponentRecord>> {
        let call = self.game_call(
            GET_COMPUTER_OPPONENT,
            calls::get_computer_opponent(opponent_id),
        )?;
        let response = self.view(&call).await?;
        Ok(decode_computer_opponent(&response))
    }
}
