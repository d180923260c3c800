//! Battle session keys: registration on the game contract and session-signed moves.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::app_state::WalletContext;
use crate::codec::calls::{
    self, battle_move_hash, Call, SessionLimits, CREATE_SESSION_KEY, EXECUTE_BATTLE_WITH_SESSION,
};
use crate::codec::primitives::{felt_from_hex, felt_to_padded_hex};
use crate::codec::records::BattleRecord;
use crate::crypto::{generate_session_keypair, StarkKeyPair};
use crate::errors::{WalletError, WalletResult};
use crate::storage::{keys, SecureStore};

/// Result of a battle move sent through the session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BattleMoveOutcome {
    pub transaction_hash: String,
    /// Battle state read after inclusion, if the read succeeded.
    pub battle: Option<BattleRecord>,
}

impl WalletContext {
    /// Register a fresh battle-only session key on the game contract. The
    /// key is stored only once the registration is included.
    pub async fn create_session_key(
        &self,
        duration_hours: u32,
        max_battles: u32,
        pin: Option<&SecretString>,
    ) -> WalletResult<bool> {
        self.validator()
            .validate_session_limits(duration_hours, max_battles)?;

        let session = generate_session_keypair()?;
        let limits = SessionLimits::battle_only(duration_hours, max_battles);
        let call = Call::new(
            self.game_contract()?,
            CREATE_SESSION_KEY,
            calls::create_session_key(session.public_key(), &limits),
        );
        self.execute(&[call], pin).await?;

        self.store().put(
            keys::SESSION_PRIVATE_KEY,
            session.private_key_hex().expose_secret(),
        )?;
        if let Err(e) = self
            .store()
            .put(keys::SESSION_PUBLIC_KEY, &session.public_key_hex())
        {
            log::error!("Failed to persist session public key, discarding session");
            if let Err(cleanup) = self.store().delete(keys::SESSION_PRIVATE_KEY) {
                log::error!("Could not remove session private key: {}", cleanup);
            }
            return Err(e);
        }

        log::info!(
            "Registered session key {} ({}h, {} battles)",
            session.public_key_hex(),
            duration_hours,
            max_battles
        );
        Ok(true)
    }

    pub fn has_session_key(&self) -> WalletResult<bool> {
        Ok(self.store().get(keys::SESSION_PRIVATE_KEY)?.is_some())
    }

    fn load_session_keypair(&self) -> WalletResult<StarkKeyPair> {
        let private_key = self
            .store()
            .get(keys::SESSION_PRIVATE_KEY)?
            .map(SecretString::from)
            .ok_or_else(|| WalletError::StorageAbsent(keys::SESSION_PRIVATE_KEY.to_string()))?;
        let keypair = StarkKeyPair::from_private_key_hex(private_key.expose_secret())?;

        if let Some(stored) = self.store().get(keys::SESSION_PUBLIC_KEY)? {
            let stored_key = felt_from_hex(&stored).map_err(|e| {
                WalletError::StorageError(format!("Stored session public key: {}", e))
            })?;
            if stored_key != keypair.public_key() {
                return Err(WalletError::IntegrityMismatch {
                    stored: felt_to_padded_hex(&stored_key),
                    computed: keypair.public_key_hex(),
                });
            }
        }
        Ok(keypair)
    }

    /// Play `card_indices` in `battle_id`. The move is signed by the session
    /// key; the transaction itself is sent by the wallet account.
    pub async fn execute_battle_move(
        &self,
        battle_id: u64,
        card_indices: &[u8],
        pin: Option<&SecretString>,
    ) -> WalletResult<BattleMoveOutcome> {
        self.validator().validate_card_indices(card_indices)?;

        let session = self.load_session_keypair()?;
        let signature = session.sign(&battle_move_hash(battle_id, card_indices))?;
        let call = Call::new(
            self.game_contract()?,
            EXECUTE_BATTLE_WITH_SESSION,
            calls::execute_battle_with_session(
                battle_id,
                card_indices,
                session.public_key(),
                &signature,
            ),
        );
        drop(session);

        let receipt = self.execute(&[call], pin).await?;
        let transaction_hash = felt_to_padded_hex(&receipt.transaction_hash);

        let battle = match self.get_battle(battle_id).await {
            Ok(battle) => battle,
            Err(e) => {
                log::warn!("Battle {} move included but state read failed: {}", battle_id, e);
                None
            }
        };
        if let Some(battle) = &battle {
            log::info!(
                "Battle {} turn {}: pet {} hp, opponent {} hp",
                battle_id,
                battle.turn,
                battle.pet_health,
                battle.opponent_health
            );
        }

        Ok(BattleMoveOutcome {
            transaction_hash,
            battle,
        })
    }
}
