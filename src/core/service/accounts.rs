//! Users and API keys.
//!
//! Identity issuance lives outside the core: callers hand in the opaque
//! subject from the identity provider and this service maps it to a stable
//! user. API keys are random 256-bit tokens stored only as SHA-256 hashes.

use std::sync::Arc;

use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::core::domain::{user::MAX_ACTIVE_KEYS, ApiKey, ApiKeyId, User, UserId};
use crate::core::ledger::Ledger;
use crate::error::{Error, Result};

/// A freshly minted key. `raw_key` is shown exactly once.
#[derive(Debug, Clone)]
pub struct MintedKey {
    pub key: ApiKey,
    pub raw_key: String,
}

pub struct AccountService<L: Ledger> {
    ledger: Arc<L>,
}

impl<L: Ledger> AccountService<L> {
    #[must_use]
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Map an identity-provider subject to a user, creating it on first
    /// sight and refreshing the email otherwise.
    pub fn resolve_identity(
        &self,
        external_id: &str,
        email: &str,
        username: Option<&str>,
    ) -> Result<User> {
        self.ledger.upsert_user(external_id, email, username)
    }

    /// Mint a new API key for the user. At most [`MAX_ACTIVE_KEYS`] may be
    /// active at once.
    pub fn mint_api_key(&self, user: UserId, name: &str) -> Result<MintedKey> {
        if self.ledger.count_active_api_keys(user)? >= MAX_ACTIVE_KEYS {
            return Err(Error::Invalid(format!(
                "maximum {MAX_ACTIVE_KEYS} active API keys allowed"
            )));
        }

        let mut token = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut token);
        let raw_key = hex::encode(token);

        let key = ApiKey {
            id: ApiKeyId::new(),
            user_id: user,
            key_hash: hash_key(&raw_key),
            key_prefix: raw_key[..8].to_string(),
            name: name.to_string(),
            is_active: true,
            last_used_at: None,
            created_at: Utc::now(),
        };
        self.ledger.insert_api_key(&key)?;
        info!(user = %user, prefix = %key.key_prefix, "API key minted");
        Ok(MintedKey { key, raw_key })
    }

    /// Verify a raw API key, stamping its last use. Returns the owning user.
    pub fn verify_api_key(&self, raw_key: &str) -> Result<(ApiKey, User)> {
        let key = self
            .ledger
            .find_api_key_by_hash(&hash_key(raw_key))?
            .ok_or(Error::NotFound("API key"))?;
        self.ledger.touch_api_key(key.id, Utc::now())?;
        let user = self
            .ledger
            .get_user(key.user_id)?
            .ok_or(Error::NotFound("user"))?;
        Ok((key, user))
    }

    /// Deactivate one of the user's keys.
    pub fn revoke_api_key(&self, user: UserId, key: ApiKeyId) -> Result<()> {
        if self.ledger.deactivate_api_key(user, key)? {
            Ok(())
        } else {
            Err(Error::NotFound("API key"))
        }
    }
}

fn hash_key(raw_key: &str) -> String {
    hex::encode(Sha256::digest(raw_key.as_bytes()))
}
