//! Users and their API keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ApiKeyId, UserId};

/// Stable identity mapped from the opaque external identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Subject claim issued by the identity provider.
    pub external_id: String,
    pub email: String,
    pub username: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Name shown on leaderboards: the username, or the email local part.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.username.clone().unwrap_or_else(|| {
            self.email
                .split('@')
                .next()
                .unwrap_or(self.email.as_str())
                .to_string()
        })
    }
}

/// An API key record. Only the SHA-256 hash of the token is stored; the raw
/// token is shown to the user once at mint time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub user_id: UserId,
    /// Hex SHA-256 of the raw token.
    pub key_hash: String,
    /// First characters of the raw token, for display.
    pub key_prefix: String,
    pub name: String,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Active keys allowed per user.
pub const MAX_ACTIVE_KEYS: usize = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_falls_back_to_email_local_part() {
        let mut user = User {
            id: UserId::new(),
            external_id: "ext_1".into(),
            email: "trader@example.com".into(),
            username: None,
            is_admin: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(user.display_name(), "trader");

        user.username = Some("whale".into());
        assert_eq!(user.display_name(), "whale");
    }
}
