//! User backend: maps a Google identity onto a local user.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::AuthenticatedUser;

/// Identity fields returned by Google's userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleIdentity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub verified_email: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Tokens obtained from the code exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for TokenInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenInfo")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Authenticates local users from Google identities.
#[async_trait]
pub trait UserBackend: Send + Sync {
    /// Returns the user to log in, or `None` to refuse the login.
    async fn authenticate(
        &self,
        identity: &GoogleIdentity,
        token: &TokenInfo,
    ) -> anyhow::Result<Option<AuthenticatedUser>>;
}

/// Process-local users keyed by Google account ID. The first login creates
/// the user; later logins refresh the email and stored token.
#[derive(Debug, Default)]
pub struct MemoryUserBackend {
    users: RwLock<HashMap<String, AuthenticatedUser>>,
    tokens: RwLock<HashMap<Uuid, TokenInfo>>,
}

impl MemoryUserBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_user(&self, google_id: &str) -> Option<AuthenticatedUser> {
        self.users.read().await.get(google_id).cloned()
    }

    /// Most recent token stored for a user.
    pub async fn token_for(&self, user_id: Uuid) -> Option<TokenInfo> {
        self.tokens.read().await.get(&user_id).cloned()
    }
}

#[async_trait]
impl UserBackend for MemoryUserBackend {
    async fn authenticate(
        &self,
        identity: &GoogleIdentity,
        token: &TokenInfo,
    ) -> anyhow::Result<Option<AuthenticatedUser>> {
        if identity.id.is_empty() {
            return Ok(None);
        }

        let user = {
            let mut users = self.users.write().await;
            let user = users
                .entry(identity.id.clone())
                .or_insert_with(|| AuthenticatedUser {
                    id: Uuid::new_v4(),
                    google_id: identity.id.clone(),
                    email: None,
                });
            if identity.email.is_some() {
                user.email = identity.email.clone();
            }
            user.clone()
        };

        self.tokens.write().await.insert(user.id, token.clone());
        tracing::debug!(user_id = %user.id, "Authenticated Google user");

        Ok(Some(user))
    }
}
