//! # Sessions
//!
//! Server-side sessions keyed by an opaque random ID carried in a cookie.
//! Session data is typed: the OAuth anti-forgery state and redirect target
//! live in [`OAuthSessionState`], the logged-in user in [`Session::user`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::models::AuthenticatedUser;

pub mod memory;

pub use memory::MemorySessionStore;

/// Errors raised by session backends.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session backend error: {0}")]
    Backend(String),
}

/// Opaque session identifier: 32 random bytes, URL-safe base64.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        use rand::Rng;

        let mut bytes = [0u8; 32];
        rand::thread_rng().fill(&mut bytes);
        Self(base64_url::encode(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// OAuth login progress stored in the session between `login` and the callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthSessionState {
    state: Option<String>,
    redirect_target: Option<String>,
}

impl OAuthSessionState {
    /// Anti-forgery token issued by the last `login`.
    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn set_state(&mut self, state: impl Into<String>) {
        self.state = Some(state.into());
    }

    pub fn clear_state(&mut self) {
        self.state = None;
    }

    /// Where to send the user after a successful login.
    pub fn redirect_target(&self) -> Option<&str> {
        self.redirect_target.as_deref()
    }

    pub fn set_redirect_target(&mut self, target: impl Into<String>) {
        self.redirect_target = Some(target.into());
    }

    pub fn clear_redirect_target(&mut self) {
        self.redirect_target = None;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Clears the stored state if it equals `returned` (constant time).
    /// Returns whether it matched.
    pub fn consume_state(&mut self, returned: &str) -> bool {
        let matches = self
            .state
            .as_deref()
            .is_some_and(|stored| bool::from(stored.as_bytes().ct_eq(returned.as_bytes())));
        if matches {
            self.state = None;
        }
        matches
    }
}

/// Data held for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub oauth: OAuthSessionState,
    pub user: Option<AuthenticatedUser>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(ttl: Duration) -> Self {
        Self {
            oauth: OAuthSessionState::default(),
            user: None,
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Storage backend for sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the session if it exists and has not expired.
    async fn load(&self, id: &SessionId) -> Result<Option<Session>, SessionError>;

    async fn save(&self, id: &SessionId, session: Session) -> Result<(), SessionError>;

    async fn remove(&self, id: &SessionId) -> Result<(), SessionError>;

    /// Moves the data stored under `id` to a freshly generated ID.
    async fn cycle_key(&self, id: &SessionId) -> Result<SessionId, SessionError>;

    /// Drops every expired session, returning how many were removed.
    async fn clear_expired(&self) -> Result<usize, SessionError>;

    /// Atomically clears the session's OAuth state if it equals `returned`.
    ///
    /// Of several concurrent callbacks carrying the same state, exactly one
    /// gets `true`.
    async fn consume_oauth_state(
        &self,
        id: &SessionId,
        returned: &str,
    ) -> Result<bool, SessionError>;
}

/// Cookie and lifetime settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub ttl: Duration,
    /// Send the cookie over HTTPS only.
    pub secure: bool,
}

/// A session loaded for the current request.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub id: SessionId,
    pub data: Session,
    pub is_new: bool,
}

/// Loads and commits request sessions against a [`SessionStore`].
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Loads the session named by the request cookie, or starts a new one.
    pub async fn load(&self, jar: &CookieJar) -> Result<ActiveSession, SessionError> {
        if let Some(cookie) = jar.get(&self.config.cookie_name) {
            let id = SessionId::from(cookie.value().to_string());
            if let Some(data) = self.store.load(&id).await? {
                return Ok(ActiveSession {
                    id,
                    data,
                    is_new: false,
                });
            }
        }

        Ok(ActiveSession {
            id: SessionId::generate(),
            data: Session::new(self.config.ttl),
            is_new: true,
        })
    }

    /// Persists the session, extends its expiry and sets the cookie.
    pub async fn commit(
        &self,
        mut session: ActiveSession,
        jar: CookieJar,
    ) -> Result<CookieJar, SessionError> {
        session.data.expires_at = Utc::now() + self.config.ttl;
        self.store.save(&session.id, session.data).await?;
        Ok(jar.add(self.cookie(&session.id)))
    }

    /// Issues a new session ID for the same data, guarding against fixation
    /// when the session's privilege level changes.
    pub async fn cycle_key(&self, session: &mut ActiveSession) -> Result<(), SessionError> {
        if session.is_new {
            session.id = SessionId::generate();
        } else {
            session.id = self.store.cycle_key(&session.id).await?;
        }
        Ok(())
    }

    fn cookie(&self, id: &SessionId) -> Cookie<'static> {
        Cookie::build((self.config.cookie_name.clone(), id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.config.secure)
            .build()
    }
}
