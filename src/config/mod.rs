//! Configuration loading for gaekit.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `GAEKIT_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Google's OAuth2 authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// Google's OAuth2 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://www.googleapis.com/oauth2/v4/token";
/// Google's userinfo endpoint, queried after a successful exchange.
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v1/userinfo";

/// Upper bound on session lifetime (one year).
const MAX_SESSION_TTL_SECONDS: u64 = 31_536_000;

/// Scopes requested when a login request does not name any.
pub const DEFAULT_OAUTH_SCOPES: &[&str] = &["openid", "profile", "email"];

/// Application configuration derived from `GAEKIT_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_client_secret: Option<String>,
    /// Scopes used when a login request does not ask for any.
    #[serde(default = "default_oauth_scopes")]
    pub oauth_scopes: Vec<String>,
    /// Scopes a login request is allowed to ask for.
    #[serde(default = "default_oauth_scopes")]
    pub oauth_scope_allowlist: Vec<String>,
    #[serde(default = "default_oauth_auth_url")]
    pub oauth_auth_url: String,
    #[serde(default = "default_oauth_token_url")]
    pub oauth_token_url: String,
    #[serde(default = "default_oauth_userinfo_url")]
    pub oauth_userinfo_url: String,
    #[serde(default = "default_session_cookie_name")]
    pub session_cookie_name: String,
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,
    /// Fallback application root when no `app.yaml` can be found.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            oauth_client_id: None,
            oauth_client_secret: None,
            oauth_scopes: default_oauth_scopes(),
            oauth_scope_allowlist: default_oauth_scopes(),
            oauth_auth_url: default_oauth_auth_url(),
            oauth_token_url: default_oauth_token_url(),
            oauth_userinfo_url: default_oauth_userinfo_url(),
            session_cookie_name: default_session_cookie_name(),
            session_ttl_seconds: default_session_ttl_seconds(),
            base_dir: default_base_dir(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.oauth_client_secret.is_some() {
            config.oauth_client_secret = Some("[REDACTED]".to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration.
    ///
    /// OAuth client credentials are not checked here; they are required only
    /// once the login routes are mounted (see `GoogleAuthSettings::from_config`).
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("oauth_auth_url", &self.oauth_auth_url),
            ("oauth_token_url", &self.oauth_token_url),
            ("oauth_userinfo_url", &self.oauth_userinfo_url),
        ] {
            Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
                field,
                value: value.clone(),
                source,
            })?;
        }

        if self.session_ttl_seconds == 0 || self.session_ttl_seconds > MAX_SESSION_TTL_SECONDS {
            return Err(ConfigError::InvalidSessionTtl {
                value: self.session_ttl_seconds,
            });
        }

        if self.session_cookie_name.trim().is_empty() {
            return Err(ConfigError::EmptySessionCookieName);
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_oauth_scopes() -> Vec<String> {
    DEFAULT_OAUTH_SCOPES.iter().map(|s| s.to_string()).collect()
}

fn default_oauth_auth_url() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_oauth_token_url() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

fn default_oauth_userinfo_url() -> String {
    GOOGLE_USERINFO_URL.to_string()
}

fn default_session_cookie_name() -> String {
    "gaekit_session".to_string()
}

fn default_session_ttl_seconds() -> u64 {
    // two weeks
    1_209_600
}

fn default_base_dir() -> PathBuf {
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid {field} '{value}': {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        source: url::ParseError,
    },
    #[error("OAuth client ID is missing; set GAEKIT_OAUTH_CLIENT_ID environment variable")]
    MissingOAuthClientId,
    #[error("OAuth client secret is missing; set GAEKIT_OAUTH_CLIENT_SECRET environment variable")]
    MissingOAuthClientSecret,
    #[error("session TTL must be between 1 and 31536000 seconds, got {value}")]
    InvalidSessionTtl { value: u64 },
    #[error("session TTL '{value}' is not a number of seconds: {source}")]
    MalformedSessionTtl {
        value: String,
        source: std::num::ParseIntError,
    },
    #[error("session cookie name must not be empty")]
    EmptySessionCookieName,
}

/// Splits a comma-separated list, dropping blank entries.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Loads configuration using layered `.env` files and `GAEKIT_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads configuration: `.env`, `.env.local`, `.env.<profile>`,
    /// `.env.<profile>.local`, then the process environment.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("GAEKIT_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        let mut take = |key: &str| layered.remove(key).filter(|v| !v.trim().is_empty());

        let profile = take("PROFILE").unwrap_or(profile_hint);
        let api_bind_addr = take("API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = take("LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = take("LOG_FORMAT").unwrap_or_else(default_log_format);
        let oauth_client_id = take("OAUTH_CLIENT_ID").map(|v| v.trim().to_string());
        let oauth_client_secret = take("OAUTH_CLIENT_SECRET").map(|v| v.trim().to_string());
        let oauth_scopes = take("OAUTH_SCOPES")
            .map(|v| split_list(&v))
            .unwrap_or_else(default_oauth_scopes);
        let oauth_scope_allowlist = take("OAUTH_SCOPE_ALLOWLIST")
            .map(|v| split_list(&v))
            .unwrap_or_else(default_oauth_scopes);
        let oauth_auth_url = take("OAUTH_AUTH_URL").unwrap_or_else(default_oauth_auth_url);
        let oauth_token_url = take("OAUTH_TOKEN_URL").unwrap_or_else(default_oauth_token_url);
        let oauth_userinfo_url =
            take("OAUTH_USERINFO_URL").unwrap_or_else(default_oauth_userinfo_url);
        let session_cookie_name =
            take("SESSION_COOKIE_NAME").unwrap_or_else(default_session_cookie_name);
        let session_ttl_seconds = match take("SESSION_TTL_SECONDS") {
            Some(value) => {
                value
                    .trim()
                    .parse()
                    .map_err(|source| ConfigError::MalformedSessionTtl {
                        value: value.clone(),
                        source,
                    })?
            }
            None => default_session_ttl_seconds(),
        };
        let base_dir = take("BASE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| self.base_dir.clone());

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            oauth_client_id,
            oauth_client_secret,
            oauth_scopes,
            oauth_scope_allowlist,
            oauth_auth_url,
            oauth_token_url,
            oauth_userinfo_url,
            session_cookie_name,
            session_ttl_seconds,
            base_dir,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("GAEKIT_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix("GAEKIT_") {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
