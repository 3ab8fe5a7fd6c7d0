//! # Google OAuth2 Login
//!
//! Authorization-code login against Google. The flow itself lives in
//! [`crate::handlers::oauth`]; this module holds the settings, scope
//! resolution, provider client and the user backend seam.

use oauth2::{AuthUrl, ClientId, ClientSecret, TokenUrl};
use url::Url;

use crate::config::{AppConfig, ConfigError};

pub mod backend;
pub mod client;
pub mod scopes;

pub use backend::{GoogleIdentity, MemoryUserBackend, TokenInfo, UserBackend};
pub use client::GoogleAuth;
pub use scopes::get_scopes;

/// Validated OAuth client settings.
#[derive(Debug, Clone)]
pub struct GoogleAuthSettings {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    pub default_scopes: Vec<String>,
    pub scope_allowlist: Vec<String>,
    pub auth_url: AuthUrl,
    pub token_url: TokenUrl,
    pub userinfo_url: Url,
}

impl GoogleAuthSettings {
    /// Builds settings from config. Missing client credentials are fatal.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let client_id = config
            .oauth_client_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or(ConfigError::MissingOAuthClientId)?;
        let client_secret = config
            .oauth_client_secret
            .clone()
            .filter(|secret| !secret.is_empty())
            .ok_or(ConfigError::MissingOAuthClientSecret)?;

        Ok(Self {
            client_id: ClientId::new(client_id),
            client_secret: ClientSecret::new(client_secret),
            default_scopes: config.oauth_scopes.clone(),
            scope_allowlist: config.oauth_scope_allowlist.clone(),
            auth_url: AuthUrl::new(config.oauth_auth_url.clone())
                .map_err(invalid_url("oauth_auth_url", &config.oauth_auth_url))?,
            token_url: TokenUrl::new(config.oauth_token_url.clone())
                .map_err(invalid_url("oauth_token_url", &config.oauth_token_url))?,
            userinfo_url: Url::parse(&config.oauth_userinfo_url)
                .map_err(invalid_url("oauth_userinfo_url", &config.oauth_userinfo_url))?,
        })
    }
}

fn invalid_url(field: &'static str, value: &str) -> impl FnOnce(url::ParseError) -> ConfigError {
    let value = value.to_string();
    move |source| ConfigError::InvalidUrl {
        field,
        value,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_credentials() -> AppConfig {
        AppConfig {
            oauth_client_id: Some("client-id".to_string()),
            oauth_client_secret: Some("client-secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_settings_from_config() {
        let settings = GoogleAuthSettings::from_config(&config_with_credentials()).unwrap();
        assert_eq!(settings.client_id.as_str(), "client-id");
        assert_eq!(settings.client_secret.secret(), "client-secret");
        assert_eq!(
            settings.auth_url.as_str(),
            "https://accounts.google.com/o/oauth2/v2/auth"
        );
        assert_eq!(settings.default_scopes, vec!["openid", "profile", "email"]);
    }

    #[test]
    fn test_missing_client_id_is_fatal() {
        let config = AppConfig {
            oauth_client_id: None,
            ..config_with_credentials()
        };
        assert!(matches!(
            GoogleAuthSettings::from_config(&config),
            Err(ConfigError::MissingOAuthClientId)
        ));
    }

    #[test]
    fn test_empty_client_secret_is_fatal() {
        let config = AppConfig {
            oauth_client_secret: Some(String::new()),
            ..config_with_credentials()
        };
        assert!(matches!(
            GoogleAuthSettings::from_config(&config),
            Err(ConfigError::MissingOAuthClientSecret)
        ));
    }

    #[test]
    fn test_invalid_endpoint_is_reported() {
        let config = AppConfig {
            oauth_userinfo_url: "::nope".to_string(),
            ..config_with_credentials()
        };
        let err = GoogleAuthSettings::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("oauth_userinfo_url"));
    }
}
