//! Google OAuth2 client: authorization URLs, code exchange and userinfo.

use chrono::Utc;
use oauth2::{
    AuthorizationCode, CsrfToken, EndpointNotSet, EndpointSet, RedirectUrl, Scope, TokenResponse,
    basic::BasicClient,
};
use url::Url;

use super::{GoogleAuthSettings, GoogleIdentity, TokenInfo};
use crate::error::{ApiError, bad_request, provider_error};

type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Talks to Google's OAuth2 endpoints on behalf of the login handlers.
#[derive(Debug, Clone)]
pub struct GoogleAuth {
    settings: GoogleAuthSettings,
    http_client: reqwest::Client,
}

impl GoogleAuth {
    pub fn new(settings: GoogleAuthSettings) -> anyhow::Result<Self> {
        // Following redirects during the token exchange opens SSRF holes.
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            settings,
            http_client,
        })
    }

    pub fn settings(&self) -> &GoogleAuthSettings {
        &self.settings
    }

    fn client(&self, redirect_uri: &str) -> Result<ConfiguredClient, ApiError> {
        let redirect_url = RedirectUrl::new(redirect_uri.to_string())
            .map_err(|_| bad_request("Invalid callback URL"))?;

        Ok(BasicClient::new(self.settings.client_id.clone())
            .set_client_secret(self.settings.client_secret.clone())
            .set_auth_uri(self.settings.auth_url.clone())
            .set_token_uri(self.settings.token_url.clone())
            .set_redirect_uri(redirect_url))
    }

    /// Builds the provider authorization URL and its fresh anti-forgery state.
    ///
    /// Requests offline access so a refresh token is issued, and always shows
    /// the account chooser.
    pub fn authorization_url(
        &self,
        redirect_uri: &str,
        scopes: &[String],
    ) -> Result<(Url, CsrfToken), ApiError> {
        let (url, state) = self
            .client(redirect_uri)?
            .authorize_url(CsrfToken::new_random)
            .add_scopes(scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "select_account")
            .url();

        Ok((url, state))
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenInfo, ApiError> {
        let response = self
            .client(redirect_uri)?
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "OAuth token exchange failed");
                provider_error("token_exchange", None, Some(err.to_string()))
            })?;

        let expires_at = response
            .expires_in()
            .and_then(|expires_in| chrono::Duration::from_std(expires_in).ok())
            .map(|expires_in| Utc::now() + expires_in);

        Ok(TokenInfo {
            access_token: response.access_token().secret().clone(),
            refresh_token: response
                .refresh_token()
                .map(|token| token.secret().clone()),
            expires_at,
            scopes: response
                .scopes()
                .map(|scopes| scopes.iter().map(|scope| scope.to_string()).collect())
                .unwrap_or_default(),
        })
    }

    /// Fetches the signed-in account's identity from the userinfo endpoint.
    pub async fn fetch_identity(&self, access_token: &str) -> Result<GoogleIdentity, ApiError> {
        let response = self
            .http_client
            .get(self.settings.userinfo_url.clone())
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "Userinfo request failed");
                provider_error("userinfo", None, Some(err.to_string()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(provider_error("userinfo", Some(status.as_u16()), Some(body)));
        }

        response.json::<GoogleIdentity>().await.map_err(|err| {
            provider_error(
                "userinfo",
                Some(status.as_u16()),
                Some(format!("Failed to parse userinfo response: {}", err)),
            )
        })
    }
}
