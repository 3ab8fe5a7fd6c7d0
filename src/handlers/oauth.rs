//! # OAuth Handlers
//!
//! Google login: `login` starts the authorization-code flow and
//! `oauth2callback` finishes it, logging the user into the session.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::{ApiError, bad_request, unauthorized};
use crate::googleauth::get_scopes;
use crate::server::AppState;

pub const LOGIN_PATH: &str = "/oauth/login";
pub const CALLBACK_PATH: &str = "/oauth/oauth2callback";

/// Query parameters accepted by the login endpoint
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoginQuery {
    /// Comma-separated scopes; defaults to the configured scopes
    pub scopes: Option<String>,
    /// Where to send the user once logged in
    pub next: Option<String>,
}

/// Query parameters Google sends back to the callback
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackQuery {
    /// Authorization code
    pub code: Option<String>,
    /// Anti-forgery state echoed back by Google
    pub state: Option<String>,
    /// Error reported by Google when the user declined or the request was invalid
    pub error: Option<String>,
}

/// Absolute callback URL for the current request's host.
fn callback_url(headers: &HeaderMap) -> Result<String, ApiError> {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|host| !host.is_empty())
        .ok_or_else(|| bad_request("Missing Host header"))?;

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|scheme| *scheme == "http" || *scheme == "https")
        .unwrap_or("http");

    Ok(format!("{}://{}{}", scheme, host, CALLBACK_PATH))
}

/// 302 redirect carrying the session cookie.
fn found(jar: CookieJar, location: &str) -> Response {
    (
        StatusCode::FOUND,
        jar,
        [(header::LOCATION, location.to_string())],
    )
        .into_response()
}

/// Start the Google login flow
///
/// Stores a fresh anti-forgery state (and the optional `next` target) in the
/// session and redirects the browser to Google's consent screen.
#[utoipa::path(
    get,
    path = "/oauth/login",
    params(LoginQuery),
    responses(
        (status = 302, description = "Redirect to Google's authorization endpoint"),
        (status = 400, description = "Callback URL could not be built", body = ApiError),
        (status = 404, description = "Requested scopes are not allowed", body = ApiError),
        (status = 500, description = "Session storage unavailable", body = ApiError)
    ),
    tag = "oauth"
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Result<Response, ApiError> {
    let scopes = get_scopes(query.scopes.as_deref(), state.google.settings())?;
    let redirect_uri = callback_url(&headers)?;

    let mut session = state.sessions.load(&jar).await?;
    if let Some(next) = query.next.as_deref()
        && !next.is_empty()
    {
        session.data.oauth.set_redirect_target(next);
    }

    let (authorize_url, csrf) = state.google.authorization_url(&redirect_uri, &scopes)?;
    session.data.oauth.set_state(csrf.secret().as_str());

    let jar = state.sessions.commit(session, jar).await?;

    tracing::info!(scopes = ?scopes, "Redirecting to Google for authorization");
    Ok(found(jar, authorize_url.as_str()))
}

/// Finish the Google login flow
///
/// Validates and consumes the anti-forgery state, exchanges the code for
/// tokens and, when a redirect target was stored at login, authenticates the
/// user and sends them on. Without a stored target the browser is sent back
/// to the login route. A state is single-use even across concurrent
/// callbacks, and is spent once it matches, even if the exchange then fails.
#[utoipa::path(
    get,
    path = "/oauth/oauth2callback",
    params(CallbackQuery),
    responses(
        (status = 302, description = "Redirect to the stored target, or back to login"),
        (status = 400, description = "Missing or mismatched state, or missing code", body = ApiError),
        (status = 401, description = "User backend refused the account", body = ApiError),
        (status = 500, description = "Session storage or user backend failure", body = ApiError),
        (status = 502, description = "Google token or userinfo request failed", body = ApiError)
    ),
    tag = "oauth"
)]
pub async fn oauth2callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    let mut session = state.sessions.load(&jar).await?;

    if session.data.oauth.state().is_none() {
        return Err(bad_request("Invalid request: no OAuth state in session"));
    }

    // Compare and clear under the store's lock so a state is redeemed once.
    let returned_state = query.state.as_deref().unwrap_or_default();
    if !state
        .sessions
        .store()
        .consume_oauth_state(&session.id, returned_state)
        .await?
    {
        tracing::warn!("OAuth callback state does not match the session");
        return Err(bad_request("Invalid request: state mismatch"));
    }
    session.data.oauth.clear_state();

    let code = match query.code.as_deref() {
        Some(code) if !code.is_empty() => code,
        _ => {
            let reason = query.error.as_deref().unwrap_or("no code returned");
            return Err(bad_request(&format!(
                "Invalid request: authorization failed ({})",
                reason
            )));
        }
    };

    let redirect_uri = callback_url(&headers)?;
    let token = state.google.exchange_code(code, &redirect_uri).await?;

    let Some(next) = session.data.oauth.redirect_target().map(str::to_owned) else {
        tracing::info!("OAuth callback without a redirect target; returning to login");
        let jar = state.sessions.commit(session, jar).await?;
        return Ok(found(jar, LOGIN_PATH));
    };

    let identity = state.google.fetch_identity(&token.access_token).await?;
    let user = state
        .users
        .authenticate(&identity, &token)
        .await?
        .ok_or_else(|| unauthorized(Some("Authentication failed")))?;

    state.sessions.cycle_key(&mut session).await?;
    session.data.user = Some(user.clone());
    session.data.oauth.clear_redirect_target();
    let jar = state.sessions.commit(session, jar).await?;

    tracing::info!(user_id = %user.id, "User logged in via Google");
    Ok(found(jar, &next))
}
