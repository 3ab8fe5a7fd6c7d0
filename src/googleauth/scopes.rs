//! Scope resolution for login requests.

use super::GoogleAuthSettings;
use crate::error::{ApiError, not_found};

/// Resolves the scopes for a login request.
///
/// No requested scopes yields the configured defaults. Otherwise the
/// comma-separated list is used as-is, provided every entry is on the
/// allow-list.
pub fn get_scopes(
    requested: Option<&str>,
    settings: &GoogleAuthSettings,
) -> Result<Vec<String>, ApiError> {
    let requested = match requested {
        Some(requested) if !requested.is_empty() => requested,
        _ => return Ok(settings.default_scopes.clone()),
    };

    let parsed: Vec<String> = requested.split(',').map(str::to_string).collect();

    if let Some(rejected) = parsed
        .iter()
        .find(|scope| !settings.scope_allowlist.contains(scope))
    {
        tracing::warn!(scope = %rejected, "Login requested a scope outside the allow-list");
        return Err(not_found(
            "Not all scopes were whitelisted for the application.",
        ));
    }

    Ok(parsed)
}
