//! # Data Models
//!
//! Response bodies and the user record shared across handlers and sessions.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "gaekit".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A local user logged in through Google.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Local user identifier
    pub id: Uuid,
    /// Google account identifier (`id` from userinfo)
    pub google_id: String,
    /// Account email, when Google shared it
    pub email: Option<String>,
}

/// Result of purging expired sessions
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClearSessionsResponse {
    /// Number of sessions removed
    pub removed: usize,
}
