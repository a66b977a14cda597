//! Connection authorization for `WebSocket` upgrades.

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use transit_settings::AuthSettings;

/// Decides whether a connecting client may open a relay connection.
pub trait ConnectionAuthorizer: Send + Sync {
    /// `token` is the bearer token the client presented, if any.
    fn authorize(&self, token: Option<&str>) -> bool;
}

/// Accepts every connection.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl ConnectionAuthorizer for AllowAll {
    fn authorize(&self, _token: Option<&str>) -> bool {
        true
    }
}

/// Accepts connections presenting one of a fixed set of tokens.
#[derive(Clone, Debug)]
pub struct SharedTokenAuthorizer {
    tokens: HashSet<String>,
}

impl SharedTokenAuthorizer {
    /// Create an authorizer for `tokens`.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

impl ConnectionAuthorizer for SharedTokenAuthorizer {
    fn authorize(&self, token: Option<&str>) -> bool {
        token.is_some_and(|t| self.tokens.contains(t))
    }
}

/// Authorizer for the configured tokens; [`AllowAll`] when none are set.
pub fn from_settings(settings: &AuthSettings) -> Arc<dyn ConnectionAuthorizer> {
    if settings.tokens.is_empty() {
        Arc::new(AllowAll)
    } else {
        Arc::new(SharedTokenAuthorizer::new(settings.tokens.iter().cloned()))
    }
}

/// The `token` query parameter, else the `Authorization: Bearer` header value.
pub fn presented_token<'a>(
    query_token: Option<&'a str>,
    headers: &'a HeaderMap,
) -> Option<&'a str> {
    query_token.filter(|t| !t.is_empty()).or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    })
}
