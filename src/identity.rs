//! Caller identity resolution.
//!
//! Bearer tokens are issued by the hosted auth platform. The service never
//! inspects them itself: it asks the platform who the token belongs to.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("auth service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("auth service returned {0}")]
    Status(StatusCode),
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve a bearer token to a user id. `Ok(None)` means the token is
    /// not valid.
    async fn resolve(&self, token: &str) -> Result<Option<Uuid>, IdentityError>;
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

// ============================================================================
// Hosted auth platform
// ============================================================================

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Uuid,
}

/// Resolves tokens through the auth platform's `GET /auth/v1/user`.
pub struct HttpIdentityResolver {
    client: reqwest::Client,
    auth_url: String,
    service_key: String,
}

impl HttpIdentityResolver {
    pub fn new(auth_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            auth_url: auth_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
        }
    }
}

#[async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<Option<Uuid>, IdentityError> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.auth_url))
            .header("apikey", &self.service_key)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => {
                let user: AuthUser = response.json().await?;
                Ok(Some(user.id))
            }
            status => Err(IdentityError::Status(status)),
        }
    }
}

// ============================================================================
// Fixed token table
// ============================================================================

/// Token table held in memory. Used by tests and local runs.
#[derive(Debug, Default, Clone)]
pub struct StaticIdentityResolver {
    tokens: HashMap<String, Uuid>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: Uuid) -> Self {
        self.tokens.insert(token.into(), user_id);
        self
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<Option<Uuid>, IdentityError> {
        Ok(self.tokens.get(token).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_extracted() {
        assert_eq!(bearer_token(&headers("Bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(&headers("bearer abc")), Some("abc"));
    }

    #[test]
    fn test_bearer_token_rejects_other_schemes_and_blanks() {
        assert_eq!(bearer_token(&headers("Basic dXNlcjpwdw==")), None);
        assert_eq!(bearer_token(&headers("Bearer   ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_static_resolver_lookup() {
        let user = Uuid::new_v4();
        let resolver = StaticIdentityResolver::new().with_token("carer-token", user);
        assert_eq!(resolver.resolve("carer-token").await.unwrap(), Some(user));
        assert_eq!(resolver.resolve("stolen").await.unwrap(), None);
    }
}
