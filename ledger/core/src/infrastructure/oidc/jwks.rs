// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! JWKS key lookup.
//!
//! [`JwksKeySource`] caches the provider's key set and refetches it when a
//! token names a `kid` the cache does not know (key rotation). Refetches are
//! rate-limited so a flood of bogus `kid`s cannot hammer the provider.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::DecodingKey;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::domain::identity::AuthError;

#[async_trait]
pub trait KeySource: Send + Sync {
    async fn key_for(&self, kid: Option<&str>) -> Result<DecodingKey, AuthError>;
}

fn select_key(keys: &JwkSet, kid: Option<&str>) -> Option<Result<DecodingKey, AuthError>> {
    let jwk = match kid {
        Some(kid) => keys.find(kid)?,
        // Only unambiguous when the provider publishes a single key.
        None if keys.keys.len() == 1 => &keys.keys[0],
        None => return None,
    };
    Some(
        DecodingKey::from_jwk(jwk)
            .map_err(|e| AuthError::Configuration(format!("unusable JWK: {}", e))),
    )
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

pub struct JwksKeySource {
    client: reqwest::Client,
    jwks_uri: String,
    min_refresh_interval: Duration,
    cache: RwLock<Option<CachedKeys>>,
}

impl JwksKeySource {
    pub fn new(client: reqwest::Client, jwks_uri: String) -> Self {
        Self {
            client,
            jwks_uri,
            min_refresh_interval: Duration::from_secs(30),
            cache: RwLock::new(None),
        }
    }

    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    async fn fetch(&self) -> Result<JwkSet, AuthError> {
        debug!(jwks_uri = %self.jwks_uri, "Fetching JWKS");
        let response = self
            .client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| AuthError::DependencyUnavailable(format!("JWKS request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::DependencyUnavailable(format!(
                "JWKS endpoint returned status {}",
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::DependencyUnavailable(format!("invalid JWKS document: {}", e)))
    }

    fn refresh_allowed(&self) -> bool {
        match self.cache.read().as_ref() {
            None => true,
            Some(cached) => cached.fetched_at.elapsed() >= self.min_refresh_interval,
        }
    }
}

#[async_trait]
impl KeySource for JwksKeySource {
    async fn key_for(&self, kid: Option<&str>) -> Result<DecodingKey, AuthError> {
        let cached = self
            .cache
            .read()
            .as_ref()
            .and_then(|cached| select_key(&cached.keys, kid));
        if let Some(key) = cached {
            return key;
        }

        if !self.refresh_allowed() {
            warn!(kid = ?kid, "Unknown signing key; JWKS refresh suppressed");
            return Err(AuthError::InvalidCredential("unknown signing key".to_string()));
        }

        let keys = self.fetch().await?;
        info!(jwks_uri = %self.jwks_uri, keys = keys.keys.len(), "Refreshed JWKS");
        let selected = select_key(&keys, kid);
        *self.cache.write() = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });

        selected.unwrap_or_else(|| Err(AuthError::InvalidCredential("unknown signing key".to_string())))
    }
}

/// Fixed key set, for tests and offline verification.
pub struct StaticKeySource {
    keys: JwkSet,
}

impl StaticKeySource {
    pub fn new(keys: JwkSet) -> Self {
        Self { keys }
    }

    pub fn from_json(jwks: &str) -> Result<Self, AuthError> {
        let keys = serde_json::from_str(jwks)
            .map_err(|e| AuthError::Configuration(format!("invalid JWKS document: {}", e)))?;
        Ok(Self::new(keys))
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    async fn key_for(&self, kid: Option<&str>) -> Result<DecodingKey, AuthError> {
        select_key(&self.keys, kid)
            .unwrap_or_else(|| Err(AuthError::InvalidCredential("unknown signing key".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JWKS: &str = include_str!("../../../tests/fixtures/jwks.json");

    #[tokio::test]
    async fn test_static_source_finds_key_by_kid() {
        let source = StaticKeySource::from_json(JWKS).unwrap();
        assert!(source.key_for(Some("test-key-1")).await.is_ok());
        assert!(source.key_for(None).await.is_ok());
        assert!(matches!(
            source.key_for(Some("rotated-away")).await,
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn test_jwks_is_fetched_once_and_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/keys")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(JWKS)
            .expect(1)
            .create_async()
            .await;

        let source = JwksKeySource::new(reqwest::Client::new(), format!("{}/v1/keys", server.url()));
        source.key_for(Some("test-key-1")).await.unwrap();
        source.key_for(Some("test-key-1")).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_kid_refresh_is_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/keys")
            .with_status(200)
            .with_body(JWKS)
            .expect(1)
            .create_async()
            .await;

        let source = JwksKeySource::new(reqwest::Client::new(), format!("{}/v1/keys", server.url()));
        assert!(source.key_for(Some("nope")).await.is_err());
        assert!(source.key_for(Some("nope-again")).await.is_err());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_kid_triggers_refresh_after_interval() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/keys")
            .with_status(200)
            .with_body(JWKS)
            .expect(2)
            .create_async()
            .await;

        let source = JwksKeySource::new(reqwest::Client::new(), format!("{}/v1/keys", server.url()))
            .with_min_refresh_interval(Duration::ZERO);
        assert!(source.key_for(Some("rotated-in")).await.is_err());
        assert!(source.key_for(Some("rotated-in")).await.is_err());
        assert!(source.key_for(Some("test-key-1")).await.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_jwks_outage_is_dependency_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/v1/keys").with_status(503).create_async().await;

        let source = JwksKeySource::new(reqwest::Client::new(), format!("{}/v1/keys", server.url()));
        assert!(matches!(
            source.key_for(Some("test-key-1")).await,
            Err(AuthError::DependencyUnavailable(_))
        ));
    }
}
