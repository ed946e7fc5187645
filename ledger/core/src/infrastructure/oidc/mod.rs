// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! OpenID Connect provider plumbing.
//!
//! [`ProviderMetadata`] is discovered once at startup and passed explicitly
//! to whoever needs it (the token verifier and the login client).

pub mod jwks;
pub mod login;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::identity::AuthError;
pub use crate::domain::ledger_config::normalize_issuer;

pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
}

impl ProviderMetadata {
    /// Fetch `{issuer}/.well-known/openid-configuration`.
    ///
    /// The document's `issuer` must match the configured one after
    /// normalisation, otherwise tokens could never validate.
    pub async fn discover(client: &reqwest::Client, issuer: &str) -> Result<Self, AuthError> {
        let issuer = normalize_issuer(issuer);
        if issuer.is_empty() {
            return Err(AuthError::Configuration("issuer is empty".to_string()));
        }
        let url = format!("{}{}", issuer, DISCOVERY_PATH);
        debug!(url = %url, "Fetching OIDC discovery document");

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| AuthError::DependencyUnavailable(format!("discovery request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "OIDC discovery failed");
            return Err(AuthError::DependencyUnavailable(format!(
                "discovery returned status {}",
                status
            )));
        }

        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| AuthError::Configuration(format!("invalid discovery document: {}", e)))?;

        if normalize_issuer(&metadata.issuer) != issuer {
            return Err(AuthError::Configuration(format!(
                "discovery issuer '{}' does not match configured issuer '{}'",
                metadata.issuer, issuer
            )));
        }

        Ok(ProviderMetadata {
            issuer,
            ..metadata
        })
    }
}

/// HTTP client shared by discovery, JWKS and code exchange.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, AuthError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AuthError::Configuration(format!("failed to build http client: {}", e)))
}

#[cfg(test)]
pub(crate) fn test_metadata(base: &str) -> ProviderMetadata {
    ProviderMetadata {
        issuer: base.to_string(),
        authorization_endpoint: format!("{}/v1/authorize", base),
        token_endpoint: format!("{}/v1/token", base),
        jwks_uri: format!("{}/v1/keys", base),
        end_session_endpoint: Some(format!("{}/v1/logout", base)),
        userinfo_endpoint: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovery_body(issuer: &str) -> String {
        serde_json::json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{}/v1/authorize", issuer),
            "token_endpoint": format!("{}/v1/token", issuer),
            "jwks_uri": format!("{}/v1/keys", issuer),
            "response_types_supported": ["code"]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_discover_normalises_trailing_slash() {
        let mut server = mockito::Server::new_async().await;
        let issuer = server.url();
        server
            .mock("GET", DISCOVERY_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(discovery_body(&format!("{}/", issuer)))
            .create_async()
            .await;

        let client = http_client(Duration::from_secs(2)).unwrap();
        let metadata = ProviderMetadata::discover(&client, &format!("{}/", issuer)).await.unwrap();
        assert_eq!(metadata.issuer, issuer);
        assert!(metadata.jwks_uri.ends_with("/v1/keys"));
        assert!(metadata.end_session_endpoint.is_none());
    }

    #[tokio::test]
    async fn test_discover_rejects_issuer_mismatch() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", DISCOVERY_PATH)
            .with_status(200)
            .with_body(discovery_body("https://other.example.com"))
            .create_async()
            .await;

        let client = http_client(Duration::from_secs(2)).unwrap();
        let err = ProviderMetadata::discover(&client, &server.url()).await.unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_discover_server_error_is_dependency_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", DISCOVERY_PATH).with_status(500).create_async().await;

        let client = http_client(Duration::from_secs(2)).unwrap();
        let err = ProviderMetadata::discover(&client, &server.url()).await.unwrap_err();
        assert!(matches!(err, AuthError::DependencyUnavailable(_)));
    }
}
