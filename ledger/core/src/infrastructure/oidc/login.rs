// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Authorization-code login for the confidential (session) client.
//!
//! Flow: `generate_state` → `authorization_url` (state also stored in the
//! `oauthstate` cookie) → provider redirects back with `code` and `state` →
//! `verify_state` → `exchange_code` → ID token stored in the `id_token`
//! cookie. The ID token is verified in session mode before it is trusted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand_core::{OsRng, RngCore};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::ProviderMetadata;
use crate::domain::identity::AuthError;
use crate::domain::ledger_config::AuthConfig;

const STATE_BYTES: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub id_token: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

pub struct AuthorizationCodeClient {
    http: reqwest::Client,
    authorization_endpoint: String,
    token_endpoint: String,
    end_session_endpoint: Option<String>,
    client_id: String,
    client_secret: Option<String>,
    redirect_url: String,
    scopes: Vec<String>,
}

impl AuthorizationCodeClient {
    pub fn new(http: reqwest::Client, metadata: &ProviderMetadata, auth: &AuthConfig) -> Result<Self, AuthError> {
        let client_secret = auth
            .resolved_client_secret()
            .map_err(|e| AuthError::Configuration(e.to_string()))?;
        let redirect_url = auth
            .redirect_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AuthError::Configuration("redirect_url is required for login".to_string()))?;
        Ok(Self {
            http,
            authorization_endpoint: metadata.authorization_endpoint.clone(),
            token_endpoint: metadata.token_endpoint.clone(),
            end_session_endpoint: metadata.end_session_endpoint.clone(),
            client_id: auth.client_id.clone(),
            client_secret,
            redirect_url: redirect_url.to_string(),
            scopes: auth.scopes.clone(),
        })
    }

    /// Random CSRF state, URL-safe.
    pub fn generate_state() -> String {
        let mut bytes = [0u8; STATE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        let mut url = url::Url::parse(&self.authorization_endpoint)
            .map_err(|e| AuthError::Configuration(format!("invalid authorization endpoint: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state);
        Ok(url.into())
    }

    /// Compare the `state` query parameter with the `oauthstate` cookie.
    pub fn verify_state(expected: &str, returned: &str) -> bool {
        if expected.is_empty() || expected.len() != returned.len() {
            return false;
        }
        expected.as_bytes().ct_eq(returned.as_bytes()).into()
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AuthError> {
        if code.trim().is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_url.as_str()),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        debug!(token_endpoint = %self.token_endpoint, "Exchanging authorization code");
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::DependencyUnavailable(format!("token request failed: {}", e)))?;

        let status = response.status();
        if status.is_client_error() {
            warn!(status = status.as_u16(), "Authorization code rejected by provider");
            return Err(AuthError::InvalidCredential(format!("code exchange rejected with status {}", status)));
        }
        if !status.is_success() {
            return Err(AuthError::DependencyUnavailable(format!("token endpoint returned status {}", status)));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::MalformedCredential(format!("token response: {}", e)))
    }

    /// Provider logout URL, when the provider advertises one.
    pub fn logout_url(&self, id_token_hint: &str, post_logout_redirect: &str) -> Option<String> {
        let endpoint = self.end_session_endpoint.as_ref()?;
        let mut url = url::Url::parse(endpoint).ok()?;
        url.query_pairs_mut()
            .append_pair("id_token_hint", id_token_hint)
            .append_pair("post_logout_redirect_uri", post_logout_redirect);
        Some(url.into())
    }
}

/// `Set-Cookie` value for an HTTP-only cookie.
pub fn set_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}", name, value, max_age_secs);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that clears a cookie. Used on logout for `id_token`.
pub fn expire_cookie(name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", name)
}
