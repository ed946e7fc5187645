// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Token Verifier
//!
//! [`CredentialVerifier`] implementations.
//!
//! [`OidcTokenVerifier`] checks signature, issuer and expiry of every token.
//! The audience policy depends on the trust mode:
//!
//! | Mode    | Transport              | Audience                         |
//! |---------|------------------------|----------------------------------|
//! | Session | `id_token` cookie      | must contain the server client id |
//! | Bearer  | `Authorization` header | not checked                      |
//!
//! [`DevBypassVerifier`] accepts anything and yields the placeholder
//! identity. It refuses to exist outside the development environment.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::identity::{AuthError, CredentialVerifier, IdentityClaims, TrustMode};
use crate::domain::ledger_config::Environment;
use crate::infrastructure::oidc::jwks::KeySource;
use crate::infrastructure::oidc::ProviderMetadata;

const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// `aud` may be a single string or an array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AudienceClaim {
    Single(String),
    Multiple(Vec<String>),
}

impl AudienceClaim {
    fn into_vec(self) -> Vec<String> {
        match self {
            AudienceClaim::Single(aud) => vec![aud],
            AudienceClaim::Multiple(auds) => auds,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    iss: String,
    #[serde(default)]
    aud: Option<AudienceClaim>,
    exp: i64,
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            AuthError::MalformedCredential(err.to_string())
        }
        _ => AuthError::InvalidCredential(err.to_string()),
    }
}

pub struct OidcTokenVerifier {
    issuer: String,
    client_id: String,
    keys: Arc<dyn KeySource>,
    leeway_secs: u64,
}

impl OidcTokenVerifier {
    pub fn new(metadata: &ProviderMetadata, client_id: &str, keys: Arc<dyn KeySource>) -> Self {
        Self {
            issuer: metadata.issuer.clone(),
            client_id: client_id.to_string(),
            keys,
            leeway_secs: 60,
        }
    }

    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    fn validation(&self, alg: Algorithm, mode: TrustMode) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.leeway_secs;
        validation.set_issuer(&[&self.issuer]);
        match mode {
            TrustMode::Session => {
                validation.set_required_spec_claims(&["exp", "iss", "sub", "aud"]);
                validation.set_audience(&[&self.client_id]);
            }
            TrustMode::Bearer => {
                validation.set_required_spec_claims(&["exp", "iss", "sub"]);
                validation.validate_aud = false;
            }
        }
        validation
    }
}

#[async_trait]
impl CredentialVerifier for OidcTokenVerifier {
    async fn verify(&self, credential: &str, mode: TrustMode) -> Result<IdentityClaims, AuthError> {
        let token = credential.trim();
        if token.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let header = decode_header(token).map_err(map_jwt_error)?;
        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::InvalidCredential(format!(
                "algorithm {:?} is not accepted",
                header.alg
            )));
        }

        let key = self.keys.key_for(header.kid.as_deref()).await?;
        let data = decode::<RawClaims>(token, &key, &self.validation(header.alg, mode)).map_err(|e| {
            let err = map_jwt_error(e);
            debug!(mode = %mode, reason = err.reason(), "Token rejected");
            err
        })?;
        let claims = data.claims;

        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::MalformedCredential("exp out of range".to_string()))?;

        let email = match claims.email.filter(|e| !e.trim().is_empty()) {
            Some(email) => email,
            None => claims.sub.clone(),
        };

        Ok(IdentityClaims {
            subject: claims.sub,
            email,
            issuer: claims.iss,
            audience: claims.aud.map(AudienceClaim::into_vec).unwrap_or_default(),
            expires_at,
        })
    }
}

/// Development-only verifier. Every request is `dev@localhost`.
#[derive(Debug)]
pub struct DevBypassVerifier {
    _private: (),
}

impl DevBypassVerifier {
    pub fn new(environment: Environment) -> Result<Self, AuthError> {
        if environment != Environment::Development {
            return Err(AuthError::Configuration(format!(
                "authentication bypass requested in {} environment",
                environment
            )));
        }
        warn!("Authentication bypass is ACTIVE; all requests act as the development placeholder");
        Ok(Self { _private: () })
    }
}

#[async_trait]
impl CredentialVerifier for DevBypassVerifier {
    async fn verify(&self, _credential: &str, _mode: TrustMode) -> Result<IdentityClaims, AuthError> {
        Ok(IdentityClaims::dev_placeholder())
    }

    fn requires_credential(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::DEV_PLACEHOLDER_EMAIL;
    use crate::infrastructure::oidc::jwks::StaticKeySource;
    use crate::infrastructure::oidc::test_metadata;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const PRIVATE_PEM: &str = include_str!("../../tests/fixtures/test_rsa_private.pem");
    const JWKS: &str = include_str!("../../tests/fixtures/jwks.json");
    const ISSUER: &str = "https://idp.example.com/oauth2/default";

    fn verifier() -> OidcTokenVerifier {
        let keys = Arc::new(StaticKeySource::from_json(JWKS).unwrap());
        OidcTokenVerifier::new(&test_metadata(ISSUER), "evolve-server", keys).with_leeway(0)
    }

    fn sign(claims: serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("test-key-1".to_string());
        let key = EncodingKey::from_rsa_pem(PRIVATE_PEM.as_bytes()).unwrap();
        encode(&header, &claims, &key).unwrap()
    }

    fn claims(aud: serde_json::Value, exp_offset: i64) -> serde_json::Value {
        json!({
            "sub": "00u1abcd",
            "email": "alice@newco.io",
            "iss": ISSUER,
            "aud": aud,
            "exp": Utc::now().timestamp() + exp_offset,
            "iat": Utc::now().timestamp(),
        })
    }

    #[tokio::test]
    async fn test_session_token_for_own_client_verifies() {
        let token = sign(claims(json!("evolve-server"), 3600));
        let identity = verifier().verify(&token, TrustMode::Session).await.unwrap();
        assert_eq!(identity.email, "alice@newco.io");
        assert_eq!(identity.issuer, ISSUER);
        assert_eq!(identity.audience, vec!["evolve-server".to_string()]);
    }

    #[tokio::test]
    async fn test_foreign_audience_passes_bearer_but_not_session() {
        let token = sign(claims(json!("api://default"), 3600));
        assert!(verifier().verify(&token, TrustMode::Bearer).await.is_ok());
        assert!(matches!(
            verifier().verify(&token, TrustMode::Session).await,
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn test_audience_array_is_accepted() {
        let token = sign(claims(json!(["other", "evolve-server"]), 3600));
        let identity = verifier().verify(&token, TrustMode::Session).await.unwrap();
        assert_eq!(identity.audience.len(), 2);
    }

    #[tokio::test]
    async fn test_expired_token() {
        let token = sign(claims(json!("evolve-server"), -600));
        assert_eq!(verifier().verify(&token, TrustMode::Bearer).await.unwrap_err(), AuthError::Expired);
    }

    #[tokio::test]
    async fn test_wrong_issuer_is_invalid() {
        let mut c = claims(json!("evolve-server"), 3600);
        c["iss"] = json!("https://evil.example.com");
        let token = sign(c);
        assert!(matches!(
            verifier().verify(&token, TrustMode::Bearer).await,
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn test_garbage_is_malformed() {
        assert!(matches!(
            verifier().verify("not-a-jwt", TrustMode::Bearer).await,
            Err(AuthError::MalformedCredential(_))
        ));
    }

    #[tokio::test]
    async fn test_tampered_signature_is_invalid() {
        let token = sign(claims(json!("evolve-server"), 3600));
        let (rest, sig) = token.rsplit_once('.').unwrap();
        let flipped = if sig.starts_with('A') { "B" } else { "A" };
        let tampered = format!("{}.{}{}", rest, flipped, &sig[1..]);
        assert!(matches!(
            verifier().verify(&tampered, TrustMode::Bearer).await,
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn test_symmetric_algorithm_is_refused() {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("test-key-1".to_string());
        let token = encode(
            &header,
            &claims(json!("evolve-server"), 3600),
            &EncodingKey::from_secret(b"shared"),
        )
        .unwrap();
        assert!(matches!(
            verifier().verify(&token, TrustMode::Bearer).await,
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn test_email_falls_back_to_subject() {
        let mut c = claims(json!("evolve-server"), 3600);
        c.as_object_mut().unwrap().remove("email");
        c["sub"] = json!("svc@partner.org");
        let identity = verifier().verify(&sign(c), TrustMode::Bearer).await.unwrap();
        assert_eq!(identity.email, "svc@partner.org");
    }

    #[tokio::test]
    async fn test_empty_credential_is_missing() {
        assert_eq!(
            verifier().verify("  ", TrustMode::Session).await.unwrap_err(),
            AuthError::MissingCredential
        );
    }

    #[tokio::test]
    async fn test_bypass_only_in_development() {
        assert!(DevBypassVerifier::new(Environment::Production).is_err());
        assert!(DevBypassVerifier::new(Environment::Staging).is_err());

        let bypass = DevBypassVerifier::new(Environment::Development).unwrap();
        assert!(!bypass.requires_credential());
        let identity = bypass.verify("", TrustMode::Session).await.unwrap();
        assert_eq!(identity.email, DEV_PLACEHOLDER_EMAIL);
    }
}
