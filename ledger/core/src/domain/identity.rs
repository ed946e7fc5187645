// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Identity
//!
//! Principal claims produced by credential verification and the port through
//! which credentials are verified.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Email substituted for every request when the development bypass is active.
pub const DEV_PLACEHOLDER_EMAIL: &str = "dev@localhost";

/// Credential transport, which decides the audience policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustMode {
    /// `id_token` cookie minted by our own confidential client. Audience must
    /// equal the server's client id.
    Session,
    /// `Authorization: Bearer` token issued to a public client. Audience is
    /// not checked.
    Bearer,
}

impl TrustMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustMode::Session => "session",
            TrustMode::Bearer => "bearer",
        }
    }
}

impl std::fmt::Display for TrustMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded principal, validated once at the verification boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub subject: String,
    pub email: String,
    pub issuer: String,
    pub audience: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

impl IdentityClaims {
    /// Identity used by the development bypass.
    pub fn dev_placeholder() -> Self {
        Self {
            subject: "dev".to_string(),
            email: DEV_PLACEHOLDER_EMAIL.to_string(),
            issuer: "dev-bypass".to_string(),
            audience: Vec::new(),
            expires_at: DateTime::<Utc>::MAX_UTC,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No credential presented")]
    MissingCredential,

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Credential expired")]
    Expired,

    #[error("Malformed credential: {0}")]
    MalformedCredential(String),

    #[error("Identity provider unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Authentication misconfigured: {0}")]
    Configuration(String),
}

impl AuthError {
    /// Short label for metrics and logs. Never contains credential material.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing",
            AuthError::InvalidCredential(_) => "invalid",
            AuthError::Expired => "expired",
            AuthError::MalformedCredential(_) => "malformed",
            AuthError::DependencyUnavailable(_) => "dependency_unavailable",
            AuthError::Configuration(_) => "configuration",
        }
    }
}

/// Port for credential verification.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, credential: &str, mode: TrustMode) -> Result<IdentityClaims, AuthError>;

    /// `false` when any request is accepted without a credential.
    fn requires_credential(&self) -> bool {
        true
    }
}
