// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::embedding::EmbeddingError;
use crate::domain::identity::AuthError;
use crate::domain::repository::RepositoryError;
use crate::domain::tenant::TenantId;
use crate::domain::versioning::{ConceptId, ConceptKind, VersionNumber};

/// Service-level failure. Carries tenant/concept/version context but never
/// credential material.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Credential expired")]
    Expired,

    #[error("Malformed credential: {0}")]
    MalformedCredential(String),

    #[error("Invalid principal: {0}")]
    InvalidPrincipal(String),

    #[error("Could not provision tenant for domain '{domain}' after {attempts} attempts")]
    TenantProvisioningConflict { domain: String, attempts: u32 },

    #[error("Version conflict on {kind} {concept_id} in tenant {tenant_id} after {attempts} attempts")]
    VersionConflict {
        kind: ConceptKind,
        tenant_id: TenantId,
        concept_id: ConceptId,
        attempts: u32,
    },

    #[error("{kind} {concept_id} not found in tenant {tenant_id}")]
    ConceptNotFound {
        kind: ConceptKind,
        tenant_id: TenantId,
        concept_id: ConceptId,
        version: Option<VersionNumber>,
    },

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<AuthError> for LedgerError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredential => {
                LedgerError::InvalidCredential("no credential presented".to_string())
            }
            AuthError::InvalidCredential(m) => LedgerError::InvalidCredential(m),
            AuthError::Expired => LedgerError::Expired,
            AuthError::MalformedCredential(m) => LedgerError::MalformedCredential(m),
            AuthError::DependencyUnavailable(m) => LedgerError::DependencyUnavailable(m),
            AuthError::Configuration(m) => LedgerError::DependencyUnavailable(m),
        }
    }
}

impl From<EmbeddingError> for LedgerError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::Empty => LedgerError::InvalidArgument(err.to_string()),
            other => LedgerError::DependencyUnavailable(other.to_string()),
        }
    }
}

impl LedgerError {
    pub fn status(&self) -> u16 {
        match self {
            LedgerError::InvalidCredential(_)
            | LedgerError::Expired
            | LedgerError::MalformedCredential(_) => 401,
            LedgerError::InvalidPrincipal(_) => 403,
            LedgerError::ConceptNotFound { .. } => 404,
            LedgerError::TenantProvisioningConflict { .. } | LedgerError::VersionConflict { .. } => 409,
            LedgerError::InvalidArgument(_) => 400,
            LedgerError::DependencyUnavailable(_) => 503,
            LedgerError::Repository(RepositoryError::Timeout(_)) => 504,
            LedgerError::Repository(_) => 500,
        }
    }

    fn slug(&self) -> &'static str {
        match self {
            LedgerError::InvalidCredential(_) => "invalid-credential",
            LedgerError::Expired => "expired-credential",
            LedgerError::MalformedCredential(_) => "malformed-credential",
            LedgerError::InvalidPrincipal(_) => "invalid-principal",
            LedgerError::TenantProvisioningConflict { .. } => "tenant-provisioning-conflict",
            LedgerError::VersionConflict { .. } => "version-conflict",
            LedgerError::ConceptNotFound { .. } => "concept-not-found",
            LedgerError::DependencyUnavailable(_) => "dependency-unavailable",
            LedgerError::InvalidArgument(_) => "invalid-argument",
            LedgerError::Repository(_) => "storage-failure",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            LedgerError::InvalidCredential(_) => "Invalid credential",
            LedgerError::Expired => "Credential expired",
            LedgerError::MalformedCredential(_) => "Malformed credential",
            LedgerError::InvalidPrincipal(_) => "Invalid principal",
            LedgerError::TenantProvisioningConflict { .. } => "Tenant provisioning conflict",
            LedgerError::VersionConflict { .. } => "Version conflict",
            LedgerError::ConceptNotFound { .. } => "Concept not found",
            LedgerError::DependencyUnavailable(_) => "Dependency unavailable",
            LedgerError::InvalidArgument(_) => "Invalid argument",
            LedgerError::Repository(_) => "Storage failure",
        }
    }

    /// RFC 7807 payload for this error.
    pub fn problem(&self) -> ProblemDetails {
        let mut problem = ProblemDetails {
            problem_type: format!("urn:evolve:problem:{}", self.slug()),
            title: self.title().to_string(),
            status: self.status(),
            detail: self.to_string(),
            tenant_id: None,
            concept_id: None,
            version: None,
        };
        match self {
            LedgerError::VersionConflict { tenant_id, concept_id, .. } => {
                problem.tenant_id = Some(*tenant_id);
                problem.concept_id = Some(*concept_id);
            }
            LedgerError::ConceptNotFound { tenant_id, concept_id, version, .. } => {
                problem.tenant_id = Some(*tenant_id);
                problem.concept_id = Some(*concept_id);
                problem.version = version.map(|v| v.0);
            }
            // Storage internals stay in the logs
            LedgerError::Repository(_) => {
                problem.detail = "the ledger could not complete the operation".to_string();
            }
            _ => {}
        }
        problem
    }
}

/// RFC 7807 problem details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_id: Option<ConceptId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
}
