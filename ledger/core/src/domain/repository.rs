// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts, defined here and implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Records | Implementations |
//! |-------|---------|-----------------|
//! | `TenantRepository` | `Tenant` | `InMemoryTenantRepository`, `PostgresTenantRepository` |
//! | `VersionedRepository<WorkflowDefinition>` | `WorkflowVersion` | `InMemoryVersionedRepository`, `PostgresWorkflowRepository` |
//! | `MemoryRepository` | `MemoryVersion` | `InMemoryVersionedRepository`, `PostgresMemoryRepository` |
//!
//! ## Append-only discipline
//!
//! Versioned repositories expose two writes. `evolve` retires the current
//! latest row of a concept and inserts the next version in a single
//! transaction, serialized per `(tenant_id, concept_id)`. `evolve_from_latest`
//! does the same but derives the new payload from the latest row read inside
//! that transaction, so read-modify-write callers never act on a stale read.
//! Every method takes the tenant explicitly; there is no unscoped read.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::memory::{MemoryFact, ScoredMemory, SearchScope};
use crate::domain::tenant::{NewTenant, Tenant, TenantId};
use crate::domain::versioning::{ConceptId, Versioned, VersionNumber};

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>, RepositoryError>;

    /// Insert a tenant. Returns `UniqueViolation` when the domain is taken.
    async fn create(&self, tenant: NewTenant) -> Result<Tenant, RepositoryError>;

    /// Update display name in place. Tenant metadata is not versioned.
    async fn rename(&self, id: TenantId, name: &str) -> Result<Tenant, RepositoryError>;
}

/// Derives the next payload from the latest one. May run more than once when
/// the surrounding evolve is retried.
pub type Revision<'a, P> = &'a (dyn Fn(&P) -> P + Send + Sync);

#[async_trait]
pub trait VersionedRepository<P>: Send + Sync
where
    P: Send + Sync + 'static,
{
    /// Append a new version of `concept_id`, or start a new concept when `None`.
    ///
    /// An unknown caller-supplied concept id starts at version 1.
    async fn evolve(
        &self,
        tenant_id: TenantId,
        concept_id: Option<ConceptId>,
        payload: &P,
    ) -> Result<Versioned<P>, RepositoryError>;

    /// Append the version `revise` derives from the current latest version,
    /// read under the same per-concept lock as the write.
    ///
    /// Returns `NotFound` when the concept has no versions.
    async fn evolve_from_latest(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
        revise: Revision<'_, P>,
    ) -> Result<Versioned<P>, RepositoryError>;

    /// Latest version of every concept in the tenant, newest first.
    async fn list_latest(&self, tenant_id: TenantId) -> Result<Vec<Versioned<P>>, RepositoryError>;

    async fn find_latest(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
    ) -> Result<Option<Versioned<P>>, RepositoryError>;

    async fn find_version(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
        version: VersionNumber,
    ) -> Result<Option<Versioned<P>>, RepositoryError>;

    /// All versions of a concept in ascending version order.
    async fn history(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
    ) -> Result<Vec<Versioned<P>>, RepositoryError>;
}

#[async_trait]
pub trait MemoryRepository: VersionedRepository<MemoryFact> {
    /// Nearest memories by cosine distance, closest first.
    async fn search(
        &self,
        tenant_id: TenantId,
        query: &[f32],
        scope: SearchScope,
    ) -> Result<Vec<ScoredMemory>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::PoolTimedOut => RepositoryError::Timeout("connection pool".to_string()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                RepositoryError::UniqueViolation(
                    db_err.constraint().unwrap_or("unknown").to_string(),
                )
            }
            // 57014: query_canceled, raised when statement_timeout fires
            sqlx::Error::Database(ref db_err) if db_err.code().as_deref() == Some("57014") => {
                RepositoryError::Timeout(db_err.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
