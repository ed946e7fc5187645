// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository contracts defined in
//! `crate::domain::repository`.
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresTenantRepository** - tenants keyed by unique domain
//! - **PostgresWorkflowRepository** - versioned workflow definitions
//! - **PostgresMemoryRepository** - versioned memory facts with pgvector search
//!
//! The two versioned repositories share one evolve engine,
//! [`postgres_versioned::PostgresVersionedRepository`], parameterised by a
//! table description.
//!
//! ## In-Memory Repositories
//!
//! Mutex-guarded maps honouring the same invariants, for development and
//! tests. Both evolve operations are atomic because the read, retire and insert
//! run under one lock.

pub mod postgres_tenant;
pub mod postgres_versioned;
pub mod postgres_workflow;
pub mod postgres_memory;

pub use postgres_memory::PostgresMemoryRepository;
pub use postgres_tenant::PostgresTenantRepository;
pub use postgres_workflow::PostgresWorkflowRepository;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::domain::memory::{cosine_distance, MemoryFact, ScoredMemory, SearchScope};
use crate::domain::repository::{MemoryRepository, RepositoryError, Revision, TenantRepository, VersionedRepository};
use crate::domain::tenant::{NewTenant, Tenant, TenantId};
use crate::domain::versioning::{ConceptId, ConceptKind, Versioned, VersionId, VersionNumber};

#[derive(Clone, Default)]
pub struct InMemoryTenantRepository {
    tenants: Arc<Mutex<HashMap<TenantId, Tenant>>>,
}

impl InMemoryTenantRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>, RepositoryError> {
        let tenants = self.tenants.lock();
        Ok(tenants.values().find(|t| t.domain == domain).cloned())
    }

    async fn create(&self, tenant: NewTenant) -> Result<Tenant, RepositoryError> {
        let mut tenants = self.tenants.lock();
        if tenants.values().any(|t| t.domain == tenant.domain) {
            return Err(RepositoryError::UniqueViolation("tenants_domain_key".to_string()));
        }
        let now = Utc::now();
        let created = Tenant {
            id: TenantId::new(),
            name: tenant.name,
            domain: tenant.domain,
            created_at: now,
            updated_at: now,
        };
        tenants.insert(created.id, created.clone());
        Ok(created)
    }

    async fn rename(&self, id: TenantId, name: &str) -> Result<Tenant, RepositoryError> {
        let mut tenants = self.tenants.lock();
        let tenant = tenants
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("tenant {}", id)))?;
        tenant.name = name.to_string();
        tenant.updated_at = Utc::now();
        Ok(tenant.clone())
    }
}

type ConceptKey = (TenantId, ConceptId);

/// Versioned store for any payload, keyed by `(tenant_id, concept_id)`.
#[derive(Clone)]
pub struct InMemoryVersionedRepository<P> {
    kind: ConceptKind,
    concepts: Arc<Mutex<HashMap<ConceptKey, Vec<Versioned<P>>>>>,
}

impl<P> InMemoryVersionedRepository<P> {
    pub fn new(kind: ConceptKind) -> Self {
        Self {
            kind,
            concepts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn kind(&self) -> ConceptKind {
        self.kind
    }
}

/// Retire every version and push the next one as latest.
fn append_version<P: Clone>(
    versions: &mut Vec<Versioned<P>>,
    tenant_id: TenantId,
    concept_id: ConceptId,
    payload: P,
) -> Versioned<P> {
    for version in versions.iter_mut() {
        version.is_latest = false;
    }
    let max = versions.iter().map(|v| v.version_number).max();

    let record = Versioned {
        version_id: VersionId::new(),
        concept_id,
        tenant_id,
        version_number: VersionNumber::after(max),
        is_latest: true,
        created_at: Utc::now(),
        payload,
    };
    versions.push(record.clone());
    record
}

#[async_trait]
impl<P> VersionedRepository<P> for InMemoryVersionedRepository<P>
where
    P: Clone + Send + Sync + 'static,
{
    async fn evolve(
        &self,
        tenant_id: TenantId,
        concept_id: Option<ConceptId>,
        payload: &P,
    ) -> Result<Versioned<P>, RepositoryError> {
        let mut concepts = self.concepts.lock();
        let concept_id = concept_id.unwrap_or_else(ConceptId::new);
        let versions = concepts.entry((tenant_id, concept_id)).or_default();
        Ok(append_version(versions, tenant_id, concept_id, payload.clone()))
    }

    async fn evolve_from_latest(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
        revise: Revision<'_, P>,
    ) -> Result<Versioned<P>, RepositoryError> {
        let mut concepts = self.concepts.lock();
        let versions = concepts
            .get_mut(&(tenant_id, concept_id))
            .ok_or_else(|| RepositoryError::NotFound(format!("{} {}", self.kind.as_str(), concept_id)))?;
        let payload = versions
            .iter()
            .find(|v| v.is_latest)
            .map(|latest| revise(&latest.payload))
            .ok_or_else(|| RepositoryError::NotFound(format!("{} {}", self.kind.as_str(), concept_id)))?;
        Ok(append_version(versions, tenant_id, concept_id, payload))
    }

    async fn list_latest(&self, tenant_id: TenantId) -> Result<Vec<Versioned<P>>, RepositoryError> {
        let concepts = self.concepts.lock();
        let mut latest: Vec<Versioned<P>> = concepts
            .iter()
            .filter(|((tenant, _), _)| *tenant == tenant_id)
            .filter_map(|(_, versions)| versions.iter().find(|v| v.is_latest).cloned())
            .collect();
        latest.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.concept_id.cmp(&b.concept_id)));
        Ok(latest)
    }

    async fn find_latest(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
    ) -> Result<Option<Versioned<P>>, RepositoryError> {
        let concepts = self.concepts.lock();
        Ok(concepts
            .get(&(tenant_id, concept_id))
            .and_then(|versions| versions.iter().find(|v| v.is_latest).cloned()))
    }

    async fn find_version(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
        version: VersionNumber,
    ) -> Result<Option<Versioned<P>>, RepositoryError> {
        let concepts = self.concepts.lock();
        Ok(concepts
            .get(&(tenant_id, concept_id))
            .and_then(|versions| versions.iter().find(|v| v.version_number == version).cloned()))
    }

    async fn history(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
    ) -> Result<Vec<Versioned<P>>, RepositoryError> {
        let concepts = self.concepts.lock();
        let mut versions = concepts
            .get(&(tenant_id, concept_id))
            .cloned()
            .unwrap_or_default();
        versions.sort_by_key(|v| v.version_number);
        Ok(versions)
    }
}

#[async_trait]
impl MemoryRepository for InMemoryVersionedRepository<MemoryFact> {
    async fn search(
        &self,
        tenant_id: TenantId,
        query: &[f32],
        scope: SearchScope,
    ) -> Result<Vec<ScoredMemory>, RepositoryError> {
        let concepts = self.concepts.lock();
        let mut hits: Vec<ScoredMemory> = concepts
            .iter()
            .filter(|((tenant, _), _)| *tenant == tenant_id)
            .flat_map(|(_, versions)| versions.iter())
            .filter(|v| scope.include_history || v.is_latest)
            .map(|v| ScoredMemory {
                distance: cosine_distance(&v.payload.embedding, query),
                memory: v.clone(),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(scope.limit);
        Ok(hits)
    }
}
