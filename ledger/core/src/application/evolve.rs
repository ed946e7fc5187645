// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, warn};

use crate::application::errors::LedgerError;
use crate::domain::repository::{RepositoryError, Revision, VersionedRepository};
use crate::domain::tenant::TenantId;
use crate::domain::versioning::{ConceptId, ConceptKind, Versioned};

/// Bounded retry for evolve races that slip past the per-concept lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }
}

/// Run `evolve`, retrying unique violations on an existing concept.
///
/// Each attempt is a fresh transaction, so `next_version` is recomputed. A
/// violation while minting a new concept is not a race and is surfaced as is.
pub async fn evolve_with_retry<P, R>(
    repo: &R,
    policy: RetryPolicy,
    kind: ConceptKind,
    tenant_id: TenantId,
    concept_id: Option<ConceptId>,
    payload: &P,
) -> Result<Versioned<P>, LedgerError>
where
    P: Send + Sync + 'static,
    R: VersionedRepository<P> + ?Sized,
{
    retry_evolve(policy, kind, tenant_id, concept_id, || {
        repo.evolve(tenant_id, concept_id, payload)
    })
    .await
}

/// Run `evolve_from_latest` under the same retry rules. `revise` sees the
/// latest payload of each attempt, never a value read before the retry.
pub async fn evolve_latest_with_retry<P, R>(
    repo: &R,
    policy: RetryPolicy,
    kind: ConceptKind,
    tenant_id: TenantId,
    concept_id: ConceptId,
    revise: Revision<'_, P>,
) -> Result<Versioned<P>, LedgerError>
where
    P: Send + Sync + 'static,
    R: VersionedRepository<P> + ?Sized,
{
    retry_evolve(policy, kind, tenant_id, Some(concept_id), || {
        repo.evolve_from_latest(tenant_id, concept_id, revise)
    })
    .await
}

async fn retry_evolve<P, F, Fut>(
    policy: RetryPolicy,
    kind: ConceptKind,
    tenant_id: TenantId,
    concept_id: Option<ConceptId>,
    mut attempt_evolve: F,
) -> Result<Versioned<P>, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Versioned<P>, RepositoryError>>,
{
    let mut attempt = 1;
    loop {
        match (attempt_evolve().await, concept_id) {
            (Ok(record), _) => {
                debug!(
                    kind = kind.as_str(),
                    tenant_id = %tenant_id,
                    concept_id = %record.concept_id,
                    version = record.version_number.0,
                    attempt,
                    "Evolved concept"
                );
                return Ok(record);
            }
            (Err(RepositoryError::UniqueViolation(constraint)), Some(concept_id)) => {
                counter!("evolve_version_conflicts_total", "kind" => kind.as_str()).increment(1);
                if attempt >= policy.max_attempts {
                    warn!(
                        kind = kind.as_str(),
                        tenant_id = %tenant_id,
                        concept_id = %concept_id,
                        attempts = attempt,
                        "Version conflict persisted, giving up"
                    );
                    return Err(LedgerError::VersionConflict {
                        kind,
                        tenant_id,
                        concept_id,
                        attempts: attempt,
                    });
                }
                warn!(
                    kind = kind.as_str(),
                    tenant_id = %tenant_id,
                    concept_id = %concept_id,
                    constraint = %constraint,
                    attempt,
                    "Version conflict, retrying evolve"
                );
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            (Err(e), _) => return Err(e.into()),
        }
    }
}
