// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Versioning properties of the ledger, exercised through the public surface
//! with in-memory repositories:
//! - exactly one latest version per concept, contiguous version numbers
//! - a conflicting evolve retries with a recomputed version number
//! - latest-only listing and tenant isolation
//! - reinforcement reproduces a known confidence sequence

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use evolve_ledger_core::application::authentication::TenantContext;
use evolve_ledger_core::application::evolve::RetryPolicy;
use evolve_ledger_core::application::ledger::LedgerComponents;
use evolve_ledger_core::application::workflow_service::WorkflowService;
use evolve_ledger_core::domain::feedback::{FeedbackKind, FeedbackWeight};
use evolve_ledger_core::domain::ledger_config::{Environment, LedgerConfigSpec};
use evolve_ledger_core::domain::memory::Provenance;
use evolve_ledger_core::domain::repository::{RepositoryError, Revision, VersionedRepository};
use evolve_ledger_core::domain::tenant::TenantId;
use evolve_ledger_core::domain::versioning::{ConceptId, ConceptKind, Versioned, VersionNumber};
use evolve_ledger_core::domain::workflow::{WorkflowDefinition, WorkflowStatus};
use evolve_ledger_core::infrastructure::embedding_client::HashingEmbedder;
use evolve_ledger_core::infrastructure::event_bus::EventBus;
use evolve_ledger_core::infrastructure::repositories::InMemoryVersionedRepository;
use evolve_ledger_core::infrastructure::token_verifier::DevBypassVerifier;
use evolve_ledger_core::{Ledger, LedgerError};

fn in_memory_ledger() -> Ledger {
    let verifier = Arc::new(DevBypassVerifier::new(Environment::Development).unwrap());
    let embedder = Arc::new(HashingEmbedder::new(64));
    Ledger::assemble(LedgerComponents::in_memory(verifier, embedder), &LedgerConfigSpec::default())
}

async fn context(ledger: &Ledger, email: &str) -> TenantContext {
    ledger.context_for_principal(email).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_evolves_leave_one_latest_and_contiguous_versions() {
    let repo = Arc::new(InMemoryVersionedRepository::<WorkflowDefinition>::new(ConceptKind::Workflow));
    let service = Arc::new(WorkflowService::new(repo.clone(), EventBus::with_default_capacity()));
    let tenant = TenantId::new();

    let v1 = service
        .put_workflow(tenant, None, WorkflowDefinition::new("Summarizer"), "a@newco.io")
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let service = service.clone();
        let concept = v1.concept_id;
        handles.push(tokio::spawn(async move {
            service
                .put_workflow(
                    tenant,
                    Some(concept),
                    WorkflowDefinition::new(format!("Summarizer rev {}", i)),
                    "a@newco.io",
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let history = repo.history(tenant, v1.concept_id).await.unwrap();
    let numbers: Vec<i32> = history.iter().map(|v| v.version_number.0).collect();
    assert_eq!(numbers, (1..=17).collect::<Vec<_>>());
    assert_eq!(history.iter().filter(|v| v.is_latest).count(), 1);
    assert!(history.last().unwrap().is_latest);

    let latest = repo.list_latest(tenant).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].version_number, VersionNumber(17));
}

/// Evolve that picks its version number from an unlocked read, suspends, and
/// only then writes. The `(tenant_id, concept_id, version_number)` key rejects
/// a number another writer claimed in the meantime.
struct UnlockedEvolve {
    inner: InMemoryVersionedRepository<WorkflowDefinition>,
    conflicts: AtomicU32,
}

impl UnlockedEvolve {
    async fn next_version(&self, tenant_id: TenantId, concept_id: ConceptId) -> Result<VersionNumber, RepositoryError> {
        let history = self.inner.history(tenant_id, concept_id).await?;
        Ok(VersionNumber::after(history.last().map(|v| v.version_number)))
    }
}

#[async_trait]
impl VersionedRepository<WorkflowDefinition> for UnlockedEvolve {
    async fn evolve(
        &self,
        tenant_id: TenantId,
        concept_id: Option<ConceptId>,
        payload: &WorkflowDefinition,
    ) -> Result<Versioned<WorkflowDefinition>, RepositoryError> {
        let Some(concept) = concept_id else {
            return self.inner.evolve(tenant_id, None, payload).await;
        };
        let planned = self.next_version(tenant_id, concept).await?;
        tokio::task::yield_now().await;

        if self.next_version(tenant_id, concept).await? != planned {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
            return Err(RepositoryError::UniqueViolation("workflows_concept_version_key".to_string()));
        }
        self.inner.evolve(tenant_id, Some(concept), payload).await
    }

    async fn evolve_from_latest(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
        revise: Revision<'_, WorkflowDefinition>,
    ) -> Result<Versioned<WorkflowDefinition>, RepositoryError> {
        self.inner.evolve_from_latest(tenant_id, concept_id, revise).await
    }

    async fn list_latest(&self, tenant_id: TenantId) -> Result<Vec<Versioned<WorkflowDefinition>>, RepositoryError> {
        self.inner.list_latest(tenant_id).await
    }

    async fn find_latest(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
    ) -> Result<Option<Versioned<WorkflowDefinition>>, RepositoryError> {
        self.inner.find_latest(tenant_id, concept_id).await
    }

    async fn find_version(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
        version: VersionNumber,
    ) -> Result<Option<Versioned<WorkflowDefinition>>, RepositoryError> {
        self.inner.find_version(tenant_id, concept_id, version).await
    }

    async fn history(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
    ) -> Result<Vec<Versioned<WorkflowDefinition>>, RepositoryError> {
        self.inner.history(tenant_id, concept_id).await
    }
}

#[tokio::test]
async fn test_conflicting_evolves_retry_with_fresh_version_numbers() {
    let repo = Arc::new(UnlockedEvolve {
        inner: InMemoryVersionedRepository::new(ConceptKind::Workflow),
        conflicts: AtomicU32::new(0),
    });
    let retry = RetryPolicy {
        max_attempts: 10,
        backoff: Duration::from_millis(1),
    };
    let service = WorkflowService::new(repo.clone(), EventBus::with_default_capacity()).with_retry_policy(retry);
    let tenant = TenantId::new();

    let v1 = service
        .put_workflow(tenant, None, WorkflowDefinition::new("Summarizer"), "a@newco.io")
        .await
        .unwrap();

    let writers = (0..8).map(|i| {
        service.put_workflow(
            tenant,
            Some(v1.concept_id),
            WorkflowDefinition::new(format!("Summarizer rev {}", i)),
            "a@newco.io",
        )
    });
    let results = futures::future::join_all(writers).await;

    let mut assigned: Vec<i32> = results
        .into_iter()
        .map(|r| r.unwrap().version_number.0)
        .collect();
    assigned.sort_unstable();
    assert_eq!(assigned, (2..=9).collect::<Vec<_>>());
    assert!(repo.conflicts.load(Ordering::SeqCst) > 0);

    let history = repo.history(tenant, v1.concept_id).await.unwrap();
    let numbers: Vec<i32> = history.iter().map(|v| v.version_number.0).collect();
    assert_eq!(numbers, (1..=9).collect::<Vec<_>>());
    assert_eq!(history.iter().filter(|v| v.is_latest).count(), 1);
    assert!(history.last().unwrap().is_latest);
}

#[tokio::test]
async fn test_summarizer_scenario_is_isolated_per_tenant() {
    let ledger = in_memory_ledger();
    let alice = context(&ledger, "alice@newco.io").await;
    let bob = context(&ledger, "bob@elsewhere.org").await;

    let v1 = ledger
        .put_workflow(&alice, None, WorkflowDefinition::new("Summarizer"))
        .await
        .unwrap();
    assert_eq!(v1.version_number, VersionNumber(1));
    assert!(v1.is_latest);

    let v2 = ledger
        .put_workflow(
            &alice,
            Some(v1.concept_id),
            WorkflowDefinition::new("Summarizer")
                .with_description("Summarise in three bullets")
                .with_status(WorkflowStatus::Active),
        )
        .await
        .unwrap();
    assert_eq!(v2.version_number, VersionNumber(2));
    assert_eq!(v2.concept_id, v1.concept_id);

    let listed = ledger.list_workflows(&alice).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].version_number, VersionNumber(2));
    assert_eq!(listed[0].payload.created_by, "alice@newco.io");

    let retired = ledger
        .get_workflow_version(&alice, v1.concept_id, VersionNumber(1))
        .await
        .unwrap();
    assert!(!retired.is_latest);

    assert!(ledger.list_workflows(&bob).await.unwrap().is_empty());
    let err = ledger.get_workflow(&bob, v1.concept_id).await.unwrap_err();
    assert!(matches!(err, LedgerError::ConceptNotFound { .. }));
}

#[tokio::test]
async fn test_list_latest_returns_one_row_per_concept() {
    let ledger = in_memory_ledger();
    let ctx = context(&ledger, "ops@newco.io").await;

    let a = ledger.put_workflow(&ctx, None, WorkflowDefinition::new("A")).await.unwrap();
    let b = ledger.put_workflow(&ctx, None, WorkflowDefinition::new("B")).await.unwrap();
    for _ in 0..3 {
        ledger.put_workflow(&ctx, Some(a.concept_id), WorkflowDefinition::new("A")).await.unwrap();
    }
    ledger.deprecate_workflow(&ctx, b.concept_id).await.unwrap();

    let listed = ledger.list_workflows(&ctx).await.unwrap();
    assert_eq!(listed.len(), 2);
    let a_latest = listed.iter().find(|v| v.concept_id == a.concept_id).unwrap();
    let b_latest = listed.iter().find(|v| v.concept_id == b.concept_id).unwrap();
    assert_eq!(a_latest.version_number, VersionNumber(4));
    assert_eq!(b_latest.payload.status, WorkflowStatus::Deprecated);
}

#[tokio::test]
async fn test_feedback_reproduces_confidence_sequence() {
    let ledger = in_memory_ledger();
    let ctx = context(&ledger, "alice@newco.io").await;

    let memory = ledger
        .remember(&ctx, "Staging deploys need a feature flag", Provenance::default())
        .await
        .unwrap();
    assert_eq!(memory.payload.confidence.value(), 0.5);

    let positive = ledger
        .submit_feedback(&ctx, memory.concept_id, FeedbackKind::Positive, FeedbackWeight::FULL)
        .await
        .unwrap();
    let negative = ledger
        .submit_feedback(&ctx, memory.concept_id, FeedbackKind::Negative, FeedbackWeight::FULL)
        .await
        .unwrap();
    assert_eq!(positive.ack.concept_id, memory.concept_id);
    positive.outcome().await.unwrap();
    let last = negative.outcome().await.unwrap();
    assert_eq!(last.version_number, VersionNumber(3));

    let mut sequence = Vec::new();
    for n in 1..=3 {
        let version = ledger
            .get_memory_version(&ctx, memory.concept_id, VersionNumber(n))
            .await
            .unwrap();
        sequence.push(version.payload.confidence.value());
    }
    assert_eq!(sequence, vec![0.5, 0.65, 0.5]);

    let latest = ledger.get_memory(&ctx, memory.concept_id).await.unwrap();
    assert_eq!(latest.version_number, VersionNumber(3));
    ledger.shutdown().await;
}

#[tokio::test]
async fn test_correction_replaces_content_and_resets_confidence() {
    let ledger = in_memory_ledger();
    let ctx = context(&ledger, "alice@newco.io").await;
    let memory = ledger
        .remember(&ctx, "The cache TTL is 5 minutes", Provenance::default())
        .await
        .unwrap();

    ledger
        .submit_feedback(&ctx, memory.concept_id, FeedbackKind::Positive, FeedbackWeight::FULL)
        .await
        .unwrap()
        .outcome()
        .await
        .unwrap();
    let corrected = ledger
        .submit_feedback(
            &ctx,
            memory.concept_id,
            FeedbackKind::Correction {
                content: "The cache TTL is 10 minutes".to_string(),
            },
            FeedbackWeight::FULL,
        )
        .await
        .unwrap()
        .outcome()
        .await
        .unwrap();

    assert_eq!(corrected.payload.content, "The cache TTL is 10 minutes");
    assert_eq!(corrected.payload.confidence.value(), 0.5);

    let hits = ledger.recall(&ctx, "cache TTL 10 minutes").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory.version_number, VersionNumber(3));
    ledger.shutdown().await;
}

#[tokio::test]
async fn test_feedback_on_foreign_memory_is_not_found_before_ack() {
    let ledger = in_memory_ledger();
    let alice = context(&ledger, "alice@newco.io").await;
    let mallory = context(&ledger, "mallory@evil.test").await;
    let memory = ledger
        .remember(&alice, "Internal runbook lives in the wiki", Provenance::default())
        .await
        .unwrap();

    let err = ledger
        .give_feedback(&mallory, memory.concept_id, FeedbackKind::Negative, FeedbackWeight::FULL)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::ConceptNotFound { .. }));
    assert_eq!(ledger.memory_history(&alice, memory.concept_id).await.unwrap().len(), 1);
    ledger.shutdown().await;
}
