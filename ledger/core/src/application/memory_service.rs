// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # MemoryLedger
//!
//! Versioned memory facts with confidence. New facts start at the configured
//! initial confidence; every later change, including a feedback-driven
//! confidence nudge, is a new version produced by evolve.
//!
//! ## Reinforcement Signals
//!
//! - **positive**: confidence rises by `step × weight`, saturating at 1.0
//! - **negative**: confidence falls by `step × weight`, saturating at 0.0
//! - **correction**: content is replaced and re-embedded, confidence resets
//!
//! Feedback reads the confidence it adjusts inside the evolve transaction, so
//! concurrent signals for one memory compose even across processes sharing
//! the database. The `ReinforcementApplier` additionally keeps acceptance
//! order within one process.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tracing::{debug, info};

use crate::application::errors::LedgerError;
use crate::application::evolve::{evolve_latest_with_retry, evolve_with_retry, RetryPolicy};
use crate::domain::embedding::{EmbeddingError, EmbeddingProvider};
use crate::domain::events::LedgerEvent;
use crate::domain::feedback::{FeedbackKind, FeedbackWeight, ReinforcementPolicy};
use crate::domain::memory::{Confidence, MemoryFact, MemoryVersion, Provenance, ScoredMemory, SearchScope};
use crate::domain::repository::{MemoryRepository, RepositoryError, Revision};
use crate::domain::tenant::TenantId;
use crate::domain::versioning::{ConceptId, ConceptKind, VersionNumber};
use crate::infrastructure::event_bus::EventBus;

pub struct MemoryService {
    repo: Arc<dyn MemoryRepository>,
    embedder: Arc<dyn EmbeddingProvider>,
    event_bus: EventBus,
    retry: RetryPolicy,
    policy: ReinforcementPolicy,
    initial_confidence: Confidence,
    top_k: usize,
}

impl MemoryService {
    pub fn new(
        repo: Arc<dyn MemoryRepository>,
        embedder: Arc<dyn EmbeddingProvider>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            repo,
            embedder,
            event_bus,
            retry: RetryPolicy::default(),
            policy: ReinforcementPolicy::default(),
            initial_confidence: Confidence::clamped(0.5),
            top_k: 10,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_reinforcement_policy(mut self, policy: ReinforcementPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_initial_confidence(mut self, confidence: Confidence) -> Self {
        self.initial_confidence = confidence;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LedgerError> {
        let embedding = self.embedder.embed(text).await?;
        if embedding.len() != self.embedder.dimensions() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.embedder.dimensions(),
                actual: embedding.len(),
            }
            .into());
        }
        Ok(embedding)
    }

    /// Store a new memory concept at version 1.
    pub async fn remember(
        &self,
        tenant_id: TenantId,
        content: &str,
        provenance: Provenance,
    ) -> Result<MemoryVersion, LedgerError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(LedgerError::InvalidArgument("memory content must not be empty".to_string()));
        }

        let fact = MemoryFact {
            content: content.to_string(),
            embedding: self.embed(content).await?,
            confidence: self.initial_confidence,
            provenance,
        };

        let record = self.evolve(tenant_id, None, &fact).await?;
        counter!("evolve_memories_stored_total").increment(1);
        info!(tenant_id = %tenant_id, concept_id = %record.concept_id, "Stored memory");
        Ok(record)
    }

    /// Nearest memories to `query`, latest versions only unless the scope
    /// asks for history.
    pub async fn recall(
        &self,
        tenant_id: TenantId,
        query: &str,
        scope: Option<SearchScope>,
    ) -> Result<Vec<ScoredMemory>, LedgerError> {
        if query.trim().is_empty() {
            return Err(LedgerError::InvalidArgument("query must not be empty".to_string()));
        }
        let scope = scope.unwrap_or_else(|| SearchScope::latest(self.top_k));
        let embedding = self.embed(query.trim()).await?;
        let hits = self.repo.search(tenant_id, &embedding, scope).await?;

        counter!("evolve_memory_searches_total").increment(1);
        debug!(tenant_id = %tenant_id, hits = hits.len(), limit = scope.limit, "Recalled memories");
        Ok(hits)
    }

    pub async fn get(&self, tenant_id: TenantId, concept_id: ConceptId) -> Result<MemoryVersion, LedgerError> {
        self.repo
            .find_latest(tenant_id, concept_id)
            .await?
            .ok_or_else(|| not_found(tenant_id, concept_id, None))
    }

    pub async fn get_version(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
        version: VersionNumber,
    ) -> Result<MemoryVersion, LedgerError> {
        self.repo
            .find_version(tenant_id, concept_id, version)
            .await?
            .ok_or_else(|| not_found(tenant_id, concept_id, Some(version)))
    }

    pub async fn history(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
    ) -> Result<Vec<MemoryVersion>, LedgerError> {
        let versions = self.repo.history(tenant_id, concept_id).await?;
        if versions.is_empty() {
            return Err(not_found(tenant_id, concept_id, None));
        }
        Ok(versions)
    }

    /// Evolve a memory according to one feedback signal.
    ///
    /// The adjustment is applied to the latest version as read under the
    /// per-concept lock.
    pub async fn apply_feedback(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
        kind: &FeedbackKind,
        weight: FeedbackWeight,
    ) -> Result<MemoryVersion, LedgerError> {
        let correction = match kind {
            FeedbackKind::Correction { content } => {
                let content = content.trim();
                if content.is_empty() {
                    return Err(LedgerError::InvalidArgument("correction content must not be empty".to_string()));
                }
                Some((content.to_string(), self.embed(content).await?))
            }
            _ => None,
        };

        let policy = self.policy;
        let revise: Revision<'_, MemoryFact> = &|current: &MemoryFact| {
            let mut fact = current.clone();
            fact.confidence = policy.adjust(current.confidence, kind, weight);
            if let Some((content, embedding)) = &correction {
                fact.content = content.clone();
                fact.embedding = embedding.clone();
            }
            fact
        };

        let record = evolve_latest_with_retry(
            self.repo.as_ref(),
            self.retry,
            ConceptKind::Memory,
            tenant_id,
            concept_id,
            revise,
        )
        .await
        .map_err(|e| match e {
            LedgerError::Repository(RepositoryError::NotFound(_)) => not_found(tenant_id, concept_id, None),
            e => e,
        })?;
        self.publish_evolved(tenant_id, &record);

        counter!("evolve_memories_versioned_total", "feedback" => kind.as_str()).increment(1);
        info!(
            tenant_id = %tenant_id,
            concept_id = %concept_id,
            feedback = kind.as_str(),
            version = record.version_number.0,
            confidence = record.payload.confidence.value(),
            "Applied feedback"
        );
        Ok(record)
    }

    async fn evolve(
        &self,
        tenant_id: TenantId,
        concept_id: Option<ConceptId>,
        fact: &MemoryFact,
    ) -> Result<MemoryVersion, LedgerError> {
        let record = evolve_with_retry(
            self.repo.as_ref(),
            self.retry,
            ConceptKind::Memory,
            tenant_id,
            concept_id,
            fact,
        )
        .await?;
        self.publish_evolved(tenant_id, &record);
        Ok(record)
    }

    fn publish_evolved(&self, tenant_id: TenantId, record: &MemoryVersion) {
        self.event_bus.publish(LedgerEvent::ConceptEvolved {
            kind: ConceptKind::Memory,
            tenant_id,
            concept_id: record.concept_id,
            version_id: record.version_id,
            version_number: record.version_number,
            evolved_at: Utc::now(),
        });
    }
}

fn not_found(tenant_id: TenantId, concept_id: ConceptId, version: Option<VersionNumber>) -> LedgerError {
    LedgerError::ConceptNotFound {
        kind: ConceptKind::Memory,
        tenant_id,
        concept_id,
        version,
    }
}
