// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # ReinforcementApplier
//!
//! Accepts feedback, acknowledges it immediately, and applies it in the
//! background as a new memory version.
//!
//! Ordering: submissions are routed to one of N worker queues by a hash of
//! `(tenant_id, concept_id)`. Each worker drains its queue sequentially, so
//! feedback for one memory concept is applied strictly in acceptance order
//! while unrelated concepts proceed in parallel.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::errors::LedgerError;
use crate::application::memory_service::MemoryService;
use crate::domain::events::LedgerEvent;
use crate::domain::feedback::{FeedbackKind, FeedbackWeight};
use crate::domain::memory::MemoryVersion;
use crate::domain::tenant::TenantId;
use crate::domain::versioning::ConceptId;
use crate::infrastructure::event_bus::EventBus;

/// Returned as soon as feedback is queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackAck {
    pub receipt_id: Uuid,
    pub concept_id: ConceptId,
    pub accepted_at: DateTime<Utc>,
}

/// Acknowledgement plus a handle on the eventual outcome.
#[derive(Debug)]
pub struct FeedbackTicket {
    pub ack: FeedbackAck,
    outcome: oneshot::Receiver<Result<MemoryVersion, LedgerError>>,
}

impl FeedbackTicket {
    /// Wait for the worker to apply the feedback.
    pub async fn outcome(self) -> Result<MemoryVersion, LedgerError> {
        self.outcome.await.map_err(|_| {
            LedgerError::DependencyUnavailable("reinforcement worker stopped before applying feedback".to_string())
        })?
    }
}

struct FeedbackJob {
    receipt_id: Uuid,
    tenant_id: TenantId,
    concept_id: ConceptId,
    kind: FeedbackKind,
    weight: FeedbackWeight,
    reply: oneshot::Sender<Result<MemoryVersion, LedgerError>>,
}

pub struct ReinforcementApplier {
    memory: Arc<MemoryService>,
    shards: RwLock<Vec<mpsc::Sender<FeedbackJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ReinforcementApplier {
    /// Start `workers` background tasks, each with a queue of `capacity`.
    pub fn spawn(memory: Arc<MemoryService>, event_bus: EventBus, workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let mut shards = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for shard in 0..workers {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            shards.push(tx);
            handles.push(tokio::spawn(run_worker(shard, rx, memory.clone(), event_bus.clone())));
        }

        info!(workers, capacity, "Reinforcement applier started");
        Self {
            memory,
            shards: RwLock::new(shards),
            workers: Mutex::new(handles),
        }
    }

    /// Queue feedback for a memory concept and return at once.
    ///
    /// Fails fast with `ConceptNotFound` when the memory does not exist in the
    /// tenant. Waits for queue space when the shard is full.
    pub async fn submit(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
        kind: FeedbackKind,
        weight: FeedbackWeight,
    ) -> Result<FeedbackTicket, LedgerError> {
        self.memory.get(tenant_id, concept_id).await?;

        let sender = {
            let shards = self.shards.read();
            if shards.is_empty() {
                None
            } else {
                Some(shards[shard_for(tenant_id, concept_id, shards.len())].clone())
            }
        }
        .ok_or_else(shut_down)?;

        let (reply, outcome) = oneshot::channel();
        let receipt_id = Uuid::new_v4();
        let feedback = kind.as_str();
        sender
            .send(FeedbackJob {
                receipt_id,
                tenant_id,
                concept_id,
                kind,
                weight,
                reply,
            })
            .await
            .map_err(|_| shut_down())?;

        debug!(%receipt_id, tenant_id = %tenant_id, concept_id = %concept_id, feedback, "Feedback accepted");
        Ok(FeedbackTicket {
            ack: FeedbackAck {
                receipt_id,
                concept_id,
                accepted_at: Utc::now(),
            },
            outcome,
        })
    }

    /// Submit and wait for the resulting memory version.
    pub async fn apply_feedback(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
        kind: FeedbackKind,
        weight: FeedbackWeight,
    ) -> Result<MemoryVersion, LedgerError> {
        self.submit(tenant_id, concept_id, kind, weight)
            .await?
            .outcome()
            .await
    }

    /// Stop accepting feedback, drain the queues and wait for the workers.
    pub async fn shutdown(&self) {
        self.shards.write().clear();
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!("Reinforcement worker ended abnormally: {}", e);
            }
        }
        info!("Reinforcement applier stopped");
    }
}

fn shut_down() -> LedgerError {
    LedgerError::DependencyUnavailable("reinforcement applier is shut down".to_string())
}

fn shard_for(tenant_id: TenantId, concept_id: ConceptId, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    tenant_id.hash(&mut hasher);
    concept_id.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

async fn run_worker(
    shard: usize,
    mut rx: mpsc::Receiver<FeedbackJob>,
    memory: Arc<MemoryService>,
    event_bus: EventBus,
) {
    debug!(shard, "Reinforcement worker running");
    while let Some(job) = rx.recv().await {
        let result = memory
            .apply_feedback(job.tenant_id, job.concept_id, &job.kind, job.weight)
            .await;

        match &result {
            Ok(version) => event_bus.publish(LedgerEvent::FeedbackApplied {
                receipt_id: job.receipt_id,
                tenant_id: job.tenant_id,
                concept_id: job.concept_id,
                feedback: job.kind.as_str().to_string(),
                new_version: version.version_number,
                confidence: version.payload.confidence.value(),
                applied_at: Utc::now(),
            }),
            Err(e) => {
                warn!(
                    receipt_id = %job.receipt_id,
                    tenant_id = %job.tenant_id,
                    concept_id = %job.concept_id,
                    error = %e,
                    "Failed to apply feedback"
                );
                event_bus.publish(LedgerEvent::FeedbackFailed {
                    receipt_id: job.receipt_id,
                    tenant_id: job.tenant_id,
                    concept_id: job.concept_id,
                    reason: e.to_string(),
                    failed_at: Utc::now(),
                });
            }
        }

        // Submitter may have dropped its ticket
        let _ = job.reply.send(result);
    }
    debug!(shard, "Reinforcement worker drained");
}
