// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # WorkflowLedger
//!
//! Versioned workflow definitions. A `put` with no concept id registers a new
//! workflow at version 1; a `put` with a concept id evolves it. Deprecation is
//! itself a new version whose payload carries `status: deprecated`.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tracing::info;

use crate::application::errors::LedgerError;
use crate::application::evolve::{evolve_latest_with_retry, evolve_with_retry, RetryPolicy};
use crate::domain::events::LedgerEvent;
use crate::domain::repository::{RepositoryError, Revision, VersionedRepository};
use crate::domain::tenant::TenantId;
use crate::domain::versioning::{ConceptId, ConceptKind, VersionNumber};
use crate::domain::workflow::{WorkflowDefinition, WorkflowStatus, WorkflowVersion};
use crate::infrastructure::event_bus::EventBus;

pub struct WorkflowService {
    repo: Arc<dyn VersionedRepository<WorkflowDefinition>>,
    event_bus: EventBus,
    retry: RetryPolicy,
}

impl WorkflowService {
    pub fn new(repo: Arc<dyn VersionedRepository<WorkflowDefinition>>, event_bus: EventBus) -> Self {
        Self {
            repo,
            event_bus,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn put_workflow(
        &self,
        tenant_id: TenantId,
        concept_id: Option<ConceptId>,
        mut definition: WorkflowDefinition,
        created_by: &str,
    ) -> Result<WorkflowVersion, LedgerError> {
        definition.validate().map_err(LedgerError::InvalidArgument)?;
        definition.created_by = created_by.to_string();

        let record = evolve_with_retry(
            self.repo.as_ref(),
            self.retry,
            ConceptKind::Workflow,
            tenant_id,
            concept_id,
            &definition,
        )
        .await?;

        let is_evolution = record.version_number > VersionNumber::FIRST;
        counter!(
            "evolve_workflows_evolved_total",
            "is_evolution" => if is_evolution { "true" } else { "false" }
        )
        .increment(1);
        info!(
            tenant_id = %tenant_id,
            concept_id = %record.concept_id,
            version = record.version_number.0,
            name = %record.payload.name,
            "Stored workflow version"
        );

        self.publish_evolved(tenant_id, &record);
        Ok(record)
    }

    /// Latest version of every workflow in the tenant.
    pub async fn list_workflows(&self, tenant_id: TenantId) -> Result<Vec<WorkflowVersion>, LedgerError> {
        Ok(self.repo.list_latest(tenant_id).await?)
    }

    pub async fn get_workflow(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
    ) -> Result<WorkflowVersion, LedgerError> {
        self.repo
            .find_latest(tenant_id, concept_id)
            .await?
            .ok_or_else(|| not_found(tenant_id, concept_id, None))
    }

    pub async fn get_workflow_version(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
        version: VersionNumber,
    ) -> Result<WorkflowVersion, LedgerError> {
        self.repo
            .find_version(tenant_id, concept_id, version)
            .await?
            .ok_or_else(|| not_found(tenant_id, concept_id, Some(version)))
    }

    pub async fn history(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
    ) -> Result<Vec<WorkflowVersion>, LedgerError> {
        let versions = self.repo.history(tenant_id, concept_id).await?;
        if versions.is_empty() {
            return Err(not_found(tenant_id, concept_id, None));
        }
        Ok(versions)
    }

    /// Evolve the workflow into a deprecated version of its latest definition.
    ///
    /// The definition is taken from the latest version read inside the evolve
    /// transaction, so a concurrent `put` is never overwritten.
    pub async fn deprecate(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
        created_by: &str,
    ) -> Result<WorkflowVersion, LedgerError> {
        let latest = self.get_workflow(tenant_id, concept_id).await?;
        if latest.payload.status == WorkflowStatus::Deprecated {
            return Ok(latest);
        }

        let revise: Revision<'_, WorkflowDefinition> = &|current: &WorkflowDefinition| {
            let mut definition = current.clone().with_status(WorkflowStatus::Deprecated);
            definition.created_by = created_by.to_string();
            definition
        };
        let record = evolve_latest_with_retry(
            self.repo.as_ref(),
            self.retry,
            ConceptKind::Workflow,
            tenant_id,
            concept_id,
            revise,
        )
        .await
        .map_err(|e| match e {
            LedgerError::Repository(RepositoryError::NotFound(_)) => not_found(tenant_id, concept_id, None),
            e => e,
        })?;

        info!(
            tenant_id = %tenant_id,
            concept_id = %concept_id,
            version = record.version_number.0,
            "Deprecated workflow"
        );
        self.publish_evolved(tenant_id, &record);
        Ok(record)
    }

    fn publish_evolved(&self, tenant_id: TenantId, record: &WorkflowVersion) {
        self.event_bus.publish(LedgerEvent::ConceptEvolved {
            kind: ConceptKind::Workflow,
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
        kind: ConceptKind::Workflow,
        tenant_id,
        concept_id,
        version,
    }
}
