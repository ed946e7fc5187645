// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Ledger Events
//!
//! Facts published after a change has been committed. Subscribers never see
//! an event for a rolled-back transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tenant::TenantId;
use super::versioning::{ConceptId, ConceptKind, VersionId, VersionNumber};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    TenantProvisioned {
        tenant_id: TenantId,
        domain: String,
        provisioned_at: DateTime<Utc>,
    },
    ConceptEvolved {
        kind: ConceptKind,
        tenant_id: TenantId,
        concept_id: ConceptId,
        version_id: VersionId,
        version_number: VersionNumber,
        evolved_at: DateTime<Utc>,
    },
    FeedbackApplied {
        receipt_id: uuid::Uuid,
        tenant_id: TenantId,
        concept_id: ConceptId,
        feedback: String,
        new_version: VersionNumber,
        confidence: f64,
        applied_at: DateTime<Utc>,
    },
    FeedbackFailed {
        receipt_id: uuid::Uuid,
        tenant_id: TenantId,
        concept_id: ConceptId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
}

impl LedgerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::TenantProvisioned { .. } => "TenantProvisioned",
            LedgerEvent::ConceptEvolved { .. } => "ConceptEvolved",
            LedgerEvent::FeedbackApplied { .. } => "FeedbackApplied",
            LedgerEvent::FeedbackFailed { .. } => "FeedbackFailed",
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        match self {
            LedgerEvent::TenantProvisioned { tenant_id, .. }
            | LedgerEvent::ConceptEvolved { tenant_id, .. }
            | LedgerEvent::FeedbackApplied { tenant_id, .. }
            | LedgerEvent::FeedbackFailed { tenant_id, .. } => *tenant_id,
        }
    }
}
