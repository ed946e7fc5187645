// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Versioning
//!
//! The shared shape of every append-only record. A *concept* is the stable
//! identity of an idea; each change produces a new immutable *version* and
//! moves the single latest pointer onto it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tenant::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConceptId(pub Uuid);

impl ConceptId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl std::fmt::Display for ConceptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionId(pub Uuid);

impl VersionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-concept version counter, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionNumber(pub i32);

impl VersionNumber {
    pub const FIRST: VersionNumber = VersionNumber(1);

    /// Next number given the current maximum, or 1 when the concept has no rows.
    pub fn after(max: Option<VersionNumber>) -> VersionNumber {
        match max {
            Some(VersionNumber(n)) => VersionNumber(n + 1),
            None => Self::FIRST,
        }
    }
}

impl std::fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// One immutable snapshot of a concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<P> {
    pub version_id: VersionId,
    pub concept_id: ConceptId,
    pub tenant_id: TenantId,
    pub version_number: VersionNumber,
    pub is_latest: bool,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: P,
}

/// Which ledger a concept lives in. Used for lock keys, metrics labels and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptKind {
    Workflow,
    Memory,
}

impl ConceptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConceptKind::Workflow => "workflow",
            ConceptKind::Memory => "memory",
        }
    }
}

impl std::fmt::Display for ConceptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
