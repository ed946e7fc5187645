// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Memory Facts
//!
//! Payload of the memory ledger: a piece of content, its embedding, a
//! confidence score and the provenance of whoever produced it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::versioning::{ConceptId, Versioned, VersionNumber};

/// Confidence in a memory fact, always within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    pub const MIN: Confidence = Confidence(0.0);
    pub const MAX: Confidence = Confidence(1.0);

    /// Rejects values outside `[0, 1]` and non-finite values.
    pub fn new(value: f64) -> Result<Self, String> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(format!("confidence {} outside [0, 1]", value));
        }
        Ok(Self(value))
    }

    /// Saturating constructor. NaN collapses to 0.
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            return Self::MIN;
        }
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Confidence {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Confidence::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(c: Confidence) -> f64 {
        c.0
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Where a memory came from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<ConceptId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_version: Option<VersionNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryFact {
    pub content: String,
    #[serde(skip_serializing, default)]
    pub embedding: Vec<f32>,
    pub confidence: Confidence,
    #[serde(default)]
    pub provenance: Provenance,
}

pub type MemoryVersion = Versioned<MemoryFact>;

/// A search hit. Lower distance is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMemory {
    #[serde(flatten)]
    pub memory: MemoryVersion,
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchScope {
    pub limit: usize,
    /// Search retired versions as well as latest ones.
    pub include_history: bool,
}

impl SearchScope {
    pub fn latest(limit: usize) -> Self {
        Self {
            limit,
            include_history: false,
        }
    }
}

impl Default for SearchScope {
    fn default() -> Self {
        Self::latest(10)
    }
}

/// Cosine distance (`1 - cos θ`) matching pgvector's `<=>` operator.
///
/// Returns 1.0 when either vector has zero magnitude or lengths differ.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na.sqrt() * nb.sqrt())
}
