// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Memory Repository
//!
//! Versioned memory facts plus semantic search. pgvector has no native sqlx
//! mapping here, so embeddings cross the wire as `REAL[]` and are cast to
//! `vector` inside the statement:
//!
//! - insert: `$n::real[]::vector`
//! - select: `embedding::real[]`
//! - search: `embedding <=> $2::real[]::vector` (cosine distance)

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;
use tracing::debug;

use super::postgres_versioned::{PgQuery, PostgresVersionedRepository, VersionedTable};
use crate::domain::memory::{Confidence, MemoryFact, Provenance, ScoredMemory, SearchScope};
use crate::domain::repository::{MemoryRepository, RepositoryError};
use crate::domain::tenant::TenantId;
use crate::domain::versioning::ConceptKind;

pub struct MemoryTable;

impl VersionedTable for MemoryTable {
    type Payload = MemoryFact;

    const KIND: ConceptKind = ConceptKind::Memory;
    const TABLE: &'static str = "memories";
    const PAYLOAD_COLUMNS: &'static [&'static str] = &["content", "embedding", "confidence", "provenance"];
    const PAYLOAD_SELECT: &'static str = "content, embedding::real[] AS embedding, confidence, provenance";

    fn placeholder(column: &str, index: usize) -> String {
        if column == "embedding" {
            format!("${}::real[]::vector", index)
        } else {
            format!("${}", index)
        }
    }

    fn bind_payload<'q>(query: PgQuery<'q>, payload: &MemoryFact) -> Result<PgQuery<'q>, RepositoryError> {
        if payload.embedding.is_empty() {
            return Err(RepositoryError::Serialization(
                "memory fact has no embedding".to_string(),
            ));
        }
        Ok(query
            .bind(payload.content.clone())
            .bind(payload.embedding.clone())
            .bind(payload.confidence.value())
            .bind(Json(payload.provenance.clone())))
    }

    fn decode_payload(row: &PgRow) -> Result<MemoryFact, RepositoryError> {
        let confidence: f64 = row.try_get("confidence")?;
        let provenance: Json<Provenance> = row.try_get("provenance")?;
        Ok(MemoryFact {
            content: row.try_get("content")?,
            embedding: row.try_get("embedding")?,
            confidence: Confidence::new(confidence).map_err(RepositoryError::Serialization)?,
            provenance: provenance.0,
        })
    }
}

pub type PostgresMemoryRepository = PostgresVersionedRepository<MemoryTable>;

#[async_trait]
impl MemoryRepository for PostgresVersionedRepository<MemoryTable> {
    async fn search(
        &self,
        tenant_id: TenantId,
        query: &[f32],
        scope: SearchScope,
    ) -> Result<Vec<ScoredMemory>, RepositoryError> {
        let sql = format!(
            "SELECT version_id, concept_id, tenant_id, version_number, is_latest, created_at, {}, \
                    (embedding <=> $2::real[]::vector)::float8 AS distance \
             FROM {} \
             WHERE tenant_id = $1 AND ($3 OR is_latest) \
             ORDER BY distance ASC \
             LIMIT $4",
            MemoryTable::PAYLOAD_SELECT,
            MemoryTable::TABLE
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.0)
            .bind(query.to_vec())
            .bind(scope.include_history)
            .bind(scope.limit as i64)
            .fetch_all(self.pool())
            .await?;

        debug!(tenant_id = %tenant_id, hits = rows.len(), limit = scope.limit, "Memory search");

        rows.iter()
            .map(|row| {
                Ok(ScoredMemory {
                    memory: Self::decode_row(row)?,
                    distance: row.try_get("distance")?,
                })
            })
            .collect()
    }
}
