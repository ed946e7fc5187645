// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Versioned Repository
//!
//! The evolve engine shared by every append-only table. A [`VersionedTable`]
//! describes the payload columns; [`PostgresVersionedRepository`] owns the
//! transaction protocol:
//!
//! 1. `BEGIN`
//! 2. `pg_advisory_xact_lock` on a hash of `(table, tenant_id, concept_id)`
//! 3. retire the current latest row
//! 4. `next = MAX(version_number) + 1`, or 1 for an unknown concept
//! 5. insert the new row with `is_latest = TRUE`
//! 6. `COMMIT`
//!
//! A brand-new concept (no caller-supplied id) skips 2–4 and starts at 1.
//! `evolve_from_latest` reads the latest row `FOR UPDATE` between steps 2 and
//! 3 and derives the inserted payload from it.
//! The lock is released at commit or rollback. The partial unique index on
//! `(tenant_id, concept_id) WHERE is_latest` and the unique
//! `(tenant_id, concept_id, version_number)` constraint back this up; a
//! violation surfaces as `RepositoryError::UniqueViolation` and the whole
//! transaction is rolled back when `tx` is dropped.

use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnection, PgPool, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row, Transaction};
use tracing::{debug, error};

use crate::domain::repository::{RepositoryError, Revision, VersionedRepository};
use crate::domain::tenant::TenantId;
use crate::domain::versioning::{ConceptId, ConceptKind, Versioned, VersionId, VersionNumber};

pub type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Column layout of one versioned table.
pub trait VersionedTable: Send + Sync + 'static {
    type Payload: Send + Sync + 'static;

    const KIND: ConceptKind;
    const TABLE: &'static str;
    /// Payload columns in bind order.
    const PAYLOAD_COLUMNS: &'static [&'static str];
    /// Select list producing the payload columns decoded by `decode_payload`.
    const PAYLOAD_SELECT: &'static str;

    /// Placeholder expression for one payload column.
    fn placeholder(_column: &str, index: usize) -> String {
        format!("${}", index)
    }

    fn bind_payload<'q>(query: PgQuery<'q>, payload: &Self::Payload) -> Result<PgQuery<'q>, RepositoryError>;

    fn decode_payload(row: &PgRow) -> Result<Self::Payload, RepositoryError>;
}

const COMMON_SELECT: &str = "version_id, concept_id, tenant_id, version_number, is_latest, created_at";

pub struct PostgresVersionedRepository<T: VersionedTable> {
    pool: PgPool,
    _table: PhantomData<T>,
}

impl<T: VersionedTable> PostgresVersionedRepository<T> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _table: PhantomData,
        }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn select_sql(where_clause: &str, order_by: &str) -> String {
        format!(
            "SELECT {}, {} FROM {} WHERE {} ORDER BY {}",
            COMMON_SELECT,
            T::PAYLOAD_SELECT,
            T::TABLE,
            where_clause,
            order_by
        )
    }

    fn insert_sql() -> String {
        let columns = T::PAYLOAD_COLUMNS.join(", ");
        let placeholders: Vec<String> = T::PAYLOAD_COLUMNS
            .iter()
            .enumerate()
            .map(|(i, column)| T::placeholder(column, i + 5))
            .collect();
        format!(
            "INSERT INTO {} (version_id, concept_id, tenant_id, version_number, is_latest, created_at, {}) \
             VALUES ($1, $2, $3, $4, TRUE, NOW(), {}) RETURNING created_at",
            T::TABLE,
            columns,
            placeholders.join(", ")
        )
    }

    fn lock_key(tenant_id: TenantId, concept_id: ConceptId) -> String {
        format!("{}:{}:{}", T::TABLE, tenant_id, concept_id)
    }

    pub(crate) fn decode_row(row: &PgRow) -> Result<Versioned<T::Payload>, RepositoryError> {
        Ok(Versioned {
            version_id: VersionId(row.try_get("version_id")?),
            concept_id: ConceptId(row.try_get("concept_id")?),
            tenant_id: TenantId(row.try_get("tenant_id")?),
            version_number: VersionNumber(row.try_get("version_number")?),
            is_latest: row.try_get("is_latest")?,
            created_at: row.try_get("created_at")?,
            payload: T::decode_payload(row)?,
        })
    }
}

impl<T> PostgresVersionedRepository<T>
where
    T: VersionedTable,
    T::Payload: Clone,
{
    async fn lock_concept(
        conn: &mut PgConnection,
        tenant_id: TenantId,
        concept_id: ConceptId,
    ) -> Result<(), RepositoryError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(Self::lock_key(tenant_id, concept_id))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Retire the latest row and return the next version number.
    async fn retire_latest(
        conn: &mut PgConnection,
        tenant_id: TenantId,
        concept_id: ConceptId,
    ) -> Result<VersionNumber, RepositoryError> {
        let retire_sql = format!(
            "UPDATE {} SET is_latest = FALSE WHERE tenant_id = $1 AND concept_id = $2 AND is_latest",
            T::TABLE
        );
        let retired = sqlx::query(&retire_sql)
            .bind(tenant_id.0)
            .bind(concept_id.0)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        let max_sql = format!(
            "SELECT MAX(version_number) FROM {} WHERE tenant_id = $1 AND concept_id = $2",
            T::TABLE
        );
        let max: Option<i32> = sqlx::query_scalar(&max_sql)
            .bind(tenant_id.0)
            .bind(concept_id.0)
            .fetch_one(&mut *conn)
            .await?;

        debug!(
            kind = T::KIND.as_str(),
            tenant_id = %tenant_id,
            concept_id = %concept_id,
            retired,
            max_version = ?max,
            "Retired latest version"
        );
        Ok(VersionNumber::after(max.map(VersionNumber)))
    }

    async fn insert_version(
        conn: &mut PgConnection,
        tenant_id: TenantId,
        concept_id: ConceptId,
        version_number: VersionNumber,
        payload: T::Payload,
    ) -> Result<Versioned<T::Payload>, RepositoryError> {
        let version_id = VersionId::new();
        let insert_sql = Self::insert_sql();
        let query = sqlx::query(&insert_sql)
            .bind(version_id.0)
            .bind(concept_id.0)
            .bind(tenant_id.0)
            .bind(version_number.0);
        let row = T::bind_payload(query, &payload)?.fetch_one(conn).await?;

        Ok(Versioned {
            version_id,
            concept_id,
            tenant_id,
            version_number,
            is_latest: true,
            created_at: row.try_get("created_at")?,
            payload,
        })
    }

    async fn commit(
        tx: Transaction<'_, Postgres>,
        tenant_id: TenantId,
        concept_id: ConceptId,
    ) -> Result<(), RepositoryError> {
        tx.commit().await.map_err(|e| {
            error!(kind = T::KIND.as_str(), tenant_id = %tenant_id, concept_id = %concept_id, "Evolve commit failed: {}", e);
            RepositoryError::from(e)
        })
    }
}

#[async_trait]
impl<T> VersionedRepository<T::Payload> for PostgresVersionedRepository<T>
where
    T: VersionedTable,
    T::Payload: Clone,
{
    async fn evolve(
        &self,
        tenant_id: TenantId,
        concept_id: Option<ConceptId>,
        payload: &T::Payload,
    ) -> Result<Versioned<T::Payload>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let (concept_id, version_number) = match concept_id {
            None => (ConceptId::new(), VersionNumber::FIRST),
            Some(concept_id) => {
                Self::lock_concept(&mut tx, tenant_id, concept_id).await?;
                (concept_id, Self::retire_latest(&mut tx, tenant_id, concept_id).await?)
            }
        };

        let record = Self::insert_version(&mut tx, tenant_id, concept_id, version_number, payload.clone()).await?;
        Self::commit(tx, tenant_id, concept_id).await?;
        Ok(record)
    }

    async fn evolve_from_latest(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
        revise: Revision<'_, T::Payload>,
    ) -> Result<Versioned<T::Payload>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_concept(&mut tx, tenant_id, concept_id).await?;

        let latest_sql = format!(
            "{} FOR UPDATE",
            Self::select_sql("tenant_id = $1 AND concept_id = $2 AND is_latest", "version_number DESC")
        );
        let row = sqlx::query(&latest_sql)
            .bind(tenant_id.0)
            .bind(concept_id.0)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("{} {}", T::KIND.as_str(), concept_id)))?;
        let latest = Self::decode_row(&row)?;

        let payload = revise(&latest.payload);
        let version_number = Self::retire_latest(&mut tx, tenant_id, concept_id).await?;
        let record = Self::insert_version(&mut tx, tenant_id, concept_id, version_number, payload).await?;
        Self::commit(tx, tenant_id, concept_id).await?;
        Ok(record)
    }

    async fn list_latest(&self, tenant_id: TenantId) -> Result<Vec<Versioned<T::Payload>>, RepositoryError> {
        let sql = Self::select_sql("tenant_id = $1 AND is_latest", "created_at DESC, concept_id");
        let rows = sqlx::query(&sql).bind(tenant_id.0).fetch_all(&self.pool).await?;
        rows.iter().map(Self::decode_row).collect()
    }

    async fn find_latest(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
    ) -> Result<Option<Versioned<T::Payload>>, RepositoryError> {
        let sql = Self::select_sql("tenant_id = $1 AND concept_id = $2 AND is_latest", "version_number DESC");
        let row = sqlx::query(&sql)
            .bind(tenant_id.0)
            .bind(concept_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn find_version(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
        version: VersionNumber,
    ) -> Result<Option<Versioned<T::Payload>>, RepositoryError> {
        let sql = Self::select_sql(
            "tenant_id = $1 AND concept_id = $2 AND version_number = $3",
            "version_number",
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.0)
            .bind(concept_id.0)
            .bind(version.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn history(
        &self,
        tenant_id: TenantId,
        concept_id: ConceptId,
    ) -> Result<Vec<Versioned<T::Payload>>, RepositoryError> {
        let sql = Self::select_sql("tenant_id = $1 AND concept_id = $2", "version_number ASC");
        let rows = sqlx::query(&sql)
            .bind(tenant_id.0)
            .bind(concept_id.0)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::decode_row).collect()
    }
}
