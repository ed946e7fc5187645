// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Tenant Repository
//!
//! `TenantRepository` backed by the `tenants` table. Duplicate domains are
//! rejected by the `tenants_domain_key` constraint and surface as
//! `RepositoryError::UniqueViolation`, which the resolver treats as "someone
//! else provisioned it first".

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::repository::{RepositoryError, TenantRepository};
use crate::domain::tenant::{NewTenant, Tenant, TenantId};

pub struct PostgresTenantRepository {
    pool: PgPool,
}

impl PostgresTenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_tenant(row: &PgRow) -> Result<Tenant, RepositoryError> {
        Ok(Tenant {
            id: TenantId(row.try_get("id")?),
            name: row.try_get("name")?,
            domain: row.try_get("domain")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl TenantRepository for PostgresTenantRepository {
    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, domain, created_at, updated_at
            FROM tenants
            WHERE domain = $1
            "#,
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_tenant).transpose()
    }

    async fn create(&self, tenant: NewTenant) -> Result<Tenant, RepositoryError> {
        let row = sqlx::query(
            r#"
            INSERT INTO tenants (id, name, domain, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            RETURNING id, name, domain, created_at, updated_at
            "#,
        )
        .bind(TenantId::new().0)
        .bind(&tenant.name)
        .bind(&tenant.domain)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_tenant(&row)
    }

    async fn rename(&self, id: TenantId, name: &str) -> Result<Tenant, RepositoryError> {
        let row = sqlx::query(
            r#"
            UPDATE tenants
            SET name = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, domain, created_at, updated_at
            "#,
        )
        .bind(id.0)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("tenant {}", id)))?;

        Self::row_to_tenant(&row)
    }
}
