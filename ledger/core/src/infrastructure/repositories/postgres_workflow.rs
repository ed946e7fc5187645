// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! PostgreSQL storage for versioned workflow definitions.

use sqlx::postgres::PgRow;
use sqlx::Row;

use super::postgres_versioned::{PgQuery, PostgresVersionedRepository, VersionedTable};
use crate::domain::repository::RepositoryError;
use crate::domain::versioning::ConceptKind;
use crate::domain::workflow::{WorkflowDefinition, WorkflowStatus};

pub struct WorkflowTable;

impl VersionedTable for WorkflowTable {
    type Payload = WorkflowDefinition;

    const KIND: ConceptKind = ConceptKind::Workflow;
    const TABLE: &'static str = "workflows";
    const PAYLOAD_COLUMNS: &'static [&'static str] = &[
        "name",
        "description",
        "status",
        "input_schema",
        "output_schema",
        "created_by",
    ];
    const PAYLOAD_SELECT: &'static str =
        "name, description, status, input_schema, output_schema, created_by";

    fn bind_payload<'q>(query: PgQuery<'q>, payload: &WorkflowDefinition) -> Result<PgQuery<'q>, RepositoryError> {
        Ok(query
            .bind(payload.name.clone())
            .bind(payload.description.clone())
            .bind(payload.status.as_str())
            .bind(payload.input_schema.clone())
            .bind(payload.output_schema.clone())
            .bind(payload.created_by.clone()))
    }

    fn decode_payload(row: &PgRow) -> Result<WorkflowDefinition, RepositoryError> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<WorkflowStatus>()
            .map_err(RepositoryError::Serialization)?;
        Ok(WorkflowDefinition {
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            status,
            input_schema: row.try_get("input_schema")?,
            output_schema: row.try_get("output_schema")?,
            created_by: row.try_get("created_by")?,
        })
    }
}

pub type PostgresWorkflowRepository = PostgresVersionedRepository<WorkflowTable>;
