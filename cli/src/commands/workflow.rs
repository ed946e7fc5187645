// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow ledger commands
//!
//! Commands: put, list, show, history, deprecate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use evolve_ledger_core::domain::versioning::{ConceptId, VersionNumber};
use evolve_ledger_core::domain::workflow::{WorkflowDefinition, WorkflowStatus, WorkflowVersion};

use super::{connect, principal_context, Output};

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Store a definition as a new workflow or a new version of an existing one
    Put {
        /// Concept to evolve; omit to start a new workflow
        #[arg(long, value_name = "CONCEPT_ID")]
        concept: Option<String>,

        /// YAML or JSON definition file
        #[arg(short, long, value_name = "FILE", conflicts_with = "name")]
        file: Option<PathBuf>,

        /// Workflow name (when not using --file)
        #[arg(long, required_unless_present = "file")]
        name: Option<String>,

        #[arg(long, requires = "name")]
        description: Option<String>,

        /// draft, active or deprecated
        #[arg(long, requires = "name")]
        status: Option<WorkflowStatus>,
    },

    /// List the latest version of every workflow
    List,

    /// Show the latest or a specific version of a workflow
    Show {
        concept: String,

        #[arg(long)]
        version: Option<i32>,
    },

    /// Show every version of a workflow, oldest first
    History { concept: String },

    /// Evolve a workflow into a deprecated version
    Deprecate { concept: String },
}

pub async fn handle_command(
    command: WorkflowCommand,
    config_path: Option<PathBuf>,
    principal: Option<String>,
    output: Output,
) -> Result<()> {
    let ledger = connect(config_path).await?;
    let ctx = principal_context(&ledger, principal).await?;

    match command {
        WorkflowCommand::Put {
            concept,
            file,
            name,
            description,
            status,
        } => {
            let concept = concept.as_deref().map(parse_concept).transpose()?;
            let definition = match file {
                Some(path) => load_definition(&path)?,
                None => {
                    let mut definition = WorkflowDefinition::new(name.unwrap_or_default());
                    if let Some(description) = description {
                        definition = definition.with_description(description);
                    }
                    if let Some(status) = status {
                        definition = definition.with_status(status);
                    }
                    definition
                }
            };
            let stored = ledger.put_workflow(&ctx, concept, definition).await?;
            output.emit(&stored, print_version)?;
        }
        WorkflowCommand::List => {
            let workflows = ledger.list_workflows(&ctx).await?;
            output.emit(&workflows, |workflows| {
                if workflows.is_empty() {
                    println!("{}", "No workflows".dimmed());
                }
                for w in workflows {
                    println!(
                        "{}  {:<4} {:<10} {}",
                        w.concept_id.to_string().cyan(),
                        w.version_number,
                        w.payload.status,
                        w.payload.name.bold()
                    );
                }
            })?;
        }
        WorkflowCommand::Show { concept, version } => {
            let concept = parse_concept(&concept)?;
            let workflow = match version {
                Some(n) => ledger.get_workflow_version(&ctx, concept, VersionNumber(n)).await?,
                None => ledger.get_workflow(&ctx, concept).await?,
            };
            output.emit(&workflow, print_version)?;
        }
        WorkflowCommand::History { concept } => {
            let history = ledger.workflow_history(&ctx, parse_concept(&concept)?).await?;
            output.emit(&history, |history| {
                for w in history {
                    let marker = if w.is_latest { "*".green() } else { " ".normal() };
                    println!(
                        "{} {:<4} {}  {:<10} {} ({})",
                        marker,
                        w.version_number,
                        w.created_at.to_rfc3339(),
                        w.payload.status,
                        w.payload.name,
                        w.payload.created_by
                    );
                }
            })?;
        }
        WorkflowCommand::Deprecate { concept } => {
            let stored = ledger.deprecate_workflow(&ctx, parse_concept(&concept)?).await?;
            output.emit(&stored, print_version)?;
        }
    }

    ledger.shutdown().await;
    Ok(())
}

pub(crate) fn parse_concept(raw: &str) -> Result<ConceptId> {
    ConceptId::from_string(raw.trim()).with_context(|| format!("'{}' is not a concept id", raw))
}

/// Parse a definition file. YAML is a superset of JSON, so both work.
fn load_definition(path: &Path) -> Result<WorkflowDefinition> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse_definition(&content).with_context(|| format!("Invalid workflow definition in {}", path.display()))
}

fn parse_definition(content: &str) -> Result<WorkflowDefinition> {
    let definition: WorkflowDefinition = serde_yaml::from_str(content)?;
    definition.validate().map_err(anyhow::Error::msg)?;
    Ok(definition)
}

fn print_version(w: &WorkflowVersion) {
    println!(
        "{} {} {}",
        "Workflow".bold(),
        w.concept_id.to_string().cyan(),
        w.version_number.to_string().bold()
    );
    println!("  Name:        {}", w.payload.name);
    if !w.payload.description.is_empty() {
        println!("  Description: {}", w.payload.description);
    }
    println!("  Status:      {}", w.payload.status);
    println!("  Latest:      {}", w.is_latest);
    println!("  Created:     {} by {}", w.created_at.to_rfc3339(), w.payload.created_by);
}
