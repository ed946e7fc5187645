// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Memory ledger commands
//!
//! Commands: remember, recall, show, history, feedback

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

use evolve_ledger_core::application::reinforcement::FeedbackAck;
use evolve_ledger_core::domain::feedback::{FeedbackKind, FeedbackWeight};
use evolve_ledger_core::domain::memory::{MemoryVersion, Provenance, SearchScope};
use evolve_ledger_core::domain::versioning::VersionNumber;

use super::workflow::parse_concept;
use super::{connect, principal_context, Output};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FeedbackArg {
    Positive,
    Negative,
    Correction,
}

#[derive(Subcommand)]
pub enum MemoryCommand {
    /// Store a new memory fact
    Remember {
        content: String,

        /// Workflow the fact was learned from
        #[arg(long, value_name = "CONCEPT_ID")]
        workflow: Option<String>,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        session: Option<String>,
    },

    /// Semantic search over the latest memories
    Recall {
        query: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Search retired versions too
        #[arg(long)]
        include_history: bool,
    },

    /// Show the latest or a specific version of a memory
    Show {
        concept: String,

        #[arg(long)]
        version: Option<i32>,
    },

    /// Show every version of a memory, oldest first
    History { concept: String },

    /// Reinforce, weaken or correct a memory and wait for the new version
    Feedback {
        concept: String,

        #[arg(long, value_enum)]
        kind: FeedbackArg,

        /// Replacement content, required for corrections
        #[arg(long)]
        content: Option<String>,

        /// Signal strength within [0, 1]
        #[arg(long, default_value_t = 1.0)]
        weight: f64,
    },
}

#[derive(Serialize)]
struct FeedbackResult<'a> {
    ack: &'a FeedbackAck,
    memory: &'a MemoryVersion,
}

pub async fn handle_command(
    command: MemoryCommand,
    config_path: Option<PathBuf>,
    principal: Option<String>,
    output: Output,
) -> Result<()> {
    let ledger = connect(config_path).await?;
    let ctx = principal_context(&ledger, principal).await?;

    match command {
        MemoryCommand::Remember {
            content,
            workflow,
            model,
            session,
        } => {
            let provenance = Provenance {
                workflow_id: workflow.as_deref().map(parse_concept).transpose()?,
                model,
                session_id: session,
                ..Provenance::default()
            };
            let stored = ledger.remember(&ctx, &content, provenance).await?;
            output.emit(&stored, print_version)?;
        }
        MemoryCommand::Recall {
            query,
            limit,
            include_history,
        } => {
            let scope = SearchScope { limit, include_history };
            let hits = ledger.recall_with_scope(&ctx, &query, scope).await?;
            output.emit(&hits, |hits| {
                if hits.is_empty() {
                    println!("{}", "No memories".dimmed());
                }
                for hit in hits {
                    let m = &hit.memory;
                    println!(
                        "{:.4}  {} {:<4} [{:.2}] {}",
                        hit.distance,
                        m.concept_id.to_string().cyan(),
                        m.version_number,
                        m.payload.confidence.value(),
                        m.payload.content
                    );
                }
            })?;
        }
        MemoryCommand::Show { concept, version } => {
            let concept = parse_concept(&concept)?;
            let memory = match version {
                Some(n) => ledger.get_memory_version(&ctx, concept, VersionNumber(n)).await?,
                None => ledger.get_memory(&ctx, concept).await?,
            };
            output.emit(&memory, print_version)?;
        }
        MemoryCommand::History { concept } => {
            let history = ledger.memory_history(&ctx, parse_concept(&concept)?).await?;
            output.emit(&history, |history| {
                for m in history {
                    let marker = if m.is_latest { "*".green() } else { " ".normal() };
                    println!(
                        "{} {:<4} {}  [{:.2}] {}",
                        marker,
                        m.version_number,
                        m.created_at.to_rfc3339(),
                        m.payload.confidence.value(),
                        m.payload.content
                    );
                }
            })?;
        }
        MemoryCommand::Feedback {
            concept,
            kind,
            content,
            weight,
        } => {
            let concept = parse_concept(&concept)?;
            let kind = feedback_kind(kind, content)?;
            let weight = FeedbackWeight::new(weight).map_err(anyhow::Error::msg)?;

            let ticket = ledger.submit_feedback(&ctx, concept, kind, weight).await?;
            let ack = ticket.ack.clone();
            let memory = ticket.outcome().await.context("Feedback was accepted but not applied")?;
            output.emit(
                &FeedbackResult {
                    ack: &ack,
                    memory: &memory,
                },
                |result| {
                    println!("{} receipt {}", "✓ Feedback applied".green(), result.ack.receipt_id);
                    print_version(result.memory);
                },
            )?;
        }
    }

    ledger.shutdown().await;
    Ok(())
}

fn feedback_kind(kind: FeedbackArg, content: Option<String>) -> Result<FeedbackKind> {
    match (kind, content) {
        (FeedbackArg::Positive, None) => Ok(FeedbackKind::Positive),
        (FeedbackArg::Negative, None) => Ok(FeedbackKind::Negative),
        (FeedbackArg::Correction, Some(content)) if !content.trim().is_empty() => {
            Ok(FeedbackKind::Correction { content })
        }
        (FeedbackArg::Correction, _) => anyhow::bail!("--kind correction requires non-empty --content"),
        (_, Some(_)) => anyhow::bail!("--content is only valid with --kind correction"),
    }
}

fn print_version(m: &MemoryVersion) {
    println!(
        "{} {} {}",
        "Memory".bold(),
        m.concept_id.to_string().cyan(),
        m.version_number.to_string().bold()
    );
    println!("  Content:    {}", m.payload.content);
    println!("  Confidence: {:.2}", m.payload.confidence.value());
    println!("  Latest:     {}", m.is_latest);
    println!("  Created:    {}", m.created_at.to_rfc3339());
    if let Some(workflow) = &m.payload.provenance.workflow_id {
        println!("  Workflow:   {}", workflow);
    }
}
