// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Evolve CLI

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

use evolve_ledger_core::application::authentication::TenantContext;
use evolve_ledger_core::domain::ledger_config::LedgerConfigManifest;
use evolve_ledger_core::Ledger;

pub mod config;
pub mod health;
pub mod memory;
pub mod migrate;
pub mod tenant;
pub mod workflow;

pub use self::config::ConfigCommand;
pub use self::memory::MemoryCommand;
pub use self::migrate::MigrateCommand;
pub use self::tenant::TenantCommand;
pub use self::workflow::WorkflowCommand;

/// How results are rendered on stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub json: bool,
}

impl Output {
    /// Print `value` as pretty JSON, or run `human` for the terminal view.
    pub fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human(value);
        }
        Ok(())
    }
}

pub(crate) fn load_config(config_path: Option<PathBuf>) -> Result<LedgerConfigManifest> {
    LedgerConfigManifest::load_or_default(config_path).context("Failed to load configuration")
}

pub(crate) async fn connect(config_path: Option<PathBuf>) -> Result<Ledger> {
    let config = load_config(config_path)?;
    Ledger::connect(&config).await
}

pub(crate) fn require_principal(principal: Option<String>) -> Result<String> {
    match principal.map(|p| p.trim().to_string()) {
        Some(p) if !p.is_empty() => Ok(p),
        _ => anyhow::bail!("This command acts for a principal; pass --principal <EMAIL> or set EVOLVE_PRINCIPAL"),
    }
}

pub(crate) async fn principal_context(ledger: &Ledger, principal: Option<String>) -> Result<TenantContext> {
    let email = require_principal(principal)?;
    let ctx = ledger
        .context_for_principal(&email)
        .await
        .with_context(|| format!("Failed to resolve tenant for {}", email))?;
    debug!(principal = %email, tenant_id = %ctx.tenant_id, "Acting for principal");
    Ok(ctx)
}
