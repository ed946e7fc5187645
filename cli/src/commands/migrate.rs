// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `evolve migrate` - apply the embedded schema migrations

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use evolve_ledger_core::infrastructure::db::Database;

use super::load_config;

#[derive(Args)]
pub struct MigrateCommand {
    /// List pending migrations without applying them
    #[arg(long)]
    pub dry_run: bool,

    /// Database URL (overrides the config file)
    #[arg(long, env = "EVOLVE_DATABASE_URL")]
    pub database_url: Option<String>,
}

pub async fn execute(command: MigrateCommand, config_path: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(url) = command.database_url {
        config.spec.database.url = url;
    }

    let database = Database::connect(&config.spec.database)
        .await
        .context("Failed to connect to PostgreSQL")?;

    let pending = database
        .pending_migrations()
        .await
        .context("Failed to read migration state")?;

    if pending.is_empty() {
        println!("{}", "✓ Database schema is up to date".green());
        return Ok(());
    }

    println!("{}", format!("{} pending migration(s):", pending.len()).bold());
    for (version, description) in &pending {
        println!("  {} {}", format!("{:04}", version).cyan(), description);
    }

    if command.dry_run {
        println!("{}", "Dry run; nothing applied.".yellow());
        return Ok(());
    }

    database.run_migrations().await.context("Migration failed")?;
    println!("{}", format!("✓ Applied {} migration(s)", pending.len()).green());
    Ok(())
}
