// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Evolve Ledger CLI
//!
//! The `evolve` binary is operator tooling for a ledger node. It talks to
//! PostgreSQL directly and acts on behalf of a principal given with
//! `--principal`, so it never holds an end-user token.
//!
//! ## Commands
//!
//! - `evolve config show|validate|generate` - Configuration management
//! - `evolve migrate [--dry-run]` - Apply database migrations
//! - `evolve tenant resolve|rename` - Tenant resolution
//! - `evolve workflow put|list|show|history|deprecate` - Workflow ledger
//! - `evolve memory remember|recall|show|history|feedback` - Memory ledger
//! - `evolve health` - Storage connectivity

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use evolve_ledger::commands::{
    self, ConfigCommand, MemoryCommand, MigrateCommand, TenantCommand, WorkflowCommand,
};
use evolve_ledger_core::domain::ledger_config::LedgerConfigManifest;

/// Evolve Ledger - versioned workflows and memories per tenant
#[derive(Parser)]
#[command(name = "evolve")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "EVOLVE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Principal email used for tenant-scoped commands
    #[arg(long, global = true, env = "EVOLVE_PRINCIPAL", value_name = "EMAIL")]
    principal: Option<String>,

    /// Log level (trace, debug, info, warn, error). Defaults to the config value.
    #[arg(long, global = true, env = "EVOLVE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (text, json). Defaults to the config value.
    #[arg(long, global = true, value_parser = ["text", "json"])]
    log_format: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Apply pending database migrations
    #[command(name = "migrate")]
    Migrate {
        #[command(flatten)]
        command: MigrateCommand,
    },

    /// Tenant resolution
    #[command(name = "tenant")]
    Tenant {
        #[command(subcommand)]
        command: TenantCommand,
    },

    /// Workflow ledger
    #[command(name = "workflow")]
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },

    /// Memory ledger
    #[command(name = "memory")]
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },

    /// Check storage connectivity
    #[command(name = "health")]
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Logging defaults come from the config file when it parses; flags win.
    let observability = LedgerConfigManifest::load_or_default(cli.config.clone())
        .map(|c| c.spec.observability)
        .unwrap_or_default();
    let level = cli.log_level.unwrap_or(observability.log_level);
    let format = cli.log_format.unwrap_or(observability.log_format);
    init_logging(&level, &format)?;

    let output = commands::Output { json: cli.json };

    match cli.command {
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Migrate { command }) => {
            commands::migrate::execute(command, cli.config).await
        }
        Some(Commands::Tenant { command }) => {
            commands::tenant::handle_command(command, cli.config, cli.principal, output).await
        }
        Some(Commands::Workflow { command }) => {
            commands::workflow::handle_command(command, cli.config, cli.principal, output).await
        }
        Some(Commands::Memory { command }) => {
            commands::memory::handle_command(command, cli.config, cli.principal, output).await
        }
        Some(Commands::Health) => commands::health::execute(cli.config, output).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
