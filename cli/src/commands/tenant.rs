// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tenant commands
//!
//! Commands: resolve, rename

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use evolve_ledger_core::domain::tenant::Tenant;

use super::{connect, principal_context, Output};

#[derive(Subcommand)]
pub enum TenantCommand {
    /// Resolve (and provision on first sight) the tenant for an email
    Resolve {
        /// Principal email; defaults to --principal
        email: Option<String>,
    },

    /// Rename the tenant of --principal
    Rename {
        /// New display name
        name: String,
    },
}

pub async fn handle_command(
    command: TenantCommand,
    config_path: Option<PathBuf>,
    principal: Option<String>,
    output: Output,
) -> Result<()> {
    let ledger = connect(config_path).await?;

    let tenant = match command {
        TenantCommand::Resolve { email } => {
            let email = super::require_principal(email.or(principal))?;
            ledger.resolve_tenant(&email).await?
        }
        TenantCommand::Rename { name } => {
            let ctx = principal_context(&ledger, principal).await?;
            ledger.rename_tenant(&ctx, &name).await?
        }
    };

    output.emit(&tenant, print_tenant)?;
    ledger.shutdown().await;
    Ok(())
}

fn print_tenant(tenant: &Tenant) {
    println!("{} {}", "Tenant".bold(), tenant.id.to_string().cyan());
    println!("  Name:    {}", tenant.name);
    println!("  Domain:  {}", tenant.domain);
    println!("  Created: {}", tenant.created_at.to_rfc3339());
    println!("  Updated: {}", tenant.updated_at.to_rfc3339());
}
