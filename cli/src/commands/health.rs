// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `evolve health` - connect with the full configuration and ping storage

use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

use super::{connect, Output};

pub async fn execute(config_path: Option<PathBuf>, output: Output) -> Result<()> {
    let ledger = connect(config_path).await?;
    let report = ledger.health().await?;

    output.emit(&report, |report| {
        println!(
            "{} storage={} checked_at={}",
            "✓ Healthy".green(),
            report.storage,
            report.checked_at.to_rfc3339()
        );
    })?;

    ledger.shutdown().await;
    Ok(())
}
