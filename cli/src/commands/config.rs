// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use evolve_ledger_core::domain::ledger_config::LedgerConfigManifest;

use super::load_config;

pub const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
pub const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./evolve-config.yaml)
        #[arg(short, long, default_value = "./evolve-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate {
            output,
            examples,
            force,
        } => generate(&output, examples, force),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = load_config(config_override.clone())?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. EVOLVE_CONFIG_PATH: {}",
            std::env::var("EVOLVE_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./evolve-config.yaml");
        println!("  4. ~/.evolve/config.yaml");
        println!("  5. /etc/evolve/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();
    println!("  Name: {}", config.metadata.name);
    println!("  Environment: {}", spec.environment);
    println!();

    println!("{}", "Database:".bold());
    println!("  URL: {}", redact_url(&spec.database.url));
    println!("  Max connections: {}", spec.database.max_connections);
    println!();

    println!("{}", "Identity Provider:".bold());
    if config.bypass_active() {
        println!("  {}", "Bypass ACTIVE (dev@localhost)".yellow());
    } else {
        println!("  Issuer: {}", display_or_unset(&spec.auth.issuer));
        println!("  Client: {}", display_or_unset(&spec.auth.client_id));
        if let Some(docs) = &spec.auth.docs_client_id {
            println!("  Docs client: {}", docs);
        }
        println!(
            "  Session login: {}",
            spec.auth.redirect_url.as_deref().unwrap_or("(disabled)")
        );
        println!("  Scopes: {}", spec.auth.scopes.join(" "));
    }
    println!();

    println!("{}", "Embeddings:".bold());
    println!("  Endpoint: {}", spec.embedding.url);
    println!("  Dimensions: {}", spec.embedding.dimensions);
    println!();

    println!("{}", "Reinforcement:".bold());
    println!("  Step: {}", spec.reinforcement.step);
    println!("  Initial confidence: {}", spec.reinforcement.initial_confidence);
    println!("  Workers: {}", spec.reinforcement.workers);
    println!();

    print_warnings(&config);
    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = load_config(config_path)?;
    config.validate().context("Configuration validation failed")?;
    print_warnings(&config);

    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}

fn generate(output: &Path, with_examples: bool, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists; pass --force to overwrite", output.display());
    }

    let sample = if with_examples {
        EXAMPLES_TEMPLATE
    } else {
        MINIMAL_TEMPLATE
    };

    std::fs::write(output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());
    Ok(())
}

fn print_warnings(config: &LedgerConfigManifest) {
    for warning in config.warnings() {
        println!("{} {}", "warning:".yellow().bold(), warning);
    }
}

fn display_or_unset(value: &str) -> String {
    if value.is_empty() {
        "(not set)".to_string()
    } else {
        value.to_string()
    }
}

/// Hide the password component of a connection URL.
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.split_once('@') {
        Some((credentials, host)) => {
            let user = credentials.split(':').next().unwrap_or_default();
            format!("{}://{}:***@{}", scheme, user, host)
        }
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_valid_manifests() {
        for template in [MINIMAL_TEMPLATE, EXAMPLES_TEMPLATE] {
            let config = LedgerConfigManifest::from_yaml_str(template).unwrap();
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_redact_url_hides_password() {
        assert_eq!(
            redact_url("postgres://evolve:hunter2@db:5432/evolve"),
            "postgres://evolve:***@db:5432/evolve"
        );
        assert_eq!(redact_url("postgres://db/evolve"), "postgres://db/evolve");
    }

    #[test]
    fn test_generate_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evolve-config.yaml");

        generate(&path, false, false).unwrap();
        assert!(generate(&path, true, false).is_err());
        generate(&path, true, true).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, EXAMPLES_TEMPLATE);
    }
}
