// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application services
//!
//! Orchestrate domain contracts into the caller-facing operations: resolve the
//! tenant, then evolve or read the ledgers on its behalf.

pub mod errors;
pub mod evolve;
pub mod tenant_resolver;
pub mod authentication;
pub mod workflow_service;
pub mod memory_service;
pub mod reinforcement;
pub mod ledger;

pub use errors::{LedgerError, ProblemDetails};
pub use ledger::Ledger;
