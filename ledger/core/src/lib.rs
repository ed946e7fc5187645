// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Evolve Ledger Core
//!
//! Append-only versioning of workflow definitions and memory facts, scoped to
//! tenants resolved from verified OpenID-Connect identities.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Versioned ledgers, tenant resolution and credential verification

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use application::{Ledger, LedgerError, ProblemDetails};
