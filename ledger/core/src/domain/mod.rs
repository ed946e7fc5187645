// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pure types and persistence contracts. Nothing in here performs I/O.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer

pub mod tenant;
pub mod identity;
pub mod versioning;
pub mod workflow;
pub mod memory;
pub mod feedback;
pub mod embedding;
pub mod events;
pub mod repository;
pub mod ledger_config;
