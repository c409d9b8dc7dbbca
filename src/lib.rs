// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Hooks Compiler - Sandboxed C-to-WASM Build Service
//!
//! This crate compiles untrusted C hook sources into WASM modules inside a
//! disposable container and returns the hashed artifact for deployment to
//! the ledger.
//!
//! ## Modules
//!
//! - `workspace` - Source intake and ephemeral build workspaces
//! - `sandbox` - Isolated container builder and development mock
//! - `artifact` - Hashing, metadata and artifact files
//! - `compiler` - The stage/build/cleanup/finalize pipeline
//! - `batch` - Directory-to-directory batch compilation
//! - `api` - HTTP API handlers (Axum)
//! - `deploy` - Hook definitions for the deployment side

pub mod api;
pub mod artifact;
pub mod batch;
pub mod compiler;
pub mod config;
pub mod deploy;
pub mod error;
pub mod models;
pub mod sandbox;
pub mod state;
pub mod telemetry;
pub mod workspace;
