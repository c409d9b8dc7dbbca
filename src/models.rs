// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the HTTP API. Every field that may be
//! absent is an explicit `Option`; there are no free-form JSON bags.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::artifact::CompileResult;

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = "hooks-compiler";

/// Multipart form accepted by `POST /compile`.
///
/// Only used for the OpenAPI document; the handler reads the fields
/// directly from the multipart stream.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CompileUpload {
    /// C source of the hook.
    #[schema(value_type = String, format = Binary)]
    pub hook: Vec<u8>,
    /// Unit name, `[A-Za-z0-9_-]{1,64}`. Defaults to `hook`.
    #[serde(rename = "hookName")]
    pub hook_name: Option<String>,
}

/// Successful compilation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct CompileResponse {
    /// Always `true`.
    pub success: bool,
    /// Artifact bytes, standard base64.
    pub wasm: String,
    /// Hex SHA-256 of the artifact.
    pub hash: String,
    /// Artifact length in bytes.
    pub size: usize,
}

impl CompileResponse {
    pub fn from_result(result: &CompileResult) -> Self {
        use base64ct::{Base64, Encoding};

        Self {
            success: true,
            wasm: Base64::encode_string(result.bytes()),
            hash: result.hash().to_string(),
            size: result.size(),
        }
    }
}

/// Failed request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Always `false`.
    pub success: bool,
    /// Human-readable reason.
    pub error: String,
}

/// Liveness response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

/// Readiness response with individual component status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ReadyResponse {
    /// `ok` or `degraded`.
    pub status: String,
    pub service: String,
    pub checks: ReadyChecks,
}

/// Individual readiness checks.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ReadyChecks {
    /// Selected builder (`container` or `mock`).
    pub builder_kind: String,
    /// `ok` or the failure reason.
    pub builder: String,
    /// `ok` or the failure reason.
    pub workspace_root: String,
}
