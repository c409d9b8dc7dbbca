// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Artifact finalization and on-disk artifact layout.
//!
//! [`finalize`] is the only constructor of [`CompileResult`], so the hash and
//! size of every result are derived from the bytes it carries.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use utoipa::ToSchema;

use crate::workspace::ARTIFACT_EXTENSION;

/// Compiled bytecode plus its derived digest and length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileResult {
    bytes: Vec<u8>,
    hash: String,
    size: usize,
}

impl CompileResult {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercase hex SHA-256 of [`Self::bytes`].
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Hex SHA-256 digest of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Package raw builder output as a [`CompileResult`].
pub fn finalize(bytes: Vec<u8>) -> CompileResult {
    let hash = digest(&bytes);
    let size = bytes.len();
    CompileResult { bytes, hash, size }
}

/// Sidecar record written next to each batch artifact.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ArtifactMetadata {
    /// Unit name.
    pub name: String,
    /// Hex SHA-256 of the artifact.
    pub hash: String,
    /// Artifact length in bytes.
    pub size: usize,
    /// ISO-8601 compile time.
    pub compiled: String,
}

impl ArtifactMetadata {
    pub fn new(name: &str, result: &CompileResult, compiled_at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            hash: result.hash().to_string(),
            size: result.size(),
            compiled: compiled_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Paths of one persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub wasm: PathBuf,
    pub metadata: PathBuf,
}

impl ArtifactPaths {
    /// `<dir>/<name>.wasm` and `<dir>/<name>.json`.
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            wasm: dir.join(format!("{name}.{ARTIFACT_EXTENSION}")),
            metadata: dir.join(format!("{name}.json")),
        }
    }
}

/// Write the artifact bytes and its metadata record into `dir`.
///
/// `name` must already be a validated unit name.
pub async fn write_artifact(
    dir: &Path,
    name: &str,
    result: &CompileResult,
) -> std::io::Result<(ArtifactPaths, ArtifactMetadata)> {
    let paths = ArtifactPaths::new(dir, name);
    let metadata = ArtifactMetadata::new(name, result, Utc::now());

    fs::write(&paths.wasm, result.bytes()).await?;
    let json = serde_json::to_vec_pretty(&metadata).map_err(std::io::Error::other)?;
    fs::write(&paths.metadata, json).await?;

    Ok((paths, metadata))
}
