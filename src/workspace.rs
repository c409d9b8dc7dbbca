// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Source Intake and Build Workspaces
//!
//! Untrusted hook source enters the pipeline here. A [`SourceUnit`] is only
//! constructed after its name passes the allow-list and its code is
//! non-empty, so nothing downstream ever builds a path from an unchecked name.
//!
//! Each compilation attempt stages its unit into a fresh [`Workspace`]:
//!
//! ```text
//! <workspace_root>/
//!   hook-<name>-<uuid>/
//!     <name>.c        # staged source
//!     <name>.wasm     # written by the builder
//! ```
//!
//! The directory is owned by exactly one attempt and is removed when the
//! workspace is closed or dropped, including when the owning future is
//! cancelled mid-build.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

use crate::error::CompileError;

/// Longest accepted unit name.
pub const MAX_UNIT_NAME_LEN: usize = 64;

/// Unit name used when an upload does not provide one.
pub const DEFAULT_UNIT_NAME: &str = "hook";

/// Source file extension picked up by the batch driver.
pub const SOURCE_EXTENSION: &str = "c";

/// Artifact file extension.
pub const ARTIFACT_EXTENSION: &str = "wasm";

/// Check a unit name against the `[A-Za-z0-9_-]{1,64}` allow-list.
///
/// Dots and separators are excluded, so a valid name can never escape the
/// workspace or output directory.
pub fn validate_unit_name(name: &str) -> Result<(), CompileError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_UNIT_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');

    if valid {
        Ok(())
    } else {
        Err(CompileError::InvalidUnitName(name.to_string()))
    }
}

/// A named unit of untrusted source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    name: String,
    code: String,
}

impl SourceUnit {
    /// Validate and wrap a submission.
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Result<Self, CompileError> {
        let name = name.into();
        let code = code.into();

        validate_unit_name(&name)?;
        if code.trim().is_empty() {
            return Err(CompileError::EmptySource);
        }

        Ok(Self { name, code })
    }

    /// Read a unit from a `<name>.c` file; the name is the file stem.
    pub async fn from_file(path: &Path) -> Result<Self, CompileError> {
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
            .to_string();
        validate_unit_name(&name)?;

        let code = fs::read_to_string(path).await?;
        Self::new(name, code)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Reject units larger than `limit` bytes.
    pub fn ensure_within(&self, limit: usize) -> Result<(), CompileError> {
        if self.code.len() > limit {
            return Err(CompileError::SourceTooLarge {
                size: self.code.len(),
                limit,
            });
        }
        Ok(())
    }
}

#[cfg(unix)]
fn private_dir_builder() -> fs::DirBuilder {
    let mut builder = fs::DirBuilder::new();
    builder.mode(0o700);
    builder
}

#[cfg(not(unix))]
fn private_dir_builder() -> fs::DirBuilder {
    fs::DirBuilder::new()
}

/// Ephemeral directory holding one staged unit and its build output.
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    source_file: PathBuf,
    artifact_file: PathBuf,
    released: bool,
}

impl Workspace {
    /// Create a unique directory under `root` and write the unit's source.
    ///
    /// The directory is created non-recursively so a name collision fails
    /// loudly instead of sharing a directory. On unix it is owner-only (0700).
    pub async fn stage(root: &Path, unit: &SourceUnit) -> Result<Self, CompileError> {
        fs::create_dir_all(root).await?;

        let dir = root.join(format!("hook-{}-{}", unit.name(), Uuid::new_v4().simple()));
        private_dir_builder().create(&dir).await?;

        // From here on Drop owns the directory, even if the write fails.
        let workspace = Self {
            source_file: dir.join(format!("{}.{SOURCE_EXTENSION}", unit.name())),
            artifact_file: dir.join(format!("{}.{ARTIFACT_EXTENSION}", unit.name())),
            dir,
            released: false,
        };

        fs::write(&workspace.source_file, unit.code()).await?;

        tracing::debug!(
            unit = unit.name(),
            workspace = %workspace.dir.display(),
            "Staged source unit"
        );

        Ok(workspace)
    }

    /// Workspace directory (mounted into the sandbox).
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Staged source file.
    pub fn source_path(&self) -> &Path {
        &self.source_file
    }

    /// Where the builder must leave the artifact.
    pub fn artifact_path(&self) -> &Path {
        &self.artifact_file
    }

    /// File name of the staged source, relative to the workspace.
    pub fn source_file_name(&self) -> String {
        file_name(&self.source_file)
    }

    /// File name of the expected artifact, relative to the workspace.
    pub fn artifact_file_name(&self) -> String {
        file_name(&self.artifact_file)
    }

    /// Remove the workspace recursively.
    ///
    /// A missing directory counts as removed. Drop does the same work
    /// synchronously if this is never reached.
    pub async fn close(mut self) -> io::Result<()> {
        self.released = true;
        match fs::remove_dir_all(&self.dir).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    workspace = %self.dir.display(),
                    error = %e,
                    "Failed to remove workspace"
                );
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
