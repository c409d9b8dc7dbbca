// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Batch Compilation
//!
//! Compiles every `*.c` file of a directory into an output directory:
//!
//! ```text
//! <output>/
//!   <name>.wasm   # artifact bytes
//!   <name>.json   # {name, hash, size, compiled}
//! ```
//!
//! Units are independent. A failing unit is logged and recorded in the
//! [`BatchSummary`]; the remaining units are still attempted. Up to
//! `concurrency` units build at once.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::artifact::write_artifact;
use crate::compiler::Compiler;
use crate::error::CompileError;
use crate::workspace::{SourceUnit, SOURCE_EXTENSION};

/// Hash characters shown per unit in the summary.
const HASH_PREFIX_LEN: usize = 8;

/// A unit that compiled and was written to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    pub name: String,
    pub hash: String,
    pub size: usize,
    pub wasm_path: PathBuf,
}

/// A unit that failed, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUnit {
    pub name: String,
    pub error: String,
}

/// Outcome of a batch run, ordered by unit name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub output_dir: PathBuf,
    pub compiled: Vec<CompiledUnit>,
    pub failed: Vec<FailedUnit>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.compiled.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Compiled {} of {} hooks into {}",
            self.compiled.len(),
            self.total(),
            self.output_dir.display()
        )?;
        for unit in &self.compiled {
            let prefix: String = unit.hash.chars().take(HASH_PREFIX_LEN).collect();
            writeln!(f, "  {}: {} bytes ({prefix}...)", unit.name, unit.size)?;
        }
        if !self.failed.is_empty() {
            writeln!(f, "Failed:")?;
            for unit in &self.failed {
                writeln!(f, "  {}: {}", unit.name, unit.error)?;
            }
        }
        Ok(())
    }
}

/// List `*.c` files directly inside `dir`, sorted by path.
pub async fn discover_sources(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut sources = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_source = path
            .extension()
            .is_some_and(|ext| ext == SOURCE_EXTENSION);
        if is_source && entry.file_type().await?.is_file() {
            sources.push(path);
        }
    }

    sources.sort();
    Ok(sources)
}

/// Drives a [`Compiler`] over a directory of sources.
#[derive(Clone)]
pub struct BatchDriver {
    compiler: Compiler,
    concurrency: usize,
}

impl BatchDriver {
    /// `concurrency` is clamped to at least 1.
    pub fn new(compiler: Compiler, concurrency: usize) -> Self {
        Self {
            compiler,
            concurrency: concurrency.max(1),
        }
    }

    /// Compile every source in `input_dir` into `output_dir`.
    ///
    /// Only directory-level I/O (listing input, creating output) aborts the
    /// run; per-unit failures end up in [`BatchSummary::failed`].
    pub async fn run(&self, input_dir: &Path, output_dir: &Path) -> std::io::Result<BatchSummary> {
        fs::create_dir_all(output_dir).await?;
        let sources = discover_sources(input_dir).await?;

        tracing::info!(
            count = sources.len(),
            input = %input_dir.display(),
            output = %output_dir.display(),
            builder = %self.compiler.builder_kind(),
            "Compiling hooks"
        );

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let output_dir: Arc<Path> = Arc::from(output_dir);
        let mut tasks = JoinSet::new();

        for path in sources {
            let compiler = self.compiler.clone();
            let permits = Arc::clone(&permits);
            let output_dir = Arc::clone(&output_dir);
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                let name = unit_label(&path);
                let outcome = compile_one(&compiler, &path, &output_dir).await;
                (name, outcome)
            });
        }

        let mut compiled = Vec::new();
        let mut failed = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(unit))) => {
                    tracing::info!(
                        unit = %unit.name,
                        size = unit.size,
                        hash = %unit.hash,
                        "Hook compiled"
                    );
                    compiled.push(unit);
                }
                Ok((name, Err(e))) => {
                    tracing::error!(unit = %name, error = %e, "Failed to compile hook");
                    failed.push(FailedUnit {
                        name,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Compilation task aborted");
                    failed.push(FailedUnit {
                        name: "<unknown>".to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        compiled.sort_by(|a, b| a.name.cmp(&b.name));
        failed.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(BatchSummary {
            output_dir: output_dir.to_path_buf(),
            compiled,
            failed,
        })
    }
}

/// Name shown for a source file, even when it is not a valid unit name.
fn unit_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn compile_one(
    compiler: &Compiler,
    path: &Path,
    output_dir: &Path,
) -> Result<CompiledUnit, CompileError> {
    let unit = SourceUnit::from_file(path).await?;
    let result = compiler.compile(&unit).await?;
    let (paths, metadata) = write_artifact(output_dir, unit.name(), &result).await?;

    Ok(CompiledUnit {
        name: metadata.name,
        hash: metadata.hash,
        size: metadata.size,
        wasm_path: paths.wasm,
    })
}
