// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Hook Builders
//!
//! Two seams keep untrusted builds pluggable:
//!
//! - [`IsolatedExecutor`] runs one toolchain command inside a sandbox whose
//!   only writable mount is the workspace, and tears the sandbox down before
//!   returning. [`ContainerExecutor`] is the production implementation.
//! - [`HookBuilder`] turns a staged workspace into artifact bytes.
//!   [`SandboxedBuilder`] drives an executor; [`MockBuilder`] is the
//!   non-isolated development substitute.
//!
//! The pipeline only sees `Arc<dyn HookBuilder>`, so both variants share the
//! same result contract.

pub mod container;
pub mod mock;

use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;

use crate::config::{BuilderKind, SandboxConfig};
use crate::error::CompileError;
use crate::workspace::{SourceUnit, Workspace};

pub use container::ContainerExecutor;
pub use mock::MockBuilder;

/// Longest stderr excerpt kept in a [`CompileError::ToolchainFailed`].
pub const MAX_STDERR_CHARS: usize = 4096;

/// A toolchain invocation, relative to the workspace directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainCommand {
    program: String,
    args: Vec<String>,
}

impl ToolchainCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Freestanding WASM module: no libc, no entry point, every symbol exported.
    pub fn wasm_hook(source_file: &str, artifact_file: &str) -> Self {
        let args = [
            "--target=wasm32-wasi",
            "-O3",
            "-nostdlib",
            "-Wl,--no-entry",
            "-Wl,--export-all",
            "-o",
            artifact_file,
            source_file,
        ]
        .iter()
        .map(|a| a.to_string())
        .collect();

        Self::new("clang", args)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Exit status and diagnostics of one sandboxed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a command inside an isolated environment.
///
/// Implementations must create a fresh sandbox per call, mount `workspace`
/// as its only writable path and working directory, enforce their own
/// wall-clock budget, and remove the sandbox on every exit path.
#[async_trait]
pub trait IsolatedExecutor: Send + Sync {
    async fn run(
        &self,
        workspace: &Path,
        command: &ToolchainCommand,
    ) -> Result<ExecOutcome, CompileError>;

    /// Whether the sandbox infrastructure is reachable.
    async fn check(&self) -> Result<(), CompileError>;
}

/// Produces artifact bytes from a staged workspace.
#[async_trait]
pub trait HookBuilder: Send + Sync {
    fn kind(&self) -> BuilderKind;

    async fn build(&self, unit: &SourceUnit, workspace: &Workspace)
        -> Result<Vec<u8>, CompileError>;

    /// Readiness probe for the builder's infrastructure.
    async fn check(&self) -> Result<(), CompileError> {
        Ok(())
    }
}

/// Builds hooks by running the WASM toolchain through an [`IsolatedExecutor`].
pub struct SandboxedBuilder<E> {
    executor: E,
}

impl<E: IsolatedExecutor> SandboxedBuilder<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl<E: IsolatedExecutor> HookBuilder for SandboxedBuilder<E> {
    fn kind(&self) -> BuilderKind {
        BuilderKind::Container
    }

    async fn build(
        &self,
        unit: &SourceUnit,
        workspace: &Workspace,
    ) -> Result<Vec<u8>, CompileError> {
        let command = ToolchainCommand::wasm_hook(
            &workspace.source_file_name(),
            &workspace.artifact_file_name(),
        );

        let outcome = self.executor.run(workspace.dir(), &command).await?;
        if !outcome.success() {
            tracing::warn!(
                unit = unit.name(),
                exit_code = ?outcome.exit_code,
                "Toolchain failed"
            );
            return Err(CompileError::ToolchainFailed {
                exit_code: outcome.exit_code,
                stderr: outcome.stderr,
            });
        }

        match fs::read(workspace.artifact_path()).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(
                CompileError::BuildIncomplete(workspace.artifact_path().to_path_buf()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn check(&self) -> Result<(), CompileError> {
        self.executor.check().await
    }
}

/// Select the builder named by the operator.
pub fn builder_for(kind: BuilderKind, sandbox: &SandboxConfig) -> Arc<dyn HookBuilder> {
    match kind {
        BuilderKind::Container => Arc::new(SandboxedBuilder::new(ContainerExecutor::new(
            sandbox.clone(),
        ))),
        BuilderKind::Mock => Arc::new(MockBuilder::new()),
    }
}

/// Keep at most [`MAX_STDERR_CHARS`] characters of toolchain output.
pub(crate) fn truncate_stderr(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    match text.char_indices().nth(MAX_STDERR_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted executor for exercising the pipeline without a container engine.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    /// What the fake sandbox does when run.
    #[derive(Debug, Clone)]
    pub enum Script {
        /// Write these bytes as the artifact and exit 0.
        Emit(Vec<u8>),
        /// Exit 0 without writing anything.
        ExitCleanWithoutOutput,
        /// Exit with this code and stderr.
        Fail(i32, String),
        /// Refuse to start.
        StartError,
        /// Sleep, then copy the staged source into the artifact.
        EchoSource(Duration),
    }

    pub struct ScriptedExecutor {
        script: Script,
        pub runs: AtomicUsize,
        pub seen: Mutex<Vec<std::path::PathBuf>>,
    }

    impl ScriptedExecutor {
        pub fn new(script: Script) -> Self {
            Self {
                script,
                runs: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl IsolatedExecutor for ScriptedExecutor {
        async fn run(
            &self,
            workspace: &Path,
            command: &ToolchainCommand,
        ) -> Result<ExecOutcome, CompileError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(workspace.to_path_buf());

            // `-o <artifact>` names the output file.
            let output = command
                .args()
                .windows(2)
                .find(|w| w[0] == "-o")
                .map(|w| workspace.join(&w[1]))
                .unwrap();

            match &self.script {
                Script::Emit(bytes) => {
                    fs::write(output, bytes).await?;
                    Ok(ExecOutcome { exit_code: Some(0), stderr: String::new() })
                }
                Script::EchoSource(delay) => {
                    tokio::time::sleep(*delay).await;
                    let source = workspace.join(command.args().last().unwrap());
                    fs::copy(source, output).await?;
                    Ok(ExecOutcome { exit_code: Some(0), stderr: String::new() })
                }
                Script::ExitCleanWithoutOutput => {
                    Ok(ExecOutcome { exit_code: Some(0), stderr: String::new() })
                }
                Script::Fail(code, stderr) => Ok(ExecOutcome {
                    exit_code: Some(*code),
                    stderr: stderr.clone(),
                }),
                Script::StartError => Err(CompileError::SandboxStart("engine offline".into())),
            }
        }

        async fn check(&self) -> Result<(), CompileError> {
            match self.script {
                Script::StartError => Err(CompileError::SandboxStart("engine offline".into())),
                _ => Ok(()),
            }
        }
    }

    #[async_trait]
    impl IsolatedExecutor for Arc<ScriptedExecutor> {
        async fn run(
            &self,
            workspace: &Path,
            command: &ToolchainCommand,
        ) -> Result<ExecOutcome, CompileError> {
            self.as_ref().run(workspace, command).await
        }

        async fn check(&self) -> Result<(), CompileError> {
            self.as_ref().check().await
        }
    }

    pub fn scripted(script: Script) -> (Arc<dyn HookBuilder>, Arc<ScriptedExecutor>) {
        let executor = Arc::new(ScriptedExecutor::new(script));
        (Arc::new(SandboxedBuilder::new(executor.clone())), executor)
    }
}
