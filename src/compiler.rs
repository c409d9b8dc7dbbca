// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Compilation Pipeline
//!
//! One attempt runs strictly in order:
//!
//! 1. size check (no filesystem access yet)
//! 2. stage the unit into a fresh [`Workspace`]
//! 3. build with the configured [`HookBuilder`]
//! 4. tear the workspace down
//! 5. [`finalize`] the bytes
//!
//! Step 4 runs whether or not the build succeeded, and the workspace's
//! `Drop` covers the case where the attempt's future is cancelled. A failed
//! teardown is logged and never replaces the build outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::artifact::{finalize, CompileResult};
use crate::config::{BuilderKind, ServiceConfig};
use crate::error::CompileError;
use crate::sandbox::{builder_for, HookBuilder};
use crate::workspace::{SourceUnit, Workspace};

/// Runs compilation attempts against a shared builder.
#[derive(Clone)]
pub struct Compiler {
    builder: Arc<dyn HookBuilder>,
    workspace_root: PathBuf,
    max_source_bytes: usize,
}

impl Compiler {
    pub fn new(
        builder: Arc<dyn HookBuilder>,
        workspace_root: impl Into<PathBuf>,
        max_source_bytes: usize,
    ) -> Self {
        Self {
            builder,
            workspace_root: workspace_root.into(),
            max_source_bytes,
        }
    }

    /// Build a compiler with the builder selected in `config`.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            builder_for(config.builder, &config.sandbox),
            config.workspace_root.clone(),
            config.max_source_bytes,
        )
    }

    pub fn builder_kind(&self) -> BuilderKind {
        self.builder.kind()
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn max_source_bytes(&self) -> usize {
        self.max_source_bytes
    }

    /// Compile one unit into a finalized artifact.
    #[tracing::instrument(
        name = "compile",
        skip_all,
        fields(unit = unit.name(), builder = %self.builder.kind())
    )]
    pub async fn compile(&self, unit: &SourceUnit) -> Result<CompileResult, CompileError> {
        unit.ensure_within(self.max_source_bytes)?;

        let workspace = Workspace::stage(&self.workspace_root, unit).await?;
        let built = self.builder.build(unit, &workspace).await;

        let dir = workspace.dir().to_path_buf();
        if let Err(e) = workspace.close().await {
            tracing::warn!(
                workspace = %dir.display(),
                error = %e,
                "Failed to remove workspace"
            );
        }

        let result = finalize(built?);
        tracing::info!(
            hash = %result.hash(),
            size = result.size(),
            "Compiled hook"
        );
        Ok(result)
    }

    /// Readiness of the workspace root and the builder.
    ///
    /// The root counts as ready once a file can be written into it and removed.
    pub async fn check(&self) -> CompilerHealth {
        let workspace_root = self
            .check_workspace_root()
            .await
            .map_err(|e| e.to_string());
        let builder = self.builder.check().await.map_err(|e| e.to_string());

        CompilerHealth {
            workspace_root,
            builder,
        }
    }
}

impl Compiler {
    async fn check_workspace_root(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.workspace_root).await?;
        let marker = self
            .workspace_root
            .join(format!(".ready-{}", Uuid::new_v4().simple()));
        tokio::fs::write(&marker, b"").await?;
        tokio::fs::remove_file(&marker).await
    }
}

/// Result of [`Compiler::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerHealth {
    pub workspace_root: Result<(), String>,
    pub builder: Result<(), String>,
}

impl CompilerHealth {
    pub fn is_ready(&self) -> bool {
        self.workspace_root.is_ok() && self.builder.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::digest;
    use crate::sandbox::testing::{scripted, Script};
    use crate::sandbox::MockBuilder;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tempfile::TempDir;

    const SOURCE: &str = "#include \"hookapi.h\"\nint64_t hook(uint32_t r) { accept(0,0,0); return 0; }";

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn successful_build_returns_hashed_artifact_and_cleans_up() {
        let temp = TempDir::new().unwrap();
        let (builder, executor) = scripted(Script::Emit(b"\0asm\x01\0\0\0".to_vec()));
        let compiler = Compiler::new(builder, temp.path(), 1024);

        let unit = SourceUnit::new("loyalty_issuer", SOURCE).unwrap();
        let result = compiler.compile(&unit).await.unwrap();

        assert!(result.size() > 0);
        assert_eq!(result.hash().len(), 64);
        assert_eq!(result.hash(), digest(b"\0asm\x01\0\0\0"));
        assert_eq!(executor.runs.load(Ordering::SeqCst), 1);

        let used = executor.seen.lock().unwrap()[0].clone();
        assert!(used.starts_with(temp.path()));
        assert!(!used.exists());
        assert_eq!(entries(temp.path()), 0);
    }

    #[tokio::test]
    async fn failed_build_still_removes_workspace() {
        let temp = TempDir::new().unwrap();
        let (builder, executor) = scripted(Script::Fail(1, "error: boom".into()));
        let compiler = Compiler::new(builder, temp.path(), 1024);

        let unit = SourceUnit::new("broken", SOURCE).unwrap();
        let err = compiler.compile(&unit).await.unwrap_err();

        assert!(matches!(err, CompileError::ToolchainFailed { exit_code: Some(1), .. }));
        assert!(!executor.seen.lock().unwrap()[0].exists());
        assert_eq!(entries(temp.path()), 0);
    }

    #[tokio::test]
    async fn sandbox_start_failure_removes_workspace() {
        let temp = TempDir::new().unwrap();
        let (builder, _) = scripted(Script::StartError);
        let compiler = Compiler::new(builder, temp.path(), 1024);

        let unit = SourceUnit::new("hook", SOURCE).unwrap();
        assert!(matches!(
            compiler.compile(&unit).await,
            Err(CompileError::SandboxStart(_))
        ));
        assert_eq!(entries(temp.path()), 0);
    }

    #[tokio::test]
    async fn missing_output_is_reported() {
        let temp = TempDir::new().unwrap();
        let (builder, _) = scripted(Script::ExitCleanWithoutOutput);
        let compiler = Compiler::new(builder, temp.path(), 1024);

        let unit = SourceUnit::new("hook", SOURCE).unwrap();
        assert!(matches!(
            compiler.compile(&unit).await,
            Err(CompileError::BuildIncomplete(_))
        ));
        assert_eq!(entries(temp.path()), 0);
    }

    #[tokio::test]
    async fn oversized_source_is_rejected_before_staging() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("ws");
        let (builder, executor) = scripted(Script::Emit(b"x".to_vec()));
        let compiler = Compiler::new(builder, &root, 8);

        let unit = SourceUnit::new("hook", SOURCE).unwrap();
        assert!(matches!(
            compiler.compile(&unit).await,
            Err(CompileError::SourceTooLarge { .. })
        ));
        assert_eq!(executor.runs.load(Ordering::SeqCst), 0);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn concurrent_builds_use_distinct_workspaces() {
        let temp = TempDir::new().unwrap();
        let (builder, executor) = scripted(Script::EchoSource(Duration::from_millis(50)));
        let compiler = Compiler::new(builder, temp.path(), 1024);

        let a = SourceUnit::new("loyalty_issuer", "int a;").unwrap();
        let b = SourceUnit::new("reward_validator", "int b;").unwrap();

        let (ra, rb) = tokio::join!(compiler.compile(&a), compiler.compile(&b));
        let (ra, rb) = (ra.unwrap(), rb.unwrap());

        assert_eq!(ra.bytes(), b"int a;");
        assert_eq!(rb.bytes(), b"int b;");

        let seen = executor.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0], seen[1]);
        assert_eq!(entries(temp.path()), 0);
    }

    #[tokio::test]
    async fn cancelled_build_removes_workspace() {
        let temp = TempDir::new().unwrap();
        let (builder, executor) = scripted(Script::EchoSource(Duration::from_secs(30)));
        let compiler = Compiler::new(builder, temp.path(), 1024);
        let unit = SourceUnit::new("hook", SOURCE).unwrap();

        let outcome =
            tokio::time::timeout(Duration::from_millis(50), compiler.compile(&unit)).await;
        assert!(outcome.is_err());
        assert_eq!(executor.runs.load(Ordering::SeqCst), 1);
        assert_eq!(entries(temp.path()), 0);
    }

    #[tokio::test]
    async fn mock_builder_goes_through_same_pipeline() {
        let temp = TempDir::new().unwrap();
        let compiler = Compiler::new(Arc::new(MockBuilder::new()), temp.path(), 1024);

        let unit = SourceUnit::new("loyalty_issuer", SOURCE).unwrap();
        let result = compiler.compile(&unit).await.unwrap();

        assert_eq!(result.size(), result.bytes().len());
        assert_eq!(result.hash(), digest(result.bytes()));
        assert_eq!(compiler.builder_kind(), BuilderKind::Mock);
        assert_eq!(entries(temp.path()), 0);
    }

    #[tokio::test]
    async fn check_reports_builder_failures() {
        let temp = TempDir::new().unwrap();
        let (builder, _) = scripted(Script::StartError);
        let compiler = Compiler::new(builder, temp.path(), 1024);

        let health = compiler.check().await;
        assert!(health.workspace_root.is_ok());
        assert!(health.builder.is_err());
        assert!(!health.is_ready());

        let compiler = Compiler::new(Arc::new(MockBuilder::new()), temp.path(), 1024);
        assert!(compiler.check().await.is_ready());
    }

    #[tokio::test]
    async fn check_reports_unusable_workspace_root() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let compiler = Compiler::new(Arc::new(MockBuilder::new()), &blocker, 1024);
        let health = compiler.check().await;
        assert!(health.workspace_root.is_err());
        assert!(!health.is_ready());
    }

    #[tokio::test]
    async fn check_leaves_no_marker_behind() {
        let temp = TempDir::new().unwrap();
        let compiler = Compiler::new(Arc::new(MockBuilder::new()), temp.path(), 1024);

        assert!(compiler.check().await.workspace_root.is_ok());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
