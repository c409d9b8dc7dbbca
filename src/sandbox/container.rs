// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Container-engine sandbox.
//!
//! Each run creates a uniquely named, network-less, read-only container
//! with dropped capabilities and resource limits. The workspace is the only
//! writable bind mount, and the toolchain runs as the workspace owner so it
//! can write there without `CAP_DAC_OVERRIDE`. A [`ContainerGuard`] force-removes the container when
//! the run returns, times out, or its future is dropped.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use super::{truncate_stderr, ExecOutcome, IsolatedExecutor, ToolchainCommand};
use crate::config::SandboxConfig;
use crate::error::CompileError;

/// Mount point of the workspace inside the container.
pub const CONTAINER_WORKDIR: &str = "/workspace";

/// Process ceiling inside the sandbox.
const PIDS_LIMIT: &str = "64";

/// Budget for `check()` probes against the engine.
const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Exit code the docker/podman CLI uses when the engine itself failed.
const ENGINE_ERROR_EXIT: i32 = 125;

/// Runs toolchain commands through a container engine CLI.
#[derive(Debug, Clone)]
pub struct ContainerExecutor {
    config: SandboxConfig,
}

impl ContainerExecutor {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Arguments for `<runtime> run ...`.
    ///
    /// `user` is a `uid:gid` pair; `None` keeps the image's default user.
    pub fn run_args(
        &self,
        container_name: &str,
        workspace: &Path,
        user: Option<&str>,
        command: &ToolchainCommand,
    ) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "run".into(),
            "--name".into(),
            container_name.into(),
        ];
        if let Some(user) = user {
            args.extend(["--user".into(), user.to_string()]);
        }
        args.extend([
            "--network".into(),
            "none".into(),
            "--memory".into(),
            self.config.memory.clone(),
            "--cpus".into(),
            self.config.cpus.clone(),
            "--pids-limit".into(),
            PIDS_LIMIT.into(),
            "--read-only".into(),
            "--tmpfs".into(),
            "/tmp".into(),
            "--cap-drop".into(),
            "ALL".into(),
            "--security-opt".into(),
            "no-new-privileges".into(),
            "--volume".into(),
            format!("{}:{CONTAINER_WORKDIR}:rw", workspace.display()),
            "--workdir".into(),
            CONTAINER_WORKDIR.into(),
            self.config.image.clone(),
            command.program().into(),
        ]);
        args.extend(command.args().iter().cloned());
        args
    }
}

/// `uid:gid` owning `path`.
#[cfg(unix)]
async fn workspace_owner(path: &Path) -> std::io::Result<Option<String>> {
    use std::os::unix::fs::MetadataExt;

    let meta = tokio::fs::metadata(path).await?;
    Ok(Some(format!("{}:{}", meta.uid(), meta.gid())))
}

#[cfg(not(unix))]
async fn workspace_owner(_path: &Path) -> std::io::Result<Option<String>> {
    Ok(None)
}

#[async_trait]
impl IsolatedExecutor for ContainerExecutor {
    async fn run(
        &self,
        workspace: &Path,
        command: &ToolchainCommand,
    ) -> Result<ExecOutcome, CompileError> {
        // Bind mounts need an absolute host path.
        let workspace = tokio::fs::canonicalize(workspace).await?;
        let name = format!("hooks-compiler-{}", Uuid::new_v4().simple());
        let user = workspace_owner(&workspace).await?;
        let args = self.run_args(&name, &workspace, user.as_deref(), command);

        let child = Command::new(&self.config.runtime)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CompileError::SandboxStart(format!("cannot run {}: {e}", self.config.runtime))
            })?;

        let mut guard = ContainerGuard::new(&self.config.runtime, &name);

        tracing::debug!(
            container = %name,
            image = %self.config.image,
            workspace = %workspace.display(),
            "Sandbox started"
        );

        let waited = tokio::time::timeout(self.config.timeout, child.wait_with_output()).await;

        // Removal happens before the result is inspected so every branch below
        // returns with the container gone.
        guard.remove().await;

        let output = match waited {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    container = %name,
                    timeout = ?self.config.timeout,
                    "Sandbox exceeded time limit, killed"
                );
                return Err(CompileError::BuildTimeout(self.config.timeout));
            }
        };

        let exit_code = output.status.code();
        let stderr = truncate_stderr(&output.stderr);

        tracing::debug!(container = %name, exit_code = ?exit_code, "Sandbox finished");

        if exit_code == Some(ENGINE_ERROR_EXIT) {
            return Err(CompileError::SandboxStart(stderr));
        }

        Ok(ExecOutcome { exit_code, stderr })
    }

    async fn check(&self) -> Result<(), CompileError> {
        let probe = Command::new(&self.config.runtime)
            .args(["version", "--format", "{{.Server.Version}}"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(CHECK_TIMEOUT, probe).await {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => Err(CompileError::SandboxStart(truncate_stderr(&output.stderr))),
            Ok(Err(e)) => Err(CompileError::SandboxStart(format!(
                "cannot run {}: {e}",
                self.config.runtime
            ))),
            Err(_) => Err(CompileError::SandboxStart(format!(
                "{} did not answer within {}s",
                self.config.runtime,
                CHECK_TIMEOUT.as_secs()
            ))),
        }
    }
}

/// Force-removes a named container exactly once.
///
/// `remove()` does it inline; if the guard is dropped first (cancellation),
/// removal is handed to the runtime or, outside one, run synchronously.
struct ContainerGuard {
    runtime: String,
    name: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(runtime: &str, name: &str) -> Self {
        Self {
            runtime: runtime.to_string(),
            name: name.to_string(),
            armed: true,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.runtime);
        cmd.args(["rm", "--force", self.name.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }

    async fn remove(&mut self) {
        let status = self.command().status().await;
        self.armed = false;
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => tracing::warn!(
                container = %self.name,
                exit_code = ?status.code(),
                "Failed to remove sandbox container"
            ),
            Err(e) => tracing::warn!(
                container = %self.name,
                error = %e,
                "Failed to remove sandbox container"
            ),
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let mut cmd = self.command();
                let name = self.name.clone();
                handle.spawn(async move {
                    if let Err(e) = cmd.status().await {
                        tracing::warn!(container = %name, error = %e, "Failed to remove sandbox container");
                    }
                });
            }
            Err(_) => {
                let status = std::process::Command::new(&self.runtime)
                    .args(["rm", "--force", self.name.as_str()])
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status();
                match status {
                    Ok(status) if status.success() => {}
                    Ok(status) => tracing::warn!(
                        container = %self.name,
                        exit_code = ?status.code(),
                        "Failed to remove sandbox container"
                    ),
                    Err(e) => tracing::warn!(
                        container = %self.name,
                        error = %e,
                        "Failed to remove sandbox container"
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn executor(runtime: &str) -> ContainerExecutor {
        ContainerExecutor::new(SandboxConfig {
            runtime: runtime.to_string(),
            ..SandboxConfig::default()
        })
    }

    #[test]
    fn run_args_isolate_the_container() {
        let exec = executor("docker");
        let cmd = ToolchainCommand::wasm_hook("a.c", "a.wasm");
        let args = exec.run_args(
            "hooks-compiler-x",
            &PathBuf::from("/tmp/ws"),
            Some("1000:1000"),
            &cmd,
        );

        let joined = args.join(" ");
        assert!(joined.starts_with("run --name hooks-compiler-x --user 1000:1000"));
        assert!(joined.contains("--network none"));
        assert!(joined.contains("--read-only"));
        assert!(joined.contains("--cap-drop ALL"));
        assert!(joined.contains("--security-opt no-new-privileges"));
        assert!(joined.contains("--memory 512m"));
        assert!(joined.contains("--volume /tmp/ws:/workspace:rw"));
        assert!(joined.contains("--workdir /workspace"));
        assert!(joined.ends_with(
            "wasi-sdk:latest clang --target=wasm32-wasi -O3 -nostdlib -Wl,--no-entry -Wl,--export-all -o a.wasm a.c"
        ));
        assert!(!args.iter().any(|a| a == "--rm"));

        let args = exec.run_args("hooks-compiler-x", &PathBuf::from("/tmp/ws"), None, &cmd);
        assert!(!args.iter().any(|a| a == "--user"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn workspace_owner_matches_directory_metadata() {
        use std::os::unix::fs::MetadataExt;

        let temp = tempfile::TempDir::new().unwrap();
        let meta = std::fs::metadata(temp.path()).unwrap();
        let owner = workspace_owner(temp.path()).await.unwrap();
        assert_eq!(owner, Some(format!("{}:{}", meta.uid(), meta.gid())));
    }

    #[tokio::test]
    async fn missing_runtime_is_sandbox_start_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let exec = executor("hooks-compiler-no-such-runtime");
        let cmd = ToolchainCommand::wasm_hook("a.c", "a.wasm");

        let err = exec.run(temp.path(), &cmd).await.unwrap_err();
        assert!(matches!(err, CompileError::SandboxStart(_)));

        let err = exec.check().await.unwrap_err();
        assert!(matches!(err, CompileError::SandboxStart(_)));
    }

    /// Fake engine CLI: logs its arguments and, for `run`, sleeps far past
    /// any test timeout.
    #[cfg(unix)]
    struct FakeEngine {
        _dir: tempfile::TempDir,
        script: PathBuf,
        log: PathBuf,
    }

    #[cfg(unix)]
    impl FakeEngine {
        fn new() -> Self {
            use std::os::unix::fs::PermissionsExt;

            let dir = tempfile::TempDir::new().unwrap();
            let script = dir.path().join("engine");
            let log = dir.path().join("engine.log");
            std::fs::write(
                &script,
                format!(
                    "#!/bin/sh\necho \"$*\" >> '{}'\nif [ \"$1\" = run ]; then exec sleep 30; fi\nexit 0\n",
                    log.display()
                ),
            )
            .unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
            Self {
                _dir: dir,
                script,
                log,
            }
        }

        fn executor(&self, timeout: Duration) -> ContainerExecutor {
            ContainerExecutor::new(SandboxConfig {
                runtime: self.script.display().to_string(),
                timeout,
                ..SandboxConfig::default()
            })
        }

        fn lines(&self) -> Vec<String> {
            std::fs::read_to_string(&self.log)
                .unwrap_or_default()
                .lines()
                .map(str::to_owned)
                .collect()
        }

        /// Container name from the logged `run --name <name>` line.
        fn container_name(&self) -> Option<String> {
            self.lines().iter().find_map(|line| {
                line.strip_prefix("run --name ")
                    .and_then(|rest| rest.split_whitespace().next())
                    .map(str::to_owned)
            })
        }

        fn removed(&self, name: &str) -> bool {
            self.lines()
                .iter()
                .any(|line| line == &format!("rm --force {name}"))
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn build_past_time_limit_is_killed_and_removed() {
        let engine = FakeEngine::new();
        let workspace = tempfile::TempDir::new().unwrap();
        let exec = engine.executor(Duration::from_millis(500));
        let cmd = ToolchainCommand::wasm_hook("a.c", "a.wasm");

        let started = std::time::Instant::now();
        let err = exec.run(workspace.path(), &cmd).await.unwrap_err();

        assert!(matches!(err, CompileError::BuildTimeout(t) if t == Duration::from_millis(500)));
        assert!(started.elapsed() < Duration::from_secs(10));

        let name = engine.container_name().expect("run was invoked");
        assert!(name.starts_with("hooks-compiler-"));
        assert!(engine.removed(&name), "log: {:?}", engine.lines());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dropped_run_still_removes_container() {
        let engine = FakeEngine::new();
        let workspace = tempfile::TempDir::new().unwrap();
        let exec = engine.executor(Duration::from_secs(60));
        let cmd = ToolchainCommand::wasm_hook("a.c", "a.wasm");

        let mut run = exec.run(workspace.path(), &cmd);

        // Drive the run until the engine has been invoked, then drop it.
        let mut name = None;
        for _ in 0..100 {
            tokio::select! {
                _ = &mut run => panic!("run finished before cancellation"),
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
            name = engine.container_name();
            if name.is_some() {
                break;
            }
        }
        let name = name.expect("run was invoked");
        drop(run);

        let mut removed = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if engine.removed(&name) {
                removed = true;
                break;
            }
        }
        assert!(removed, "log: {:?}", engine.lines());
    }

    #[cfg(unix)]
    #[test]
    fn guard_dropped_outside_runtime_removes_synchronously() {
        let engine = FakeEngine::new();
        let runtime = engine.script.display().to_string();

        drop(ContainerGuard::new(&runtime, "hooks-compiler-sync"));
        assert!(engine.removed("hooks-compiler-sync"), "log: {:?}", engine.lines());

        // A failing engine is logged, not raised.
        drop(ContainerGuard::new("hooks-compiler-no-such-runtime", "hooks-compiler-gone"));
    }
}
