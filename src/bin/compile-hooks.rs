// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Batch driver: compile every `*.c` hook in a directory.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use hooks_compiler::{
    batch::BatchDriver,
    compiler::Compiler,
    config::{BuilderKind, ConfigError, ServiceConfig},
    telemetry::{init_tracing, LogFormat},
};

/// Flags override the service's `HOOKS_*` environment, which overrides
/// the built-in defaults.
#[derive(Debug, Parser)]
#[command(name = "compile-hooks", about = "Compile C hooks to WASM artifacts")]
#[command(version)]
struct Cli {
    /// Directory containing `<name>.c` hook sources.
    #[arg(default_value = "hooks")]
    input: PathBuf,

    /// Directory receiving `<name>.wasm` and `<name>.json`.
    #[arg(default_value = "compiled")]
    output: PathBuf,

    /// Builder variant (`HOOKS_BUILDER`). `mock` produces placeholders
    /// without a container engine.
    #[arg(long, value_enum)]
    builder: Option<BuilderKind>,

    /// Number of hooks compiled at once.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    concurrency: u16,

    /// Toolchain container image (`HOOKS_SANDBOX_IMAGE`).
    #[arg(long)]
    image: Option<String>,

    /// Container engine CLI (`HOOKS_CONTAINER_RUNTIME`).
    #[arg(long)]
    runtime: Option<String>,

    /// Per-hook build time limit in seconds (`HOOKS_BUILD_TIMEOUT_SECS`).
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_secs: Option<u64>,

    /// Container memory limit (`HOOKS_SANDBOX_MEMORY`).
    #[arg(long)]
    memory: Option<String>,

    /// Container CPU limit (`HOOKS_SANDBOX_CPUS`).
    #[arg(long)]
    cpus: Option<String>,

    /// Root for ephemeral build workspaces (`HOOKS_WORKSPACE_ROOT`).
    #[arg(long)]
    workspace_root: Option<PathBuf>,
}

impl Cli {
    fn service_config(&self) -> Result<ServiceConfig, ConfigError> {
        self.service_config_from(|key| std::env::var(key).ok())
    }

    fn service_config_from<F>(&self, lookup: F) -> Result<ServiceConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServiceConfig::from_lookup(lookup)?;
        if let Some(builder) = self.builder {
            config.builder = builder;
        }
        if let Some(root) = &self.workspace_root {
            config.workspace_root = root.clone();
        }
        if let Some(image) = &self.image {
            config.sandbox.image = image.clone();
        }
        if let Some(runtime) = &self.runtime {
            config.sandbox.runtime = runtime.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.sandbox.timeout = Duration::from_secs(secs);
        }
        if let Some(memory) = &self.memory {
            config.sandbox.memory = memory.clone();
        }
        if let Some(cpus) = &self.cpus {
            config.sandbox.cpus = cpus.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing(LogFormat::from_env());
    let cli = Cli::parse();
    let config = match cli.service_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    if config.builder == BuilderKind::Mock {
        tracing::warn!("Using mock builder: outputs are placeholders, not compiled WASM");
    }

    let driver = BatchDriver::new(Compiler::from_config(&config), usize::from(cli.concurrency));

    match driver.run(&cli.input, &cli.output).await {
        Ok(summary) => {
            println!("{summary}");
            if summary.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!(
                input = %cli.input.display(),
                output = %cli.output.display(),
                error = %e,
                "Batch compilation failed"
            );
            ExitCode::FAILURE
        }
    }
}
