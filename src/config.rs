// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values and the
//! [`ServiceConfig`] loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `3002` |
//! | `HOOKS_BUILDER` | Builder variant (`container` or `mock`) | `container` |
//! | `HOOKS_WORKSPACE_ROOT` | Root for ephemeral build workspaces | `$TMPDIR/hooks-compiler` |
//! | `HOOKS_SANDBOX_IMAGE` | Toolchain container image | `wasi-sdk:latest` |
//! | `HOOKS_CONTAINER_RUNTIME` | Container engine CLI | `docker` |
//! | `HOOKS_BUILD_TIMEOUT_SECS` | Wall-clock budget per build | `60` |
//! | `HOOKS_SANDBOX_MEMORY` | Container memory limit | `512m` |
//! | `HOOKS_SANDBOX_CPUS` | Container CPU limit | `1` |
//! | `HOOKS_MAX_SOURCE_BYTES` | Largest accepted source unit | `1048576` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files enabling HTTPS | unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const BUILDER_ENV: &str = "HOOKS_BUILDER";
pub const WORKSPACE_ROOT_ENV: &str = "HOOKS_WORKSPACE_ROOT";
pub const SANDBOX_IMAGE_ENV: &str = "HOOKS_SANDBOX_IMAGE";
pub const CONTAINER_RUNTIME_ENV: &str = "HOOKS_CONTAINER_RUNTIME";
pub const BUILD_TIMEOUT_ENV: &str = "HOOKS_BUILD_TIMEOUT_SECS";
pub const SANDBOX_MEMORY_ENV: &str = "HOOKS_SANDBOX_MEMORY";
pub const SANDBOX_CPUS_ENV: &str = "HOOKS_SANDBOX_CPUS";
pub const MAX_SOURCE_BYTES_ENV: &str = "HOOKS_MAX_SOURCE_BYTES";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";

/// Logging format selector. Read directly by the binaries.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3002;
pub const DEFAULT_SANDBOX_IMAGE: &str = "wasi-sdk:latest";
pub const DEFAULT_CONTAINER_RUNTIME: &str = "docker";
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SANDBOX_MEMORY: &str = "512m";
pub const DEFAULT_SANDBOX_CPUS: &str = "1";
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 1024 * 1024;

/// Directory name created under the system temp dir when no root is set.
pub const DEFAULT_WORKSPACE_DIR_NAME: &str = "hooks-compiler";

/// Configuration errors surfaced at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("TLS_CERT_PATH and TLS_KEY_PATH must be set together")]
    IncompleteTls,
}

/// Which builder produces artifacts.
///
/// Selecting [`BuilderKind::Mock`] is always an explicit operator decision;
/// it is never chosen automatically when the container runtime is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BuilderKind {
    #[default]
    #[value(alias = "docker")]
    Container,
    Mock,
}

impl FromStr for BuilderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "container" | "docker" => Ok(BuilderKind::Container),
            "mock" => Ok(BuilderKind::Mock),
            _ => Err(ConfigError::InvalidValue {
                var: BUILDER_ENV,
                value: s.to_string(),
                reason: "expected `container` or `mock`",
            }),
        }
    }
}

impl std::fmt::Display for BuilderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuilderKind::Container => write!(f, "container"),
            BuilderKind::Mock => write!(f, "mock"),
        }
    }
}

/// Resource limits and image settings for the container sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Container engine CLI (`docker`, `podman`).
    pub runtime: String,
    /// Image providing the WASI toolchain.
    pub image: String,
    /// Wall-clock budget for one build.
    pub timeout: Duration,
    /// Memory limit passed to the engine (`--memory`).
    pub memory: String,
    /// CPU limit passed to the engine (`--cpus`).
    pub cpus: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime: DEFAULT_CONTAINER_RUNTIME.to_string(),
            image: DEFAULT_SANDBOX_IMAGE.to_string(),
            timeout: DEFAULT_BUILD_TIMEOUT,
            memory: DEFAULT_SANDBOX_MEMORY.to_string(),
            cpus: DEFAULT_SANDBOX_CPUS.to_string(),
        }
    }
}

/// Paths to a PEM certificate chain and private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Complete service configuration, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub builder: BuilderKind,
    pub workspace_root: PathBuf,
    pub sandbox: SandboxConfig,
    pub max_source_bytes: usize,
    pub tls: Option<TlsPaths>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            builder: BuilderKind::default(),
            workspace_root: default_workspace_root(),
            sandbox: SandboxConfig::default(),
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            tls: None,
        }
    }
}

/// `$TMPDIR/hooks-compiler`.
pub fn default_workspace_root() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_WORKSPACE_DIR_NAME)
}

impl ServiceConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup(PORT_ENV) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                var: PORT_ENV,
                value: raw.clone(),
                reason: "expected a port number",
            })?,
            None => defaults.port,
        };

        let builder = match lookup(BUILDER_ENV) {
            Some(raw) => raw.parse()?,
            None => defaults.builder,
        };

        let timeout = match lookup(BUILD_TIMEOUT_ENV) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: BUILD_TIMEOUT_ENV,
                        value: raw,
                        reason: "expected a positive number of seconds",
                    })
                }
            },
            None => defaults.sandbox.timeout,
        };

        let max_source_bytes = match lookup(MAX_SOURCE_BYTES_ENV) {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: MAX_SOURCE_BYTES_ENV,
                        value: raw,
                        reason: "expected a positive byte count",
                    })
                }
            },
            None => defaults.max_source_bytes,
        };

        let tls = match (lookup(TLS_CERT_PATH_ENV), lookup(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: PathBuf::from(cert),
                key: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        Ok(Self {
            host: lookup(HOST_ENV).unwrap_or(defaults.host),
            port,
            builder,
            workspace_root: lookup(WORKSPACE_ROOT_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
            sandbox: SandboxConfig {
                runtime: lookup(CONTAINER_RUNTIME_ENV).unwrap_or(defaults.sandbox.runtime),
                image: lookup(SANDBOX_IMAGE_ENV).unwrap_or(defaults.sandbox.image),
                timeout,
                memory: lookup(SANDBOX_MEMORY_ENV).unwrap_or(defaults.sandbox.memory),
                cpus: lookup(SANDBOX_CPUS_ENV).unwrap_or(defaults.sandbox.cpus),
            },
            max_source_bytes,
            tls,
        })
    }

    /// `host:port` string for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
