// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::path::PathBuf;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Coarse failure category reported alongside every [`CompileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected before any workspace or sandbox was created.
    Input,
    /// The sandboxed toolchain could not run or did not produce output.
    Sandbox,
    /// Filesystem failure while staging or reading.
    Io,
}

/// Errors produced by one compilation attempt.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Source code is empty")]
    EmptySource,

    #[error("Source code is {size} bytes, limit is {limit}")]
    SourceTooLarge { size: usize, limit: usize },

    #[error("Invalid hook name {0:?}: use 1-64 characters from [A-Za-z0-9_-]")]
    InvalidUnitName(String),

    #[error("Failed to start sandbox: {0}")]
    SandboxStart(String),

    #[error("Toolchain exited with status {exit_code:?}: {stderr}")]
    ToolchainFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Build finished but produced no artifact at {}", .0.display())]
    BuildIncomplete(PathBuf),

    #[error("Build exceeded the {0:?} time limit")]
    BuildTimeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CompileError::EmptySource
            | CompileError::SourceTooLarge { .. }
            | CompileError::InvalidUnitName(_) => ErrorCategory::Input,
            CompileError::SandboxStart(_)
            | CompileError::ToolchainFailed { .. }
            | CompileError::BuildIncomplete(_)
            | CompileError::BuildTimeout(_) => ErrorCategory::Sandbox,
            CompileError::Io(_) => ErrorCategory::Io,
        }
    }

    /// HTTP status used when this error crosses the service boundary.
    pub fn status_code(&self) -> StatusCode {
        match self.category() {
            ErrorCategory::Input => StatusCode::BAD_REQUEST,
            ErrorCategory::Sandbox | ErrorCategory::Io => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<CompileError> for ApiError {
    fn from(err: CompileError) -> Self {
        Self::new(err.status_code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            success: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
