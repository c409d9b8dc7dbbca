// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Hook compilation endpoint.

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    Json,
};

use crate::{
    error::ApiError,
    models::{CompileResponse, CompileUpload, ErrorResponse},
    state::AppState,
    workspace::{SourceUnit, DEFAULT_UNIT_NAME},
};

/// Multipart field carrying the source file.
pub const SOURCE_FIELD: &str = "hook";

/// Multipart field carrying the optional unit name.
pub const NAME_FIELD: &str = "hookName";

fn multipart_error(e: MultipartError) -> ApiError {
    ApiError::new(e.status(), e.body_text())
}

/// Compile an uploaded C hook into WASM.
///
/// The unit is staged in a private workspace, built in the configured
/// sandbox and hashed. The workspace is removed before the response is sent.
#[utoipa::path(
    post,
    path = "/compile",
    tag = "Compiler",
    request_body(content = CompileUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Hook compiled", body = CompileResponse),
        (status = 400, description = "Missing file, empty source or invalid name", body = ErrorResponse),
        (status = 413, description = "Upload too large", body = ErrorResponse),
        (status = 500, description = "Build failed", body = ErrorResponse)
    )
)]
pub async fn compile_hook(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CompileResponse>, ApiError> {
    let mut source = None;
    let mut hook_name = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some(SOURCE_FIELD) => source = Some(field.bytes().await.map_err(multipart_error)?),
            Some(NAME_FIELD) => hook_name = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    let source = source.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;
    let code = String::from_utf8(source.to_vec())
        .map_err(|_| ApiError::bad_request("Hook source must be UTF-8 text"))?;
    let name = hook_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_UNIT_NAME.to_string());

    let unit = SourceUnit::new(name, code)?;

    let result = state.compiler.compile(&unit).await.map_err(|e| {
        tracing::error!(unit = unit.name(), error = %e, "Compilation error");
        ApiError::from(e)
    })?;

    Ok(Json(CompileResponse::from_result(&result)))
}
