// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    deploy::{EncodedHookParameter, HookDefinition, HookParameter},
    models::{
        CompileResponse, CompileUpload, ErrorResponse, HealthResponse, ReadyChecks,
        ReadyResponse,
    },
    state::AppState,
};

pub mod compile;
pub mod health;

/// Room for multipart boundaries and headers on top of the source itself.
pub const MULTIPART_OVERHEAD_BYTES: usize = 16 * 1024;

pub fn router(state: AppState) -> Router {
    let body_limit = state.compiler.max_source_bytes() + MULTIPART_OVERHEAD_BYTES;

    let routes = Router::new()
        .route(
            "/compile",
            post(compile::compile_hook).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CorsLayer::permissive()),
        )
}

#[derive(OpenApi)]
#[openapi(
    paths(compile::compile_hook, health::health, health::readiness),
    components(
        schemas(
            CompileUpload,
            CompileResponse,
            ErrorResponse,
            HealthResponse,
            ReadyResponse,
            ReadyChecks,
            HookDefinition,
            HookParameter,
            EncodedHookParameter
        )
    ),
    tags(
        (name = "Compiler", description = "Sandboxed C-to-WASM hook compilation"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;
