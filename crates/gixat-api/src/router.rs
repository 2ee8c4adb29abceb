//! HTTP surface: GraphQL endpoint, media redirects and health routes

use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    Router,
    extract::{DefaultBodyLimit, Extension, State},
    http::HeaderMap,
    middleware,
    response::{Html, IntoResponse},
    routing::get,
};
use gixat_observability::{HealthState, health_router};
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::context::request_context;
use crate::media_routes::media_redirect;
use crate::middleware::{
    MAX_REQUEST_BYTES, RequestId, body_size_limit_middleware, cors_layer, request_id_middleware,
    security_headers_middleware,
};
use crate::state::AppState;

/// Operation names are client supplied; keep the metric label set bounded
fn operation_label(name: Option<&str>) -> String {
    match name {
        Some(name)
            if !name.is_empty()
                && name.len() <= 64
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') =>
        {
            name.to_string()
        }
        Some(_) => "invalid".to_string(),
        None => "anonymous".to_string(),
    }
}

async fn graphql_handler(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let started = Instant::now();
    let ctx = request_context(&state.tokens, &headers);
    let request = req.into_inner();
    let operation = operation_label(request.operation_name.as_deref());

    let response = state.schema.execute(request.data(ctx)).await;

    let outcome = response
        .errors
        .first()
        .map(|e| {
            e.extensions
                .as_ref()
                .and_then(|ext| ext.get("code"))
                .and_then(|code| match code {
                    async_graphql::Value::String(code) => Some(code.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| "GRAPHQL_ERROR".to_string())
        })
        .unwrap_or_else(|| "ok".to_string());
    let elapsed = started.elapsed();
    state
        .metrics
        .record_graphql_request(&operation, &outcome, elapsed.as_secs_f64());
    debug!(
        "GraphQL {} -> {} in {:?} (request {})",
        operation,
        outcome,
        elapsed,
        request_id.map(|Extension(id)| id.0).unwrap_or_default()
    );

    response.into()
}

async fn graphiql() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

/// Assemble the full application router
pub fn router(state: AppState, health: HealthState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/graphql", get(graphiql).post(graphql_handler))
        .route("/api/media/{kind}/{id}/{*file}", get(media_redirect))
        .with_state(state)
        .merge(health_router(health))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(middleware::from_fn(|req, next| {
            body_size_limit_middleware(req, next, MAX_REQUEST_BYTES)
        }))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors_layer(cors_origins))
}
