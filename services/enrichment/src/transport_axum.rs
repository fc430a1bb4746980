use std::{collections::HashMap, sync::Arc};

use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::get,
};

use crate::transport::{
    FUNCTION_KEY_HEADER, FUNCTION_KEY_QUERY, HttpResponse, MAX_HTTP_BODY_BYTES, SharedRuntime,
    SkillCall, SkillRuntime, handle_skill_call,
};

pub fn serve_http_with_axum(
    runtime: SkillRuntime,
    bind_addr: &str,
    worker_threads: usize,
) -> Result<(), String> {
    let worker_threads = worker_threads.max(1);
    let app = router(Arc::new(runtime));
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .map_err(|err| format!("failed to build tokio runtime: {err}"))?
        .block_on(async move {
            let listener = tokio::net::TcpListener::bind(bind_addr)
                .await
                .map_err(|err| format!("failed to bind {bind_addr}: {err}"))?;
            tracing::info!(bind_addr, worker_threads, "axum skill transport started");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .map_err(|err| format!("axum server failed: {err}"))
        })
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("axum skill transport shutting down"),
        Err(err) => {
            tracing::warn!(%err, "shutdown signal unavailable; serving until killed");
            std::future::pending::<()>().await;
        }
    }
}

fn router(runtime: SharedRuntime) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/:skill_name", get(invoke_skill).post(invoke_skill))
        .fallback(unknown_path)
        .layer(DefaultBodyLimit::max(MAX_HTTP_BODY_BYTES))
        .with_state(runtime)
}

async fn health() -> HttpResponse {
    HttpResponse::health()
}

async fn metrics(State(runtime): State<SharedRuntime>) -> HttpResponse {
    HttpResponse::ok_metrics(runtime.metrics_text())
}

async fn unknown_path() -> HttpResponse {
    HttpResponse::not_found("unknown path")
}

/// Enrichment fans records out over rayon, so it runs on the blocking pool
/// rather than on an async worker.
async fn invoke_skill(
    State(runtime): State<SharedRuntime>,
    Path(skill_name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResponse {
    if !runtime.accepts_skill_name(&skill_name) {
        return HttpResponse::not_found("unknown path");
    }
    let function_key = header_text(&headers, FUNCTION_KEY_HEADER)
        .or_else(|| query.get(FUNCTION_KEY_QUERY).cloned());
    let content_type = header_text(&headers, CONTENT_TYPE.as_str());

    let enrichment = tokio::task::spawn_blocking(move || {
        handle_skill_call(
            &runtime,
            SkillCall {
                function_key: function_key.as_deref(),
                content_type: content_type.as_deref(),
                body: &body,
            },
        )
    });
    match enrichment.await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(%err, "skill enrichment task failed");
            HttpResponse::internal_server_error("skill enrichment task failed")
        }
    }
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

impl IntoResponse for HttpResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, [(CONTENT_TYPE, self.content_type)], self.body).into_response()
    }
}
