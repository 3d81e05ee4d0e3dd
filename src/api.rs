use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::import::{generate_session_id, ImportEngine};
use crate::models::*;
use crate::progress::{BroadcastSink, EventHub};

/// Thin REST wrapping around the engine. Every route answers with a
/// `{data, error}` envelope; failures map to HTTP 500.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ImportEngine>,
    pub events: Arc<EventHub>,
}

pub fn router(engine: Arc<ImportEngine>, events: Arc<EventHub>) -> Router {
    let state = AppState { engine, events };
    Router::new()
        .route("/api/testConnection", post(test_connection))
        .route("/api/import", post(import))
        .route("/api/resumeImport", post(resume_import))
        .route("/api/pauseImport", post(pause_import))
        .route("/api/testTransform", post(test_transform))
        .route("/api/sampleRecord", post(sample_record))
        .route("/api/events/{session_id}", get(events_stream))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct ApiEnvelope<T> {
    data: Option<T>,
    error: Option<String>,
}

fn respond<T: Serialize>(result: Result<T>) -> (StatusCode, Json<ApiEnvelope<T>>) {
    match result {
        Ok(data) => (
            StatusCode::OK,
            Json(ApiEnvelope { data: Some(data), error: None }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "API call failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiEnvelope { data: None, error: Some(e.to_string()) }),
            )
        }
    }
}

async fn test_connection(
    State(state): State<AppState>,
    Json(input): Json<TestConnectionInput>,
) -> impl IntoResponse {
    respond(state.engine.test_connection(input).await)
}

async fn import(
    State(state): State<AppState>,
    Json(mut input): Json<StartImportInput>,
) -> impl IntoResponse {
    // Fix the session id here so the observer channel and the engine agree.
    let session_id = input.session_id.get_or_insert_with(generate_session_id).clone();
    let sink = Arc::new(BroadcastSink::new(state.events.sender(&session_id)));
    respond(state.engine.start_import(input, sink).await)
}

async fn resume_import(
    State(state): State<AppState>,
    Json(input): Json<ResumeImportInput>,
) -> impl IntoResponse {
    let sink = Arc::new(BroadcastSink::new(state.events.sender(&input.session_id)));
    respond(state.engine.resume_import(input, sink).await)
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct PauseImportInput {
    session_id: String,
}

async fn pause_import(
    State(state): State<AppState>,
    Json(input): Json<PauseImportInput>,
) -> impl IntoResponse {
    respond(
        state
            .engine
            .pause_import(&input.session_id)
            .await
            .map(|_| "Pause requested"),
    )
}

async fn test_transform(
    State(state): State<AppState>,
    Json(input): Json<TestTransformInput>,
) -> impl IntoResponse {
    respond(state.engine.test_transform(input))
}

async fn sample_record(
    State(state): State<AppState>,
    Json(input): Json<SampleRecordInput>,
) -> impl IntoResponse {
    respond(state.engine.sample_record(input).await)
}

/// Server-Sent Events stream of the session's progress events.
async fn events_stream(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Sse<impl futures::Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.events.subscribe(&session_id);
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => match Event::default().json_data(&event) {
                    Ok(sse_event) => return Some((Ok::<_, Infallible>(sse_event), rx)),
                    Err(_) => continue,
                },
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn health_check() -> &'static str {
    "OK"
}
