// SPDX-License-Identifier: MIT

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::adk::error::FlowError;
use crate::ects::envelope::{ResponseEnvelope, RunRequest};
use crate::ects::workflow::graph::StepEvent;
use crate::ects::workflow::{GraphExecutor, Workflow};

/// Invocation failure rendered as `500 {"detail": ...}`
struct ApiError(FlowError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": self.0.to_string() })),
        )
            .into_response()
    }
}

pub fn router(workflow: Arc<Workflow>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/run", post(run))
        .route("/run/stream", post(run_stream))
        .with_state(workflow)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(
    workflow: Arc<Workflow>,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(workflow);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn run(
    State(workflow): State<Arc<Workflow>>,
    Json(payload): Json<RunRequest>,
) -> Result<Json<ResponseEnvelope>, ApiError> {
    log::debug!(
        "Run request: transcript {} bytes, segment data {} bytes",
        payload.transcript.len(),
        payload.segment_data.len()
    );

    match GraphExecutor::new(workflow).invoke(payload).await {
        Ok(envelope) => Ok(Json(envelope)),
        Err(e) => {
            log::error!("Invocation failed: {}", e);
            Err(ApiError(e))
        }
    }
}

async fn run_stream(
    State(workflow): State<Arc<Workflow>>,
    Json(payload): Json<RunRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        log::info!("Starting streaming invocation of {}", workflow.name());

        let executor = GraphExecutor::new(workflow).with_events(tx.clone());
        let last = match executor.invoke(payload).await {
            Ok(response) => StepEvent::Completed { response },
            Err(e) => {
                log::error!("Streaming invocation failed: {}", e);
                StepEvent::Error {
                    message: e.to_string(),
                }
            }
        };
        let _ = tx.send(last).await;
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        Ok(Event::default()
            .json_data(&event)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1)))
}
