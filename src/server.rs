//! HTTP server for tick triggers and task status.
//!
//! Provides REST API endpoints for:
//! - Health checks
//! - Accepting monitoring ticks
//! - Querying task status

use std::net::SocketAddr;

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use podwatch_types::{MonitorRequest, MonitoringTask};

use crate::monitor::Monitor;
use crate::tasks::TaskLookup;

/// Server state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub monitor: Monitor,
}

/// Build the HTTP router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/tick", post(tick_handler))
        .route("/api/tasks/{task_id}", get(task_status_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn run_server(
    state: AppState,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Podwatch listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    tasks_in_flight: usize,
}

#[derive(Debug, Serialize)]
struct TickAccepted {
    status: &'static str,
    task_id: Uuid,
}

#[derive(Debug, Serialize)]
struct TickRejected {
    status: &'static str,
    message: String,
    missing_settings: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum TaskStatusResponse {
    Found(MonitoringTask),
    NotFound { status: &'static str, task_id: String },
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        tasks_in_flight: state.monitor.registry().in_flight(),
    })
}

async fn tick_handler(
    State(state): State<AppState>,
    Json(request): Json<MonitorRequest>,
) -> Response {
    match state.monitor.submit(request) {
        Ok(task_id) => (
            StatusCode::ACCEPTED,
            Json(TickAccepted {
                status: "accepted",
                task_id,
            }),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Rejected tick");
            (
                StatusCode::BAD_REQUEST,
                Json(TickRejected {
                    status: "error",
                    message: e.to_string(),
                    missing_settings: e.missing_fields().to_vec(),
                }),
            )
                .into_response()
        }
    }
}

async fn task_status_handler(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Json<TaskStatusResponse> {
    match state.monitor.registry().status(&task_id) {
        TaskLookup::Found(task) => Json(TaskStatusResponse::Found(task)),
        TaskLookup::NotFound => Json(TaskStatusResponse::NotFound {
            status: "not_found",
            task_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::tests::{FakeCluster, monitor, request};
    use axum::body::{self, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt; // for `oneshot`
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_tick(body: &MonitorRequest) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/tick")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_tick_accepted_then_observable_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let state = AppState {
            monitor: monitor(Arc::new(FakeCluster::default()), dir.path(), 4),
        };
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(post_tick(&request(&server.uri(), &[])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["status"], "accepted");
        let task_id = body["task_id"].as_str().unwrap().to_string();

        let uri = format!("/api/tasks/{}", task_id);
        let mut last = serde_json::Value::Null;
        for _ in 0..500 {
            let response = app.clone().oneshot(get_request(&uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            last = json_body(response).await;
            if last["status"] == "succeeded" || last["status"] == "failed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(last["status"], "succeeded");
        assert_eq!(last["task_id"], task_id.as_str());

        let response = app.oneshot(get_request(&uri)).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["status"], "not_found");
    }

    #[tokio::test]
    async fn test_tick_with_missing_settings_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(Arc::new(FakeCluster::default()), dir.path(), 4);
        let app = build_router(AppState {
            monitor: monitor.clone(),
        });

        let tick = request(
            "http://127.0.0.1:9/hook",
            &[("ca_cert", ""), ("service_account_token", "")],
        );
        let response = app.oneshot(post_tick(&tick)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(
            body["missing_settings"],
            serde_json::json!(["ca_cert", "service_account_token"])
        );
        assert_eq!(monitor.registry().len(), 0);
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(AppState {
            monitor: monitor(Arc::new(FakeCluster::default()), dir.path(), 4),
        });

        let response = app.oneshot(get_request("/api/tasks/unknown-id")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "not_found");
        assert_eq!(body["task_id"], "unknown-id");
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(AppState {
            monitor: monitor(Arc::new(FakeCluster::default()), dir.path(), 4),
        });

        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["tasks_in_flight"], 0);
    }
}
