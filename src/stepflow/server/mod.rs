// SPDX-License-Identifier: MIT

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::sdk::error::{CheckpointError, ExecutionError, StepflowError};
use crate::sdk::observer::ChannelObserver;
use crate::stepflow::checkpoint::{Checkpoint, CheckpointStore};
use crate::stepflow::workflow::graph::{CompiledGraph, Engine, EngineConfig, SessionLocks};
use crate::stepflow::workflow::state::{PartialState, StateRecord};

/// Shared handler state: one workflow served over one checkpoint store
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn CheckpointStore>,
    graph: Arc<CompiledGraph>,
    engine_config: EngineConfig,
    locks: SessionLocks,
}

impl AppState {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        graph: CompiledGraph,
        engine_config: EngineConfig,
    ) -> Self {
        Self {
            store,
            graph: Arc::new(graph),
            engine_config,
            locks: SessionLocks::new(),
        }
    }

    /// Per-request engine; all of them share one session lock table
    fn engine(&self) -> Engine {
        Engine::new(self.store.clone())
            .with_config(self.engine_config.clone())
            .with_session_locks(self.locks.clone())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/sessions", get(list_sessions))
        .route(
            "/api/sessions/{id}/state",
            get(get_state).post(update_state),
        )
        .route("/api/sessions/{id}/history", get(get_history))
        .route("/api/sessions/{id}/run", post(run_session))
        .route("/api/sessions/{id}/run/stream", post(stream_session))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> Result<(), StepflowError> {
    let workflow = state.graph.name().to_string();
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Serving workflow '{}' on http://{}", workflow, addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// JSON error response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: json!({ "error": message.into() }),
        }
    }
}

impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        let status = match &err {
            ExecutionError::StepExecution { .. } | ExecutionError::StepLimitExceeded { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ExecutionError::UnknownResumePoint { .. } => StatusCode::CONFLICT,
            ExecutionError::UnknownStep(_) | ExecutionError::State(_) => StatusCode::BAD_REQUEST,
            ExecutionError::Checkpoint(CheckpointError::SessionNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ExecutionError::Checkpoint(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = json!({ "error": err.to_string() });
        if let ExecutionError::StepExecution {
            step,
            last_sequence,
            ..
        } = &err
        {
            body["step"] = json!(step);
            body["last_sequence"] = json!(last_sequence);
        }

        if status.is_server_error() {
            log::error!("Request failed: {}", err);
        }
        Self { status, body }
    }
}

impl From<CheckpointError> for ApiError {
    fn from(err: CheckpointError) -> Self {
        ExecutionError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    /// Initial state for a fresh session; ignored when resuming
    #[serde(default)]
    pub input: StateRecord,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub values: PartialState,
    pub as_step: String,
}

#[derive(Debug, Serialize)]
struct StateResponse {
    checkpoint: Checkpoint,
    next: Option<String>,
}

async fn health_check(State(app): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "workflow": app.graph.name() }))
}

async fn list_sessions(State(app): State<AppState>) -> Result<Json<Value>, ApiError> {
    let sessions = app.store.sessions().await?;
    Ok(Json(json!({ "sessions": sessions })))
}

async fn get_state(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StateResponse>, ApiError> {
    let engine = app.engine();
    let checkpoint = engine
        .get_state(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Session '{}' not found", id)))?;
    let next = engine.next_step(&app.graph, &id).await?;
    Ok(Json(StateResponse {
        checkpoint: checkpoint.as_ref().clone(),
        next,
    }))
}

async fn get_history(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let history = app.engine().get_history(&id).await?;
    let checkpoints: Vec<&Checkpoint> = history.iter().map(|c| c.as_ref()).collect();
    Ok(Json(json!({ "session_id": id, "checkpoints": checkpoints })))
}

async fn update_state(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateRequest>,
) -> Result<Json<Value>, ApiError> {
    let sequence = app
        .engine()
        .update_state(&app.graph, &id, payload.values, &payload.as_step)
        .await?;
    Ok(Json(json!({ "session_id": id, "sequence_number": sequence })))
}

async fn run_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<RunRequest>,
) -> Result<Json<Value>, ApiError> {
    let state = app.engine().run(&app.graph, payload.input, &id).await?;
    Ok(Json(json!({ "session_id": id, "state": state })))
}

async fn stream_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<RunRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        log::info!("Starting streaming run for session {}", id);
        let engine = app
            .engine()
            .with_observer(Arc::new(ChannelObserver::new(tx)));
        let outcome = engine.run(&app.graph, payload.input, &id).await;
        // Closes the event channel before the final message goes out
        drop(engine);

        let last = match outcome {
            Ok(state) => sse_event("result", &json!({ "session_id": id, "state": state })),
            Err(e) => sse_event("error", &json!({ "session_id": id, "error": e.to_string() })),
        };
        let _ = done_tx.send(last);
    });

    let events = UnboundedReceiverStream::new(rx).map(|event| sse_event(event.kind(), &event));
    let last = stream::once(done_rx).filter_map(|received| received.ok());
    let stream = events.chain(last).map(Ok);

    Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(1)))
}

fn sse_event(name: &str, data: &impl Serialize) -> Event {
    Event::default()
        .event(name)
        .json_data(data)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stepflow::checkpoint::MemoryCheckpointStore;
    use crate::stepflow::workflow::graph::WorkflowGraph;

    fn app_state() -> AppState {
        let mut graph = WorkflowGraph::new("news");
        graph
            .add_fn("load", |_: &StateRecord| {
                Ok(PartialState::new().with("count", json!(2)))
            })
            .unwrap();
        graph
            .add_fn("process", |state: &StateRecord| {
                if state.get("fail").and_then(|v| v.as_bool()) == Some(true) {
                    return Err("process failed".into());
                }
                Ok(PartialState::new().with("results", json!(["a", "b"])))
            })
            .unwrap();
        graph.chain(&["load", "process"]).unwrap();

        AppState::new(
            Arc::new(MemoryCheckpointStore::new()),
            graph.compile().unwrap(),
            EngineConfig::default(),
        )
    }

    fn run_request(input: Value) -> Json<RunRequest> {
        Json(RunRequest {
            input: StateRecord::from_value(input).unwrap(),
        })
    }

    #[tokio::test]
    async fn test_health_check() {
        let Json(body) = health_check(State(app_state())).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["workflow"], "news");
    }

    #[tokio::test]
    async fn test_run_then_inspect() {
        let app = app_state();

        let Json(body) = run_session(
            State(app.clone()),
            Path("s1".to_string()),
            run_request(json!({})),
        )
        .await
        .unwrap();
        assert_eq!(body["state"]["count"], 2);

        let Json(state) = get_state(State(app.clone()), Path("s1".to_string()))
            .await
            .unwrap();
        assert_eq!(state.checkpoint.sequence, 2);
        assert_eq!(state.next, None);

        let Json(history) = get_history(State(app.clone()), Path("s1".to_string()))
            .await
            .unwrap();
        let sequences: Vec<u64> = history["checkpoints"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["sequence_number"].as_u64().unwrap())
            .collect();
        assert_eq!(sequences, vec![2, 1]);

        let Json(sessions) = list_sessions(State(app)).await.unwrap();
        assert_eq!(sessions["sessions"], json!(["s1"]));
    }

    #[tokio::test]
    async fn test_unknown_session_state_is_404() {
        let err = get_state(State(app_state()), Path("ghost".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_step_failure_is_422_with_step_name() {
        let err = run_session(
            State(app_state()),
            Path("s1".to_string()),
            run_request(json!({ "fail": true })),
        )
        .await
        .unwrap_err();

        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.body["step"], "process");
        assert_eq!(err.body["last_sequence"], 1);
    }

    #[tokio::test]
    async fn test_manual_update_then_resume() {
        let app = app_state();
        run_session(
            State(app.clone()),
            Path("s1".to_string()),
            run_request(json!({ "fail": true })),
        )
        .await
        .unwrap_err();

        let Json(body) = update_state(
            State(app.clone()),
            Path("s1".to_string()),
            Json(UpdateRequest {
                values: PartialState::new().with("fail", json!(false)),
                as_step: "load".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(body["sequence_number"], 2);

        let Json(body) = run_session(
            State(app),
            Path("s1".to_string()),
            run_request(json!({})),
        )
        .await
        .unwrap();
        assert_eq!(body["state"]["results"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_update_with_unknown_step_is_400() {
        let app = app_state();
        run_session(
            State(app.clone()),
            Path("s1".to_string()),
            run_request(json!({})),
        )
        .await
        .unwrap();

        let err = update_state(
            State(app),
            Path("s1".to_string()),
            Json(UpdateRequest {
                values: PartialState::new(),
                as_step: "publish".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_unknown_session_is_404() {
        let err = update_state(
            State(app_state()),
            Path("ghost".to_string()),
            Json(UpdateRequest {
                values: PartialState::new(),
                as_step: "load".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
