//! HTTP routes.
//!
//! Everything except `/health` lives under `/api/v1`.

use crate::error::ApiError;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use loomwork_core::{TemplateId, UserId, WorkflowInstanceId};
use loomwork_workflow::{
    Engine, EngineError, InstanceDetail, InstanceSummary, NodeInstance, ProgressEvent,
    TimelineEntry, WorkflowStatus,
};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::convert::Infallible;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use tower_http::trace::TraceLayer;

/// Header carrying the acting user's id.
pub const USER_HEADER: &str = "x-user-id";

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub default_user: UserId,
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/workflows", get(list_workflows))
        .route("/workflows/start", post(start_workflow))
        .route("/workflows/{id}", get(workflow_detail))
        .route("/workflows/{id}/timeline", get(workflow_timeline))
        .route("/workflows/{id}/nodes/{node_id}", get(node_instance))
        .route("/workflows/{id}/events", get(workflow_events));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    #[serde(default)]
    template_id: Option<TemplateId>,
    /// Inline definition, as a JSON document or a string holding one.
    #[serde(default)]
    definition: Option<JsonValue>,
    #[serde(default)]
    inputs: Map<String, JsonValue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    workflow_id: WorkflowInstanceId,
}

fn actor(headers: &HeaderMap, default_user: UserId) -> Result<UserId, ApiError> {
    let Some(value) = headers.get(USER_HEADER) else {
        return Ok(default_user);
    };
    value
        .to_str()
        .map_err(|e| ApiError::bad_request(format!("invalid {USER_HEADER} header: {e}")))?
        .parse()
        .map_err(|e| ApiError::bad_request(format!("invalid {USER_HEADER} header: {e}")))
}

async fn start_workflow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<StartRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let actor = actor(&headers, state.default_user)?;
    let workflow_id = match (request.definition, request.template_id) {
        (Some(JsonValue::String(definition)), template_id) => {
            state
                .engine
                .start(&definition, template_id, actor, request.inputs)
                .await?
        }
        (Some(definition), template_id) => {
            state
                .engine
                .start(&definition.to_string(), template_id, actor, request.inputs)
                .await?
        }
        (None, Some(template_id)) => {
            state
                .engine
                .start_from_template(template_id, actor, request.inputs)
                .await?
        }
        (None, None) => {
            return Err(ApiError::bad_request(
                "either templateId or definition is required",
            ));
        }
    };
    Ok(Json(StartResponse { workflow_id }))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

async fn list_workflows(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<InstanceSummary>>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    Ok(Json(state.engine.list_instances(limit).await?))
}

async fn workflow_detail(
    State(state): State<AppState>,
    Path(id): Path<WorkflowInstanceId>,
) -> Result<Json<InstanceDetail>, ApiError> {
    Ok(Json(state.engine.instance_detail(id).await?))
}

async fn workflow_timeline(
    State(state): State<AppState>,
    Path(id): Path<WorkflowInstanceId>,
) -> Result<Json<Vec<TimelineEntry>>, ApiError> {
    Ok(Json(state.engine.timeline(id).await?))
}

async fn node_instance(
    State(state): State<AppState>,
    Path((id, node_id)): Path<(WorkflowInstanceId, String)>,
) -> Result<Json<NodeInstance>, ApiError> {
    Ok(Json(state.engine.node_instance(id, &node_id).await?))
}

/// Streams the progress events of one instance as server-sent events.
///
/// The stream ends after the instance's `workflowFinished` event, and is
/// empty if the instance had already finished when the client connected.
async fn workflow_events(
    State(state): State<AppState>,
    Path(id): Path<WorkflowInstanceId>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Subscribe before reading the status so the final event cannot slip between.
    let receiver = state.engine.subscribe();
    let status = state
        .engine
        .store()
        .workflow_status(id)
        .await
        .map_err(|e| engine_error(EngineError::from(e)))?
        .ok_or_else(|| engine_error(EngineError::InstanceNotFound { workflow_id: id }))?;

    let live = (status == WorkflowStatus::Running).then_some(receiver);
    let events = instance_events(live, id).filter_map(|event| sse_event(&event).map(Ok));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn engine_error(error: EngineError) -> ApiError {
    let report: Report<EngineError> = error.into();
    report.into()
}

/// Progress events of one instance, up to and including its `WorkflowFinished`.
fn instance_events(
    receiver: Option<broadcast::Receiver<ProgressEvent>>,
    id: WorkflowInstanceId,
) -> impl Stream<Item = ProgressEvent> {
    futures::stream::unfold(receiver.map(BroadcastStream::new), move |stream| async move {
        let mut stream = stream?;
        while let Some(received) = stream.next().await {
            match received {
                Ok(event) if event.workflow_id() == id => {
                    let finished = matches!(event, ProgressEvent::WorkflowFinished { .. });
                    return Some((event, (!finished).then_some(stream)));
                }
                Ok(_) => {}
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    tracing::warn!(workflow_id = %id, missed, "progress subscriber lagged");
                }
            }
        }
        None
    })
}

fn sse_event(event: &ProgressEvent) -> Option<Event> {
    let name = match event {
        ProgressEvent::NodeFinished { .. } => "nodeFinished",
        ProgressEvent::WorkflowFinished { .. } => "workflowFinished",
    };
    match Event::default().event(name).json_data(event) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode progress event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use loomwork_ai::ModelRegistry;
    use loomwork_core::SnowflakeGenerator;
    use loomwork_integration::{Crawler, LocalFileStore};
    use loomwork_workflow::{
        EngineConfig, InMemoryInstanceStore, InMemoryTemplateSource, Services,
    };
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        engine: Engine,
        templates: Arc<InMemoryTemplateSource>,
        _files: tempfile::TempDir,
    }

    fn app() -> TestApp {
        let files = tempfile::tempdir().expect("tempdir");
        let services = Services::new(
            Arc::new(ModelRegistry::new()),
            Crawler::new(Duration::from_secs(5)).expect("crawler"),
            Arc::new(LocalFileStore::new(files.path())),
        );
        let templates = Arc::new(InMemoryTemplateSource::new());
        let engine = Engine::new(
            Arc::new(InMemoryInstanceStore::new()),
            templates.clone(),
            services,
            Arc::new(SnowflakeGenerator::new(1).expect("worker id")),
            EngineConfig::default(),
        );
        let router = router(AppState {
            engine: engine.clone(),
            default_user: UserId::from_raw(1),
        });
        TestApp {
            router,
            engine,
            templates,
            _files: files,
        }
    }

    fn echo_definition() -> JsonValue {
        json!({
            "nodes": [
                {"id": "start", "type": "start", "data": {"input": [
                    {"name": "question", "type": "string", "required": true}
                ]}},
                {"id": "end", "type": "end", "data": {"input": [
                    {"name": "question", "type": "string",
                     "value": {"type": "ref", "sourceNode": "start", "sourceName": "question"}}
                ]}}
            ],
            "edges": [{"id": "e1", "source": "start", "target": "end"}]
        })
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, JsonValue) {
        let response = router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
        (status, body)
    }

    fn post_start(body: JsonValue) -> Request<Body> {
        Request::post("/api/v1/workflows/start")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = app();
        let response = app.router.oneshot(get("/health")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn started_workflow_can_be_inspected() {
        let app = app();
        let (status, body) = send(
            &app.router,
            post_start(json!({"definition": echo_definition(), "inputs": {"question": "hi"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = body["workflowId"].as_str().expect("id").to_string();
        app.engine.wait_idle().await;

        let (status, detail) = send(&app.router, get(&format!("/api/v1/workflows/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["instance"]["status"], json!("completed"));
        assert_eq!(detail["passedEdges"][0]["id"], json!("e1"));

        let (status, timeline) =
            send(&app.router, get(&format!("/api/v1/workflows/{id}/timeline"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(timeline.as_array().map(Vec::len), Some(2));

        let (status, end) =
            send(&app.router, get(&format!("/api/v1/workflows/{id}/nodes/end"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(end["output"], json!({"question": "hi"}));

        let (status, list) = send(&app.router, get("/api/v1/workflows?limit=5")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list[0]["id"], json!(id));
    }

    #[tokio::test]
    async fn actor_comes_from_header() {
        let app = app();
        let request = Request::post("/api/v1/workflows/start")
            .header("content-type", "application/json")
            .header(USER_HEADER, "42")
            .body(Body::from(
                json!({"definition": echo_definition().to_string(), "inputs": {"question": "q"}})
                    .to_string(),
            ))
            .expect("request");
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        app.engine.wait_idle().await;

        let id = body["workflowId"].as_str().expect("id");
        let (_, detail) = send(&app.router, get(&format!("/api/v1/workflows/{id}"))).await;
        assert_eq!(detail["instance"]["addUser"], json!("42"));
    }

    #[tokio::test]
    async fn bad_actor_header_is_rejected() {
        let app = app();
        let request = Request::post("/api/v1/workflows/start")
            .header("content-type", "application/json")
            .header(USER_HEADER, "alice")
            .body(Body::from(json!({"definition": echo_definition()}).to_string()))
            .expect("request");
        let (status, _) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_input_is_a_bad_request() {
        let app = app();
        let (status, body) =
            send(&app.router, post_start(json!({"definition": echo_definition()}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "missing required variable: question"}));
    }

    #[tokio::test]
    async fn start_needs_a_definition_or_template() {
        let app = app();
        let (status, _) = send(&app.router, post_start(json!({"inputs": {}}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app.router, post_start(json!({"templateId": "99"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn templates_are_started_by_id() {
        let app = app();
        app.templates
            .insert(TemplateId::from_raw(7), echo_definition().to_string());
        let (status, body) = send(
            &app.router,
            post_start(json!({"templateId": 7, "inputs": {"question": "t"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["workflowId"].is_string());
    }

    #[tokio::test]
    async fn unknown_instance_is_not_found() {
        let app = app();
        let (status, body) = send(&app.router, get("/api/v1/workflows/12345")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().is_some());
    }

    fn node_finished(workflow_id: i64, node_id: &str) -> ProgressEvent {
        ProgressEvent::NodeFinished {
            workflow_id: WorkflowInstanceId::from_raw(workflow_id),
            node_id: node_id.to_string(),
            node_type: loomwork_workflow::NodeType::Llm,
            status: loomwork_workflow::NodeStatus::Completed,
            error: None,
            at: chrono::Utc::now(),
        }
    }

    fn workflow_finished(workflow_id: i64) -> ProgressEvent {
        ProgressEvent::WorkflowFinished {
            workflow_id: WorkflowInstanceId::from_raw(workflow_id),
            status: loomwork_workflow::WorkflowStatus::Completed,
            at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn event_stream_ends_after_workflow_finished() {
        let (tx, rx) = broadcast::channel(16);
        for event in [
            node_finished(2, "other"),
            node_finished(1, "llm"),
            workflow_finished(2),
            workflow_finished(1),
            node_finished(1, "late"),
        ] {
            tx.send(event).expect("send");
        }

        // The sender stays alive, so only the finish event can end the stream.
        let events: Vec<ProgressEvent> = instance_events(Some(rx), WorkflowInstanceId::from_raw(1))
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ProgressEvent::NodeFinished { node_id, .. } if node_id == "llm"));
        assert!(matches!(events[1], ProgressEvent::WorkflowFinished { .. }));
        drop(tx);
    }

    #[tokio::test]
    async fn events_of_a_finished_instance_close_immediately() {
        let app = app();
        let (_, body) = send(
            &app.router,
            post_start(json!({"definition": echo_definition(), "inputs": {"question": "hi"}})),
        )
        .await;
        app.engine.wait_idle().await;
        let id = body["workflowId"].as_str().expect("id").to_string();

        let response = app
            .router
            .clone()
            .oneshot(get(&format!("/api/v1/workflows/{id}/events")))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = tokio::time::timeout(
            Duration::from_secs(5),
            to_bytes(response.into_body(), usize::MAX),
        )
        .await
        .expect("stream closed")
        .expect("body");
        assert!(bytes.is_empty());

        let (status, _) = send(&app.router, get("/api/v1/workflows/12345/events")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn progress_events_are_named_by_kind() {
        let event = ProgressEvent::WorkflowFinished {
            workflow_id: WorkflowInstanceId::from_raw(1),
            status: loomwork_workflow::WorkflowStatus::Completed,
            at: chrono::Utc::now(),
        };
        assert!(sse_event(&event).is_some());
    }
}
