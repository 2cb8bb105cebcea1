use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::domain::filter::{CompileError, FilterInput};
use crate::domain::projector::Column;
use crate::domain::snapshot_store::SnapshotStore;
use crate::domain::types::*;
use crate::domain::view_model::{RebuildOutcome, TableView, ViewModel};
use crate::ingest::{IngestError, IngestHandle, IngestMessage};

/// Shared application state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SnapshotStore>,
    pub view: Arc<ViewModel>,
    pub ingest: IngestHandle,
    pub started_at: Instant,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
            field: None,
        }),
    )
}

impl From<CompileError> for ErrorBody {
    fn from(e: CompileError) -> Self {
        Self {
            error: e.to_string(),
            field: Some(e.field.to_string()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/ingest", post(ingest))
        .route("/api/v1/view", get(view))
        .route("/api/v1/columns", get(columns))
        .route("/api/v1/machines", get(machines))
        .route("/api/v1/filter", get(get_filter).put(set_filter))
        .route("/api/v1/sort", put(set_sort))
        .route("/api/v1/selection", put(select).delete(clear_selection))
        .route("/api/v1/refresh", post(refresh))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<DaemonHealth> {
    Json(DaemonHealth {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        machines: state.store.machine_count().await,
        records: state.store.record_count().await,
    })
}

/// Accept one machine snapshot. Decoding happens here; the store write is
/// queued, so the response is 202.
async fn ingest(
    State(state): State<AppState>,
    Json(message): Json<IngestMessage>,
) -> Result<StatusCode, ApiError> {
    match state.ingest.submit(&message) {
        Ok(_) => Ok(StatusCode::ACCEPTED),
        Err(e @ IngestError::Decode(_)) => Err(api_error(StatusCode::BAD_REQUEST, e)),
        Err(e) => Err(api_error(StatusCode::SERVICE_UNAVAILABLE, e)),
    }
}

async fn view(State(state): State<AppState>) -> Json<TableView> {
    Json(state.view.view().await)
}

async fn columns(State(state): State<AppState>) -> Json<Vec<Column>> {
    Json(state.view.schema().columns.clone())
}

async fn machines(State(state): State<AppState>) -> Json<Vec<MachineSummary>> {
    let machines = state
        .store
        .machines()
        .await
        .into_iter()
        .map(|(machine, processes)| MachineSummary { machine, processes })
        .collect();
    Json(machines)
}

async fn get_filter(State(state): State<AppState>) -> Json<FilterResponse> {
    Json(FilterResponse {
        filter: state.view.filter_input().await,
    })
}

/// Install a new filter. An invalid regex is rejected with 422 and the
/// previous filter stays active.
async fn set_filter(
    State(state): State<AppState>,
    Json(input): Json<FilterInput>,
) -> Result<Json<FilterResponse>, (StatusCode, Json<ErrorBody>)> {
    state
        .view
        .on_filter_changed(&input)
        .await
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorBody::from(e))))?;
    Ok(Json(FilterResponse {
        filter: state.view.filter_input().await,
    }))
}

async fn set_sort(
    State(state): State<AppState>,
    Json(request): Json<SortRequest>,
) -> Result<Json<TableView>, ApiError> {
    let column = state.view.schema().resolve(&request.column).ok_or_else(|| {
        api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("unknown column '{}'", request.column),
        )
    })?;
    state
        .view
        .set_sort(column, request.ascending)
        .await
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e))?;
    Ok(Json(state.view.view().await))
}

async fn select(
    State(state): State<AppState>,
    Json(request): Json<SelectRequest>,
) -> StatusCode {
    state.view.on_row_activated(&request.node_name);
    state.view.request_rebuild().await;
    StatusCode::NO_CONTENT
}

async fn clear_selection(State(state): State<AppState>) -> StatusCode {
    state.view.clear_selection();
    state.view.request_rebuild().await;
    StatusCode::NO_CONTENT
}

/// Rebuild out of cadence. Returns `null` when the request was folded into
/// a rebuild already in flight.
async fn refresh(State(state): State<AppState>) -> Json<Option<RebuildOutcome>> {
    Json(state.view.request_rebuild().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use tower::ServiceExt;

    use crate::domain::filter::FilterSpec;
    use crate::domain::projector::ColumnSchema;
    use crate::ingest;

    const PAYLOAD: &str = r#"[
        {"node_name": "/talker", "pid": 11, "get_cpu_percent": 10.0, "get_memory_percent": 1.0,
         "get_num_threads": 4, "cmdline": ["talker"], "memory_info": [1048576, 2097152]},
        {"node_name": "/listener", "pid": 12, "get_cpu_percent": 2.0, "get_memory_percent": 0.5,
         "get_num_threads": 2, "cmdline": ["listener"], "memory_info": [1048576, 2097152]}
    ]"#;

    fn app() -> (Router, AppState) {
        let store = Arc::new(SnapshotStore::new());
        let view = Arc::new(ViewModel::new(
            store.clone(),
            ColumnSchema::default(),
            FilterSpec::default(),
        ));
        let (ingest, _task) = ingest::spawn(store.clone(), 16);
        let state = AppState {
            store,
            view,
            ingest,
            started_at: Instant::now(),
        };
        (router(state.clone()), state)
    }

    fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("build request")
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("parse body")
    }

    async fn wait_for_records(state: &AppState, count: usize) {
        for _ in 0..100 {
            if state.store.record_count().await == count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("store never reached {} records", count);
    }

    #[tokio::test]
    async fn ingest_then_view() {
        let (app, state) = app();

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/v1/ingest",
                serde_json::json!({"key": "robot-1", "value": PAYLOAD}),
            ))
            .await
            .expect("call service");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        wait_for_records(&state, 2).await;

        let response = app
            .clone()
            .oneshot(Request::post("/api/v1/refresh").body(Body::empty()).unwrap())
            .await
            .expect("call service");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/api/v1/view").body(Body::empty()).unwrap())
            .await
            .expect("call service");
        let view: TableView = body_json(response).await;
        assert_eq!(view.rows.len(), 2);
        assert_eq!(view.rows[0].cells, vec!["/listener", "robot-1", "12", "2.00", "0.50", "2"]);
        assert_eq!(view.rows[1].tooltips[&3], "Resident: 1.00 MiB, Virtual: 2.00 MiB");
    }

    #[tokio::test]
    async fn malformed_ingest_is_rejected() {
        let (app, state) = app();

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/api/v1/ingest",
                serde_json::json!({"key": "robot-1", "value": "[{\"pid\": 1}]"}),
            ))
            .await
            .expect("call service");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.store.machine_count().await, 0);
    }

    #[tokio::test]
    async fn invalid_filter_returns_422_with_field() {
        let (app, state) = app();

        let response = app
            .oneshot(json_request(
                Method::PUT,
                "/api/v1/filter",
                serde_json::json!({"name_filter_text": "(", "is_regex": true}),
            ))
            .await
            .expect("call service");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: ErrorBody = body_json(response).await;
        assert_eq!(body.field.as_deref(), Some("name"));
        assert_eq!(state.view.filter_input().await, FilterInput::default());
    }

    #[tokio::test]
    async fn sort_and_select_update_the_view() {
        let (app, state) = app();
        state
            .ingest
            .submit(&IngestMessage {
                key: "robot-1".to_string(),
                value: PAYLOAD.to_string(),
            })
            .unwrap();
        wait_for_records(&state, 2).await;

        let response = app
            .clone()
            .oneshot(json_request(
                Method::PUT,
                "/api/v1/selection",
                serde_json::json!({"node_name": "/talker"}),
            ))
            .await
            .expect("call service");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(json_request(
                Method::PUT,
                "/api/v1/sort",
                serde_json::json!({"column": "CPU %", "ascending": false}),
            ))
            .await
            .expect("call service");
        assert_eq!(response.status(), StatusCode::OK);
        let view: TableView = body_json(response).await;
        assert_eq!(view.sort.column, 3);
        assert_eq!(view.rows[0].node_name, "/talker");
        assert!(view.rows[0].selected);
        assert!(!view.rows[1].selected);

        let response = app
            .oneshot(json_request(
                Method::PUT,
                "/api/v1/sort",
                serde_json::json!({"column": "uptime"}),
            ))
            .await
            .expect("call service");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn health_counts_machines() {
        let (app, state) = app();
        state.store.put("robot-1", vec![]).await;

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .expect("call service");
        let health: DaemonHealth = body_json(response).await;
        assert_eq!(health.machines, 1);
        assert_eq!(health.records, 0);
    }
}
