#![allow(dead_code)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use orvi_common::observability::{LogConfig, LogFormat};
use orvi_common::{CapacitySettings, EngineSettings};
use orvi_drivers::mock::{MockSession, MockSessionFactory};
use orvi_engine::{CoordinateMap, Credentials, EngineDeps, ExecutionService};
use orvi_server::{AppState, router};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

static INIT_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let config = LogConfig {
            app_name: "orvi-server-tests",
            log_dir: Some(std::env::temp_dir().join("orvi-tests")),
            emit_stderr: true,
            format: LogFormat::Text,
            default_filter: "debug".to_string(),
        };
        orvi_common::observability::init_logging(config).unwrap_or_default()
    });
}

pub fn state(factory: Arc<MockSessionFactory>, capacity: CapacitySettings, dir: &Path) -> AppState {
    init_test_tracing();
    let service = ExecutionService::new(EngineDeps {
        settings: EngineSettings {
            initial_backoff_ms: 10,
            max_backoff_ms: 20,
            default_timeout_ms: 50,
            optional_timeout_ms: 20,
            ..EngineSettings::default()
        },
        capacity,
        factory,
        solver: None,
        screenshot_dir: dir.to_path_buf(),
        credentials: Credentials::default(),
        coordinates: CoordinateMap::default(),
    });
    AppState::new(service, CancellationToken::new())
}

pub fn app(factory: Arc<MockSessionFactory>, capacity: CapacitySettings, dir: &Path) -> Router {
    router(state(factory, capacity, dir))
}

pub fn mock_app(page: MockSession, dir: &Path) -> (Router, Arc<MockSessionFactory>) {
    let factory = Arc::new(MockSessionFactory::new(page));
    (app(factory.clone(), CapacitySettings::default(), dir), factory)
}

pub fn post_json(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/execute")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}
