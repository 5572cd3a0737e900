#![allow(dead_code)]

use orvi_common::observability::{LogConfig, LogFormat};
use orvi_common::{CapacitySettings, EngineSettings};
use orvi_drivers::mock::{MockSession, MockSessionFactory};
use orvi_engine::{
    CoordinateMap, Credentials, EngineDeps, ExecutionReport, ExecutionRequest, ExecutionService,
};
use std::path::Path;
use std::sync::{Arc, OnceLock};

static INIT_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let config = LogConfig {
            app_name: "orvi-engine-tests",
            log_dir: Some(std::env::temp_dir().join("orvi-tests")),
            emit_stderr: true,
            format: LogFormat::Text,
            default_filter: "debug".to_string(),
        };
        orvi_common::observability::init_logging(config).unwrap_or_default()
    });
}

/// Short timeouts and backoffs so failing paths finish quickly.
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        retry_limit: 3,
        initial_backoff_ms: 10,
        backoff_multiplier: 2.0,
        max_backoff_ms: 40,
        default_timeout_ms: 50,
        navigation_timeout_ms: 500,
        optional_timeout_ms: 20,
        screenshot_timeout_ms: 500,
        run_timeout_secs: 30,
        ..EngineSettings::default()
    }
}

pub struct Harness {
    pub service: ExecutionService,
    pub factory: Arc<MockSessionFactory>,
    pub page: MockSession,
}

pub fn harness(page: MockSession, dir: &Path) -> Harness {
    harness_with(page, dir, |_| {})
}

pub fn harness_with(
    page: MockSession,
    dir: &Path,
    configure: impl FnOnce(&mut EngineDeps),
) -> Harness {
    init_test_tracing();
    let factory = Arc::new(MockSessionFactory::new(page.clone()));
    let mut deps = EngineDeps {
        settings: fast_settings(),
        capacity: CapacitySettings::default(),
        factory: factory.clone(),
        solver: None,
        screenshot_dir: dir.to_path_buf(),
        credentials: Credentials::default(),
        coordinates: CoordinateMap::default(),
    };
    configure(&mut deps);
    Harness {
        service: ExecutionService::new(deps),
        factory,
        page,
    }
}

pub fn request(value: serde_json::Value) -> ExecutionRequest {
    serde_json::from_value(value).expect("valid request")
}

/// Report lines written for attempts of step `seq:step`.
pub fn attempt_lines(report: &ExecutionReport, seq: usize, step: usize) -> usize {
    let tag = format!("[{seq}:{step}] attempt ");
    report.logs().iter().filter(|l| l.contains(&tag)).count()
}

pub fn logs_contain(report: &ExecutionReport, needle: &str) -> bool {
    report.logs().iter().any(|l| l.contains(needle))
}
