use crate::artifacts::ScreenshotStore;
use crate::budget::RunBudget;
use crate::capacity::CapacityGate;
use crate::context::{Scope, format_line};
use crate::error::EngineError;
use crate::model::{ExecutionRequest, compile};
use crate::report::ExecutionReport;
use crate::resolver::{CoordinateMap, Credentials};
use crate::runner::{RunInputs, SequenceRunner};
use orvi_captcha::CaptchaSolver;
use orvi_common::{CapacitySettings, EngineSettings};
use orvi_drivers::SessionFactory;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level, info, info_span, warn};
use uuid::Uuid;

/// Process-wide collaborators, built once at startup.
pub struct EngineDeps {
    pub settings: EngineSettings,
    pub capacity: CapacitySettings,
    pub factory: Arc<dyn SessionFactory>,
    pub solver: Option<Arc<dyn CaptchaSolver>>,
    pub screenshot_dir: PathBuf,
    pub credentials: Credentials,
    /// Used when a request carries no coordinates.
    pub coordinates: CoordinateMap,
}

/// Entry point for executions: validates, admits, opens a session and runs.
pub struct ExecutionService {
    settings: Arc<EngineSettings>,
    gate: CapacityGate,
    factory: Arc<dyn SessionFactory>,
    solver: Option<Arc<dyn CaptchaSolver>>,
    store: ScreenshotStore,
    credentials: Arc<Credentials>,
    coordinates: Arc<CoordinateMap>,
}

fn rejected(message: String) -> ExecutionReport {
    ExecutionReport::new(
        false,
        None,
        vec![format_line(Level::ERROR, Scope::Run, &message)],
    )
}

impl ExecutionService {
    pub fn new(deps: EngineDeps) -> Self {
        Self {
            gate: CapacityGate::new(&deps.capacity),
            settings: Arc::new(deps.settings),
            factory: deps.factory,
            solver: deps.solver,
            store: ScreenshotStore::new(deps.screenshot_dir),
            credentials: Arc::new(deps.credentials),
            coordinates: Arc::new(deps.coordinates),
        }
    }

    pub fn capacity(&self) -> &CapacityGate {
        &self.gate
    }

    /// Run one request.
    ///
    /// Logical failures come back as a report with `success == false`.
    /// `Err` is reserved for `CapacityError` and a browser that could not be
    /// started, which the HTTP layer maps to transport errors.
    pub async fn execute(
        &self,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> Result<ExecutionReport, EngineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(target: "engine.runner", "run", %run_id);
        self.execute_inner(request, cancel).instrument(span).await
    }

    async fn execute_inner(
        &self,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> Result<ExecutionReport, EngineError> {
        let sequences = match compile(&request.sequences) {
            Ok(sequences) => sequences,
            Err(err) => {
                warn!(target: "engine.runner", error = %err, "request rejected before launch");
                return Ok(rejected(err.to_string()));
            }
        };

        let coordinates = match request.coordinates {
            Some(raw) => match CoordinateMap::new(raw) {
                Ok(map) => Arc::new(map),
                Err(err) => {
                    let err = EngineError::from(err);
                    warn!(target: "engine.runner", error = %err, "request rejected before launch");
                    return Ok(rejected(err.to_string()));
                }
            },
            None => self.coordinates.clone(),
        };

        let permit = self.gate.acquire().await?;

        let run_limit = self.settings.run_timeout();
        let limit = request
            .timeout_ms
            .map(Duration::from_millis)
            .map_or(run_limit, |requested| requested.min(run_limit));
        let budget = RunBudget::new(cancel, limit);

        let open = tokio::time::timeout(self.settings.navigation_timeout(), self.factory.open());
        let session = match budget.guard(open).await {
            Ok(Ok(Ok(session))) => session,
            Ok(Ok(Err(err))) => return Err(EngineError::SessionLaunch(err.to_string())),
            Ok(Err(_)) => {
                return Err(EngineError::SessionLaunch(format!(
                    "browser did not start within {}ms",
                    self.settings.navigation_timeout().as_millis()
                )));
            }
            Err(err) => return Ok(rejected(err.to_string())),
        };

        info!(
            target: "engine.runner",
            sequences = sequences.len(),
            coordinates = coordinates.len(),
            limit_ms = limit.as_millis() as u64,
            "run admitted"
        );
        let runner = SequenceRunner::new(RunInputs {
            settings: self.settings.clone(),
            sequences,
            coordinates,
            credentials: self.credentials.clone(),
            solver: self.solver.clone(),
            store: self.store.clone(),
            budget,
        });
        let report = runner.run(session).await;
        drop(permit);

        info!(
            target: "engine.runner",
            success = report.success(),
            lines = report.logs().len(),
            "run finished"
        );
        Ok(report)
    }
}
