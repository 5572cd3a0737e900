use crate::artifacts::ScreenshotStore;
use crate::budget::RunBudget;
use crate::context::{ExecutionContext, RunState, Scope};
use crate::error::EngineError;
use crate::interpreter::StepInterpreter;
use crate::model::Sequence;
use crate::report::ExecutionReport;
use crate::resolver::{CoordinateMap, Credentials, DynamicValueResolver};
use orvi_captcha::CaptchaSolver;
use orvi_common::EngineSettings;
use orvi_drivers::{BrowserSession, DriverError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::Level;

/// Everything one run reads. Immutable for the run's duration.
pub struct RunInputs {
    pub settings: Arc<EngineSettings>,
    pub sequences: Vec<Sequence>,
    pub coordinates: Arc<CoordinateMap>,
    pub credentials: Arc<Credentials>,
    pub solver: Option<Arc<dyn CaptchaSolver>>,
    pub store: ScreenshotStore,
    pub budget: RunBudget,
}

/// Runs the sequences of exactly one execution.
///
/// `run` consumes the runner, so an instance cannot be reused or shared
/// between executions.
pub struct SequenceRunner {
    inputs: RunInputs,
}

impl SequenceRunner {
    pub fn new(inputs: RunInputs) -> Self {
        Self { inputs }
    }

    /// Execute every sequence in order on `session`, then capture a final
    /// screenshot and close the session, whatever the outcome.
    pub async fn run(self, session: Box<dyn BrowserSession>) -> ExecutionReport {
        let started = Instant::now();
        let mut ctx = ExecutionContext::new(session);
        ctx.log(
            Level::INFO,
            Scope::Run,
            format!("run started: {} sequence(s)", self.inputs.sequences.len()),
        );

        let success = match self.run_sequences(&mut ctx).await {
            Ok(()) => {
                ctx.set_state(RunState::Completed);
                true
            }
            Err(err) => {
                ctx.set_state(RunState::Failed);
                ctx.log(Level::ERROR, Scope::Run, format!("run failed: {err}"));
                false
            }
        };

        let screenshot = self.final_screenshot(&mut ctx).await;
        ctx.release_session().await;

        let secs = started.elapsed().as_secs();
        ctx.log(
            if success { Level::INFO } else { Level::ERROR },
            Scope::Run,
            format!(
                "flow finished in {}m {}s ({})",
                secs / 60,
                secs % 60,
                if success { "success" } else { "failed" }
            ),
        );
        ExecutionReport::new(success, screenshot, ctx.into_logs())
    }

    async fn run_sequences(&self, ctx: &mut ExecutionContext) -> Result<(), EngineError> {
        let inputs = &self.inputs;
        let resolver = DynamicValueResolver::new(&inputs.coordinates, &inputs.credentials);
        let interpreter = StepInterpreter::new(
            &inputs.settings,
            resolver,
            inputs.solver.as_deref(),
            &inputs.store,
            &inputs.budget,
        );
        for sequence in &inputs.sequences {
            self.run_sequence(&interpreter, ctx, sequence).await?;
        }
        Ok(())
    }

    async fn run_sequence(
        &self,
        interpreter: &StepInterpreter<'_>,
        ctx: &mut ExecutionContext,
        sequence: &Sequence,
    ) -> Result<(), EngineError> {
        let scope = Scope::Sequence(sequence.index);
        let mut intent = 1;
        loop {
            ctx.log(
                Level::INFO,
                scope,
                format!(
                    "sequence '{}' started (try {intent}/{})",
                    sequence.title, sequence.intents
                ),
            );
            let err = match self.run_steps(interpreter, ctx, sequence).await {
                Ok(()) => match self.confirm_target(ctx, sequence).await {
                    Ok(()) => {
                        ctx.log(
                            Level::INFO,
                            scope,
                            format!("sequence '{}' completed", sequence.title),
                        );
                        return Ok(());
                    }
                    Err(err) => err,
                },
                Err(err) => err,
            };
            if !err.is_retryable() || intent >= sequence.intents {
                return Err(err);
            }
            ctx.log(
                Level::WARN,
                scope,
                format!("sequence '{}' will be retried: {err}", sequence.title),
            );
            self.inputs
                .budget
                .sleep(self.inputs.settings.initial_backoff())
                .await?;
            intent += 1;
        }
    }

    async fn run_steps(
        &self,
        interpreter: &StepInterpreter<'_>,
        ctx: &mut ExecutionContext,
        sequence: &Sequence,
    ) -> Result<(), EngineError> {
        for step in &sequence.steps {
            interpreter.execute(ctx, sequence.index, step).await?;
        }
        Ok(())
    }

    /// Wait for the sequence's success marker, if it declares one.
    async fn confirm_target(
        &self,
        ctx: &mut ExecutionContext,
        sequence: &Sequence,
    ) -> Result<(), EngineError> {
        let Some(target) = &sequence.target else {
            return Ok(());
        };
        let session = ctx
            .session()
            .ok_or_else(|| EngineError::SessionUnusable("session already released".into()))?;
        let limit = sequence
            .target_wait
            .unwrap_or_else(|| self.inputs.settings.default_timeout());
        let waited = self
            .inputs
            .budget
            .guard(session.wait_visible(target, limit))
            .await?;
        match waited {
            Ok(()) => {
                ctx.log(
                    Level::INFO,
                    Scope::Sequence(sequence.index),
                    format!("target {target} confirmed"),
                );
                Ok(())
            }
            Err(DriverError::Unusable(msg)) => Err(EngineError::SessionUnusable(msg)),
            Err(err) => Err(EngineError::StepExecution {
                seq: sequence.index,
                step: None,
                action: "sequence confirmation".into(),
                reason: format!("target {target} not visible: {err}"),
            }),
        }
    }

    /// Best effort: failures become warnings and never change the outcome.
    async fn final_screenshot(&self, ctx: &mut ExecutionContext) -> Option<PathBuf> {
        let session = ctx.session()?;
        let limit = self.inputs.settings.screenshot_timeout();
        let bytes = match tokio::time::timeout(limit, session.screenshot()).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(err)) => {
                ctx.log(Level::WARN, Scope::Run, format!("final screenshot failed: {err}"));
                return None;
            }
            Err(_) => {
                ctx.log(
                    Level::WARN,
                    Scope::Run,
                    format!("final screenshot timed out after {}ms", limit.as_millis()),
                );
                return None;
            }
        };
        match self.inputs.store.save_execution(&bytes).await {
            Ok(path) => {
                ctx.log(
                    Level::INFO,
                    Scope::Run,
                    format!("screenshot saved to {}", path.display()),
                );
                Some(path)
            }
            Err(err) => {
                ctx.log(Level::WARN, Scope::Run, format!("saving screenshot failed: {err}"));
                None
            }
        }
    }
}
