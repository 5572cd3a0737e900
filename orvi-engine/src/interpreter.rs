//! Executes one step against the browser session.
//!
//! Each attempt runs under the run budget. Failures are classified into a
//! [`FailureClass`] and fed to a [`RetryMachine`], which decides between a
//! recovery-then-retry, giving up, or aborting the run. Exactly one report
//! line containing `attempt` is written per attempt.
use crate::artifacts::ScreenshotStore;
use crate::budget::RunBudget;
use crate::context::{ExecutionContext, RunState, Scope};
use crate::error::EngineError;
use crate::model::{Action, Step};
use crate::resolver::{DynamicValueResolver, extract_code};
use crate::retry::{Decision, FailureClass, Recovery, RetryMachine, RetryPolicy};
use orvi_captcha::{CaptchaChallenge, CaptchaSolver};
use orvi_common::EngineSettings;
use orvi_drivers::{BrowserSession, DriverError};
use std::time::Duration;
use tracing::{Level, debug, warn};

/// Failure of a single attempt, before the retry decision.
#[derive(Debug)]
enum AttemptError {
    Driver(DriverError),
    Engine(EngineError),
}

impl From<DriverError> for AttemptError {
    fn from(err: DriverError) -> Self {
        AttemptError::Driver(err)
    }
}

impl From<EngineError> for AttemptError {
    fn from(err: EngineError) -> Self {
        AttemptError::Engine(err)
    }
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Driver(err) => err.fmt(f),
            AttemptError::Engine(err) => err.fmt(f),
        }
    }
}

impl AttemptError {
    fn class(&self) -> FailureClass {
        match self {
            AttemptError::Driver(DriverError::Unusable(_) | DriverError::Launch(_)) => {
                FailureClass::Fatal
            }
            AttemptError::Driver(DriverError::Stale(_)) => {
                FailureClass::Transient(Recovery::ReResolve)
            }
            AttemptError::Driver(
                DriverError::Intercepted(_)
                | DriverError::Timeout { .. }
                | DriverError::NotFound(_),
            ) => FailureClass::Transient(Recovery::DismissModal),
            AttemptError::Driver(_) => FailureClass::Transient(Recovery::None),
            AttemptError::Engine(err) if err.is_retryable() => match err {
                EngineError::ChallengeParse { .. } => {
                    FailureClass::Transient(Recovery::RereadChallenge)
                }
                _ => FailureClass::Transient(Recovery::None),
            },
            AttemptError::Engine(_) => FailureClass::Fatal,
        }
    }

    /// The run-level error once no more attempts will be made.
    fn into_engine(self, seq: usize, step: &Step, attempts: u32) -> EngineError {
        match self {
            AttemptError::Engine(err) => err,
            AttemptError::Driver(DriverError::Unusable(msg)) => EngineError::SessionUnusable(msg),
            AttemptError::Driver(DriverError::Launch(msg)) => EngineError::SessionLaunch(msg),
            AttemptError::Driver(err) => EngineError::StepExecution {
                seq,
                step: Some(step.index),
                action: step.action.name().to_string(),
                reason: format!("{err} (after {attempts} attempts)"),
            },
        }
    }
}

enum Outcome {
    Done(Option<String>),
    Skipped(String),
}

fn same_page(current: &str, target: &str) -> bool {
    !current.is_empty() && current.trim_end_matches('/') == target.trim_end_matches('/')
}

/// Click the first visible dismiss control, if any.
async fn dismiss_modal(
    session: &dyn BrowserSession,
    selectors: &[String],
    limit: Duration,
) -> Option<String> {
    for selector in selectors {
        if !session.is_visible(selector).await.unwrap_or(false) {
            continue;
        }
        match session.click(selector, limit).await {
            Ok(()) => return Some(selector.clone()),
            Err(err) => debug!(target: "engine.step", %selector, error = %err, "dismiss click failed"),
        }
    }
    None
}

pub struct StepInterpreter<'r> {
    settings: &'r EngineSettings,
    policy: RetryPolicy,
    resolver: DynamicValueResolver<'r>,
    solver: Option<&'r dyn CaptchaSolver>,
    store: &'r ScreenshotStore,
    budget: &'r RunBudget,
}

impl<'r> StepInterpreter<'r> {
    pub fn new(
        settings: &'r EngineSettings,
        resolver: DynamicValueResolver<'r>,
        solver: Option<&'r dyn CaptchaSolver>,
        store: &'r ScreenshotStore,
        budget: &'r RunBudget,
    ) -> Self {
        Self {
            settings,
            policy: RetryPolicy::from_settings(settings),
            resolver,
            solver,
            store,
            budget,
        }
    }

    fn timeout_for(&self, step: &Step) -> Duration {
        step.timeout.unwrap_or_else(|| {
            if step.optional {
                self.settings.optional_timeout()
            } else if matches!(step.action, Action::Navigate { .. }) {
                self.settings.navigation_timeout()
            } else {
                self.settings.default_timeout()
            }
        })
    }

    /// Run `step` to completion, retrying transient failures.
    pub async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        seq: usize,
        step: &Step,
    ) -> Result<(), EngineError> {
        let policy = if step.optional {
            RetryPolicy::single()
        } else {
            self.policy.clone()
        };
        let mut machine = RetryMachine::new(policy);
        let limit = machine.limit();
        let scope = Scope::Step(seq, step.index);
        let action = step.action.name();
        ctx.set_state(RunState::Running {
            sequence: seq,
            step: step.index,
        });

        loop {
            let attempt = machine.start_attempt();
            ctx.record_attempt(seq, step.index);
            let result = match ctx.session() {
                Some(session) => match self.budget.guard(self.attempt(session, step)).await {
                    Ok(result) => result,
                    Err(timeout) => Err(AttemptError::Engine(timeout)),
                },
                None => Err(AttemptError::Driver(DriverError::Unusable(
                    "session already released".into(),
                ))),
            };

            let err = match result {
                Ok(outcome) => {
                    machine.succeed();
                    let message = match outcome {
                        Outcome::Done(None) => format!("attempt {attempt}/{limit} {action} ok"),
                        Outcome::Done(Some(detail)) => {
                            format!("attempt {attempt}/{limit} {action} ok: {detail}")
                        }
                        Outcome::Skipped(reason) => {
                            format!("attempt {attempt}/{limit} {action} skipped: {reason}")
                        }
                    };
                    ctx.log(Level::INFO, scope, message);
                    break;
                }
                Err(err) => err,
            };

            match machine.fail(err.class()) {
                Decision::Retry {
                    backoff, recovery, ..
                } => {
                    ctx.log(
                        Level::WARN,
                        scope,
                        format!(
                            "attempt {attempt}/{limit} {action} failed: {err}; retrying in {}ms",
                            backoff.as_millis()
                        ),
                    );
                    self.recover(ctx, scope, step, recovery).await?;
                    self.budget.sleep(backoff).await?;
                }
                Decision::GiveUp { .. } if step.optional => {
                    ctx.log(
                        Level::WARN,
                        scope,
                        format!("attempt {attempt}/{limit} {action} failed: {err}; optional step skipped"),
                    );
                    return Ok(());
                }
                Decision::GiveUp { attempts } | Decision::Abort { attempts } => {
                    ctx.log(
                        Level::ERROR,
                        scope,
                        format!("attempt {attempt}/{limit} {action} failed: {err}"),
                    );
                    return Err(err.into_engine(seq, step, attempts));
                }
            }
        }

        self.budget.sleep(step.wait_after).await
    }

    async fn recover(
        &self,
        ctx: &mut ExecutionContext,
        scope: Scope,
        step: &Step,
        recovery: Recovery,
    ) -> Result<(), EngineError> {
        let Some(session) = ctx.session() else {
            return Ok(());
        };
        let short = self.settings.optional_timeout();
        match recovery {
            Recovery::None => {}
            Recovery::DismissModal => {
                let dismissed = self
                    .budget
                    .guard(dismiss_modal(
                        session,
                        &self.settings.modal_dismiss_selectors,
                        short,
                    ))
                    .await?;
                if let Some(selector) = dismissed {
                    ctx.log(Level::INFO, scope, format!("dismissed modal via {selector}"));
                }
            }
            Recovery::ReResolve => {
                if let Some(element) = step.action.element() {
                    self.await_element(ctx, scope, element, short).await?;
                }
            }
            Recovery::RereadChallenge => {
                let region = match &step.action {
                    Action::DynamicInput {
                        challenge: Some(challenge),
                        ..
                    } => challenge.as_str(),
                    _ => self.settings.challenge_selector.as_str(),
                };
                self.await_element(ctx, scope, region, short).await?;
            }
        }
        Ok(())
    }

    async fn await_element(
        &self,
        ctx: &mut ExecutionContext,
        scope: Scope,
        element: &str,
        limit: Duration,
    ) -> Result<(), EngineError> {
        let Some(session) = ctx.session() else {
            return Ok(());
        };
        let found = self
            .budget
            .guard(session.wait_visible(element, limit))
            .await?
            .is_ok();
        ctx.log(
            Level::INFO,
            scope,
            format!("re-resolved {element}: {}", if found { "present" } else { "not yet visible" }),
        );
        Ok(())
    }

    async fn attempt(
        &self,
        session: &dyn BrowserSession,
        step: &Step,
    ) -> Result<Outcome, AttemptError> {
        let limit = self.timeout_for(step);
        let outcome = match &step.action {
            Action::Navigate { url } => {
                let current = session.current_url().await.unwrap_or_default();
                if same_page(&current, url) {
                    session.reload(limit).await?;
                    Outcome::Done(Some("already there, reloaded".into()))
                } else {
                    session.goto(url, limit).await?;
                    Outcome::Done(None)
                }
            }
            Action::Input { element, value } => {
                let text = self.resolver.resolve(value).map_err(EngineError::from)?;
                session.fill(element, text, limit).await?;
                Outcome::Done(None)
            }
            Action::Click { element } => {
                session.click(element, limit).await?;
                Outcome::Done(None)
            }
            Action::Wait { target: Some(target) } => {
                session.wait_visible(target, limit).await?;
                Outcome::Done(Some(format!("{target} visible")))
            }
            Action::Wait { target: None } => Outcome::Done(Some("pause only".into())),
            Action::DynamicInput { element, challenge } => {
                let region = challenge
                    .as_deref()
                    .unwrap_or(&self.settings.challenge_selector);
                let text = session.inner_text(region, limit).await?;
                let code = extract_code(&text).ok_or_else(|| EngineError::ChallengeParse {
                    text: text.trim().to_string(),
                })?;
                let value = self.resolver.coordinate(&code).map_err(EngineError::from)?;
                session.fill(element, value, limit).await?;
                Outcome::Done(Some(format!("challenge code {code}")))
            }
            Action::SolveCaptcha { image, input } => {
                if !session.is_visible(image).await? {
                    return Ok(Outcome::Skipped(format!("captcha {image} not shown")));
                }
                let solver = self.solver.ok_or_else(|| EngineError::CaptchaSolve {
                    reason: "no captcha solver configured".into(),
                    retryable: false,
                })?;
                let png = session.element_screenshot(image, limit).await?;
                match self.store.save_captcha(&png).await {
                    Ok(path) => debug!(target: "engine.step", path = %path.display(), "captcha image saved"),
                    Err(err) => warn!(target: "engine.step", error = %err, "could not save captcha image"),
                }
                let solution = solver
                    .solve(CaptchaChallenge::Image { png })
                    .await
                    .map_err(EngineError::from)?;
                session.fill(input, &solution.text, limit).await?;
                Outcome::Done(Some(format!("captcha solved by {}", solver.provider())))
            }
        };

        if let Some(target) = &step.target {
            let checks_target = !matches!(step.action, Action::Navigate { .. } | Action::Wait { .. })
                && !matches!(outcome, Outcome::Skipped(_));
            if checks_target {
                session.wait_visible(target, limit).await?;
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_do_not_matter() {
        assert!(same_page("https://bank.example/login/", "https://bank.example/login"));
        assert!(!same_page("", "https://bank.example/login"));
        assert!(!same_page("https://bank.example/home", "https://bank.example/login"));
    }

    #[test]
    fn failures_map_to_recoveries() {
        let class = |e: AttemptError| e.class();
        assert_eq!(
            class(DriverError::Intercepted("modal".into()).into()),
            FailureClass::Transient(Recovery::DismissModal)
        );
        assert_eq!(
            class(DriverError::Stale("#user".into()).into()),
            FailureClass::Transient(Recovery::ReResolve)
        );
        assert_eq!(
            class(DriverError::Unusable("gone".into()).into()),
            FailureClass::Fatal
        );
        assert_eq!(
            class(EngineError::MissingCoordinate { code: "H3".into() }.into()),
            FailureClass::Fatal
        );
        assert_eq!(
            class(EngineError::ChallengeParse { text: "??".into() }.into()),
            FailureClass::Transient(Recovery::RereadChallenge)
        );
        assert_eq!(
            class(EngineError::Timeout("run cancelled".into()).into()),
            FailureClass::Fatal
        );
    }
}
