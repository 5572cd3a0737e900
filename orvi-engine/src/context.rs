use chrono::{SecondsFormat, Utc};
use orvi_drivers::BrowserSession;
use std::collections::BTreeMap;
use tracing::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running { sequence: usize, step: usize },
    Completed,
    Failed,
}

/// Which part of the run a report line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Run,
    Sequence(usize),
    Step(usize, usize),
}

impl Scope {
    fn tag(&self) -> Option<String> {
        match self {
            Scope::Run => None,
            Scope::Sequence(seq) => Some(format!("[{seq}]")),
            Scope::Step(seq, step) => Some(format!("[{seq}:{step}]")),
        }
    }
}

/// `"<RFC 3339 timestamp> <LEVEL> [tag] message"`.
pub fn format_line(level: Level, scope: Scope, message: &str) -> String {
    let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    match scope.tag() {
        Some(tag) => format!("{ts} {level} {tag} {message}"),
        None => format!("{ts} {level} {message}"),
    }
}

/// Mutable state of one run: position, report lines, attempt counters and
/// the browser session it exclusively owns.
pub struct ExecutionContext {
    state: RunState,
    logs: Vec<String>,
    attempts: BTreeMap<(usize, usize), u32>,
    session: Option<Box<dyn BrowserSession>>,
}

impl ExecutionContext {
    pub fn new(session: Box<dyn BrowserSession>) -> Self {
        Self {
            state: RunState::Idle,
            logs: Vec::new(),
            attempts: BTreeMap::new(),
            session: Some(session),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn set_state(&mut self, state: RunState) {
        self.state = state;
    }

    /// The active session, or `None` once released.
    pub fn session(&self) -> Option<&dyn BrowserSession> {
        self.session.as_deref()
    }

    /// Close the session. Later calls do nothing.
    pub async fn release_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if let Err(err) = session.close().await {
            self.log(Level::WARN, Scope::Run, format!("closing browser session failed: {err}"));
        }
    }

    pub fn record_attempt(&mut self, seq: usize, step: usize) -> u32 {
        let count = self.attempts.entry((seq, step)).or_insert(0);
        *count += 1;
        *count
    }

    pub fn attempts(&self, seq: usize, step: usize) -> u32 {
        self.attempts.get(&(seq, step)).copied().unwrap_or(0)
    }

    /// Append a report line and mirror it to tracing.
    pub fn log(&mut self, level: Level, scope: Scope, message: impl Into<String>) {
        let message = message.into();
        let line = format_line(level, scope, &message);
        match (level, scope) {
            (Level::ERROR, Scope::Step(..)) => tracing::error!(target: "engine.step", "{message}"),
            (Level::WARN, Scope::Step(..)) => tracing::warn!(target: "engine.step", "{message}"),
            (_, Scope::Step(..)) => tracing::info!(target: "engine.step", "{message}"),
            (Level::ERROR, _) => tracing::error!(target: "engine.runner", "{message}"),
            (Level::WARN, _) => tracing::warn!(target: "engine.runner", "{message}"),
            _ => tracing::info!(target: "engine.runner", "{message}"),
        }
        self.logs.push(line);
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn into_logs(self) -> Vec<String> {
        self.logs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orvi_drivers::mock::MockSession;

    #[tokio::test]
    async fn lines_are_timestamped_and_tagged() {
        let mut ctx = ExecutionContext::new(Box::new(MockSession::new()));
        ctx.log(Level::INFO, Scope::Run, "run started");
        ctx.log(Level::WARN, Scope::Step(1, 2), "attempt 1/3 click failed");
        let lines = ctx.logs();
        assert!(lines[0].ends_with(" INFO run started"));
        assert!(lines[1].contains(" WARN [1:2] attempt 1/3"));
        assert!(chrono::DateTime::parse_from_rfc3339(lines[0].split(' ').next().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn session_is_closed_once() {
        let page = MockSession::new();
        let mut ctx = ExecutionContext::new(Box::new(page.clone()));
        ctx.release_session().await;
        ctx.release_session().await;
        assert_eq!(page.close_count(), 1);
        assert!(ctx.session().is_none());
    }
}
