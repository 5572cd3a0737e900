//! Per-step retry state machine.
//!
//! ```text
//! Ready -> Attempting(n) -> Succeeded
//!                        -> Recovering(n) -> Attempting(n + 1)
//!                        -> Exhausted      (transient failure, budget spent)
//!                        -> Aborted        (fatal failure)
//! ```
//!
//! The machine only decides; the interpreter performs the attempt, the
//! recovery action and the backoff sleep.
use orvi_common::EngineSettings;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub limit: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            limit: settings.retry_limit.max(1),
            initial_backoff: settings.initial_backoff(),
            multiplier: settings.backoff_multiplier.max(1.0),
            max_backoff: settings.max_backoff(),
        }
    }

    /// One attempt, no backoff. Used for optional steps.
    pub fn single() -> Self {
        Self {
            limit: 1,
            initial_backoff: Duration::ZERO,
            multiplier: 1.0,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    ///
    /// ```
    /// use orvi_engine::retry::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::from_settings(&Default::default());
    /// assert_eq!(policy.backoff_after(1), Duration::from_millis(500));
    /// assert_eq!(policy.backoff_after(2), Duration::from_millis(1000));
    /// assert_eq!(policy.backoff_after(10), Duration::from_secs(8));
    /// ```
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let ms = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exp);
        Duration::from_millis(ms.min(self.max_backoff.as_millis() as f64) as u64)
    }
}

/// What to do to the page before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    None,
    /// Close an unexpected modal overlay.
    DismissModal,
    /// Look the element up again after a reload replaced it.
    ReResolve,
    /// Wait for the challenge region to show a readable code again.
    RereadChallenge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient(Recovery),
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Ready,
    Attempting(u32),
    Recovering(u32),
    Succeeded(u32),
    Exhausted(u32),
    Aborted(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry {
        next_attempt: u32,
        backoff: Duration,
        recovery: Recovery,
    },
    GiveUp {
        attempts: u32,
    },
    Abort {
        attempts: u32,
    },
}

#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    phase: Phase,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            phase: Phase::Ready,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn limit(&self) -> u32 {
        self.policy.limit
    }

    /// Enter the next attempt and return its 1-based number.
    pub fn start_attempt(&mut self) -> u32 {
        let n = match self.phase {
            Phase::Ready => 1,
            Phase::Recovering(n) => n + 1,
            Phase::Attempting(n)
            | Phase::Succeeded(n)
            | Phase::Exhausted(n)
            | Phase::Aborted(n) => n,
        };
        self.phase = Phase::Attempting(n);
        n
    }

    pub fn succeed(&mut self) {
        if let Phase::Attempting(n) = self.phase {
            self.phase = Phase::Succeeded(n);
        }
    }

    pub fn fail(&mut self, class: FailureClass) -> Decision {
        let attempt = match self.phase {
            Phase::Attempting(n) => n,
            Phase::Ready => 0,
            Phase::Recovering(n)
            | Phase::Succeeded(n)
            | Phase::Exhausted(n)
            | Phase::Aborted(n) => n,
        };
        match class {
            FailureClass::Fatal => {
                self.phase = Phase::Aborted(attempt);
                Decision::Abort { attempts: attempt }
            }
            FailureClass::Transient(_) if attempt >= self.policy.limit => {
                self.phase = Phase::Exhausted(attempt);
                Decision::GiveUp { attempts: attempt }
            }
            FailureClass::Transient(recovery) => {
                self.phase = Phase::Recovering(attempt);
                Decision::Retry {
                    next_attempt: attempt + 1,
                    backoff: self.policy.backoff_after(attempt),
                    recovery,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(limit: u32) -> RetryPolicy {
        RetryPolicy {
            limit,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2.0,
            max_backoff: Duration::from_millis(1500),
        }
    }

    #[test]
    fn transient_failures_stop_at_limit() {
        let mut machine = RetryMachine::new(policy(3));
        let mut attempts = 0;
        let decision = loop {
            attempts = machine.start_attempt();
            match machine.fail(FailureClass::Transient(Recovery::DismissModal)) {
                Decision::Retry { .. } => continue,
                other => break other,
            }
        };
        assert_eq!(attempts, 3);
        assert_eq!(decision, Decision::GiveUp { attempts: 3 });
        assert_eq!(machine.phase(), Phase::Exhausted(3));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let mut machine = RetryMachine::new(policy(4));
        let mut delays = Vec::new();
        loop {
            machine.start_attempt();
            match machine.fail(FailureClass::Transient(Recovery::None)) {
                Decision::Retry { backoff, .. } => delays.push(backoff),
                _ => break,
            }
        }
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(1500)
            ]
        );
    }

    #[test]
    fn fatal_aborts_on_first_attempt() {
        let mut machine = RetryMachine::new(policy(3));
        machine.start_attempt();
        assert_eq!(
            machine.fail(FailureClass::Fatal),
            Decision::Abort { attempts: 1 }
        );
    }

    #[test]
    fn recovery_is_carried_to_the_decision() {
        let mut machine = RetryMachine::new(policy(2));
        machine.start_attempt();
        let decision = machine.fail(FailureClass::Transient(Recovery::ReResolve));
        assert!(matches!(
            decision,
            Decision::Retry {
                next_attempt: 2,
                recovery: Recovery::ReResolve,
                ..
            }
        ));
        assert_eq!(machine.phase(), Phase::Recovering(1));
        assert_eq!(machine.start_attempt(), 2);
        machine.succeed();
        assert_eq!(machine.phase(), Phase::Succeeded(2));
    }

    #[test]
    fn single_policy_never_retries() {
        let mut machine = RetryMachine::new(RetryPolicy::single());
        machine.start_attempt();
        assert_eq!(
            machine.fail(FailureClass::Transient(Recovery::None)),
            Decision::GiveUp { attempts: 1 }
        );
    }
}
