use crate::error::EngineError;
use orvi_common::{CapacityPolicy, CapacitySettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, warn};

/// Caps concurrent browser sessions.
#[derive(Debug, Clone)]
pub struct CapacityGate {
    slots: Arc<Semaphore>,
    max: usize,
    policy: CapacityPolicy,
    queue_timeout: Duration,
}

/// Held for the lifetime of one execution.
#[derive(Debug)]
pub struct SessionPermit {
    _permit: OwnedSemaphorePermit,
}

impl CapacityGate {
    pub fn new(settings: &CapacitySettings) -> Self {
        let max = settings.max_sessions.max(1);
        Self {
            slots: Arc::new(Semaphore::new(max)),
            max,
            policy: settings.policy,
            queue_timeout: settings.queue_timeout(),
        }
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_sessions(&self) -> usize {
        self.max
    }

    /// Take a slot, or fail with `CapacityError` per the configured policy.
    pub async fn acquire(&self) -> Result<SessionPermit, EngineError> {
        let permit = match self.policy {
            CapacityPolicy::Reject => match self.slots.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(TryAcquireError::NoPermits) => {
                    warn!(target: "engine.capacity", max = self.max, "rejecting: all sessions busy");
                    return Err(EngineError::Capacity(format!(
                        "all {} browser sessions are busy",
                        self.max
                    )));
                }
                Err(TryAcquireError::Closed) => {
                    return Err(EngineError::Capacity("capacity gate closed".into()));
                }
            },
            CapacityPolicy::Queue => {
                match tokio::time::timeout(self.queue_timeout, self.slots.clone().acquire_owned())
                    .await
                {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => {
                        return Err(EngineError::Capacity("capacity gate closed".into()));
                    }
                    Err(_) => {
                        warn!(
                            target: "engine.capacity",
                            waited_ms = self.queue_timeout.as_millis() as u64,
                            "no session freed up while queued"
                        );
                        return Err(EngineError::Capacity(format!(
                            "no browser session freed within {}ms",
                            self.queue_timeout.as_millis()
                        )));
                    }
                }
            }
        };
        debug!(target: "engine.capacity", available = self.available(), "session slot taken");
        Ok(SessionPermit { _permit: permit })
    }
}
