use crate::error::EngineError;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;

/// Cancellation plus an absolute deadline for one run.
///
/// Every wait in a run goes through [`RunBudget::guard`], so either signal
/// aborts whatever the run is blocked on.
#[derive(Debug, Clone)]
pub struct RunBudget {
    cancel: CancellationToken,
    deadline: Instant,
}

impl RunBudget {
    pub fn new(cancel: CancellationToken, limit: Duration) -> Self {
        Self {
            cancel,
            deadline: Instant::now() + limit,
        }
    }

    pub fn is_spent(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }

    pub async fn guard<F, T>(&self, fut: F) -> Result<T, EngineError>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EngineError::Timeout("run cancelled".into())),
            _ = sleep_until(self.deadline) => Err(EngineError::Timeout("run deadline exceeded".into())),
            out = fut => Ok(out),
        }
    }

    pub async fn sleep(&self, dur: Duration) -> Result<(), EngineError> {
        if dur.is_zero() {
            return Ok(());
        }
        self.guard(sleep(dur)).await
    }
}
