use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Multi-threaded runtime hosting the HTTP front-end and every browser run,
/// plus the root token that process shutdown cancels.
pub struct OrviRuntime {
    runtime: Runtime,
    shutdown: CancellationToken,
}

/// Cheap clone of the runtime handle and its shutdown token.
#[derive(Clone)]
pub struct OrviHandle {
    inner: Handle,
    shutdown: CancellationToken,
}

impl OrviRuntime {
    /// Build the runtime.
    ///
    /// ```
    /// use orvi_runtime::OrviRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = OrviRuntime::build("orvi-doctest", Some(1)).expect("runtime builds");
    /// assert_eq!(runtime.block_on(async { 2 + 2 }), 4);
    /// runtime.shutdown(Duration::from_millis(10));
    /// ```
    pub fn build(thread_name: &str, worker_threads: Option<usize>) -> Result<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name(thread_name);
        if let Some(workers) = worker_threads {
            builder.worker_threads(workers.max(1));
        }
        Ok(Self {
            runtime: builder.build()?,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn handle(&self) -> OrviHandle {
        OrviHandle {
            inner: self.runtime.handle().clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    /// Cancel every run token, then give tasks `grace` to finish closing
    /// their browser sessions.
    pub fn shutdown(self, grace: Duration) {
        self.shutdown.cancel();
        info!(target: "server.runtime", grace_ms = grace.as_millis() as u64, "runtime shutting down");
        self.runtime.shutdown_timeout(grace);
    }
}

impl OrviHandle {
    pub fn spawn<F, T>(&self, fut: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.inner.spawn(fut)
    }

    /// Token for one execution. Cancelled by process shutdown or by the
    /// caller (for instance when the HTTP client goes away).
    ///
    /// ```
    /// use orvi_runtime::OrviRuntime;
    ///
    /// let runtime = OrviRuntime::build("orvi-token", Some(1)).unwrap();
    /// let handle = runtime.handle();
    /// let run = handle.run_token();
    /// handle.begin_shutdown();
    /// assert!(run.is_cancelled());
    /// ```
    pub fn run_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn begin_shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves on Ctrl-C or once shutdown has begun; suitable for
    /// graceful-shutdown hooks. Ctrl-C also cancels the run tokens.
    pub async fn shutdown_signal(&self) {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(target: "server.runtime", "ctrl-c received");
                self.shutdown.cancel();
            }
            _ = self.shutdown.cancelled() => {}
        }
    }
}
