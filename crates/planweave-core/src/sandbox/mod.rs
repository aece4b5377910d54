//! Sandbox lifecycle management.
//!
//! The execution environment is hosted externally; this module owns the
//! lifecycle discipline around it. [`SandboxLifecycleManager::acquire`]
//! provisions an environment and hands out a [`SandboxLease`]; the lease is
//! owned exclusively by the branch/loop that acquired it and must be released
//! exactly once on every exit path -- normal completion, forced-fallback
//! completion, fatal abort, and cancellation alike. `release` is idempotent,
//! and the manager counts acquires and releases so tests can assert the
//! no-leak/no-double-release property.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use planweave_types::sandbox::{CodeExecution, SandboxError, SandboxHandle};

// ---------------------------------------------------------------------------
// SandboxService port
// ---------------------------------------------------------------------------

/// Port to the external sandboxed code-execution service.
pub trait SandboxService: Send + Sync {
    /// Provision an environment that idles out after `idle_timeout`.
    fn create(
        &self,
        idle_timeout: Duration,
    ) -> impl Future<Output = Result<SandboxHandle, SandboxError>> + Send;

    /// Run code. In-sandbox runtime errors are captured in the returned
    /// [`CodeExecution`], never raised.
    fn run_code(
        &self,
        handle: &SandboxHandle,
        code: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<CodeExecution, SandboxError>> + Send;

    /// Tear the environment down.
    fn destroy(
        &self,
        handle: &SandboxHandle,
    ) -> impl Future<Output = Result<(), SandboxError>> + Send;
}

/// Object-safe version of [`SandboxService`] with boxed futures.
pub trait SandboxServiceDyn: Send + Sync {
    fn create_boxed(
        &self,
        idle_timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<SandboxHandle, SandboxError>> + Send + '_>>;

    fn run_code_boxed<'a>(
        &'a self,
        handle: &'a SandboxHandle,
        code: &'a str,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<CodeExecution, SandboxError>> + Send + 'a>>;

    fn destroy_boxed<'a>(
        &'a self,
        handle: &'a SandboxHandle,
    ) -> Pin<Box<dyn Future<Output = Result<(), SandboxError>> + Send + 'a>>;
}

impl<T: SandboxService> SandboxServiceDyn for T {
    fn create_boxed(
        &self,
        idle_timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<SandboxHandle, SandboxError>> + Send + '_>> {
        Box::pin(self.create(idle_timeout))
    }

    fn run_code_boxed<'a>(
        &'a self,
        handle: &'a SandboxHandle,
        code: &'a str,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<CodeExecution, SandboxError>> + Send + 'a>> {
        Box::pin(self.run_code(handle, code, timeout))
    }

    fn destroy_boxed<'a>(
        &'a self,
        handle: &'a SandboxHandle,
    ) -> Pin<Box<dyn Future<Output = Result<(), SandboxError>> + Send + 'a>> {
        Box::pin(self.destroy(handle))
    }
}

// ---------------------------------------------------------------------------
// SandboxLifecycleManager
// ---------------------------------------------------------------------------

/// Acquires and releases sandbox environments with an exactly-once release
/// guarantee per lease.
pub struct SandboxLifecycleManager {
    service: Arc<dyn SandboxServiceDyn>,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl SandboxLifecycleManager {
    pub fn new<S: SandboxService + 'static>(service: S) -> Self {
        Self {
            service: Arc::new(service),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    /// Provision an environment and wrap it in a lease.
    pub async fn acquire(self: &Arc<Self>, idle_timeout: Duration) -> Result<SandboxLease, SandboxError> {
        let handle = self.service.create_boxed(idle_timeout).await?;
        self.acquired.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(sandbox = handle.as_str(), "sandbox acquired");
        Ok(SandboxLease {
            handle,
            manager: Arc::clone(self),
            released: false,
        })
    }

    /// Acquires so far (for leak assertions).
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Releases so far (for leak assertions).
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// SandboxLease
// ---------------------------------------------------------------------------

/// Exclusive ownership of one provisioned sandbox. The same lease is reused
/// across all retries of one subtask and released only when that subtask's
/// loop exits.
pub struct SandboxLease {
    handle: SandboxHandle,
    manager: Arc<SandboxLifecycleManager>,
    released: bool,
}

impl SandboxLease {
    pub fn handle(&self) -> &SandboxHandle {
        &self.handle
    }

    /// Run code in the leased environment.
    pub async fn execute(
        &self,
        code: &str,
        timeout: Duration,
    ) -> Result<CodeExecution, SandboxError> {
        if self.released {
            return Err(SandboxError::Protocol(
                "execute on a released sandbox lease".to_string(),
            ));
        }
        self.manager
            .service
            .run_code_boxed(&self.handle, code, timeout)
            .await
    }

    /// Tear the environment down. Idempotent: the first call destroys, later
    /// calls are no-ops. A failing teardown is logged and swallowed -- the
    /// environment idles out on its own and the loop's outcome must not be
    /// masked.
    pub async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.manager.released.fetch_add(1, Ordering::SeqCst);
        if let Err(error) = self.manager.service.destroy_boxed(&self.handle).await {
            tracing::warn!(
                sandbox = self.handle.as_str(),
                %error,
                "sandbox teardown failed; environment will idle out"
            );
        } else {
            tracing::debug!(sandbox = self.handle.as_str(), "sandbox released");
        }
    }
}

impl Drop for SandboxLease {
    fn drop(&mut self) {
        // Cannot release asynchronously here; every orchestrator exit path
        // must have called `release` already.
        if !self.released {
            tracing::error!(
                sandbox = self.handle.as_str(),
                "sandbox lease dropped without release"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

/// Counting in-memory sandbox service shared by the orchestrator tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub(crate) struct FakeSandboxService {
        created: AtomicUsize,
        destroyed: AtomicUsize,
        pub(crate) fail_destroy: bool,
        /// Scripted executions popped per run; the last entry is sticky.
        pub(crate) executions: std::sync::Mutex<std::collections::VecDeque<CodeExecution>>,
    }

    impl FakeSandboxService {
        pub(crate) fn new() -> Self {
            Self {
                created: AtomicUsize::new(0),
                destroyed: AtomicUsize::new(0),
                fail_destroy: false,
                executions: std::sync::Mutex::new(std::collections::VecDeque::new()),
            }
        }

        pub(crate) fn with_executions(executions: Vec<CodeExecution>) -> Self {
            let service = Self::new();
            *service.executions.lock().unwrap() = executions.into();
            service
        }

        pub(crate) fn failing_teardown() -> Self {
            let mut service = Self::new();
            service.fail_destroy = true;
            service
        }
    }

    impl SandboxService for FakeSandboxService {
        async fn create(&self, _idle_timeout: Duration) -> Result<SandboxHandle, SandboxError> {
            let id = self.created.fetch_add(1, Ordering::SeqCst);
            Ok(SandboxHandle(format!("sbx-{id}")))
        }

        async fn run_code(
            &self,
            _handle: &SandboxHandle,
            code: &str,
            _timeout: Duration,
        ) -> Result<CodeExecution, SandboxError> {
            let mut executions = self.executions.lock().unwrap();
            if executions.len() > 1 {
                Ok(executions.pop_front().unwrap())
            } else if let Some(execution) = executions.front() {
                Ok(execution.clone())
            } else {
                Ok(CodeExecution {
                    stdout: format!("ran: {code}"),
                    ..CodeExecution::default()
                })
            }
        }

        async fn destroy(&self, _handle: &SandboxHandle) -> Result<(), SandboxError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            if self.fail_destroy {
                Err(SandboxError::Service {
                    message: "teardown refused".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
