//! Timeout-wrapped invocations
//!
//! Two ways to put a deadline on an invocation:
//! - `SameThreadTimeoutInvocation`: runs on the caller's thread; the shared
//!   scheduler cancels the call's token when the deadline fires
//! - `SeparateThreadTimeoutInvocation`: runs on a fresh worker thread; the
//!   caller stops waiting at the deadline and abandons the worker

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::cancel::{ActivityCell, ActivityScope, TokenScope};
use super::duration::TimeoutDuration;
use super::scheduler::TimeoutScheduler;
use crate::context::ExtensionContext;
use crate::error::{panic_message, LifecycleError};
use crate::extension::Invocation;

static NEXT_WORKER: AtomicU64 = AtomicU64::new(1);

/// Where timeout-wrapped work runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadMode {
    /// Caller's thread, cooperative cancellation
    SameThread,
    /// Dedicated worker thread, preemptive for the caller
    SeparateThread,
    /// Let the engine pick (same thread)
    #[default]
    Inferred,
}

impl ThreadMode {
    pub fn resolve(self) -> ThreadMode {
        match self {
            ThreadMode::Inferred => ThreadMode::SameThread,
            mode => mode,
        }
    }
}

/// Why a preemptive call was abandoned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrunDiagnostic {
    pub thread_name: String,
    pub activity: Option<String>,
    pub elapsed: Duration,
}

impl fmt::Display for OverrunDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "worker '{}' still running after {:?}; last activity: {}",
            self.thread_name,
            self.elapsed,
            self.activity.as_deref().unwrap_or("<none recorded>")
        )
    }
}

impl std::error::Error for OverrunDiagnostic {}

#[derive(Error, Debug)]
#[error("[CAD-040] {description} timed out after {duration}")]
pub struct TimeoutError {
    description: String,
    duration: TimeoutDuration,
    #[source]
    overrun: Option<OverrunDiagnostic>,
    suppressed: Option<String>,
}

impl TimeoutError {
    pub fn new(description: impl Into<String>, duration: TimeoutDuration) -> Self {
        Self {
            description: description.into(),
            duration,
            overrun: None,
            suppressed: None,
        }
    }

    pub fn with_overrun(mut self, overrun: OverrunDiagnostic) -> Self {
        self.overrun = Some(overrun);
        self
    }

    pub fn with_suppressed(mut self, suppressed: impl Into<String>) -> Self {
        self.suppressed = Some(suppressed.into());
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn duration(&self) -> TimeoutDuration {
        self.duration
    }

    /// Present for preemptive timeouts
    pub fn overrun(&self) -> Option<&OverrunDiagnostic> {
        self.overrun.as_ref()
    }

    /// Failure the work itself reported after its deadline fired
    pub fn suppressed(&self) -> Option<&str> {
        self.suppressed.as_deref()
    }
}

type DescriptionSupplier = Box<dyn Fn() -> String + Send + Sync>;

/// Invocation, deadline and description, checked at build time
pub struct TimeoutInvocationParameters<T> {
    invocation: Invocation<T>,
    timeout: TimeoutDuration,
    description: DescriptionSupplier,
}

impl<T> TimeoutInvocationParameters<T> {
    pub fn builder() -> TimeoutInvocationParametersBuilder<T> {
        TimeoutInvocationParametersBuilder {
            invocation: None,
            timeout: None,
            description: None,
        }
    }

    pub fn timeout(&self) -> TimeoutDuration {
        self.timeout
    }

    pub fn description(&self) -> String {
        (self.description)()
    }
}

pub struct TimeoutInvocationParametersBuilder<T> {
    invocation: Option<Invocation<T>>,
    timeout: Option<TimeoutDuration>,
    description: Option<DescriptionSupplier>,
}

impl<T> TimeoutInvocationParametersBuilder<T> {
    pub fn invocation(mut self, invocation: Invocation<T>) -> Self {
        self.invocation = Some(invocation);
        self
    }

    pub fn timeout(mut self, timeout: TimeoutDuration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn description<F>(mut self, supplier: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.description = Some(Box::new(supplier));
        self
    }

    pub fn build(self) -> Result<TimeoutInvocationParameters<T>, LifecycleError> {
        Ok(TimeoutInvocationParameters {
            invocation: self.invocation.ok_or(LifecycleError::MissingArgument {
                argument: "invocation",
            })?,
            timeout: self.timeout.ok_or(LifecycleError::MissingArgument {
                argument: "timeout",
            })?,
            description: self.description.ok_or(LifecycleError::MissingArgument {
                argument: "description",
            })?,
        })
    }
}

/// Cooperative deadline on the caller's thread
pub struct SameThreadTimeoutInvocation<T> {
    parameters: TimeoutInvocationParameters<T>,
    scheduler: Arc<TimeoutScheduler>,
}

impl<T> SameThreadTimeoutInvocation<T> {
    pub fn new(parameters: TimeoutInvocationParameters<T>, scheduler: Arc<TimeoutScheduler>) -> Self {
        Self {
            parameters,
            scheduler,
        }
    }

    pub fn proceed(self) -> anyhow::Result<T> {
        let TimeoutInvocationParameters {
            invocation,
            timeout,
            description,
        } = self.parameters;

        let token = CancellationToken::new();
        let deadline_token = token.clone();
        let caller = thread::current();
        let scheduled = self.scheduler.schedule(timeout.to_std(), move || {
            deadline_token.cancel();
            caller.unpark();
        })?;

        let outcome = {
            let _scope = TokenScope::enter(token);
            panic::catch_unwind(AssertUnwindSafe(|| invocation.proceed()))
        };

        if scheduled.cancel() {
            return match outcome {
                Ok(result) => result,
                Err(payload) => panic::resume_unwind(payload),
            };
        }

        // Consume the wake-up permit left by the deadline action.
        thread::park_timeout(Duration::ZERO);

        let mut error = TimeoutError::new(description(), timeout);
        match outcome {
            Ok(Err(err)) => error = error.with_suppressed(format!("{err:#}")),
            Err(payload) => error = error.with_suppressed(panic_message(payload.as_ref())),
            Ok(Ok(_)) => {}
        }
        debug!(timeout = %timeout, "cooperative deadline expired");
        Err(error.into())
    }
}

/// Preemptive deadline: the caller returns at the deadline even if the work
/// never does
pub struct SeparateThreadTimeoutInvocation<T> {
    parameters: TimeoutInvocationParameters<T>,
}

impl<T: Send + 'static> SeparateThreadTimeoutInvocation<T> {
    pub fn new(parameters: TimeoutInvocationParameters<T>) -> Self {
        Self { parameters }
    }

    pub fn proceed(self) -> anyhow::Result<T> {
        let TimeoutInvocationParameters {
            invocation,
            timeout,
            description,
        } = self.parameters;

        let thread_name = format!(
            "cadence-timeout-worker-{}",
            NEXT_WORKER.fetch_add(1, Ordering::Relaxed)
        );
        let token = CancellationToken::new();
        let activity: ActivityCell = Arc::default();
        let (tx, rx) = mpsc::sync_channel(1);

        let worker_token = token.clone();
        let worker_activity = Arc::clone(&activity);
        let worker = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let _token = TokenScope::enter(worker_token);
                let _activity = ActivityScope::enter(worker_activity);
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| invocation.proceed()));
                // The caller may have stopped listening after its deadline.
                let _ = tx.send(outcome);
            })?;

        let started = Instant::now();
        match rx.recv_timeout(timeout.to_std()) {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(RecvTimeoutError::Timeout) => {
                token.cancel();
                worker.thread().unpark();
                let overrun = OverrunDiagnostic {
                    thread_name,
                    activity: activity.lock().clone(),
                    elapsed: started.elapsed(),
                };
                let description = description();
                warn!(
                    invocation = %description,
                    worker = %overrun.thread_name,
                    activity = overrun.activity.as_deref().unwrap_or("<none>"),
                    "abandoning timed out worker"
                );
                Err(TimeoutError::new(description, timeout)
                    .with_overrun(overrun)
                    .into())
            }
            Err(RecvTimeoutError::Disconnected) => Err(LifecycleError::WorkerLost {
                description: description(),
            }
            .into()),
        }
    }
}

/// Wrap `parameters` into an invocation enforcing its deadline in `mode`
pub fn wrap_with_timeout<T: Send + 'static>(
    cx: &ExtensionContext,
    parameters: TimeoutInvocationParameters<T>,
    mode: ThreadMode,
) -> anyhow::Result<Invocation<T>> {
    match mode.resolve() {
        ThreadMode::SeparateThread => {
            let invocation = SeparateThreadTimeoutInvocation::new(parameters);
            Ok(Invocation::new(move || invocation.proceed()))
        }
        _ => {
            let invocation = SameThreadTimeoutInvocation::new(parameters, TimeoutScheduler::shared(cx)?);
            Ok(Invocation::new(move || invocation.proceed()))
        }
    }
}
