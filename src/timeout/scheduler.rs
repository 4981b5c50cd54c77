//! Shared deadline scheduler for cooperative timeouts
//!
//! A single-worker tokio runtime that fires deadline actions. One scheduler
//! lives in the engine root store and is shut down when that store closes.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::context::ExtensionContext;
use crate::store::{CloseableResource, Namespace, StoreError};

const PENDING: u8 = 0;
const FIRING: u8 = 1;
const FIRED: u8 = 2;
const CANCELLED: u8 = 3;

const SCHEDULER_KEY: &str = "scheduler";

pub struct TimeoutScheduler {
    runtime: Mutex<Option<Runtime>>,
}

impl TimeoutScheduler {
    pub fn new() -> anyhow::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("cadence-timeout-scheduler")
            .enable_time()
            .build()?;
        debug!("timeout scheduler started");
        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
        })
    }

    /// The scheduler owned by the root store of `cx`'s tree, created on first use
    pub fn shared(cx: &ExtensionContext) -> anyhow::Result<Arc<Self>> {
        let store = cx.root().store(Namespace::create(["cadence", "timeout"]))?;
        store.get_or_compute_resource(SCHEDULER_KEY, Self::new)
    }

    /// Run `action` once `delay` has elapsed, unless cancelled first
    pub fn schedule<F>(&self, delay: Duration, action: F) -> Result<ScheduledAction, StoreError>
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.runtime.lock();
        let runtime = guard.as_ref().ok_or_else(|| StoreError::Closed {
            node: "cadence-timeout-scheduler".to_string(),
        })?;

        let state = Arc::new(AtomicU8::new(PENDING));
        let task_state = Arc::clone(&state);
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if task_state
                .compare_exchange(PENDING, FIRING, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                action();
                task_state.store(FIRED, Ordering::Release);
            }
        });
        Ok(ScheduledAction { state, task })
    }

    pub fn is_shut_down(&self) -> bool {
        self.runtime.lock().is_none()
    }
}

impl CloseableResource for TimeoutScheduler {
    fn close(&self) -> anyhow::Result<()> {
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
            debug!("timeout scheduler shut down");
        }
        Ok(())
    }
}

/// Handle to a pending deadline action
pub struct ScheduledAction {
    state: Arc<AtomicU8>,
    task: JoinHandle<()>,
}

impl ScheduledAction {
    /// Cancel the action. Returns `false` when it already fired, in which
    /// case this waits until the action has finished running.
    pub fn cancel(self) -> bool {
        match self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.task.abort();
                true
            }
            Err(_) => {
                while self.state.load(Ordering::Acquire) != FIRED {
                    std::thread::yield_now();
                }
                false
            }
        }
    }
}
