//! Timeout Module - deadlines for invocations
//!
//! Key types:
//! - `TimeoutDuration`: Positive (amount, unit) pair with a compact text form
//! - `SameThreadTimeoutInvocation`: Cooperative deadline via a shared scheduler
//! - `SeparateThreadTimeoutInvocation`: Preemptive deadline via a worker thread
//! - `TimeoutExtension`: Built-in interceptor applying configured deadlines
//!
//! Work running under a deadline can check `is_cancelled()`, sleep with
//! `sleep_cancellable()` and publish progress with `record_activity()`.

mod cancel;
mod duration;
mod extension;
mod invocation;
mod scheduler;

pub use cancel::{current_token, is_cancelled, record_activity, sleep_cancellable, Cancelled};
pub use duration::{DurationParseError, TimeUnit, TimeoutDuration};
pub use extension::{resolve_timeout, EffectiveTimeout, TimeoutDeclaration, TimeoutExtension};
pub use invocation::{
    wrap_with_timeout, OverrunDiagnostic, SameThreadTimeoutInvocation,
    SeparateThreadTimeoutInvocation, ThreadMode, TimeoutError, TimeoutInvocationParameters,
    TimeoutInvocationParametersBuilder,
};
pub use scheduler::{ScheduledAction, TimeoutScheduler};
