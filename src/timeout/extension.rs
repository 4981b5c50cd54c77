//! Built-in timeout extension
//!
//! Registered at the engine root so it is the outermost interceptor. The
//! effective deadline of a test comes from, in order: the test's own
//! declaration, the nearest enclosing container's declaration,
//! `timeout.test`, `timeout.default`.

use tracing::trace;

use super::duration::{DurationParseError, TimeoutDuration};
use super::invocation::{wrap_with_timeout, ThreadMode, TimeoutInvocationParameters};
use crate::config::TimeoutConfig;
use crate::extension::{CallbackResult, Extension, Invocation, InvocationContext, InvocationInterceptor};

/// Timeout as written on a test or container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutDeclaration {
    pub text: String,
    pub thread_mode: Option<ThreadMode>,
}

impl TimeoutDeclaration {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            thread_mode: None,
        }
    }

    pub fn with_thread_mode(mut self, mode: ThreadMode) -> Self {
        self.thread_mode = Some(mode);
        self
    }
}

/// Parsed deadline that applies to one test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveTimeout {
    pub duration: TimeoutDuration,
    pub thread_mode: ThreadMode,
}

/// Pick and parse the deadline for a test. `Ok(None)` when timeouts are
/// disabled or nothing applies.
pub fn resolve_timeout(
    test: Option<&TimeoutDeclaration>,
    enclosing: Option<&TimeoutDeclaration>,
    config: &TimeoutConfig,
) -> Result<Option<EffectiveTimeout>, DurationParseError> {
    if !config.enabled {
        return Ok(None);
    }
    if let Some(declared) = test.or(enclosing) {
        return Ok(Some(EffectiveTimeout {
            duration: TimeoutDuration::parse(&declared.text)?,
            thread_mode: declared.thread_mode.unwrap_or(config.thread_mode).resolve(),
        }));
    }
    Ok(config.test.or(config.default).map(|duration| EffectiveTimeout {
        duration,
        thread_mode: config.thread_mode.resolve(),
    }))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TimeoutExtension;

impl Extension for TimeoutExtension {
    fn name(&self) -> &str {
        "cadence-timeout"
    }

    fn as_invocation_interceptor(&self) -> Option<&dyn InvocationInterceptor> {
        Some(self)
    }
}

impl InvocationInterceptor for TimeoutExtension {
    fn intercept_test(&self, invocation: Invocation<()>, cx: &InvocationContext) -> CallbackResult {
        let Some(timeout) = cx.timeout().copied() else {
            return invocation.proceed();
        };
        trace!(test = cx.test_name(), timeout = %timeout.duration, mode = ?timeout.thread_mode, "applying timeout");

        let test_name = cx.test_name().to_string();
        let parameters = TimeoutInvocationParameters::builder()
            .invocation(invocation)
            .timeout(timeout.duration)
            .description(move || format!("{test_name}()"))
            .build()?;
        wrap_with_timeout(cx.extension_context(), parameters, timeout.thread_mode)?.proceed()
    }
}
