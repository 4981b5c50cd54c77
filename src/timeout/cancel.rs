//! Per-call cancellation state
//!
//! Timeout-wrapped work runs with a `CancellationToken` installed for the
//! current thread. The token is scoped to one call: it is installed on entry
//! and the previous state is restored on exit, so nothing leaks into code
//! that runs afterwards on the same thread.

use std::cell::RefCell;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Latest activity published by a worker, readable from other threads
pub(crate) type ActivityCell = Arc<Mutex<Option<String>>>;

thread_local! {
    static CURRENT_TOKEN: RefCell<Option<CancellationToken>> = const { RefCell::new(None) };
    static CURRENT_ACTIVITY: RefCell<Option<ActivityCell>> = const { RefCell::new(None) };
}

/// Returned by [`sleep_cancellable`] when the deadline fired
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("[CAD-041] Interrupted by an expired deadline")]
pub struct Cancelled;

/// Token of the innermost timeout-wrapped call on this thread
pub fn current_token() -> Option<CancellationToken> {
    CURRENT_TOKEN.with(|slot| slot.borrow().clone())
}

/// Whether the deadline of the innermost wrapped call has fired
pub fn is_cancelled() -> bool {
    CURRENT_TOKEN.with(|slot| {
        slot.borrow()
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    })
}

/// Sleep that wakes up early when the current deadline fires.
///
/// Outside of a wrapped call this is a plain sleep.
pub fn sleep_cancellable(duration: Duration) -> Result<(), Cancelled> {
    let Some(token) = current_token() else {
        thread::sleep(duration);
        return Ok(());
    };
    let deadline = Instant::now() + duration;
    loop {
        if token.is_cancelled() {
            return Err(Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::park_timeout(deadline - now);
    }
}

/// Publish what the current worker is doing. Shows up in overrun diagnostics
/// of preemptive timeouts; a no-op elsewhere.
pub fn record_activity(activity: impl Into<String>) {
    CURRENT_ACTIVITY.with(|slot| {
        if let Some(cell) = slot.borrow().as_ref() {
            *cell.lock() = Some(activity.into());
        }
    });
}

/// Installs a token for the current thread until dropped
pub(crate) struct TokenScope {
    previous: Option<CancellationToken>,
}

impl TokenScope {
    pub(crate) fn enter(token: CancellationToken) -> Self {
        let previous = CURRENT_TOKEN.with(|slot| slot.borrow_mut().replace(token));
        Self { previous }
    }
}

impl Drop for TokenScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_TOKEN.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Installs an activity cell for the current thread until dropped
pub(crate) struct ActivityScope {
    previous: Option<ActivityCell>,
}

impl ActivityScope {
    pub(crate) fn enter(cell: ActivityCell) -> Self {
        let previous = CURRENT_ACTIVITY.with(|slot| slot.borrow_mut().replace(cell));
        Self { previous }
    }
}

impl Drop for ActivityScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_ACTIVITY.with(|slot| *slot.borrow_mut() = previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_restore_previous_token() {
        assert!(current_token().is_none());
        let outer = CancellationToken::new();
        {
            let _outer = TokenScope::enter(outer.clone());
            let inner = CancellationToken::new();
            inner.cancel();
            {
                let _inner = TokenScope::enter(inner);
                assert!(is_cancelled());
            }
            assert!(!is_cancelled());
        }
        assert!(current_token().is_none());
        assert!(!is_cancelled());
    }

    #[test]
    fn sleep_wakes_on_cancel() {
        let token = CancellationToken::new();
        let _scope = TokenScope::enter(token.clone());
        let me = thread::current();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            token.cancel();
            me.unpark();
        });

        let start = Instant::now();
        assert_eq!(sleep_cancellable(Duration::from_secs(5)), Err(Cancelled));
        assert!(start.elapsed() < Duration::from_secs(2));
        canceller.join().unwrap();
    }

    #[test]
    fn sleep_without_token_is_plain() {
        assert_eq!(sleep_cancellable(Duration::from_millis(1)), Ok(()));
    }

    #[test]
    fn activity_is_visible_through_the_cell() {
        let cell: ActivityCell = Arc::default();
        record_activity("ignored");
        {
            let _scope = ActivityScope::enter(Arc::clone(&cell));
            record_activity("loading fixtures");
        }
        record_activity("also ignored");
        assert_eq!(cell.lock().as_deref(), Some("loading fixtures"));
    }
}
