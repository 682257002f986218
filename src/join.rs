//! Fan-in coordination for callback-style asynchronous operations.
//!
//! A [`JoinEpisode`] tracks a dynamic set of in-flight operations and fires a
//! single continuation exactly once, after every registered operation has
//! reported completion. It is the library's replacement for the nested
//! completion-handler-plus-shared-counter pattern: callers `register()` each
//! operation *before* dispatching it, the operation calls `complete()` when
//! its result arrives, and the continuation armed via `notify()` runs on a
//! designated [`DeliveryHandle`] once the pending count drains to zero.
//!
//! Register-before-dispatch matters: registering after dispatch opens a race
//! where the last already-running completion drains the counter to zero and
//! fires the continuation while siblings are still being started.
//!
//! Episodes are single-use. One episode binds one batch of operations to one
//! continuation; start a fresh episode for each batch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::delivery::DeliveryHandle;
use crate::error::{GlucologError, Result};

type Continuation = Box<dyn FnOnce(JoinOutcome) + Send + 'static>;

/// What the continuation learns about the batch it waited for.
#[derive(Debug)]
pub struct JoinOutcome {
    /// Total number of operations registered with the episode.
    pub completed: usize,
    /// Failures reported by individual operations, in completion order.
    ///
    /// A failure never aborts sibling operations; the episode always waits
    /// for every registration to resolve.
    pub failures: Vec<GlucologError>,
}

impl JoinOutcome {
    /// True when every operation completed without error.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Armed {
    run: Continuation,
    delivery: Option<DeliveryHandle>,
}

struct Inner {
    pending: AtomicUsize,
    registered: AtomicUsize,
    armed: AtomicBool,
    failures: Mutex<Vec<GlucologError>>,
    continuation: Mutex<Option<Armed>>,
}

/// One fan-out/fan-in coordination instance.
///
/// Cloneable; all clones share the same pending count and continuation.
/// `register` and `complete` are safe to call from any thread or task.
#[derive(Clone)]
pub struct JoinEpisode {
    inner: Arc<Inner>,
}

impl Default for JoinEpisode {
    fn default() -> Self {
        Self::new()
    }
}

impl JoinEpisode {
    /// Create an episode with nothing pending.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: AtomicUsize::new(0),
                registered: AtomicUsize::new(0),
                armed: AtomicBool::new(false),
                failures: Mutex::new(Vec::new()),
                continuation: Mutex::new(None),
            }),
        }
    }

    /// Add one operation to the pending set.
    ///
    /// Call this synchronously, before the operation is dispatched. Sibling
    /// operations carry no ordering relative to one another; only the count
    /// reaching zero matters.
    pub fn register(&self) {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        self.inner.registered.fetch_add(1, Ordering::AcqRel);
    }

    /// Report one operation's completion.
    ///
    /// An `Err` result is recorded into the outcome's failure list; it does
    /// not short-circuit the episode. When the pending count reaches zero the
    /// armed continuation fires, exactly once.
    ///
    /// # Panics
    ///
    /// Panics if called more times than [`register`](Self::register) — that is
    /// a coordination bug in the caller, not an environmental failure.
    pub fn complete(&self, result: Result<()>) {
        if let Err(error) = result {
            tracing::debug!(error = %error, "operation completed with error");
            self.inner.failures.lock().push(error);
        }

        // Atomic decrement-and-test. checked_sub refuses to go below zero, so
        // two racing "last" completions cannot both observe the zero crossing.
        let prev = self
            .inner
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or_else(|_| {
                panic!("join episode completed more times than registered");
            });

        if prev == 1 {
            self.try_fire();
        }
    }

    /// Arm the continuation to run on `delivery` once the pending count
    /// reaches zero.
    ///
    /// An episode with zero registrations fires immediately; an empty join
    /// never stalls. Arming an episode twice panics.
    pub fn notify(&self, delivery: &DeliveryHandle, f: impl FnOnce(JoinOutcome) + Send + 'static) {
        self.arm(Armed {
            run: Box::new(f),
            delivery: Some(delivery.clone()),
        });
    }

    /// Like [`notify`](Self::notify), but the continuation runs inline on
    /// whichever context observes the last completion (or on the caller, for
    /// an empty episode). Prefer `notify` when a delivery queue exists.
    pub fn notify_inline(&self, f: impl FnOnce(JoinOutcome) + Send + 'static) {
        self.arm(Armed {
            run: Box::new(f),
            delivery: None,
        });
    }

    fn arm(&self, armed: Armed) {
        if self.inner.armed.swap(true, Ordering::AcqRel) {
            panic!("join episode continuation armed twice");
        }
        *self.inner.continuation.lock() = Some(armed);
        self.try_fire();
    }

    /// Fire the continuation if the pending count is zero and a continuation
    /// is armed. Taking the continuation out of its slot is what makes the
    /// firing exactly-once under concurrent callers.
    fn try_fire(&self) {
        if self.inner.pending.load(Ordering::Acquire) != 0 {
            return;
        }
        let Some(armed) = self.inner.continuation.lock().take() else {
            return;
        };

        let outcome = JoinOutcome {
            completed: self.inner.registered.load(Ordering::Acquire),
            failures: std::mem::take(&mut *self.inner.failures.lock()),
        };
        tracing::debug!(
            completed = outcome.completed,
            failures = outcome.failures.len(),
            "join episode complete"
        );

        match armed.delivery {
            Some(delivery) => {
                let run = armed.run;
                delivery.dispatch(move || run(outcome));
            }
            None => (armed.run)(outcome),
        }
    }
}
