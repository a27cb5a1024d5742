//! Resolve-once handle with success and failure continuations.
//!
//! A [`Deferred`] is handed out by operations that complete later, such as
//! closing a channel. Callers register continuations on it; the producer
//! resolves it exactly once. Continuations registered after resolution run
//! immediately, so registration order relative to resolution never matters.
//!
//! Handles are cheap clones of the same shared state. Everything here is
//! single-threaded, matching the event loop that owns the channel.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type SuccessCallback = Box<dyn FnOnce()>;
type FailureCallback = Box<dyn FnOnce(&str)>;
type FinalizeCallback = Box<dyn FnOnce()>;

/// Where a deferred is in its life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredOutcome {
    /// Not resolved yet.
    Pending,
    /// Resolved successfully.
    Succeeded,
    /// Resolved with an error message.
    Failed(String),
}

#[derive(Default)]
struct DeferredState {
    outcome: Option<DeferredOutcome>,
    on_success: Vec<SuccessCallback>,
    on_failure: Vec<FailureCallback>,
    on_finalize: Vec<FinalizeCallback>,
}

/// A future-like handle resolved exactly once.
#[derive(Clone, Default)]
pub struct Deferred {
    state: Rc<RefCell<DeferredState>>,
}

impl Deferred {
    /// Creates a pending deferred.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a deferred that has already succeeded.
    #[must_use]
    pub fn succeeded() -> Self {
        let deferred = Self::new();
        deferred.resolve();
        deferred
    }

    /// Creates a deferred that has already failed.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        let deferred = Self::new();
        deferred.fail(message);
        deferred
    }

    /// Returns the current outcome.
    #[must_use]
    pub fn outcome(&self) -> DeferredOutcome {
        self.state
            .borrow()
            .outcome
            .clone()
            .unwrap_or(DeferredOutcome::Pending)
    }

    /// Returns true if not yet resolved.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.borrow().outcome.is_none()
    }

    /// Returns true if resolved successfully.
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        matches!(self.state.borrow().outcome, Some(DeferredOutcome::Succeeded))
    }

    /// Returns true if resolved with an error.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.state.borrow().outcome, Some(DeferredOutcome::Failed(_)))
    }

    /// Returns true if both handles share the same state.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Registers a continuation for success.
    pub fn on_success(&self, callback: impl FnOnce() + 'static) -> &Self {
        let run_now = {
            let mut state = self.state.borrow_mut();
            if state.outcome.is_none() {
                state.on_success.push(Box::new(callback));
                return self;
            }
            matches!(state.outcome, Some(DeferredOutcome::Succeeded))
        };
        if run_now {
            callback();
        }
        self
    }

    /// Registers a continuation for failure.
    pub fn on_error(&self, callback: impl FnOnce(&str) + 'static) -> &Self {
        let message = {
            let mut state = self.state.borrow_mut();
            if state.outcome.is_none() {
                state.on_failure.push(Box::new(callback));
                return self;
            }
            match &state.outcome {
                Some(DeferredOutcome::Failed(message)) => Some(message.clone()),
                _ => None,
            }
        };
        if let Some(message) = message {
            callback(&message);
        }
        self
    }

    /// Registers a continuation that runs on either outcome.
    pub fn on_finalize(&self, callback: impl FnOnce() + 'static) -> &Self {
        {
            let mut state = self.state.borrow_mut();
            if state.outcome.is_none() {
                state.on_finalize.push(Box::new(callback));
                return self;
            }
        }
        callback();
        self
    }

    /// Resolves successfully.
    ///
    /// Returns false, and does nothing, if already resolved.
    pub fn resolve(&self) -> bool {
        let (success, finalize) = {
            let mut state = self.state.borrow_mut();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(DeferredOutcome::Succeeded);
            state.on_failure.clear();
            (
                std::mem::take(&mut state.on_success),
                std::mem::take(&mut state.on_finalize),
            )
        };
        for callback in success {
            callback();
        }
        for callback in finalize {
            callback();
        }
        true
    }

    /// Resolves with an error.
    ///
    /// Returns false, and does nothing, if already resolved.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        let (failure, finalize) = {
            let mut state = self.state.borrow_mut();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(DeferredOutcome::Failed(message.clone()));
            state.on_success.clear();
            (
                std::mem::take(&mut state.on_failure),
                std::mem::take(&mut state.on_finalize),
            )
        };
        for callback in failure {
            callback(&message);
        }
        for callback in finalize {
            callback();
        }
        true
    }

    /// Resolves this deferred with whatever `upstream` resolves with.
    pub fn follow(&self, upstream: &Self) {
        let on_ok = self.clone();
        let on_err = self.clone();
        upstream.on_success(move || {
            on_ok.resolve();
        });
        upstream.on_error(move |message| {
            on_err.fail(message);
        });
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("outcome", &self.outcome())
            .finish_non_exhaustive()
    }
}
