//! Write-once futures settled on the scripting context.
//!
//! A `Promise` is a single-assignment result slot plus a watcher list. It is
//! settled exactly once, always from the scripting thread; watchers run there
//! as queued tasks, never inline on a native worker. Settling twice is a
//! broken invariant and panics (the release profile aborts on panic).

use std::sync::{Arc, Mutex};

use crate::context::ContextHandle;
use crate::error::{BridgeError, Result};
use crate::value::Value;

type Watcher = Box<dyn FnOnce(Result<Value>) + Send + 'static>;

enum State {
    Pending(Vec<Watcher>),
    Fulfilled(Value),
    Rejected(BridgeError),
}

/// A single-assignment result container observable by the scripting side.
#[derive(Clone)]
pub struct Promise {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    ctx: ContextHandle,
}

impl std::fmt::Debug for Promise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.settled() {
            None => write!(f, "Promise(pending)"),
            Some(Ok(value)) => write!(f, "Promise(fulfilled: {value:?})"),
            Some(Err(err)) => write!(f, "Promise(rejected: {err})"),
        }
    }
}

impl Promise {
    pub fn pending(ctx: &ContextHandle) -> Promise {
        Promise {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending(Vec::new())),
                ctx: ctx.clone(),
            }),
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(*self.inner.state.lock().unwrap(), State::Pending(_))
    }

    /// The settled result, or `None` while pending.
    pub fn settled(&self) -> Option<Result<Value>> {
        match &*self.inner.state.lock().unwrap() {
            State::Pending(_) => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(err) => Some(Err(err.clone())),
        }
    }

    /// Run `watcher` on the scripting context once the promise settles. If
    /// it already has, the watcher is queued immediately.
    pub fn on_settled(&self, watcher: impl FnOnce(Result<Value>) + Send + 'static) {
        let mut state = self.inner.state.lock().unwrap();
        match &mut *state {
            State::Pending(watchers) => watchers.push(Box::new(watcher)),
            State::Fulfilled(value) => {
                let result = Ok(value.clone());
                self.inner.ctx.schedule(Box::new(move || watcher(result)));
            }
            State::Rejected(err) => {
                let result = Err(err.clone());
                self.inner.ctx.schedule(Box::new(move || watcher(result)));
            }
        }
    }

    /// Fulfill with `value`. Must run on the scripting context.
    pub fn resolve(&self, value: Value) {
        self.settle(Ok(value));
    }

    /// Reject with `error`. Must run on the scripting context.
    pub fn reject(&self, error: BridgeError) {
        self.settle(Err(error));
    }

    fn settle(&self, result: Result<Value>) {
        assert!(
            self.inner.ctx.is_current(),
            "promise settled off the scripting context"
        );
        let mut state = self.inner.state.lock().unwrap();
        let watchers = match &mut *state {
            State::Pending(watchers) => std::mem::take(watchers),
            _ => panic!("promise settled twice"),
        };
        *state = match &result {
            Ok(value) => State::Fulfilled(value.clone()),
            Err(err) => State::Rejected(err.clone()),
        };
        drop(state);

        // Watchers stay cooperative: they go through the queue even when the
        // settling call already runs on the scripting thread.
        for watcher in watchers {
            let result = result.clone();
            self.inner.ctx.schedule(Box::new(move || watcher(result)));
        }
    }
}
