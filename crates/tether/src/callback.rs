//! Callback bridge: retains scripting-side functions for native code.
//!
//! Script functions are not `Send`; they live in a slab on the thread that
//! owns the scripting context, keyed by callback id. The `CallbackHandle`
//! given to native code is `Send`: invoked on the scripting thread it is a
//! direct slab lookup and call, invoked from a worker it queues the call onto
//! the context and blocks until the reply arrives.
//!
//! Handles are revoked when their owning hybrid object is destroyed; using
//! one afterwards fails with `StaleCallback`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::mpsc;

use crate::context::ContextHandle;
use crate::error::{BridgeError, Result};
use crate::object::Handle;
use crate::value::Value;

/// A scripting-side function as supplied by the caller, before wrapping.
#[derive(Clone)]
pub struct ScriptFunction(Rc<dyn Fn(Vec<Value>) -> Value>);

impl ScriptFunction {
    pub fn new(f: impl Fn(Vec<Value>) -> Value + 'static) -> ScriptFunction {
        ScriptFunction(Rc::new(f))
    }
}

struct CallbackEntry {
    func: ScriptFunction,
    owner: Option<Handle>,
}

thread_local! {
    /// Callback slab for the scripting thread.
    static CALLBACKS: RefCell<HashMap<u64, CallbackEntry>> = RefCell::new(HashMap::new());
    static NEXT_CALLBACK_ID: Cell<u64> = const { Cell::new(1) };
}

/// A retained cross-boundary reference to a scripting-side function.
#[derive(Clone)]
pub struct CallbackHandle {
    id: u64,
    ctx: ContextHandle,
}

/// Retain a scripting function so native code can invoke it later. Must be
/// called on the scripting thread. `owner` couples the callback's lifetime
/// to a hybrid object: destroying the object revokes the handle.
pub fn wrap(ctx: &ContextHandle, func: ScriptFunction, owner: Option<Handle>) -> CallbackHandle {
    assert!(
        ctx.is_current(),
        "callbacks can only be wrapped on the scripting context"
    );
    let id = NEXT_CALLBACK_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    });
    CALLBACKS.with(|slab| {
        slab.borrow_mut().insert(id, CallbackEntry { func, owner });
    });
    log::debug!("wrapped callback #{id}");
    CallbackHandle {
        id,
        ctx: ctx.clone(),
    }
}

/// Drop every callback owned by the given object. Object destruction
/// schedules this onto the scripting thread.
pub(crate) fn revoke_owned_by(owner: Handle) {
    CALLBACKS.with(|slab| {
        slab.borrow_mut()
            .retain(|_, entry| entry.owner != Some(owner));
    });
}

fn call_local(id: u64, args: Vec<Value>) -> Result<Value> {
    // Clone the function out of the slab first so the callback body may
    // itself wrap or revoke callbacks without re-entering the RefCell.
    let func = CALLBACKS.with(|slab| slab.borrow().get(&id).map(|entry| entry.func.clone()));
    match func {
        Some(func) => Ok((func.0)(args)),
        None => Err(BridgeError::StaleCallback),
    }
}

impl CallbackHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Invoke synchronously. From the scripting thread this is a direct
    /// call; from a worker the invocation is queued onto the scripting
    /// context and the caller blocks until it has run. The context must be
    /// pumping for a worker-side call to complete.
    pub fn invoke(&self, args: Vec<Value>) -> Result<Value> {
        if self.ctx.is_current() {
            return call_local(self.id, args);
        }
        let (tx, rx) = mpsc::channel();
        let id = self.id;
        self.ctx.schedule(Box::new(move || {
            let _ = tx.send(call_local(id, args));
        }));
        // A dropped context discards the task along with the sender, which
        // surfaces here as a stale callback.
        rx.recv().unwrap_or(Err(BridgeError::StaleCallback))
    }

    /// Queue an invocation without waiting for it. Stale invocations are
    /// logged and dropped.
    pub fn invoke_detached(&self, args: Vec<Value>) {
        let id = self.id;
        self.ctx.schedule(Box::new(move || {
            if let Err(err) = call_local(id, args) {
                log::warn!("detached callback #{id} dropped: {err}");
            }
        }));
    }
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CallbackHandle(#{})", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ScriptContext;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn local_invocation_returns_the_function_result() {
        let context = ScriptContext::new();
        let cb = wrap(
            &context.handle(),
            ScriptFunction::new(|args| match args.first() {
                Some(Value::Int(i)) => Value::Int(i * 2),
                _ => Value::Null,
            }),
            None,
        );
        assert_eq!(cb.invoke(vec![Value::Int(21)]), Ok(Value::Int(42)));
    }

    #[test]
    fn revoked_callback_reports_stale() {
        let context = ScriptContext::new();
        let cb = wrap(
            &context.handle(),
            ScriptFunction::new(|_| Value::Null),
            Some(99),
        );
        revoke_owned_by(99);
        assert_eq!(cb.invoke(vec![]), Err(BridgeError::StaleCallback));
    }

    #[test]
    fn worker_invocation_is_redirected_to_the_owning_thread() {
        let context = ScriptContext::new();
        let owner_thread = thread::current().id();
        let cb = wrap(
            &context.handle(),
            ScriptFunction::new(move |_| {
                assert_eq!(thread::current().id(), owner_thread);
                Value::Str("from script".to_string())
            }),
            None,
        );

        let worker = thread::spawn(move || cb.invoke(vec![]));
        assert!(context.run_until(|| worker.is_finished(), Duration::from_secs(5)));
        assert_eq!(worker.join().unwrap(), Ok(Value::Str("from script".to_string())));
    }

    #[test]
    fn detached_invocation_of_missing_callback_is_dropped() {
        let context = ScriptContext::new();
        let cb = wrap(&context.handle(), ScriptFunction::new(|_| Value::Null), Some(7));
        revoke_owned_by(7);
        cb.invoke_detached(vec![]);
        // The queued task observes the stale entry and logs instead of
        // panicking.
        assert_eq!(context.pump(), 1);
    }
}
