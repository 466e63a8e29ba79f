//! Method dispatch table: named native callables with typed signatures.
//!
//! Arity and argument tags are checked against the registered descriptor
//! before any state is touched; a failed call never leaves partial mutation
//! behind. Parameters declared as callbacks capture the supplied scripting
//! function into a `CallbackHandle` owned by the receiving object. Methods
//! declared to return a future hand the caller a promise immediately and run
//! their work through the async bridge.
//!
//! The receiving object stays locked for the duration of a method body, so a
//! callback invoked synchronously from inside a body must not reenter the
//! same object.

use std::any::Any;
use std::future::Future;

use crate::callback::{self, CallbackHandle, ScriptFunction};
use crate::context::ContextHandle;
use crate::error::{BridgeError, Result};
use crate::marshal;
use crate::object::{Handle, Instance, ObjectHandle, StateCell};
use crate::promise::Promise;
use crate::value::{Callable, Value, ValueType};

/// Declared shape of one positional parameter.
#[derive(Debug, Clone)]
pub enum ParamSpec {
    Typed(ValueType),
    /// Captures a scripting-side function instead of a typed value.
    Callback,
}

/// Declared return shape of a method.
#[derive(Debug, Clone)]
pub enum ReturnSpec {
    Void,
    Typed(ValueType),
    /// The method returns a promise immediately; the declared type applies
    /// to the eventual resolution value.
    Future(ValueType),
}

/// Argument as supplied by the scripting caller.
pub enum CallArg {
    Value(Value),
    /// A scripting function supplied where the descriptor declares a
    /// callback parameter.
    Function(ScriptFunction),
}

impl From<Value> for CallArg {
    fn from(value: Value) -> CallArg {
        CallArg::Value(value)
    }
}

impl From<ScriptFunction> for CallArg {
    fn from(func: ScriptFunction) -> CallArg {
        CallArg::Function(func)
    }
}

/// Argument as seen by a native method body, after marshaling.
pub enum Arg {
    Value(Value),
    Callback(CallbackHandle),
}

impl Arg {
    /// The marshaled value of a typed parameter. Reading a callback
    /// parameter as a value is a registration bug and panics.
    pub fn into_value(self) -> Value {
        match self {
            Arg::Value(value) => value,
            Arg::Callback(_) => panic!("method body read a callback parameter as a value"),
        }
    }

    /// The handle of a callback parameter. Reading a typed parameter as a
    /// callback is a registration bug and panics.
    pub fn into_callback(self) -> CallbackHandle {
        match self {
            Arg::Callback(handle) => handle,
            Arg::Value(_) => panic!("method body read a value parameter as a callback"),
        }
    }
}

/// What a method invocation yields: a plain value or a future of one.
#[derive(Debug)]
pub enum MethodResult {
    Value(Value),
    Future(Promise),
}

impl MethodResult {
    /// The conventional void return.
    pub fn void() -> MethodResult {
        MethodResult::Value(Value::Null)
    }

    /// Unwrap a plain return value; panics on a future (caller bug).
    pub fn expect_value(self) -> Value {
        match self {
            MethodResult::Value(value) => value,
            MethodResult::Future(_) => panic!("expected a plain return value, got a future"),
        }
    }

    /// Unwrap a future return; panics on a plain value (caller bug).
    pub fn expect_future(self) -> Promise {
        match self {
            MethodResult::Future(promise) => promise,
            MethodResult::Value(value) => panic!("expected a future, got {value:?}"),
        }
    }
}

type MethodBody =
    Box<dyn Fn(&mut (dyn Any + Send), &MethodScope, Vec<Arg>) -> Result<MethodResult> + Send + Sync>;

/// One registered method: parameter and return descriptors plus the body.
pub struct MethodDef {
    pub(crate) params: Vec<ParamSpec>,
    pub(crate) ret: ReturnSpec,
    body: MethodBody,
}

impl MethodDef {
    pub fn new<S, F>(params: Vec<ParamSpec>, ret: ReturnSpec, body: F) -> MethodDef
    where
        S: Any + Send,
        F: Fn(&mut S, &MethodScope, Vec<Arg>) -> Result<MethodResult> + Send + Sync + 'static,
    {
        MethodDef {
            params,
            ret,
            body: Box::new(move |state, scope, args| {
                let state = state
                    .downcast_mut::<S>()
                    .expect("method body: state type confusion");
                body(state, scope, args)
            }),
        }
    }
}

/// Ambient facilities available to a method body.
pub struct MethodScope {
    ctx: ContextHandle,
    this: Handle,
    state: StateCell,
    ret: ReturnSpec,
}

impl MethodScope {
    pub fn context(&self) -> &ContextHandle {
        &self.ctx
    }

    /// Raw handle of the receiving object.
    pub fn this(&self) -> Handle {
        self.this
    }

    /// The shared state cell, for native callables that outlive the call.
    pub fn state(&self) -> StateCell {
        self.state.clone()
    }

    /// Construct a fresh hybrid object of a registered type; methods may
    /// return newly created instances.
    pub fn create(&self, type_name: &str, args: &[Value]) -> Result<ObjectHandle> {
        crate::object::create_instance(type_name, args, &self.ctx)
    }

    /// Run `work` on a native worker context and return a future settled on
    /// the scripting context with the result, validated against the declared
    /// resolution type. Only valid in methods declared to return a future.
    pub fn spawn_async<F>(&self, work: F) -> Result<MethodResult>
    where
        F: Future<Output = std::result::Result<Value, String>> + Send + 'static,
    {
        match &self.ret {
            ReturnSpec::Future(ty) => Ok(MethodResult::Future(crate::async_bridge::run_async(
                &self.ctx, *ty, work,
            ))),
            _ => panic!("spawn_async from a method not declared to return a future"),
        }
    }
}

/// Lock the shared state cell and run `f` against the typed state. For use
/// by native callables captured out of a method body.
pub fn with_state<S: Any + Send, R>(cell: &StateCell, f: impl FnOnce(&mut S) -> R) -> R {
    let mut guard = cell.lock().unwrap();
    let state = (&mut **guard)
        .downcast_mut::<S>()
        .expect("state type confusion");
    f(state)
}

enum Staged {
    Value(Value),
    Function(ScriptFunction),
    Wrapped(CallbackHandle),
}

pub(crate) fn invoke(
    this: Handle,
    inst: &Instance,
    name: &str,
    args: Vec<CallArg>,
) -> Result<MethodResult> {
    let def = inst
        .type_def
        .method(name)
        .ok_or_else(|| BridgeError::NoSuchMethod(name.to_string()))?;

    if args.len() != def.params.len() {
        return Err(BridgeError::ArityMismatch {
            method: name.to_string(),
            expected: def.params.len(),
            actual: args.len(),
        });
    }

    // Phase one validates every argument; nothing is wrapped or mutated
    // until the whole call is known to be well-formed.
    let mut staged = Vec::with_capacity(args.len());
    for (arg, spec) in args.into_iter().zip(&def.params) {
        match (arg, spec) {
            (CallArg::Value(value), ParamSpec::Typed(ty)) => {
                staged.push(Staged::Value(marshal::to_native(value, ty)?));
            }
            (CallArg::Function(func), ParamSpec::Callback) => {
                staged.push(Staged::Function(func));
            }
            // An already-wrapped script function is accepted where a
            // callback is declared.
            (CallArg::Value(Value::Callable(Callable::Script(handle))), ParamSpec::Callback) => {
                staged.push(Staged::Wrapped(handle));
            }
            (CallArg::Value(value), ParamSpec::Callback) => {
                return Err(BridgeError::mismatch("scripting function", value.kind()));
            }
            (CallArg::Function(_), ParamSpec::Typed(ty)) => {
                return Err(BridgeError::mismatch(ty.to_string(), "callable"));
            }
        }
    }

    let mut marshaled = Vec::with_capacity(staged.len());
    for arg in staged {
        marshaled.push(match arg {
            Staged::Value(value) => Arg::Value(value),
            Staged::Function(func) => {
                Arg::Callback(callback::wrap(&inst.ctx, func, Some(this)))
            }
            Staged::Wrapped(handle) => Arg::Callback(handle),
        });
    }

    log::debug!("dispatch {}::{name} on #{this}", inst.type_def.name());
    let scope = MethodScope {
        ctx: inst.ctx.clone(),
        this,
        state: inst.state.clone(),
        ret: def.ret.clone(),
    };
    let result = {
        let mut guard = inst.state.lock().unwrap();
        (def.body)(&mut **guard, &scope, marshaled)?
    };

    // The body's return shape must agree with the descriptor; disagreement
    // is a registration bug, not a caller mistake.
    match (&def.ret, result) {
        (ReturnSpec::Void, MethodResult::Value(Value::Null)) => Ok(MethodResult::void()),
        (ReturnSpec::Typed(ty), MethodResult::Value(value)) => {
            Ok(MethodResult::Value(marshal::to_scripting(value, ty)?))
        }
        (ReturnSpec::Future(_), MethodResult::Future(promise)) => {
            Ok(MethodResult::Future(promise))
        }
        (ret, _) => panic!("method '{name}' return shape disagrees with its descriptor {ret:?}"),
    }
}
