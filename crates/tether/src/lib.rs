//! Typed bridge between a scripting environment and native objects.
//!
//! Native types register a constructor, typed properties, and typed methods
//! through [`TypeDef::builder`]; the scripting side holds instances as
//! [`ObjectHandle`]s and reaches native state exclusively through those
//! declared surfaces. Every crossing validates the runtime value tag against
//! the declared type, with no silent coercion.
//!
//! Threading model: one [`ScriptContext`] owns all script-visible execution.
//! Callbacks passed into methods are retained on that context and may be
//! invoked from native workers, which transparently redirect to the owning
//! thread. Methods declared to return futures run on a shared worker pool and
//! settle a [`Promise`] back on the scripting context.

pub mod async_bridge;
pub mod callback;
pub mod context;
pub mod error;
pub mod marshal;
pub mod method;
pub mod object;
pub mod promise;
pub mod property;
pub mod value;

pub use callback::{wrap as wrap_callback, CallbackHandle, ScriptFunction};
pub use context::{ContextHandle, ScriptContext, Task};
pub use error::{BridgeError, Result};
pub use marshal::{FromValue, IntoValue};
pub use method::{
    with_state, Arg, CallArg, MethodDef, MethodResult, MethodScope, ParamSpec, ReturnSpec,
};
pub use object::{
    create_instance, expose_instance, register_type, Handle, ObjectHandle, StateCell, TypeDef,
    TypeDefBuilder, INVALID_HANDLE,
};
pub use promise::Promise;
pub use value::{Callable, EnumDef, NativeFn, Value, ValueType};
