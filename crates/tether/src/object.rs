//! Object lifetime bridge: type registry, instance table, identity table.
//!
//! Native objects are stored in a process-wide registry and handed to the
//! scripting side as integer-keyed handles. The identity table guarantees
//! that repeatedly exposing the same native instance yields the same outward
//! handle instead of duplicate wrappers. When the scripting side drops its
//! last reference to a handle the bridge releases its native retention and
//! revokes the callbacks owned by the object; a native holder of the state
//! cell keeps the underlying object alive past the handle, but the handle id
//! itself is never reissued.
//!
//! The instance and identity tables are the only structures mutated from
//! multiple contexts; both are concurrent maps.

use std::any::Any;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::callback;
use crate::context::ContextHandle;
use crate::error::{BridgeError, Result};
use crate::marshal;
use crate::method::{CallArg, MethodDef, MethodResult, MethodScope, ParamSpec, ReturnSpec};
use crate::property::PropertyDef;
use crate::value::{Value, ValueType};

/// Raw instance id. 0 is reserved as invalid.
pub type Handle = i64;

pub const INVALID_HANDLE: Handle = 0;

/// Native state cell shared between the bridge and native code.
pub type StateCell = Arc<Mutex<Box<dyn Any + Send>>>;

type Constructor = Box<dyn Fn(&[Value]) -> Result<Box<dyn Any + Send>> + Send + Sync>;

/// A hybrid object type: constructor plus the per-type accessor and method
/// registries, resolved once at registration time.
pub struct TypeDef {
    name: &'static str,
    ctor_params: Vec<ValueType>,
    constructor: Constructor,
    properties: Vec<(String, PropertyDef)>,
    methods: Vec<(String, MethodDef)>,
}

impl TypeDef {
    pub fn builder(name: &'static str) -> TypeDefBuilder {
        TypeDefBuilder {
            name,
            ctor_params: Vec::new(),
            constructor: None,
            properties: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, def)| def)
    }

    pub(crate) fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, def)| def)
    }
}

/// Builder for a `TypeDef`. Duplicate property or method names and a missing
/// constructor are registration bugs and panic.
pub struct TypeDefBuilder {
    name: &'static str,
    ctor_params: Vec<ValueType>,
    constructor: Option<Constructor>,
    properties: Vec<(String, PropertyDef)>,
    methods: Vec<(String, MethodDef)>,
}

impl TypeDefBuilder {
    pub fn constructor<S, F>(mut self, params: Vec<ValueType>, ctor: F) -> Self
    where
        S: Any + Send,
        F: Fn(&[Value]) -> Result<S> + Send + Sync + 'static,
    {
        self.ctor_params = params;
        self.constructor = Some(Box::new(move |args| {
            Ok(Box::new(ctor(args)?) as Box<dyn Any + Send>)
        }));
        self
    }

    pub fn property<S, T>(
        mut self,
        name: &str,
        ty: ValueType,
        get: impl Fn(&S) -> T + Send + Sync + 'static,
        set: impl Fn(&mut S, T) + Send + Sync + 'static,
    ) -> Self
    where
        S: Any + Send,
        T: crate::marshal::IntoValue + crate::marshal::FromValue + 'static,
    {
        self.push_property(name, PropertyDef::writable(ty, get, set));
        self
    }

    pub fn readonly_property<S, T>(
        mut self,
        name: &str,
        ty: ValueType,
        get: impl Fn(&S) -> T + Send + Sync + 'static,
    ) -> Self
    where
        S: Any + Send,
        T: crate::marshal::IntoValue + 'static,
    {
        self.push_property(name, PropertyDef::readable(ty, get));
        self
    }

    pub fn method<S, F>(
        mut self,
        name: &str,
        params: Vec<ParamSpec>,
        ret: ReturnSpec,
        body: F,
    ) -> Self
    where
        S: Any + Send,
        F: Fn(&mut S, &MethodScope, Vec<crate::method::Arg>) -> Result<MethodResult>
            + Send
            + Sync
            + 'static,
    {
        if self.methods.iter().any(|(n, _)| n == name) {
            panic!("method '{name}' defined twice on {}", self.name);
        }
        self.methods
            .push((name.to_string(), MethodDef::new(params, ret, body)));
        self
    }

    fn push_property(&mut self, name: &str, def: PropertyDef) {
        if self.properties.iter().any(|(n, _)| n == name) {
            panic!("property '{name}' defined twice on {}", self.name);
        }
        self.properties.push((name.to_string(), def));
    }

    pub fn build(self) -> TypeDef {
        let constructor = self
            .constructor
            .unwrap_or_else(|| panic!("type '{}' has no constructor", self.name));
        TypeDef {
            name: self.name,
            ctor_params: self.ctor_params,
            constructor,
            properties: self.properties,
            methods: self.methods,
        }
    }

    /// Build and register in one step.
    pub fn register(self) {
        register_type(self.build());
    }
}

/// One live instance row.
#[derive(Clone)]
pub(crate) struct Instance {
    pub(crate) type_def: Arc<TypeDef>,
    pub(crate) state: StateCell,
    pub(crate) ctx: ContextHandle,
}

static TYPES: Lazy<DashMap<&'static str, Arc<TypeDef>>> = Lazy::new(DashMap::new);
static INSTANCES: Lazy<DashMap<Handle, Instance>> = Lazy::new(DashMap::new);
/// Native identity (state cell address) -> live outward handle.
static IDENTITY: Lazy<DashMap<usize, (Handle, Weak<HandleCore>)>> = Lazy::new(DashMap::new);
static NEXT_HANDLE: AtomicI64 = AtomicI64::new(1);

/// Register a hybrid object type. Registering the same name twice is a
/// startup bug and panics.
pub fn register_type(def: TypeDef) {
    let name = def.name;
    if TYPES.insert(name, Arc::new(def)).is_some() {
        panic!("hybrid object type '{name}' registered twice");
    }
    log::debug!("registered hybrid object type '{name}'");
}

fn lookup_type(name: &str) -> Result<Arc<TypeDef>> {
    TYPES
        .get(name)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| BridgeError::UnknownType(name.to_string()))
}

/// Construct a fresh native instance of a registered type and expose it.
/// Constructor arguments are checked like method arguments.
pub fn create_instance(type_name: &str, args: &[Value], ctx: &ContextHandle) -> Result<ObjectHandle> {
    let def = lookup_type(type_name)?;
    if args.len() != def.ctor_params.len() {
        return Err(BridgeError::ArityMismatch {
            method: format!("{type_name}::new"),
            expected: def.ctor_params.len(),
            actual: args.len(),
        });
    }
    let mut native_args = Vec::with_capacity(args.len());
    for (arg, ty) in args.iter().zip(&def.ctor_params) {
        native_args.push(marshal::to_native(arg.clone(), ty)?);
    }
    let state: StateCell = Arc::new(Mutex::new((def.constructor)(&native_args)?));
    Ok(expose(def, state, ctx))
}

/// Expose an existing native instance. While an outward handle for the same
/// state cell is live, the same handle is returned (identity stability);
/// once it has died, a fresh handle is issued and the old id is retired for
/// good.
pub fn expose_instance(type_name: &str, state: StateCell, ctx: &ContextHandle) -> Result<ObjectHandle> {
    let def = lookup_type(type_name)?;
    Ok(expose(def, state, ctx))
}

fn expose(def: Arc<TypeDef>, state: StateCell, ctx: &ContextHandle) -> ObjectHandle {
    let identity = Arc::as_ptr(&state) as *const () as usize;
    match IDENTITY.entry(identity) {
        Entry::Occupied(mut occupied) => {
            if let Some(core) = occupied.get().1.upgrade() {
                return ObjectHandle { core };
            }
            // The previous handle died between its table cleanup and now;
            // replace the row rather than duplicate it.
            let core = new_instance(def, state, ctx, identity);
            occupied.insert((core.raw, Arc::downgrade(&core)));
            ObjectHandle { core }
        }
        Entry::Vacant(vacant) => {
            let core = new_instance(def, state, ctx, identity);
            vacant.insert((core.raw, Arc::downgrade(&core)));
            ObjectHandle { core }
        }
    }
}

fn new_instance(
    def: Arc<TypeDef>,
    state: StateCell,
    ctx: &ContextHandle,
    identity: usize,
) -> Arc<HandleCore> {
    let raw = NEXT_HANDLE.fetch_add(1, Ordering::SeqCst);
    log::debug!("created {} instance #{raw}", def.name);
    INSTANCES.insert(
        raw,
        Instance {
            type_def: def,
            state,
            ctx: ctx.clone(),
        },
    );
    Arc::new(HandleCore {
        raw,
        identity,
        ctx: ctx.clone(),
    })
}

struct HandleCore {
    raw: Handle,
    identity: usize,
    ctx: ContextHandle,
}

impl Drop for HandleCore {
    fn drop(&mut self) {
        if INSTANCES.remove(&self.raw).is_none() {
            // Every outward handle must outlive its instance row.
            panic!("instance table corrupted: missing entry #{}", self.raw);
        }
        IDENTITY.remove_if(&self.identity, |_, (raw, _)| *raw == self.raw);
        let raw = self.raw;
        self.ctx
            .schedule(Box::new(move || callback::revoke_owned_by(raw)));
        log::debug!("released instance #{raw}");
    }
}

/// Outward-facing handle held by the scripting side. Cloning is cheap; the
/// native retention is released when the last clone drops.
#[derive(Clone)]
pub struct ObjectHandle {
    core: Arc<HandleCore>,
}

impl ObjectHandle {
    pub fn raw(&self) -> Handle {
        self.core.raw
    }

    pub fn type_name(&self) -> &'static str {
        self.instance().type_def.name
    }

    /// Read a property through its declared type.
    pub fn get(&self, name: &str) -> Result<Value> {
        crate::property::get(&self.instance(), name)
    }

    /// Write a property through its declared type; the mutation is visible
    /// to the next `get` on the same context.
    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        crate::property::set(&self.instance(), name, value)
    }

    /// Invoke a registered method with positional arguments.
    pub fn invoke(&self, name: &str, args: Vec<CallArg>) -> Result<MethodResult> {
        crate::method::invoke(self.core.raw, &self.instance(), name, args)
    }

    /// JSON snapshot of every readable property, in registration order where
    /// the JSON map preserves it.
    pub fn to_json(&self) -> serde_json::Value {
        let inst = self.instance();
        let mut map = serde_json::Map::new();
        for (name, _) in &inst.type_def.properties {
            let value = crate::property::get(&inst, name)
                .map(|v| v.to_json())
                .unwrap_or(serde_json::Value::Null);
            map.insert(name.clone(), value);
        }
        serde_json::Value::Object(map)
    }

    // The row is cloned out (cheap: three refcounts) rather than borrowed so
    // dispatch never holds a map shard lock while user code runs.
    fn instance(&self) -> Instance {
        INSTANCES
            .get(&self.core.raw)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| panic!("instance table corrupted: missing entry #{}", self.core.raw))
    }
}

impl PartialEq for ObjectHandle {
    fn eq(&self, other: &Self) -> bool {
        self.core.raw == other.core.raw
    }
}

impl std::fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectHandle(#{})", self.core.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ScriptContext;
    use std::sync::Once;

    struct Counter {
        count: i64,
    }

    static REGISTER: Once = Once::new();

    fn register_counter() {
        REGISTER.call_once(|| {
            TypeDef::builder("object_tests::Counter")
                .constructor(vec![ValueType::Int], |args| {
                    let start = match args {
                        [Value::Int(i)] => *i,
                        _ => 0,
                    };
                    Ok(Counter { count: start })
                })
                .property(
                    "count",
                    ValueType::Int,
                    |s: &Counter| s.count,
                    |s: &mut Counter, v| s.count = v,
                )
                .register();
        });
    }

    #[test]
    fn unknown_type_is_rejected() {
        let context = ScriptContext::new();
        let err = create_instance("object_tests::Missing", &[], &context.handle()).unwrap_err();
        assert_eq!(err, BridgeError::UnknownType("object_tests::Missing".to_string()));
    }

    #[test]
    fn constructor_arity_is_checked() {
        register_counter();
        let context = ScriptContext::new();
        let err = create_instance("object_tests::Counter", &[], &context.handle()).unwrap_err();
        assert!(matches!(err, BridgeError::ArityMismatch { expected: 1, actual: 0, .. }));
    }

    #[test]
    fn exposing_the_same_state_reuses_the_handle() {
        register_counter();
        let context = ScriptContext::new();
        let ctx = context.handle();
        let state: StateCell = Arc::new(Mutex::new(Box::new(Counter { count: 3 })));

        let a = expose_instance("object_tests::Counter", state.clone(), &ctx).unwrap();
        let b = expose_instance("object_tests::Counter", state.clone(), &ctx).unwrap();
        assert_eq!(a.raw(), b.raw());

        let retired = a.raw();
        drop(a);
        drop(b);

        // The native side still holds the state, so it can be re-exposed,
        // but under a fresh id: dead handles are never reissued.
        let c = expose_instance("object_tests::Counter", state, &ctx).unwrap();
        assert_ne!(c.raw(), retired);
        assert_eq!(c.get("count"), Ok(Value::Int(3)));
    }

    #[test]
    fn dropping_the_last_handle_releases_the_instance() {
        register_counter();
        let context = ScriptContext::new();
        let handle =
            create_instance("object_tests::Counter", &[Value::Int(0)], &context.handle()).unwrap();
        let raw = handle.raw();
        let clone = handle.clone();
        drop(handle);
        assert!(INSTANCES.contains_key(&raw), "clone keeps the row alive");
        drop(clone);
        assert!(!INSTANCES.contains_key(&raw));
    }
}
