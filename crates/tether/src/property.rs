//! Property accessor table: typed getter/setter pairs backed by native fields.
//!
//! Accessors are resolved at registration time. A `get` routes the native
//! field through the marshaler against the property's declared type; a `set`
//! marshals first and then mutates native state synchronously, visible to the
//! next `get` on the same context. There is no caching layer in between.

use std::any::Any;

use crate::error::{BridgeError, Result};
use crate::marshal::{self, FromValue, IntoValue};
use crate::object::Instance;
use crate::value::{Value, ValueType};

type Getter = Box<dyn Fn(&(dyn Any + Send)) -> Value + Send + Sync>;
type Setter = Box<dyn Fn(&mut (dyn Any + Send), Value) -> Result<()> + Send + Sync>;

/// One registered property: declared type plus accessor pair. A property
/// without a setter is read-only.
pub struct PropertyDef {
    pub(crate) ty: ValueType,
    getter: Getter,
    setter: Option<Setter>,
}

impl PropertyDef {
    /// A read-only property backed by `get`.
    pub fn readable<S, T, G>(ty: ValueType, get: G) -> PropertyDef
    where
        S: Any + Send,
        T: IntoValue,
        G: Fn(&S) -> T + Send + Sync + 'static,
    {
        PropertyDef {
            ty,
            getter: erase_getter(get),
            setter: None,
        }
    }

    /// A read-write property backed by `get` and `set`.
    pub fn writable<S, T, G, P>(ty: ValueType, get: G, set: P) -> PropertyDef
    where
        S: Any + Send,
        T: IntoValue + FromValue,
        G: Fn(&S) -> T + Send + Sync + 'static,
        P: Fn(&mut S, T) + Send + Sync + 'static,
    {
        PropertyDef {
            ty,
            getter: erase_getter(get),
            setter: Some(Box::new(move |state, value| {
                let state = state
                    .downcast_mut::<S>()
                    .expect("property setter: state type confusion");
                set(state, T::from_value(value)?);
                Ok(())
            })),
        }
    }
}

fn erase_getter<S, T, G>(get: G) -> Getter
where
    S: Any + Send,
    T: IntoValue,
    G: Fn(&S) -> T + Send + Sync + 'static,
{
    Box::new(move |state| {
        let state = state
            .downcast_ref::<S>()
            .expect("property getter: state type confusion");
        get(state).into_value()
    })
}

pub(crate) fn get(inst: &Instance, name: &str) -> Result<Value> {
    let prop = inst
        .type_def
        .property(name)
        .ok_or_else(|| BridgeError::NoSuchProperty(name.to_string()))?;
    let raw = {
        let guard = inst.state.lock().unwrap();
        (prop.getter)(&**guard)
    };
    marshal::to_scripting(raw, &prop.ty)
}

pub(crate) fn set(inst: &Instance, name: &str, value: Value) -> Result<()> {
    let prop = inst
        .type_def
        .property(name)
        .ok_or_else(|| BridgeError::NoSuchProperty(name.to_string()))?;
    let setter = prop
        .setter
        .as_ref()
        .ok_or_else(|| BridgeError::ReadOnlyProperty(name.to_string()))?;
    let value = marshal::to_native(value, &prop.ty)?;
    let mut guard = inst.state.lock().unwrap();
    setter(&mut **guard, value)
}
