//! Error taxonomy for the bridge boundary.
//!
//! Everything here is a recoverable, synchronous error signal raised to the
//! calling context as soon as it is detected. Broken internal invariants
//! (double promise settlement, corrupted instance tables, state type
//! confusion) are not represented here; those panic, and the release profile
//! aborts on panic.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors observable by a scripting caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// A value's runtime tag disagrees with the declared type. Values are
    /// never coerced silently.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// An enum value outside the closed set of declared variant names.
    #[error("unknown variant '{variant}' for enum {enum_name}")]
    UnknownEnumVariant { enum_name: String, variant: String },

    #[error("no such property '{0}'")]
    NoSuchProperty(String),

    #[error("no such method '{0}'")]
    NoSuchMethod(String),

    #[error("property '{0}' is read-only")]
    ReadOnlyProperty(String),

    /// Wrong positional argument count. Raised before any argument is
    /// marshaled, so a failed call never leaves partial state behind.
    #[error("{method} expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        method: String,
        expected: usize,
        actual: usize,
    },

    /// Factory call against a type name that was never registered.
    #[error("no registered hybrid object type '{0}'")]
    UnknownType(String),

    /// A callback handle used after its owning object was destroyed (or
    /// after the scripting context itself went away).
    #[error("callback invoked after its owning object was destroyed")]
    StaleCallback,

    /// Native async work failed. This variant only ever travels through
    /// promise rejection, never by throwing on the call that started the
    /// operation.
    #[error("async operation failed: {0}")]
    AsyncFailure(String),
}

impl BridgeError {
    pub fn mismatch(expected: impl Into<String>, actual: impl Into<String>) -> BridgeError {
        BridgeError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
