//! Native worker pool and the handoff back to the scripting context.
//!
//! Long-running native work runs on a shared multi-threaded runtime so it
//! never blocks the scripting thread. Completion crosses back as a queued
//! task on the owning context, where the promise is settled; the resolution
//! value is validated against the declared type before it is handed over.

use std::future::Future;

use once_cell::sync::Lazy;
use tokio::runtime::Runtime;

use crate::context::ContextHandle;
use crate::error::BridgeError;
use crate::marshal;
use crate::promise::Promise;
use crate::value::{Value, ValueType};

static RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .thread_name("bridge-worker")
        .enable_all()
        .build()
        .expect("failed to start the bridge worker runtime")
});

/// The shared worker runtime.
pub fn runtime() -> &'static Runtime {
    &RUNTIME
}

/// Spawn detached native work on the worker pool.
pub fn spawn<F>(work: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    RUNTIME.spawn(work);
}

/// Drive a future to completion from a non-async caller. Must not be called
/// from the scripting thread while the same context is being pumped.
pub fn block_on<F: Future>(work: F) -> F::Output {
    RUNTIME.block_on(work)
}

/// Run `work` on the worker pool and hand back a promise that settles on the
/// scripting context. A successful result must carry the declared resolution
/// type; anything else rejects the promise.
pub fn run_async<F>(ctx: &ContextHandle, declared: ValueType, work: F) -> Promise
where
    F: Future<Output = std::result::Result<Value, String>> + Send + 'static,
{
    let promise = Promise::pending(ctx);
    let settle = promise.clone();
    let ctx = ctx.clone();
    RUNTIME.spawn(async move {
        let outcome = work.await;
        ctx.schedule(Box::new(move || match outcome {
            Ok(value) => match marshal::to_scripting(value, &declared) {
                Ok(value) => settle.resolve(value),
                Err(err) => {
                    log::error!("async result failed validation: {err}");
                    settle.reject(BridgeError::AsyncFailure(err.to_string()));
                }
            },
            Err(message) => {
                log::error!("async work failed: {message}");
                settle.reject(BridgeError::AsyncFailure(message));
            }
        }));
    });
    promise
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ScriptContext;
    use std::time::Duration;

    #[test]
    fn async_work_settles_on_the_scripting_context() {
        let context = ScriptContext::new();
        let promise = run_async(&context.handle(), ValueType::Int, async { Ok(Value::Int(41)) });
        assert_eq!(
            context.block_on(&promise, Duration::from_secs(5)),
            Ok(Value::Int(41))
        );
    }

    #[test]
    fn failed_work_rejects_the_promise() {
        let context = ScriptContext::new();
        let promise = run_async(&context.handle(), ValueType::Int, async {
            Err("worker exploded".to_string())
        });
        assert_eq!(
            context.block_on(&promise, Duration::from_secs(5)),
            Err(BridgeError::AsyncFailure("worker exploded".to_string()))
        );
    }

    #[test]
    fn mistyped_results_reject_instead_of_resolving() {
        let context = ScriptContext::new();
        let promise = run_async(&context.handle(), ValueType::Int, async {
            Ok(Value::Str("not an int".to_string()))
        });
        assert!(matches!(
            context.block_on(&promise, Duration::from_secs(5)),
            Err(BridgeError::AsyncFailure(_))
        ));
    }
}
