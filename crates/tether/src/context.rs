//! The scripting execution context: a single-threaded cooperative task queue.
//!
//! All script-visible work (callback invocations, promise settlements) runs
//! on the one thread that owns the `ScriptContext`. Native workers never call
//! into scripting state directly; they queue tasks through a `ContextHandle`
//! and the owning thread drains them with `pump`, the way a host event loop
//! would between script turns.

use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crate::error::{BridgeError, Result};
use crate::promise::Promise;
use crate::value::Value;

/// A unit of work scheduled onto the scripting context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// The scripting-side event loop. Owned by exactly one thread; not `Send`.
pub struct ScriptContext {
    rx: Receiver<Task>,
    handle: ContextHandle,
}

/// Cloneable, thread-safe reference to a context's queue.
#[derive(Clone)]
pub struct ContextHandle {
    tx: Sender<Task>,
    thread: ThreadId,
}

impl ScriptContext {
    /// Create a context owned by the calling thread.
    pub fn new() -> ScriptContext {
        let (tx, rx) = channel();
        ScriptContext {
            rx,
            handle: ContextHandle {
                tx,
                thread: thread::current().id(),
            },
        }
    }

    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }

    /// Drain every task currently queued. Returns the number processed.
    pub fn pump(&self) -> usize {
        let mut ran = 0;
        loop {
            match self.rx.try_recv() {
                Ok(task) => {
                    task();
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        ran
    }

    /// Pump the queue until `done` reports true or the timeout elapses.
    /// Returns false on timeout.
    pub fn run_until(&self, mut done: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match self.rx.recv_timeout(deadline - now) {
                Ok(task) => task(),
                Err(RecvTimeoutError::Timeout) => return false,
                // The context itself keeps a sender alive, so this arm is
                // unreachable in practice.
                Err(RecvTimeoutError::Disconnected) => return done(),
            }
        }
    }

    /// Pump until the promise settles and return its result. This is the
    /// awaiting pattern for hosts without their own event loop (tests, the
    /// demo binary).
    pub fn block_on(&self, promise: &Promise, timeout: Duration) -> Result<Value> {
        self.run_until(|| promise.is_settled(), timeout);
        match promise.settled() {
            Some(result) => result,
            None => Err(BridgeError::AsyncFailure(format!(
                "promise not settled within {timeout:?}"
            ))),
        }
    }
}

impl Default for ScriptContext {
    fn default() -> Self {
        ScriptContext::new()
    }
}

impl ContextHandle {
    /// True when called from the thread that owns the context.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread
    }

    /// Queue a task for the owning thread. Tasks scheduled on a dropped
    /// context are discarded.
    pub fn schedule(&self, task: Task) {
        if self.tx.send(task).is_err() {
            log::warn!("task scheduled on a dropped scripting context");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn pump_runs_queued_tasks_in_order() {
        let context = ScriptContext::new();
        let log: Arc<std::sync::Mutex<Vec<u32>>> = Arc::default();
        for i in 0..3 {
            let log = log.clone();
            context
                .handle()
                .schedule(Box::new(move || log.lock().unwrap().push(i)));
        }
        assert_eq!(context.pump(), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn tasks_from_other_threads_run_on_the_owning_thread() {
        let context = ScriptContext::new();
        let handle = context.handle();
        let owner = thread::current().id();
        let ran = Arc::new(AtomicUsize::new(0));
        let observed = ran.clone();

        let worker = thread::spawn(move || {
            assert!(!handle.is_current());
            handle.schedule(Box::new(move || {
                assert_eq!(thread::current().id(), owner);
                observed.fetch_add(1, Ordering::SeqCst);
            }));
        });

        assert!(context.run_until(|| ran.load(Ordering::SeqCst) == 1, Duration::from_secs(5)));
        worker.join().unwrap();
    }
}
