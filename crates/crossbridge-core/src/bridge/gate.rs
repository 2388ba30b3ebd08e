//! Concurrency gate
//!
//! Native functions and methods carry a [`GateFlag`]. When set, a call from
//! dynamic code releases the execution lock for the duration of the native
//! body and reacquires it before the result is marshaled back. Dispatch
//! stubs always reacquire the lock before running an override, so a native
//! body running unlocked can still call back into dynamic code.
//!
//! [`DynThread`] is a host thread that runs dynamic code: it holds the
//! execution lock while its body runs, and waiting on it releases the lock
//! so the worker can make progress.

use crate::bridge::{DynException, DynResult, ExceptionBridge};
use crate::interp::Interpreter;
use crate::marshal;
use crate::native::NativeFunction;
use crate::value::DynValue;
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Per-function "release the execution lock" flag.
#[derive(Debug, Default)]
pub struct GateFlag(AtomicBool);

impl GateFlag {
    /// Create a flag
    pub fn new(release: bool) -> Self {
        Self(AtomicBool::new(release))
    }

    /// Set or clear the flag
    pub fn set(&self, release: bool) {
        self.0.store(release, Ordering::Release);
    }

    /// Check if calls release the lock
    pub fn releases(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Lock-release policy for native calls made from dynamic code.
pub struct ConcurrencyGate;

impl ConcurrencyGate {
    /// Call a free native function with dynamic arguments.
    pub fn call(interp: &Interpreter, func: &NativeFunction, args: &[DynValue]) -> DynResult<DynValue> {
        if args.len() != func.params().len() {
            return Err(DynException::type_error(format!(
                "{}() takes {} arguments but {} were given",
                func.name(),
                func.params().len(),
                args.len()
            )));
        }
        let context = format!("argument of '{}'", func.name());
        let native_args = args
            .iter()
            .zip(func.params())
            .map(|(arg, ty)| marshal::to_native(arg, ty, &context))
            .collect::<Result<Vec<_>, _>>()
            .map_err(ExceptionBridge::raise)?;

        let result = Self::run(interp, func.gate(), || func.invoke(&native_args));
        result.map(marshal::to_dynamic).map_err(ExceptionBridge::raise)
    }

    /// Run a native body, releasing the execution lock around it when the
    /// flag is set. The lock is reacquired before returning, on every path.
    pub fn run<T, F>(interp: &Interpreter, flag: &GateFlag, body: F) -> T
    where
        F: FnOnce() -> T,
    {
        if !flag.releases() {
            return body();
        }
        interp.counters().record_gated();
        let suspension = interp.lock().suspend();
        tracing::trace!(released = suspension.released(), "native call running unlocked");
        let result = body();
        drop(suspension);
        result
    }

    /// Sleep with the execution lock released
    pub fn sleep(interp: &Interpreter, duration: Duration) {
        let _suspension = interp.lock().suspend();
        thread::sleep(duration);
    }

    /// Let other threads waiting on the execution lock run
    pub fn yield_now(interp: &Interpreter) {
        let _suspension = interp.lock().suspend();
        thread::yield_now();
    }
}

/// Cooperative stop request shared between a controller and a worker.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Create an unset signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Check if a stop was requested
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A host thread running dynamic code.
pub struct DynThread<T> {
    name: String,
    interp: Interpreter,
    handle: Option<JoinHandle<()>>,
    result: Receiver<DynResult<T>>,
    finished: Option<DynResult<T>>,
    alive: Arc<AtomicBool>,
}

impl<T: Send + 'static> DynThread<T> {
    /// Start a thread that runs `body` holding the execution lock.
    ///
    /// A panic in `body` is reported as a `RuntimeError` from [`join`](Self::join).
    pub fn spawn<F>(interp: &Interpreter, body: F) -> DynResult<Self>
    where
        F: FnOnce(&Interpreter) -> T + Send + 'static,
    {
        static NEXT: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(1);
        let name = format!(
            "{}-{}",
            interp.options().thread_name_prefix,
            NEXT.fetch_add(1, Ordering::Relaxed)
        );
        let (tx, rx) = channel::bounded(1);
        let alive = Arc::new(AtomicBool::new(true));

        let worker_interp = interp.clone();
        let worker_alive = alive.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let outcome = {
                    let _guard = worker_interp.enter();
                    panic::catch_unwind(AssertUnwindSafe(|| body(&worker_interp)))
                };
                let outcome = outcome.map_err(|payload| {
                    DynException::runtime_error(format!("thread panicked: {}", panic_message(&payload)))
                });
                worker_alive.store(false, Ordering::Release);
                let _ = tx.send(outcome);
            })
            .map_err(|e| DynException::runtime_error(format!("failed to start thread: {}", e)))?;

        tracing::debug!(thread = %name, "dynamic thread started");
        Ok(Self {
            name,
            interp: interp.clone(),
            handle: Some(handle),
            result: rx,
            finished: None,
            alive,
        })
    }

    /// Thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the body is still running
    pub fn is_alive(&self) -> bool {
        self.finished.is_none() && self.alive.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for the body to finish, with the execution lock
    /// released. Returns `true` if it finished.
    pub fn join_timeout(&mut self, timeout: Duration) -> bool {
        if self.finished.is_some() {
            return true;
        }
        let received = {
            let _suspension = self.interp.lock().suspend();
            self.result.recv_timeout(timeout)
        };
        match received {
            Ok(outcome) => self.finished = Some(outcome),
            Err(RecvTimeoutError::Timeout) => return false,
            Err(RecvTimeoutError::Disconnected) => {
                self.finished = Some(Err(DynException::runtime_error(format!(
                    "thread '{}' exited without a result",
                    self.name
                ))))
            }
        }
        self.reap();
        true
    }

    /// Wait for the body to finish and take its result.
    pub fn join(mut self) -> DynResult<T> {
        let outcome = match self.finished.take() {
            Some(outcome) => outcome,
            None => {
                let _suspension = self.interp.lock().suspend();
                self.result.recv().unwrap_or_else(|_| {
                    Err(DynException::runtime_error(format!(
                        "thread '{}' exited without a result",
                        self.name
                    )))
                })
            }
        };
        self.reap();
        tracing::debug!(thread = %self.name, ok = outcome.is_ok(), "dynamic thread joined");
        outcome
    }

    fn reap(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _suspension = self.interp.lock().suspend();
            let _ = handle.join();
        }
    }
}

impl<T> std::fmt::Debug for DynThread<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynThread")
            .field("name", &self.name)
            .field("alive", &self.alive.load(Ordering::Acquire))
            .finish()
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
