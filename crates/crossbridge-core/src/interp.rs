//! Interpreter handle
//!
//! An [`Interpreter`] is the dynamic host runtime every bridged class is
//! declared in. It owns:
//! - The execution lock
//! - Options
//! - Call counters
//! - The diagnostic log of lifetime warnings

use crate::bridge::{ClassBridge, ClassDecl, ConcurrencyGate, DynClass, DynResult, ExceptionBridge};
use crate::lock::{ExecutionGuard, ExecutionLock};
use crate::native::NativeFunction;
use crate::value::DynValue;
use crossbridge_sdk::LifetimeWarning;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for an Interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterpreterId(u64);

impl InterpreterId {
    /// Create a new unique interpreter ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        InterpreterId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for InterpreterId {
    fn default() -> Self {
        Self::new()
    }
}

/// Interpreter configuration
#[derive(Debug, Clone)]
pub struct InterpreterOptions {
    /// Emit a lifetime warning when a subclass names a base without a
    /// virtual destructor
    pub warn_missing_virtual_dtor: bool,

    /// Name prefix for threads spawned through `DynThread`
    pub thread_name_prefix: String,

    /// Treat a non-None value returned for a void slot as a type mismatch
    pub strict_void_returns: bool,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            warn_missing_virtual_dtor: true,
            thread_name_prefix: "crossbridge-worker".to_string(),
            strict_void_returns: false,
        }
    }
}

/// Call accounting
#[derive(Debug, Default)]
pub struct InterpreterCounters {
    /// Native virtual calls routed into a dynamic override
    dispatches: AtomicU64,

    /// Dynamic exceptions carried back through native frames
    propagated: AtomicU64,

    /// Native calls made with the execution lock released
    gated_calls: AtomicU64,
}

impl InterpreterCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of override dispatches
    pub fn dispatches(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }

    /// Number of propagated exceptions
    pub fn propagated(&self) -> u64 {
        self.propagated.load(Ordering::Relaxed)
    }

    /// Number of lock-released native calls
    pub fn gated_calls(&self) -> u64 {
        self.gated_calls.load(Ordering::Relaxed)
    }

    pub(crate) fn record_dispatch(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_propagated(&self) {
        self.propagated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_gated(&self) {
        self.gated_calls.fetch_add(1, Ordering::Relaxed);
    }
}

struct InterpreterInner {
    id: InterpreterId,
    options: InterpreterOptions,
    lock: ExecutionLock,
    counters: InterpreterCounters,
    diagnostics: Mutex<Vec<LifetimeWarning>>,
}

/// Shared handle to a dynamic host runtime.
#[derive(Clone)]
pub struct Interpreter {
    inner: Arc<InterpreterInner>,
}

impl Interpreter {
    /// Create a new interpreter with default options
    pub fn new() -> Self {
        Self::with_options(InterpreterOptions::default())
    }

    /// Create a new interpreter with specific options
    pub fn with_options(options: InterpreterOptions) -> Self {
        Self {
            inner: Arc::new(InterpreterInner {
                id: InterpreterId::new(),
                options,
                lock: ExecutionLock::new(),
                counters: InterpreterCounters::new(),
                diagnostics: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Get the interpreter ID
    pub fn id(&self) -> InterpreterId {
        self.inner.id
    }

    /// Get the options
    pub fn options(&self) -> &InterpreterOptions {
        &self.inner.options
    }

    /// Get the execution lock
    pub fn lock(&self) -> &ExecutionLock {
        &self.inner.lock
    }

    /// Enter dynamic code on the current thread (acquire the execution lock)
    pub fn enter(&self) -> ExecutionGuard<'_> {
        self.inner.lock.acquire()
    }

    /// Get call counters
    pub fn counters(&self) -> &InterpreterCounters {
        &self.inner.counters
    }

    /// All lifetime warnings emitted so far, oldest first
    pub fn diagnostics(&self) -> Vec<LifetimeWarning> {
        self.inner.diagnostics.lock().clone()
    }

    pub(crate) fn record_warning(&self, warning: LifetimeWarning) {
        self.inner.diagnostics.lock().push(warning);
    }

    /// Declare a dynamic subclass of one or more native interfaces
    pub fn declare_class(&self, decl: ClassDecl) -> DynResult<Arc<DynClass>> {
        ClassBridge::build(self, decl).map_err(ExceptionBridge::raise)
    }

    /// Call a native function from dynamic code.
    ///
    /// Releases the execution lock for the duration of the native body when
    /// the function's gate flag is set.
    pub fn call_native(&self, func: &NativeFunction, args: &[DynValue]) -> DynResult<DynValue> {
        ConcurrencyGate::call(self, func, args)
    }

    /// Check if two handles refer to the same interpreter
    pub fn ptr_eq(&self, other: &Interpreter) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("id", &self.inner.id)
            .field("options", &self.inner.options)
            .finish()
    }
}
