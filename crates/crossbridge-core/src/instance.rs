//! Bridged instances
//!
//! A bridged instance is one [`Pair`] record holding both halves of the
//! object: the native storage (one segment per native class) and the
//! dynamic attribute dictionary. Two handle types point at it:
//!
//! - [`Instance`]: the dynamic-side handle
//! - [`NativeRef`]: the native-side handle
//!
//! Each handle type has its own liveness count. The pair is released
//! exactly once, when both counts reach zero: destroy hooks run, storage
//! and attributes are dropped.

use crate::bridge::{ConcurrencyGate, DynClass, DynResult, ExceptionBridge};
use crate::interp::Interpreter;
use crate::marshal::{self, Fit};
use crate::native::{ArgGroup, Layout, NativeInterface, VTable};
use crate::value::{DynValue, FromNative, NativeValue};
use crossbridge_sdk::{BridgeError, BridgeResult, OwnershipFlag};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Unique identifier for a bridged instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        InstanceId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Class of a bridged instance
#[derive(Clone)]
pub(crate) enum InstanceClass {
    /// Plain native class
    Native(Arc<NativeInterface>),
    /// Dynamic subclass (dispatches through its shadow type)
    Dynamic(Arc<DynClass>),
}

impl InstanceClass {
    fn name(&self) -> &str {
        match self {
            InstanceClass::Native(iface) => iface.name(),
            InstanceClass::Dynamic(class) => class.name(),
        }
    }

    fn vtable(&self) -> &VTable {
        match self {
            InstanceClass::Native(iface) => iface.vtable(),
            InstanceClass::Dynamic(class) => class.shadow().vtable(),
        }
    }

    /// Dynamic subclasses see protected members of their native bases
    fn from_derived(&self) -> bool {
        matches!(self, InstanceClass::Dynamic(_))
    }
}

#[derive(Default)]
struct Liveness {
    native: usize,
    dynamic: usize,
    released: bool,
}

/// Shared record behind both handles of a bridged instance.
pub(crate) struct Pair {
    id: InstanceId,
    interp: Interpreter,
    class: InstanceClass,
    layout: Arc<Layout>,
    storage: RwLock<Vec<Vec<NativeValue>>>,
    attrs: RwLock<FxHashMap<String, DynValue>>,
    owner: AtomicU8,
    constructed: Mutex<Vec<bool>>,
    moved: AtomicBool,
    liveness: Mutex<Liveness>,
}

impl Pair {
    pub(crate) fn new(
        interp: &Interpreter,
        class: InstanceClass,
        layout: Arc<Layout>,
        owner: OwnershipFlag,
    ) -> Arc<Pair> {
        let storage = layout.default_storage();
        let bases = layout.base_count();
        Arc::new(Pair {
            id: InstanceId::next(),
            interp: interp.clone(),
            class,
            layout,
            storage: RwLock::new(storage),
            attrs: RwLock::new(FxHashMap::default()),
            owner: AtomicU8::new(owner.as_u8()),
            constructed: Mutex::new(vec![false; bases]),
            moved: AtomicBool::new(false),
            liveness: Mutex::new(Liveness::default()),
        })
    }

    pub(crate) fn class(&self) -> &InstanceClass {
        &self.class
    }

    pub(crate) fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    pub(crate) fn interp(&self) -> &Interpreter {
        &self.interp
    }

    pub(crate) fn storage(&self) -> &RwLock<Vec<Vec<NativeValue>>> {
        &self.storage
    }

    pub(crate) fn attrs(&self) -> &RwLock<FxHashMap<String, DynValue>> {
        &self.attrs
    }

    pub(crate) fn constructed(&self) -> Vec<bool> {
        self.constructed.lock().clone()
    }

    pub(crate) fn set_constructed(&self, flags: Vec<bool>) {
        *self.constructed.lock() = flags;
    }

    pub(crate) fn mark_moved(&self) {
        self.moved.store(true, Ordering::Release);
    }

    pub(crate) fn is_released(&self) -> bool {
        self.liveness.lock().released
    }

    fn retain_native(&self) {
        self.liveness.lock().native += 1;
    }

    fn retain_dynamic(&self) {
        self.liveness.lock().dynamic += 1;
    }

    fn drop_native(&self) {
        let release = {
            let mut live = self.liveness.lock();
            live.native = live.native.saturating_sub(1);
            Self::take_release(&mut live)
        };
        if release {
            self.release();
        }
    }

    fn drop_dynamic(&self) {
        let release = {
            let mut live = self.liveness.lock();
            live.dynamic = live.dynamic.saturating_sub(1);
            Self::take_release(&mut live)
        };
        if release {
            self.release();
        }
    }

    fn take_release(live: &mut Liveness) -> bool {
        if live.native == 0 && live.dynamic == 0 && !live.released {
            live.released = true;
            true
        } else {
            false
        }
    }

    /// Destroy both halves. Runs once per pair.
    fn release(&self) {
        let constructed = std::mem::take(&mut *self.constructed.lock());
        for (index, done) in constructed.iter().enumerate().rev() {
            if !done {
                continue;
            }
            let Some(range) = self.layout.base_range(index) else {
                continue;
            };
            for seg in range.rev() {
                for hook in self.layout.segments()[seg].destroy_hooks() {
                    hook();
                }
            }
        }

        if let InstanceClass::Dynamic(class) = &self.class {
            if let Some(base) = class.shadow().bases().find(|b| !b.has_virtual_dtor()) {
                tracing::debug!(
                    instance = %self.id,
                    class = class.name(),
                    base = base.name(),
                    "released through a base without virtual destructor"
                );
            }
        }

        let storage = std::mem::take(&mut *self.storage.write());
        let attrs = std::mem::take(&mut *self.attrs.write());
        drop(storage);
        drop(attrs);
        tracing::trace!(instance = %self.id, class = self.class.name(), "bridged instance released");
    }
}

// ============================================================================
// Instance (dynamic handle)
// ============================================================================

/// Dynamic-side handle to a bridged instance.
pub struct Instance {
    pair: Arc<Pair>,
}

impl Instance {
    pub(crate) fn create(
        interp: &Interpreter,
        class: InstanceClass,
        layout: Arc<Layout>,
        owner: OwnershipFlag,
    ) -> Instance {
        Instance::from_pair(Pair::new(interp, class, layout, owner))
    }

    pub(crate) fn from_pair(pair: Arc<Pair>) -> Instance {
        pair.retain_dynamic();
        Instance { pair }
    }

    pub(crate) fn pair(&self) -> &Arc<Pair> {
        &self.pair
    }

    /// Instance ID
    pub fn id(&self) -> InstanceId {
        self.pair.id
    }

    /// Class name (dynamic subclass name for dynamic instances)
    pub fn class_name(&self) -> &str {
        self.pair.class.name()
    }

    /// Dynamic class, if this is an instance of a dynamic subclass
    pub fn dyn_class(&self) -> Option<&Arc<DynClass>> {
        match &self.pair.class {
            InstanceClass::Dynamic(class) => Some(class),
            InstanceClass::Native(_) => None,
        }
    }

    /// Native class, if this is a plain native instance
    pub fn native_class(&self) -> Option<&Arc<NativeInterface>> {
        match &self.pair.class {
            InstanceClass::Native(iface) => Some(iface),
            InstanceClass::Dynamic(_) => None,
        }
    }

    /// Interpreter the instance belongs to
    pub fn interp(&self) -> &Interpreter {
        &self.pair.interp
    }

    /// Storage layout
    pub fn layout(&self) -> &Arc<Layout> {
        &self.pair.layout
    }

    /// Check if the instance is, or derives from, the named class
    pub fn is_a(&self, name: &str) -> bool {
        is_a(&self.pair, name)
    }

    /// Check if both handles refer to the same instance
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.pair, &other.pair)
    }

    /// Current ownership flag
    pub fn ownership(&self) -> OwnershipFlag {
        OwnershipFlag::from_u8(self.pair.owner.load(Ordering::Acquire))
    }

    /// Override the ownership flag
    pub fn set_ownership(&self, flag: OwnershipFlag) {
        tracing::trace!(instance = %self.pair.id, %flag, "ownership flag set");
        self.pair.owner.store(flag.as_u8(), Ordering::Release);
    }

    /// Whether the dynamic side owns the instance
    pub fn dynamic_owns(&self) -> bool {
        self.ownership() == OwnershipFlag::Dynamic
    }

    /// Set or clear dynamic ownership; clearing hands ownership to native code
    pub fn set_dynamic_owns(&self, owns: bool) {
        let flag = if owns {
            OwnershipFlag::Dynamic
        } else {
            OwnershipFlag::Native
        };
        self.set_ownership(flag);
    }

    /// Native-side handle to the same instance
    pub fn native_ref(&self) -> NativeRef {
        NativeRef::from_pair(self.pair.clone())
    }

    /// Live handle counts as `(native, dynamic)`
    pub fn live_refs(&self) -> (usize, usize) {
        let live = self.pair.liveness.lock();
        (live.native, live.dynamic)
    }

    /// Whether every native base has been constructed
    pub fn is_initialized(&self) -> bool {
        self.pair.constructed.lock().iter().all(|done| *done)
    }

    /// Whether the native state was moved out of this instance
    pub fn is_moved(&self) -> bool {
        self.pair.moved.load(Ordering::Acquire)
    }

    /// Attribute lookup: native member, then instance attribute, then
    /// class attribute.
    pub fn get_attr(&self, name: &str) -> DynResult<DynValue> {
        let from_derived = self.pair.class.from_derived();
        if let Some((seg, idx)) = self.pair.layout.find_visible_field(name, from_derived) {
            let value = self
                .pair
                .storage
                .read()
                .get(seg)
                .and_then(|s| s.get(idx))
                .cloned()
                .unwrap_or_default();
            return Ok(marshal::to_dynamic(value));
        }
        let attr = self.pair.attrs.read().get(name).cloned();
        if let Some(value) = attr {
            return Ok(value);
        }
        if let Some(value) = self.dyn_class().and_then(|c| c.class_attr(name)) {
            return Ok(value);
        }
        Err(ExceptionBridge::raise(BridgeError::NoSuchAttribute {
            class: self.class_name().to_string(),
            name: name.to_string(),
        }))
    }

    /// Check if an attribute lookup would succeed
    pub fn has_attr(&self, name: &str) -> bool {
        self.get_attr(name).is_ok()
    }

    /// Attribute assignment: visible native members write native storage,
    /// everything else lands in the instance dictionary.
    pub fn set_attr(&self, name: &str, value: impl Into<DynValue>) -> DynResult<()> {
        let value = value.into();
        let from_derived = self.pair.class.from_derived();
        if let Some((seg, idx)) = self.pair.layout.find_visible_field(name, from_derived) {
            let ty = match self.pair.layout.field_decl(seg, idx) {
                Some(decl) => decl.ty.clone(),
                None => return Ok(()),
            };
            let native = marshal::to_native(&value, &ty, &format!("assignment to '{}'", name))
                .map_err(ExceptionBridge::raise)?;
            let old = {
                let mut storage = self.pair.storage.write();
                storage
                    .get_mut(seg)
                    .and_then(|s| s.get_mut(idx))
                    .map(|slot| std::mem::replace(slot, native))
            };
            drop(old);
            return Ok(());
        }
        let old = self.pair.attrs.write().insert(name.to_string(), value);
        drop(old);
        Ok(())
    }

    /// Method call from dynamic code.
    ///
    /// A dynamic override wins; otherwise the call resolves against the
    /// virtual table, then against non-virtual native methods.
    pub fn call_method(&self, name: &str, args: &[DynValue]) -> DynResult<DynValue> {
        if let Some(class) = self.dyn_class() {
            if let Some(method) = class.find_method(name) {
                method.check_arity(class.name(), args.len())?;
                let _guard = self.pair.interp.enter();
                return (method.body)(self, args);
            }
        }
        self.call_native_method(name, args)
            .map_err(ExceptionBridge::raise)
    }

    fn call_native_method(&self, name: &str, args: &[DynValue]) -> BridgeResult<DynValue> {
        let this = self.native_ref();
        let context = format!("argument of '{}'", name);
        let vtable = self.pair.class.vtable();
        if vtable.has_method(name) {
            let (index, native_args) = vtable.resolve(self.class_name(), name, false, |params, fit| {
                marshal::args_to_native(args, params, &context, fit)
            })?;
            let result = this.call_slot(index, &native_args)?;
            return Ok(marshal::to_dynamic(result));
        }

        let Some(overloads) = self.pair.layout.find_method(name) else {
            return Err(BridgeError::NoSuchAttribute {
                class: self.class_name().to_string(),
                name: name.to_string(),
            });
        };
        let from_derived = self.pair.class.from_derived();
        for fit in Fit::ORDER {
            for decl in overloads.iter().filter(|d| d.access.visible(from_derived)) {
                let Some(native_args) = marshal::args_to_native(args, &decl.params, &context, fit) else {
                    continue;
                };
                let result = ConcurrencyGate::run(&self.pair.interp, decl.gate(), || {
                    decl.call(&this, &native_args)
                })?;
                return Ok(marshal::to_dynamic(result));
            }
        }
        Err(BridgeError::NoSuchMethod {
            class: self.class_name().to_string(),
            method: name.to_string(),
        })
    }

    /// Base-qualified call: runs the native implementation declared by
    /// `iface`, bypassing any dynamic override.
    pub fn call_base(&self, iface: &NativeInterface, name: &str, args: &[DynValue]) -> DynResult<DynValue> {
        let context = format!("argument of '{}::{}'", iface.name(), name);
        let result = self.native_ref().call_base_with(iface, name, |params, fit| {
            marshal::args_to_native(args, params, &context, fit)
        });
        result.map(marshal::to_dynamic).map_err(ExceptionBridge::raise)
    }

    /// Initialize the native bases through the cooperative path.
    ///
    /// With a single base the arguments go to its constructor. With a
    /// composition every argument must be a tuple holding one base's
    /// constructor arguments; omitted trailing groups use default
    /// constructors.
    pub fn super_init(&self, args: &[DynValue]) -> DynResult<()> {
        let groups = if self.pair.layout.base_count() > 1 {
            args.iter()
                .enumerate()
                .map(|(i, arg)| match arg {
                    DynValue::Tuple(items) => Ok(ArgGroup::positional(items.clone())),
                    other => Err(BridgeError::type_mismatch(
                        format!("argument group {} of '{}'", i, self.class_name()),
                        "tuple",
                        other.type_name(),
                    )),
                })
                .collect::<BridgeResult<Vec<_>>>()
                .map_err(ExceptionBridge::raise)?
        } else {
            vec![ArgGroup::positional(args.to_vec())]
        };
        self.super_init_grouped(groups)
    }

    /// Initialize the native bases from explicit argument groups
    pub fn super_init_grouped(&self, groups: Vec<ArgGroup>) -> DynResult<()> {
        self.init_groups(groups).map_err(ExceptionBridge::raise)
    }

    fn init_groups(&self, groups: Vec<ArgGroup>) -> BridgeResult<()> {
        self.require_dynamic()?;
        let count = self.pair.layout.base_count();
        if groups.len() > count {
            return Err(BridgeError::type_mismatch(
                format!("argument groups of '{}'", self.class_name()),
                format!("at most {} groups", count),
                format!("{} groups", groups.len()),
            ));
        }
        let mut groups = groups.into_iter();
        for index in 0..count {
            let group = groups.next().unwrap_or_default();
            self.construct_once(index, &group)?;
        }
        Ok(())
    }

    /// Direct base initialization (`Base.__init__(self, ...)`).
    ///
    /// Only concrete bases may be initialized this way.
    pub fn init_base(&self, iface: &NativeInterface, args: &[DynValue]) -> DynResult<()> {
        self.init_base_inner(iface, args).map_err(ExceptionBridge::raise)
    }

    fn init_base_inner(&self, iface: &NativeInterface, args: &[DynValue]) -> BridgeResult<()> {
        self.require_dynamic()?;
        let index = self.pair.layout.base_index(iface).ok_or_else(|| {
            BridgeError::ConstructionAccess(format!(
                "'{}' is not a direct base of '{}'",
                iface.name(),
                self.class_name()
            ))
        })?;
        if iface.is_abstract() {
            return Err(BridgeError::ConstructionAccess(format!(
                "base '{}' is abstract and cannot be initialized directly; use super() to initialize '{}'",
                iface.name(),
                self.class_name()
            )));
        }
        self.construct_once(index, &ArgGroup::positional(args.to_vec()))
    }

    fn require_dynamic(&self) -> BridgeResult<()> {
        if self.dyn_class().is_none() {
            return Err(BridgeError::ConstructionAccess(format!(
                "'{}' is not a dynamic subclass; base initialization is not available",
                self.class_name()
            )));
        }
        Ok(())
    }

    fn construct_once(&self, index: usize, group: &ArgGroup) -> BridgeResult<()> {
        let done = self.pair.constructed.lock().get(index).copied().unwrap_or(false);
        if done {
            let base = self.pair.layout.bases().nth(index).map(|b| b.name().to_string());
            return Err(BridgeError::ConstructionAccess(format!(
                "base '{}' of '{}' is already initialized",
                base.unwrap_or_default(),
                self.class_name()
            )));
        }
        self.construct_base(index, group, self.pair.class.from_derived())
    }

    pub(crate) fn construct_base(&self, index: usize, group: &ArgGroup, from_derived: bool) -> BridgeResult<()> {
        {
            let mut storage = self.pair.storage.write();
            self.pair.layout.construct_base(index, &mut storage, group, from_derived)?;
        }
        if let Some(done) = self.pair.constructed.lock().get_mut(index) {
            *done = true;
        }
        Ok(())
    }

    /// Default-construct every base no initializer constructed.
    pub(crate) fn finish_construction(&self) -> BridgeResult<()> {
        let pending: Vec<usize> = self
            .pair
            .constructed
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, done)| !**done)
            .map(|(i, _)| i)
            .collect();
        for index in pending {
            self.construct_base(index, &ArgGroup::new(), true)?;
        }
        Ok(())
    }
}

impl Clone for Instance {
    fn clone(&self) -> Self {
        Instance::from_pair(self.pair.clone())
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.pair.drop_dynamic();
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} object at {}>", self.class_name(), self.pair.id)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.pair.id)
            .field("class", &self.class_name())
            .field("ownership", &self.ownership())
            .finish()
    }
}

fn is_a(pair: &Pair, name: &str) -> bool {
    if pair.layout.is_a(name) {
        return true;
    }
    match &pair.class {
        InstanceClass::Native(iface) => iface.is_a(name),
        InstanceClass::Dynamic(class) => class.is_a(name),
    }
}

// ============================================================================
// NativeRef (native handle)
// ============================================================================

/// Native-side handle to a bridged instance.
///
/// Virtual calls made through a `NativeRef` reach dynamic overrides; this
/// is what native code holding a base pointer or reference uses.
pub struct NativeRef {
    pair: Arc<Pair>,
}

impl NativeRef {
    pub(crate) fn from_pair(pair: Arc<Pair>) -> NativeRef {
        pair.retain_native();
        NativeRef { pair }
    }

    pub(crate) fn pair(&self) -> &Arc<Pair> {
        &self.pair
    }

    /// Instance ID
    pub fn id(&self) -> InstanceId {
        self.pair.id
    }

    /// Most-derived class name
    pub fn class_name(&self) -> &str {
        self.pair.class.name()
    }

    /// Check if the instance is, or derives from, the named class
    pub fn is_a(&self, name: &str) -> bool {
        is_a(&self.pair, name)
    }

    /// Check if both handles refer to the same instance
    pub fn ptr_eq(&self, other: &NativeRef) -> bool {
        Arc::ptr_eq(&self.pair, &other.pair)
    }

    /// Current ownership flag
    pub fn ownership(&self) -> OwnershipFlag {
        OwnershipFlag::from_u8(self.pair.owner.load(Ordering::Acquire))
    }

    /// Dynamic-side handle to the same instance
    pub fn to_dynamic(&self) -> Instance {
        Instance::from_pair(self.pair.clone())
    }

    /// Virtual call by name, dispatching to a dynamic override if present
    pub fn call_virtual(&self, name: &str, args: &[NativeValue]) -> BridgeResult<NativeValue> {
        let (index, args) = self.pair.class.vtable().resolve(self.class_name(), name, false, |params, fit| {
            marshal::coerce_args(args, params, fit)
        })?;
        self.call_slot(index, &args)
    }

    /// View through a const reference: only const-qualified slots resolve
    pub fn as_const(&self) -> ConstRef<'_> {
        ConstRef { inner: self }
    }

    /// Base-qualified call to the native implementation declared by `iface`
    pub fn call_base(&self, iface: &NativeInterface, name: &str, args: &[NativeValue]) -> BridgeResult<NativeValue> {
        self.call_base_with(iface, name, |params, fit| marshal::coerce_args(args, params, fit))
    }

    fn call_base_with<F>(&self, iface: &NativeInterface, name: &str, convert: F) -> BridgeResult<NativeValue>
    where
        F: FnMut(&[crossbridge_sdk::NativeType], Fit) -> Option<Vec<NativeValue>>,
    {
        if !self.is_a(iface.name()) {
            return Err(BridgeError::type_mismatch(
                format!("base call '{}::{}'", iface.name(), name),
                iface.name(),
                self.class_name(),
            ));
        }
        let vtable = iface.vtable();
        let (index, args) = vtable.resolve(iface.name(), name, false, convert)?;
        match vtable.get(index) {
            Some(slot) => slot.call_default(self, &args),
            None => Err(BridgeError::NoSuchMethod {
                class: iface.name().to_string(),
                method: name.to_string(),
            }),
        }
    }

    /// Non-virtual native method call from native code
    pub fn call_method(&self, name: &str, args: &[NativeValue]) -> BridgeResult<NativeValue> {
        let not_found = || BridgeError::NoSuchMethod {
            class: self.class_name().to_string(),
            method: name.to_string(),
        };
        let overloads = self.pair.layout.find_method(name).ok_or_else(not_found)?;
        for fit in Fit::ORDER {
            for decl in overloads {
                if let Some(args) = marshal::coerce_args(args, &decl.params, fit) {
                    return decl.call(self, &args);
                }
            }
        }
        Err(not_found())
    }

    /// Read a data member (native code sees every access level)
    pub fn field(&self, name: &str) -> BridgeResult<NativeValue> {
        let (seg, idx) = self.pair.layout.find_field(name).ok_or_else(|| self.no_field(name))?;
        self.read_slot(seg, idx, name)
    }

    /// Read a data member declared by a specific class
    pub fn field_of(&self, class: &str, name: &str) -> BridgeResult<NativeValue> {
        let (seg, idx) = self
            .pair
            .layout
            .find_field_in(class, name)
            .ok_or_else(|| self.no_field(name))?;
        self.read_slot(seg, idx, name)
    }

    /// Read a data member as a Rust value
    pub fn field_as<T: FromNative>(&self, name: &str) -> BridgeResult<T> {
        T::from_native(&self.field(name)?)
    }

    /// Write a data member, coercing to its declared type
    pub fn set_field(&self, name: &str, value: impl Into<NativeValue>) -> BridgeResult<()> {
        let value = value.into();
        let (seg, idx) = self.pair.layout.find_field(name).ok_or_else(|| self.no_field(name))?;
        let decl = self.pair.layout.field_decl(seg, idx).ok_or_else(|| self.no_field(name))?;
        let coerced = value.coerce(&decl.ty).ok_or_else(|| {
            BridgeError::type_mismatch(format!("member '{}'", name), &decl.ty, value.type_name())
        })?;
        let old = {
            let mut storage = self.pair.storage.write();
            storage
                .get_mut(seg)
                .and_then(|s| s.get_mut(idx))
                .map(|slot| std::mem::replace(slot, coerced))
        };
        drop(old);
        Ok(())
    }

    fn read_slot(&self, seg: usize, idx: usize, name: &str) -> BridgeResult<NativeValue> {
        self.pair
            .storage
            .read()
            .get(seg)
            .and_then(|s| s.get(idx))
            .cloned()
            .ok_or_else(|| self.no_field(name))
    }

    fn no_field(&self, name: &str) -> BridgeError {
        BridgeError::NoSuchAttribute {
            class: self.class_name().to_string(),
            name: name.to_string(),
        }
    }

    /// Invoke a resolved slot of this instance's virtual table
    pub(crate) fn call_slot(&self, index: usize, args: &[NativeValue]) -> BridgeResult<NativeValue> {
        match &self.pair.class {
            InstanceClass::Dynamic(class) => match class.shadow().stub(index) {
                Some(stub) => stub.invoke(class, self, args),
                None => Err(BridgeError::NoSuchMethod {
                    class: class.name().to_string(),
                    method: format!("slot {}", index),
                }),
            },
            InstanceClass::Native(iface) => match iface.vtable().get(index) {
                Some(slot) => slot.call_default(self, args),
                None => Err(BridgeError::NoSuchMethod {
                    class: iface.name().to_string(),
                    method: format!("slot {}", index),
                }),
            },
        }
    }
}

impl Clone for NativeRef {
    fn clone(&self) -> Self {
        NativeRef::from_pair(self.pair.clone())
    }
}

impl Drop for NativeRef {
    fn drop(&mut self) {
        self.pair.drop_native();
    }
}

impl fmt::Debug for NativeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeRef")
            .field("id", &self.pair.id)
            .field("class", &self.class_name())
            .finish()
    }
}

/// Const view of a native handle.
#[derive(Clone, Copy)]
pub struct ConstRef<'a> {
    inner: &'a NativeRef,
}

impl ConstRef<'_> {
    /// Virtual call restricted to const-qualified slots
    pub fn call_virtual(&self, name: &str, args: &[NativeValue]) -> BridgeResult<NativeValue> {
        let (index, args) = self
            .inner
            .pair
            .class
            .vtable()
            .resolve(self.inner.class_name(), name, true, |params, fit| {
                marshal::coerce_args(args, params, fit)
            })?;
        self.inner.call_slot(index, &args)
    }

    /// Read a data member
    pub fn field(&self, name: &str) -> BridgeResult<NativeValue> {
        self.inner.field(name)
    }
}
