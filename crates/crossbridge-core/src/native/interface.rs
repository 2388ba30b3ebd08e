//! Native interface declarations and virtual tables
//!
//! A [`NativeInterface`] is the runtime description of a native class: its
//! native parents, data members, constructor overloads, virtual slots and
//! non-virtual methods, plus the destructor and copy traits the bridge
//! needs to know about. Interfaces are built once through
//! [`NativeInterfaceBuilder`] and are immutable afterwards (apart from the
//! per-method lock-release flag).

use crate::bridge::{DynResult, ExceptionBridge, GateFlag, ShadowType};
use crate::instance::{Instance, InstanceClass, NativeRef};
use crate::interp::Interpreter;
use crate::marshal::{self, Fit};
use crate::native::Layout;
use crate::registry::ShadowRegistry;
use crate::value::{DynValue, NativeValue};
use crossbridge_sdk::{Access, BridgeError, BridgeResult, CopyPolicy, NativeType, OwnershipFlag, SlotKey};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Native method body: receives `this` and the already-coerced arguments
pub type NativeImpl =
    Arc<dyn Fn(&NativeRef, &[NativeValue]) -> BridgeResult<NativeValue> + Send + Sync>;

/// Constructor body: initializes the declaring class's own data members
pub type CtorBody = Arc<dyn Fn(&mut FieldInit<'_>, &[NativeValue]) -> BridgeResult<()> + Send + Sync>;

/// Construction or destruction side effect of a native class
pub type LifecycleHook = Arc<dyn Fn() + Send + Sync>;

/// Unique identifier for a native interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceId(u64);

impl InterfaceId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        InterfaceId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// Constructor parameter
#[derive(Clone, Debug)]
pub struct Param {
    /// Parameter name (used for keyword binding)
    pub name: String,
    /// Declared type
    pub ty: NativeType,
    /// Default value, if the parameter may be omitted
    pub default: Option<NativeValue>,
}

impl Param {
    /// Required parameter
    pub fn new(name: impl Into<String>, ty: NativeType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    /// Parameter with a default value
    pub fn with_default(name: impl Into<String>, ty: NativeType, default: impl Into<NativeValue>) -> Self {
        Self {
            name: name.into(),
            ty,
            default: Some(default.into()),
        }
    }
}

/// Data member declaration
#[derive(Clone, Debug)]
pub struct FieldDecl {
    /// Member name
    pub name: String,
    /// Member type
    pub ty: NativeType,
    /// Access level
    pub access: Access,
    /// Value before any constructor body runs
    pub default: NativeValue,
}

/// Constructor overload
#[derive(Clone)]
pub struct Constructor {
    /// Parameters in declaration order
    pub params: Vec<Param>,
    /// Access level
    pub access: Access,
    body: CtorBody,
}

impl Constructor {
    /// Bind an argument group: positional first, then keywords, then defaults.
    ///
    /// Returns `None` if the group does not fit this overload under `fit`.
    fn bind(&self, group: &ArgGroup, context: &str, fit: Fit) -> Option<Vec<NativeValue>> {
        if group.positional.len() > self.params.len() {
            return None;
        }
        let mut bound = Vec::with_capacity(self.params.len());
        let mut keywords_used = 0;
        for (i, param) in self.params.iter().enumerate() {
            let keyword = group.keywords.iter().find(|(k, _)| *k == param.name);
            let arg = match (group.positional.get(i), keyword) {
                (Some(_), Some(_)) => return None,
                (Some(v), None) => Some(v),
                (None, Some((_, v))) => {
                    keywords_used += 1;
                    Some(v)
                }
                (None, None) => None,
            };
            match arg {
                Some(v) if fit == Fit::Exact && marshal::widens(v, &param.ty) => return None,
                Some(v) => bound.push(marshal::to_native(v, &param.ty, context).ok()?),
                None => bound.push(param.default.as_ref()?.coerce(&param.ty)?),
            }
        }
        if keywords_used != group.keywords.len() {
            return None;
        }
        Some(bound)
    }

    fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.ty.to_string()).collect();
        format!("({})", params.join(", "))
    }
}

/// One constructor argument group: positional values plus keywords.
#[derive(Clone, Debug, Default)]
pub struct ArgGroup {
    /// Positional arguments
    pub positional: Vec<DynValue>,
    /// Keyword arguments, matched against parameter names
    pub keywords: Vec<(String, DynValue)>,
}

impl ArgGroup {
    /// Empty group (selects the default constructor)
    pub fn new() -> Self {
        Self::default()
    }

    /// Group of positional arguments
    pub fn positional(args: impl Into<Vec<DynValue>>) -> Self {
        Self {
            positional: args.into(),
            keywords: Vec::new(),
        }
    }

    /// Add a keyword argument
    pub fn keyword(mut self, name: impl Into<String>, value: impl Into<DynValue>) -> Self {
        self.keywords.push((name.into(), value.into()));
        self
    }

    /// Check if the group carries no arguments
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    fn describe(&self) -> String {
        let mut parts: Vec<String> = self.positional.iter().map(|v| v.type_name()).collect();
        parts.extend(self.keywords.iter().map(|(k, v)| format!("{}={}", k, v.type_name())));
        format!("({})", parts.join(", "))
    }
}

/// Data member initializer handed to constructor bodies.
pub struct FieldInit<'a> {
    class: &'a str,
    decls: &'a [FieldDecl],
    values: &'a mut Vec<NativeValue>,
}

impl FieldInit<'_> {
    /// Set a data member of the class being constructed
    pub fn set(&mut self, name: &str, value: impl Into<NativeValue>) -> BridgeResult<()> {
        let value = value.into();
        let index = self
            .decls
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| BridgeError::NoSuchAttribute {
                class: self.class.to_string(),
                name: name.to_string(),
            })?;
        let decl = &self.decls[index];
        let coerced = value.coerce(&decl.ty).ok_or_else(|| {
            BridgeError::type_mismatch(
                format!("member '{}::{}'", self.class, name),
                &decl.ty,
                value.type_name(),
            )
        })?;
        self.values[index] = coerced;
        Ok(())
    }

    /// Read a data member of the class being constructed
    pub fn get(&self, name: &str) -> Option<&NativeValue> {
        let index = self.decls.iter().position(|d| d.name == name)?;
        self.values.get(index)
    }
}

// ============================================================================
// Virtual table
// ============================================================================

/// Virtual slot: signature, return type and native default (if any).
#[derive(Clone)]
pub struct Slot {
    /// Name, parameter types and const qualifier
    pub key: SlotKey,
    /// Declared return type
    pub ret: NativeType,
    /// Interface that declared (or last overrode) the slot
    pub declared_in: String,
    body: Option<NativeImpl>,
}

impl Slot {
    /// Check if the slot has no native implementation
    pub fn is_pure(&self) -> bool {
        self.body.is_none()
    }

    /// Run the native default implementation
    pub fn call_default(&self, this: &NativeRef, args: &[NativeValue]) -> BridgeResult<NativeValue> {
        match &self.body {
            Some(body) => body(this, args),
            None => Err(BridgeError::AbstractMethod {
                class: self.declared_in.clone(),
                method: self.key.to_string(),
            }),
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("key", &self.key.to_string())
            .field("ret", &self.ret)
            .field("declared_in", &self.declared_in)
            .field("pure", &self.is_pure())
            .finish()
    }
}

/// Virtual method table, indexed by slot.
#[derive(Clone, Debug, Default)]
pub struct VTable {
    slots: Vec<Slot>,
}

impl VTable {
    /// Create an empty vtable
    pub fn new() -> Self {
        Self::default()
    }

    /// All slots in index order
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Get a slot by index
    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if there are no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index of the slot with exactly this key
    pub fn position(&self, key: &SlotKey) -> Option<usize> {
        self.slots.iter().position(|s| s.key == *key)
    }

    /// All slots (overloads and const variants) with the given name
    pub fn slots_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = (usize, &'a Slot)> + 'a {
        self.slots
            .iter()
            .enumerate()
            .filter(move |(_, s)| s.key.name == name)
    }

    /// Check if any slot has the given name
    pub fn has_method(&self, name: &str) -> bool {
        self.slots.iter().any(|s| s.key.name == name)
    }

    /// First slot without a native implementation
    pub fn first_pure(&self) -> Option<&Slot> {
        self.slots.iter().find(|s| s.is_pure())
    }

    /// Merge the slots of another table (a further base of the same class).
    ///
    /// Identical keys collapse into one slot; a native implementation wins
    /// over a pure declaration. Differing return types are rejected.
    pub(crate) fn merge(&mut self, other: &VTable) -> BridgeResult<()> {
        for slot in &other.slots {
            match self.position(&slot.key) {
                Some(index) => {
                    let existing = &mut self.slots[index];
                    if existing.ret != slot.ret {
                        return Err(BridgeError::IncompatibleSignature {
                            method: slot.key.to_string(),
                            reason: format!(
                                "'{}' returns {} but '{}' returns {}",
                                existing.declared_in, existing.ret, slot.declared_in, slot.ret
                            ),
                        });
                    }
                    if existing.is_pure() && !slot.is_pure() {
                        *existing = slot.clone();
                    }
                }
                None => self.slots.push(slot.clone()),
            }
        }
        Ok(())
    }

    /// Override an inherited slot with the same key, or append a new one.
    ///
    /// `is_subclass(derived, base)` decides covariant object returns.
    pub(crate) fn override_or_push(
        &mut self,
        slot: Slot,
        is_subclass: impl Fn(&str, &str) -> bool,
    ) -> BridgeResult<()> {
        let Some(index) = self.position(&slot.key) else {
            self.slots.push(slot);
            return Ok(());
        };
        let existing = &self.slots[index];
        let compatible = existing.ret == slot.ret
            || match (&existing.ret, &slot.ret) {
                (NativeType::Ptr(base), NativeType::Ptr(derived))
                | (NativeType::Ref(base), NativeType::Ref(derived)) => is_subclass(derived, base),
                _ => false,
            };
        if !compatible {
            return Err(BridgeError::IncompatibleSignature {
                method: slot.key.to_string(),
                reason: format!(
                    "return type {} does not match {} declared in '{}'",
                    slot.ret, existing.ret, existing.declared_in
                ),
            });
        }
        let ret = existing.ret.clone();
        self.slots[index] = Slot { ret, ..slot };
        Ok(())
    }

    /// Pick the slot a call by name resolves to.
    ///
    /// `convert` maps the call's arguments onto a candidate's parameter
    /// list, returning `None` when they do not fit. Exact fits across all
    /// overloads win over widened ones. Within a pass non-const overloads
    /// are preferred unless `const_only` is set, in which case only
    /// const-qualified slots are eligible.
    pub fn resolve<F>(
        &self,
        class: &str,
        name: &str,
        const_only: bool,
        mut convert: F,
    ) -> BridgeResult<(usize, Vec<NativeValue>)>
    where
        F: FnMut(&[NativeType], Fit) -> Option<Vec<NativeValue>>,
    {
        let mut blocked_by_const = false;
        for fit in Fit::ORDER {
            let mut const_match = None;
            for (index, slot) in self.slots_named(name) {
                let Some(args) = convert(&slot.key.params, fit) else {
                    continue;
                };
                if slot.key.is_const {
                    if const_match.is_none() {
                        const_match = Some((index, args));
                    }
                } else if const_only {
                    blocked_by_const = true;
                } else {
                    return Ok((index, args));
                }
            }
            if let Some(found) = const_match {
                return Ok(found);
            }
        }
        if blocked_by_const {
            return Err(BridgeError::ConstViolation {
                class: class.to_string(),
                method: name.to_string(),
            });
        }
        Err(BridgeError::NoSuchMethod {
            class: class.to_string(),
            method: name.to_string(),
        })
    }
}

/// Non-virtual native method
#[derive(Clone)]
pub struct MethodDecl {
    /// Method name
    pub name: String,
    /// Parameter types
    pub params: Vec<NativeType>,
    /// Return type
    pub ret: NativeType,
    /// Access level
    pub access: Access,
    body: NativeImpl,
    gate: Arc<GateFlag>,
}

impl MethodDecl {
    /// Run the method body
    pub fn call(&self, this: &NativeRef, args: &[NativeValue]) -> BridgeResult<NativeValue> {
        (self.body)(this, args)
    }

    /// Lock-release flag of this method
    pub fn gate(&self) -> &GateFlag {
        &self.gate
    }
}

// ============================================================================
// NativeInterface
// ============================================================================

/// A declared native class.
pub struct NativeInterface {
    id: InterfaceId,
    name: String,
    parents: Vec<Arc<NativeInterface>>,
    fields: Vec<FieldDecl>,
    ctors: Vec<Constructor>,
    vtable: VTable,
    methods: FxHashMap<String, Vec<MethodDecl>>,
    virtual_dtor: bool,
    copy_policy: CopyPolicy,
    on_construct: Vec<LifecycleHook>,
    on_destroy: Vec<LifecycleHook>,
}

impl NativeInterface {
    /// Start declaring a native class
    pub fn builder(name: impl Into<String>) -> NativeInterfaceBuilder {
        NativeInterfaceBuilder::new(name.into())
    }

    /// Get the interface ID
    pub fn id(&self) -> InterfaceId {
        self.id
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct native parents
    pub fn parents(&self) -> &[Arc<NativeInterface>] {
        &self.parents
    }

    /// Own data members (parents' members live in their own segments)
    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    /// Resolved virtual table (inherited slots included)
    pub fn vtable(&self) -> &VTable {
        &self.vtable
    }

    /// Whether this class or any ancestor declares a virtual destructor
    pub fn has_virtual_dtor(&self) -> bool {
        self.virtual_dtor
    }

    /// Copy/move availability
    pub fn copy_policy(&self) -> CopyPolicy {
        self.copy_policy
    }

    /// Check if any virtual slot is still pure
    pub fn is_abstract(&self) -> bool {
        self.vtable.first_pure().is_some()
    }

    /// Check if this class is, or derives from, the named class
    pub fn is_a(&self, name: &str) -> bool {
        self.name == name || self.parents.iter().any(|p| p.is_a(name))
    }

    /// IDs of this class and all its ancestors
    pub fn lineage(&self) -> Vec<InterfaceId> {
        let mut ids = vec![self.id];
        for parent in &self.parents {
            ids.extend(parent.lineage());
        }
        ids
    }

    /// Number of storage segments (one per class in the hierarchy)
    pub fn segment_count(&self) -> usize {
        1 + self.parents.iter().map(|p| p.segment_count()).sum::<usize>()
    }

    /// Non-virtual method overloads by name, searching parents in order
    pub fn find_method(&self, name: &str) -> Option<&[MethodDecl]> {
        if let Some(overloads) = self.methods.get(name) {
            return Some(overloads.as_slice());
        }
        self.parents.iter().find_map(|p| p.find_method(name))
    }

    /// Set whether calls to a non-virtual method release the execution lock
    pub fn set_release_lock(&self, method: &str, release: bool) -> BridgeResult<()> {
        let overloads = self.find_method(method).ok_or_else(|| BridgeError::NoSuchMethod {
            class: self.name.clone(),
            method: method.to_string(),
        })?;
        for decl in overloads {
            decl.gate.set(release);
        }
        Ok(())
    }

    /// Check if a data member is visible from dynamic code
    pub fn has_visible_field(&self, name: &str, from_derived: bool) -> bool {
        self.fields
            .iter()
            .any(|f| f.name == name && f.access.visible(from_derived))
            || self.parents.iter().any(|p| p.has_visible_field(name, from_derived))
    }

    /// Shadow types registered for dynamic subclasses of this class
    pub fn shadows(&self) -> Vec<Arc<ShadowType>> {
        ShadowRegistry::shadows_of(self.id)
    }

    /// Create an instance from dynamic code (`Base1(27)`).
    ///
    /// The instance is dynamic-owned. Fails for abstract classes.
    pub fn instantiate(self: &Arc<Self>, interp: &Interpreter, args: &[DynValue]) -> DynResult<Instance> {
        self.instantiate_with(interp, ArgGroup::positional(args.to_vec()))
    }

    /// Create an instance from dynamic code with keyword arguments
    pub fn instantiate_with(self: &Arc<Self>, interp: &Interpreter, group: ArgGroup) -> DynResult<Instance> {
        self.new_instance(interp, &group, OwnershipFlag::Dynamic)
            .map_err(ExceptionBridge::raise)
    }

    /// Create an instance from native code (`new Base1(27)`).
    ///
    /// The returned handle is native-owned.
    pub fn construct(self: &Arc<Self>, interp: &Interpreter, args: &[NativeValue]) -> BridgeResult<NativeRef> {
        let group = ArgGroup::positional(
            args.iter().cloned().map(marshal::to_dynamic).collect::<Vec<_>>(),
        );
        let instance = self.new_instance(interp, &group, OwnershipFlag::Native)?;
        Ok(instance.native_ref())
    }

    fn new_instance(
        self: &Arc<Self>,
        interp: &Interpreter,
        group: &ArgGroup,
        owner: OwnershipFlag,
    ) -> BridgeResult<Instance> {
        if let Some(slot) = self.vtable.first_pure() {
            return Err(BridgeError::AbstractInstantiation {
                class: self.name.clone(),
                method: slot.key.to_string(),
            });
        }
        let layout = Arc::new(Layout::of(std::slice::from_ref(self)));
        let instance = Instance::create(interp, InstanceClass::Native(self.clone()), layout, owner);
        instance.construct_base(0, group, false)?;
        Ok(instance)
    }

    /// Append this class's segments (parents first, then its own).
    pub(crate) fn flatten_into(self: &Arc<Self>, out: &mut Vec<Arc<NativeInterface>>) {
        for parent in &self.parents {
            parent.flatten_into(out);
        }
        out.push(self.clone());
    }

    /// Initial values of this class's own data members
    pub(crate) fn default_segment(&self) -> Vec<NativeValue> {
        self.fields.iter().map(|f| f.default.clone()).collect()
    }

    pub(crate) fn construct_hooks(&self) -> &[LifecycleHook] {
        &self.on_construct
    }

    pub(crate) fn destroy_hooks(&self) -> &[LifecycleHook] {
        &self.on_destroy
    }

    /// Run construction over this class's segments.
    ///
    /// Parents are default-constructed first, then the own segment is reset
    /// to member defaults and the selected constructor overload runs.
    /// `segments` covers exactly [`segment_count`](Self::segment_count)
    /// entries. On failure the destroy hooks of every parent already
    /// constructed run in reverse before the error is returned.
    pub(crate) fn construct_into(
        &self,
        segments: &mut [Vec<NativeValue>],
        group: &ArgGroup,
        from_derived: bool,
    ) -> BridgeResult<()> {
        let mut offset = 0;
        for (built, parent) in self.parents.iter().enumerate() {
            let count = parent.segment_count();
            if let Err(err) = parent.construct_into(&mut segments[offset..offset + count], &ArgGroup::new(), true) {
                self.unwind_parents(built);
                return Err(err);
            }
            offset += count;
        }

        if let Err(err) = self.construct_own(&mut segments[offset], group, from_derived) {
            self.unwind_parents(self.parents.len());
            return Err(err);
        }
        for hook in &self.on_construct {
            hook();
        }
        Ok(())
    }

    fn construct_own(&self, own: &mut Vec<NativeValue>, group: &ArgGroup, from_derived: bool) -> BridgeResult<()> {
        *own = self.default_segment();
        let context = format!("constructor of '{}'", self.name);

        if self.ctors.is_empty() {
            if !group.is_empty() {
                return Err(BridgeError::type_mismatch(context, "()", group.describe()));
            }
            return Ok(());
        }

        let mut inaccessible = false;
        let mut chosen = None;
        'passes: for fit in Fit::ORDER {
            for ctor in &self.ctors {
                let Some(args) = ctor.bind(group, &context, fit) else {
                    continue;
                };
                if ctor.access.visible(from_derived) {
                    chosen = Some((ctor, args));
                    break 'passes;
                }
                inaccessible = true;
            }
        }
        match chosen {
            Some((ctor, args)) => {
                let mut init = FieldInit {
                    class: &self.name,
                    decls: &self.fields,
                    values: own,
                };
                (ctor.body)(&mut init, &args)
            }
            None if inaccessible => Err(BridgeError::ConstructionAccess(format!(
                "constructor of '{}' taking {} is not accessible",
                self.name,
                group.describe()
            ))),
            None => {
                let expected: Vec<String> = self.ctors.iter().map(Constructor::signature).collect();
                Err(BridgeError::type_mismatch(context, expected.join(" or "), group.describe()))
            }
        }
    }

    /// Destroy the first `built` parents, last constructed first.
    fn unwind_parents(&self, built: usize) {
        for parent in self.parents[..built].iter().rev() {
            parent.run_destroy_hooks();
        }
    }

    /// Destroy hooks over every segment of this class, in reverse layout order.
    fn run_destroy_hooks(&self) {
        for hook in &self.on_destroy {
            hook();
        }
        self.unwind_parents(self.parents.len());
    }
}

impl fmt::Debug for NativeInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeInterface")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parents", &self.parents.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("vtable", &self.vtable)
            .field("virtual_dtor", &self.virtual_dtor)
            .field("copy_policy", &self.copy_policy)
            .finish()
    }
}

fn zero_value(ty: &NativeType) -> NativeValue {
    match ty {
        NativeType::Void => NativeValue::Void,
        NativeType::Bool => NativeValue::Bool(false),
        NativeType::Int => NativeValue::Int(0),
        NativeType::Double => NativeValue::Double(0.0),
        NativeType::Str => NativeValue::Str(String::new()),
        NativeType::Object(_) | NativeType::Ref(_) | NativeType::Ptr(_) => NativeValue::Null,
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`NativeInterface`]
pub struct NativeInterfaceBuilder {
    name: String,
    parents: Vec<Arc<NativeInterface>>,
    fields: Vec<FieldDecl>,
    ctors: Vec<Constructor>,
    slots: Vec<Slot>,
    methods: FxHashMap<String, Vec<MethodDecl>>,
    virtual_dtor: bool,
    copy_policy: CopyPolicy,
    on_construct: Vec<LifecycleHook>,
    on_destroy: Vec<LifecycleHook>,
}

impl NativeInterfaceBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            parents: Vec::new(),
            fields: Vec::new(),
            ctors: Vec::new(),
            slots: Vec::new(),
            methods: FxHashMap::default(),
            virtual_dtor: false,
            copy_policy: CopyPolicy::Public,
            on_construct: Vec::new(),
            on_destroy: Vec::new(),
        }
    }

    /// Add a native parent class (call repeatedly for multiple inheritance)
    pub fn parent(mut self, parent: &Arc<NativeInterface>) -> Self {
        self.parents.push(parent.clone());
        self
    }

    /// Public data member
    pub fn field(self, name: impl Into<String>, ty: NativeType, default: impl Into<NativeValue>) -> Self {
        self.field_with_access(name, ty, Access::Public, default)
    }

    /// Protected data member (visible to dynamic subclasses only)
    pub fn protected_field(
        self,
        name: impl Into<String>,
        ty: NativeType,
        default: impl Into<NativeValue>,
    ) -> Self {
        self.field_with_access(name, ty, Access::Protected, default)
    }

    /// Data member with explicit access
    pub fn field_with_access(
        mut self,
        name: impl Into<String>,
        ty: NativeType,
        access: Access,
        default: impl Into<NativeValue>,
    ) -> Self {
        let default = default.into();
        let default = default.coerce(&ty).unwrap_or_else(|| zero_value(&ty));
        self.fields.push(FieldDecl {
            name: name.into(),
            ty,
            access,
            default,
        });
        self
    }

    /// Public constructor overload
    pub fn constructor<F>(self, params: Vec<Param>, body: F) -> Self
    where
        F: Fn(&mut FieldInit<'_>, &[NativeValue]) -> BridgeResult<()> + Send + Sync + 'static,
    {
        self.constructor_with_access(params, Access::Public, body)
    }

    /// Constructor overload with explicit access
    pub fn constructor_with_access<F>(mut self, params: Vec<Param>, access: Access, body: F) -> Self
    where
        F: Fn(&mut FieldInit<'_>, &[NativeValue]) -> BridgeResult<()> + Send + Sync + 'static,
    {
        self.ctors.push(Constructor {
            params,
            access,
            body: Arc::new(body),
        });
        self
    }

    /// Virtual method with a native default implementation
    pub fn virtual_method<F>(self, name: impl Into<String>, params: Vec<NativeType>, ret: NativeType, body: F) -> Self
    where
        F: Fn(&NativeRef, &[NativeValue]) -> BridgeResult<NativeValue> + Send + Sync + 'static,
    {
        self.slot(SlotKey::new(name, params), ret, Some(Arc::new(body)))
    }

    /// Const-qualified virtual method with a native default implementation
    pub fn const_virtual_method<F>(
        self,
        name: impl Into<String>,
        params: Vec<NativeType>,
        ret: NativeType,
        body: F,
    ) -> Self
    where
        F: Fn(&NativeRef, &[NativeValue]) -> BridgeResult<NativeValue> + Send + Sync + 'static,
    {
        self.slot(SlotKey::new_const(name, params), ret, Some(Arc::new(body)))
    }

    /// Pure virtual method
    pub fn pure_virtual(self, name: impl Into<String>, params: Vec<NativeType>, ret: NativeType) -> Self {
        self.slot(SlotKey::new(name, params), ret, None)
    }

    /// Const-qualified pure virtual method
    pub fn pure_const_virtual(self, name: impl Into<String>, params: Vec<NativeType>, ret: NativeType) -> Self {
        self.slot(SlotKey::new_const(name, params), ret, None)
    }

    fn slot(mut self, key: SlotKey, ret: NativeType, body: Option<NativeImpl>) -> Self {
        self.slots.push(Slot {
            key,
            ret,
            declared_in: self.name.clone(),
            body,
        });
        self
    }

    /// Public non-virtual method
    pub fn method<F>(self, name: impl Into<String>, params: Vec<NativeType>, ret: NativeType, body: F) -> Self
    where
        F: Fn(&NativeRef, &[NativeValue]) -> BridgeResult<NativeValue> + Send + Sync + 'static,
    {
        self.method_with_access(name, params, ret, Access::Public, body)
    }

    /// Non-virtual method with explicit access
    pub fn method_with_access<F>(
        mut self,
        name: impl Into<String>,
        params: Vec<NativeType>,
        ret: NativeType,
        access: Access,
        body: F,
    ) -> Self
    where
        F: Fn(&NativeRef, &[NativeValue]) -> BridgeResult<NativeValue> + Send + Sync + 'static,
    {
        let name = name.into();
        self.methods.entry(name.clone()).or_default().push(MethodDecl {
            name,
            params,
            ret,
            access,
            body: Arc::new(body),
            gate: Arc::new(GateFlag::new(false)),
        });
        self
    }

    /// Declare a virtual destructor
    pub fn virtual_destructor(mut self) -> Self {
        self.virtual_dtor = true;
        self
    }

    /// Set copy/move availability
    pub fn copy_policy(mut self, policy: CopyPolicy) -> Self {
        self.copy_policy = policy;
        self
    }

    /// Side effect run whenever an instance segment of this class is
    /// constructed (including copies)
    pub fn on_construct<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_construct.push(Arc::new(hook));
        self
    }

    /// Side effect run when an instance segment of this class is destroyed
    pub fn on_destroy<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_destroy.push(Arc::new(hook));
        self
    }

    /// Resolve the virtual table and freeze the declaration
    pub fn build(self) -> BridgeResult<Arc<NativeInterface>> {
        for (i, a) in self.parents.iter().enumerate() {
            for b in &self.parents[i + 1..] {
                let b_ids = b.lineage();
                if let Some(shared) = a.lineage().into_iter().find(|id| b_ids.contains(id)) {
                    return Err(BridgeError::UnsupportedComposition(format!(
                        "'{}' has parents '{}' and '{}' sharing a base ({:?})",
                        self.name, a.name, b.name, shared
                    )));
                }
            }
        }

        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(BridgeError::IncompatibleSignature {
                    method: format!("{}::{}", self.name, field.name),
                    reason: "data member declared twice".to_string(),
                });
            }
        }

        let mut vtable = VTable::new();
        for parent in &self.parents {
            vtable.merge(&parent.vtable)?;
        }
        let lineage: Vec<&str> = std::iter::once(self.name.as_str())
            .chain(self.parents.iter().flat_map(|p| ancestor_names(p)))
            .collect();
        for slot in self.slots {
            vtable.override_or_push(slot, |derived, base| {
                lineage.contains(&derived) && lineage.contains(&base)
            })?;
        }

        let virtual_dtor = self.virtual_dtor || self.parents.iter().any(|p| p.virtual_dtor);
        tracing::debug!(
            class = %self.name,
            slots = vtable.len(),
            parents = self.parents.len(),
            virtual_dtor,
            "native interface declared"
        );

        Ok(Arc::new(NativeInterface {
            id: InterfaceId::next(),
            name: self.name,
            parents: self.parents,
            fields: self.fields,
            ctors: self.ctors,
            vtable,
            methods: self.methods,
            virtual_dtor,
            copy_policy: self.copy_policy,
            on_construct: self.on_construct,
            on_destroy: self.on_destroy,
        }))
    }
}

fn ancestor_names(iface: &NativeInterface) -> Vec<&str> {
    let mut names = vec![iface.name()];
    for parent in &iface.parents {
        names.extend(ancestor_names(parent));
    }
    names
}
