//! Dynamic subclass declaration
//!
//! [`ClassBridge::build`] turns a [`ClassDecl`] into a [`DynClass`] plus the
//! [`ShadowType`] native code dispatches through. The shadow carries one
//! dispatch stub per virtual slot of its (possibly composed) native bases
//! and a lazily filled override table.

use crate::bridge::{Composition, DispatchStub, DynResult, ExceptionBridge, SlotOverrideTable};
use crate::instance::{Instance, InstanceClass};
use crate::interp::Interpreter;
use crate::native::{NativeInterface, VTable};
use crate::registry::ShadowRegistry;
use crate::value::DynValue;
use crossbridge_sdk::{BridgeError, BridgeResult, LifetimeWarning, OwnershipFlag};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Dynamic method body: receives `self` and the call arguments
pub type DynFn = Arc<dyn Fn(&Instance, &[DynValue]) -> DynResult<DynValue> + Send + Sync>;

/// Dynamic initializer (`__init__`)
pub type DynInit = Arc<dyn Fn(&Instance, &[DynValue]) -> DynResult<()> + Send + Sync>;

/// A method defined by a dynamic class.
#[derive(Clone)]
pub struct DynMethod {
    /// Method name
    pub name: String,
    /// Fixed argument count, or `None` for variadic methods
    pub arity: Option<usize>,
    /// Body
    pub body: DynFn,
}

impl DynMethod {
    /// Check if the method can be called with `count` arguments
    pub fn accepts(&self, count: usize) -> bool {
        self.arity.map_or(true, |n| n == count)
    }

    pub(crate) fn check_arity(&self, class: &str, count: usize) -> DynResult<()> {
        match self.arity {
            Some(n) if n != count => Err(crate::bridge::DynException::type_error(format!(
                "{}.{}() takes {} arguments but {} were given",
                class, self.name, n, count
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for DynMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynMethod")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// What a dynamic class derives from
#[derive(Clone)]
pub enum BaseSpec {
    /// One native interface
    Native(Arc<NativeInterface>),
    /// Explicit composition of several unrelated native interfaces
    Composed(Vec<Arc<NativeInterface>>),
    /// Another dynamic class
    Dynamic(Arc<DynClass>),
}

/// Declaration of a dynamic subclass.
pub struct ClassDecl {
    name: String,
    base: Option<BaseSpec>,
    methods: Vec<DynMethod>,
    init: Option<DynInit>,
    attrs: Vec<(String, DynValue)>,
}

impl ClassDecl {
    /// Start a declaration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            methods: Vec::new(),
            init: None,
            attrs: Vec::new(),
        }
    }

    /// Derive from one native interface
    pub fn extends(mut self, base: &Arc<NativeInterface>) -> Self {
        self.base = Some(BaseSpec::Native(base.clone()));
        self
    }

    /// Derive from several unrelated native interfaces
    pub fn extends_multi(mut self, bases: &[Arc<NativeInterface>]) -> Self {
        self.base = Some(BaseSpec::Composed(bases.to_vec()));
        self
    }

    /// Derive from another dynamic class
    pub fn extends_class(mut self, parent: &Arc<DynClass>) -> Self {
        self.base = Some(BaseSpec::Dynamic(parent.clone()));
        self
    }

    /// Define a variadic method
    pub fn method<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Instance, &[DynValue]) -> DynResult<DynValue> + Send + Sync + 'static,
    {
        self.methods.push(DynMethod {
            name: name.into(),
            arity: None,
            body: Arc::new(body),
        });
        self
    }

    /// Define a method taking exactly `arity` arguments
    pub fn method_with_arity<F>(mut self, name: impl Into<String>, arity: usize, body: F) -> Self
    where
        F: Fn(&Instance, &[DynValue]) -> DynResult<DynValue> + Send + Sync + 'static,
    {
        self.methods.push(DynMethod {
            name: name.into(),
            arity: Some(arity),
            body: Arc::new(body),
        });
        self
    }

    /// Define the initializer
    pub fn init<F>(mut self, body: F) -> Self
    where
        F: Fn(&Instance, &[DynValue]) -> DynResult<()> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(body));
        self
    }

    /// Define a class attribute
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<DynValue>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }
}

// ============================================================================
// ShadowType
// ============================================================================

/// Synthesized native type of one dynamic subclass.
pub struct ShadowType {
    name: String,
    composition: Arc<Composition>,
    stubs: Vec<DispatchStub>,
    overrides: SlotOverrideTable,
    warnings: Vec<LifetimeWarning>,
}

impl ShadowType {
    fn new(name: String, composition: Arc<Composition>, warnings: Vec<LifetimeWarning>) -> Self {
        let stubs = composition
            .vtable()
            .slots()
            .iter()
            .enumerate()
            .map(|(index, slot)| DispatchStub::new(index, slot.clone()))
            .collect::<Vec<_>>();
        let overrides = SlotOverrideTable::new(stubs.len());
        Self {
            name,
            composition,
            stubs,
            overrides,
            warnings,
        }
    }

    /// Name of the dynamic subclass this shadow belongs to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Native bases and merged slot table
    pub fn composition(&self) -> &Arc<Composition> {
        &self.composition
    }

    /// Merged virtual table
    pub fn vtable(&self) -> &VTable {
        self.composition.vtable()
    }

    /// Native bases in declaration order
    pub fn bases(&self) -> impl Iterator<Item = &Arc<NativeInterface>> {
        self.composition.bases().iter()
    }

    /// Dispatch stub for a slot
    pub fn stub(&self, index: usize) -> Option<&DispatchStub> {
        self.stubs.get(index)
    }

    /// All dispatch stubs in slot order
    pub fn stubs(&self) -> &[DispatchStub] {
        &self.stubs
    }

    /// Override cache
    pub fn overrides(&self) -> &SlotOverrideTable {
        &self.overrides
    }

    /// Lifetime warnings raised when the subclass was declared
    pub fn warnings(&self) -> &[LifetimeWarning] {
        &self.warnings
    }
}

impl fmt::Debug for ShadowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowType")
            .field("name", &self.name)
            .field("bases", &self.bases().map(|b| b.name()).collect::<Vec<_>>())
            .field("stubs", &self.stubs.len())
            .finish()
    }
}

// ============================================================================
// DynClass
// ============================================================================

/// A dynamic subclass of native interfaces.
pub struct DynClass {
    name: String,
    interp: Interpreter,
    parent: Option<Arc<DynClass>>,
    shadow: Arc<ShadowType>,
    methods: FxHashMap<String, DynMethod>,
    init: Option<DynInit>,
    class_attrs: RwLock<FxHashMap<String, DynValue>>,
}

impl DynClass {
    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interpreter the class was declared in
    pub fn interp(&self) -> &Interpreter {
        &self.interp
    }

    /// Dynamic parent class, if any
    pub fn parent(&self) -> Option<&Arc<DynClass>> {
        self.parent.as_ref()
    }

    /// Shadow type
    pub fn shadow(&self) -> &Arc<ShadowType> {
        &self.shadow
    }

    /// Names of the direct bases (`__bases__`)
    pub fn base_names(&self) -> Vec<String> {
        match &self.parent {
            Some(parent) => vec![parent.name.clone()],
            None => self.shadow.bases().map(|b| b.name().to_string()).collect(),
        }
    }

    /// Method lookup along the dynamic class chain
    pub fn find_method(&self, name: &str) -> Option<&DynMethod> {
        match self.methods.get(name) {
            Some(method) => Some(method),
            None => self.parent.as_ref().and_then(|p| p.find_method(name)),
        }
    }

    fn find_init(&self) -> Option<&DynInit> {
        match &self.init {
            Some(init) => Some(init),
            None => self.parent.as_ref().and_then(|p| p.find_init()),
        }
    }

    /// Class attribute lookup along the dynamic class chain
    pub fn class_attr(&self, name: &str) -> Option<DynValue> {
        let own = self.class_attrs.read().get(name).cloned();
        own.or_else(|| self.parent.as_ref().and_then(|p| p.class_attr(name)))
    }

    /// Set a class attribute
    pub fn set_class_attr(&self, name: impl Into<String>, value: impl Into<DynValue>) {
        let old = self.class_attrs.write().insert(name.into(), value.into());
        drop(old);
    }

    /// Check if the class exposes a name: method, class attribute, virtual
    /// slot, or native member visible to subclasses
    pub fn has_attr(&self, name: &str) -> bool {
        self.find_method(name).is_some()
            || self.class_attr(name).is_some()
            || self.shadow.vtable().has_method(name)
            || self
                .shadow
                .composition()
                .layout()
                .find_visible_field(name, true)
                .is_some()
    }

    /// Check if the class is, or derives from, the named class
    pub fn is_a(&self, name: &str) -> bool {
        self.name == name
            || self.parent.as_ref().is_some_and(|p| p.is_a(name))
            || self.shadow.composition().contains(name)
    }

    /// First pure virtual slot without a matching override
    pub fn missing_override(&self) -> Option<String> {
        self.shadow
            .vtable()
            .slots()
            .iter()
            .filter(|slot| slot.is_pure())
            .find(|slot| {
                self.find_method(&slot.key.name)
                    .map_or(true, |m| !m.accepts(slot.key.arity()))
            })
            .map(|slot| slot.key.to_string())
    }

    /// Check if instantiation would fail for lack of overrides
    pub fn is_abstract(&self) -> bool {
        self.missing_override().is_some()
    }

    /// Lifetime warnings raised for this class's declaration
    pub fn warnings(&self) -> &[LifetimeWarning] {
        self.shadow.warnings()
    }

    /// Create an instance.
    ///
    /// Runs the initializer (own or inherited) under the execution lock.
    /// Without an initializer the arguments go to the base constructors.
    /// Bases no initializer constructed are default-constructed afterwards.
    pub fn instantiate(self: &Arc<Self>, args: &[DynValue]) -> DynResult<Instance> {
        if let Some(method) = self.missing_override() {
            return Err(ExceptionBridge::raise(BridgeError::AbstractInstantiation {
                class: self.name.clone(),
                method,
            }));
        }
        let layout = self.shadow.composition().layout().clone();
        let instance = Instance::create(
            &self.interp,
            InstanceClass::Dynamic(self.clone()),
            layout,
            OwnershipFlag::Dynamic,
        );
        self.init_instance(&instance, args)?;
        instance
            .finish_construction()
            .map_err(ExceptionBridge::raise)?;
        tracing::trace!(class = %self.name, instance = %instance.id(), "instance created");
        Ok(instance)
    }

    /// Run this class's initializer (own or inherited) on `instance`.
    ///
    /// This is what a subclass initializer calls to chain to its dynamic
    /// parent. Without any initializer the arguments go to the native base
    /// constructors.
    pub fn init_instance(&self, instance: &Instance, args: &[DynValue]) -> DynResult<()> {
        let _guard = self.interp.enter();
        match self.find_init() {
            Some(init) => init(instance, args),
            None if !args.is_empty() => instance.super_init(args),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for DynClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynClass")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .field("shadow", &self.shadow)
            .finish()
    }
}

// ============================================================================
// ClassBridge
// ============================================================================

/// Builds dynamic subclasses and their shadow types.
pub struct ClassBridge;

impl ClassBridge {
    /// Declare a dynamic subclass.
    ///
    /// Validates overrides against the native slots, emits a lifetime
    /// warning for a direct native base without a virtual destructor, and
    /// registers the shadow type under every native class it derives from.
    pub fn build(interp: &Interpreter, decl: ClassDecl) -> BridgeResult<Arc<DynClass>> {
        let ClassDecl {
            name,
            base,
            methods,
            init,
            attrs,
        } = decl;

        let base = base.ok_or_else(|| {
            BridgeError::UnsupportedComposition(format!("'{}' names no base class", name))
        })?;
        let (composition, parent, direct_native) = match base {
            BaseSpec::Native(iface) => (Arc::new(Composition::single(&iface)), None, true),
            BaseSpec::Composed(bases) => (Arc::new(Composition::compose(&bases)?), None, true),
            BaseSpec::Dynamic(parent) => (parent.shadow.composition().clone(), Some(parent), false),
        };

        for method in &methods {
            if composition.layout().find_field(&method.name).is_some() {
                return Err(BridgeError::IncompatibleSignature {
                    method: format!("{}.{}", name, method.name),
                    reason: "name is already a native data member".to_string(),
                });
            }
            let Some(arity) = method.arity else {
                continue;
            };
            let arities: Vec<usize> = composition
                .vtable()
                .slots_named(&method.name)
                .map(|(_, slot)| slot.key.arity())
                .collect();
            if !arities.is_empty() && !arities.contains(&arity) {
                return Err(BridgeError::IncompatibleSignature {
                    method: format!("{}.{}", name, method.name),
                    reason: format!(
                        "override takes {} arguments, virtual method takes {:?}",
                        arity, arities
                    ),
                });
            }
        }

        let mut warnings = Vec::new();
        if direct_native && interp.options().warn_missing_virtual_dtor {
            if let Some(base) = composition.bases().iter().find(|b| !b.has_virtual_dtor()) {
                let warning = LifetimeWarning::missing_virtual_dtor(&name, base.name());
                tracing::warn!(class = %name, base = base.name(), "{}", warning.message);
                interp.record_warning(warning.clone());
                warnings.push(warning);
            }
        }

        let shadow = Arc::new(ShadowType::new(name.clone(), composition, warnings));
        ShadowRegistry::register(&shadow);

        tracing::debug!(
            class = %name,
            bases = shadow.composition().bases().len(),
            slots = shadow.stubs().len(),
            overrides = methods.len(),
            "dynamic subclass declared"
        );

        Ok(Arc::new(DynClass {
            name,
            interp: interp.clone(),
            parent,
            shadow,
            methods: methods.into_iter().map(|m| (m.name.clone(), m)).collect(),
            init,
            class_attrs: RwLock::new(attrs.into_iter().collect()),
        }))
    }
}
