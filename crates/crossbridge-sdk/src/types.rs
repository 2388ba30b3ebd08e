//! Native-side type vocabulary
//!
//! These types describe what a native interface looks like from the
//! outside: parameter and return types of virtual slots, member access
//! levels, copy/move availability and who owns a bridged instance.

use std::fmt;

// ============================================================================
// NativeType
// ============================================================================

/// Declared type of a native parameter, return value or data member.
///
/// Object types carry the name of the native interface they refer to. The
/// three object flavours mirror how a compiled language passes class
/// instances: by value (copied into fresh storage), by reference (borrowed,
/// never null) and by pointer (nullable, ownership may be handed over).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NativeType {
    /// No value
    Void,
    /// Boolean
    Bool,
    /// Signed integer (all integer widths collapse to i64)
    Int,
    /// Floating point (all float widths collapse to f64)
    Double,
    /// Owned string
    Str,
    /// Class instance passed by value
    Object(String),
    /// Class instance passed by reference
    Ref(String),
    /// Nullable pointer to a class instance
    Ptr(String),
}

impl NativeType {
    /// By-value object type
    pub fn object(class: impl Into<String>) -> Self {
        NativeType::Object(class.into())
    }

    /// Reference-to-object type
    pub fn reference(class: impl Into<String>) -> Self {
        NativeType::Ref(class.into())
    }

    /// Pointer-to-object type
    pub fn pointer(class: impl Into<String>) -> Self {
        NativeType::Ptr(class.into())
    }

    /// Name of the referenced class, for object types
    pub fn class_name(&self) -> Option<&str> {
        match self {
            NativeType::Object(name) | NativeType::Ref(name) | NativeType::Ptr(name) => {
                Some(name.as_str())
            }
            _ => None,
        }
    }

    /// Check if this is any of the object flavours
    pub fn is_object(&self) -> bool {
        self.class_name().is_some()
    }

    /// Check if this is `Void`
    pub fn is_void(&self) -> bool {
        matches!(self, NativeType::Void)
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeType::Void => write!(f, "void"),
            NativeType::Bool => write!(f, "bool"),
            NativeType::Int => write!(f, "int"),
            NativeType::Double => write!(f, "double"),
            NativeType::Str => write!(f, "string"),
            NativeType::Object(name) => write!(f, "{}", name),
            NativeType::Ref(name) => write!(f, "{}&", name),
            NativeType::Ptr(name) => write!(f, "{}*", name),
        }
    }
}

// ============================================================================
// SlotKey
// ============================================================================

/// Identity of a virtual slot: name, parameter types and const qualifier.
///
/// Two declarations with the same key occupy the same slot; overloads
/// differ in their parameter list, and a const and non-const method of the
/// same name and parameters are distinct slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    /// Method name
    pub name: String,
    /// Parameter types in declaration order
    pub params: Vec<NativeType>,
    /// Const-qualified (callable through a const reference)
    pub is_const: bool,
}

impl SlotKey {
    /// Create a non-const slot key
    pub fn new(name: impl Into<String>, params: Vec<NativeType>) -> Self {
        Self {
            name: name.into(),
            params,
            is_const: false,
        }
    }

    /// Create a const-qualified slot key
    pub fn new_const(name: impl Into<String>, params: Vec<NativeType>) -> Self {
        Self {
            name: name.into(),
            params,
            is_const: true,
        }
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ")")?;
        if self.is_const {
            write!(f, " const")?;
        }
        Ok(())
    }
}

// ============================================================================
// Access / CopyPolicy
// ============================================================================

/// Member access level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    /// Visible everywhere
    #[default]
    Public,
    /// Visible to derived classes only
    Protected,
    /// Visible to the declaring class only
    Private,
}

impl Access {
    /// Whether a member with this access is visible from outside the class,
    /// either from a derived class (`from_derived`) or from unrelated code.
    pub fn visible(self, from_derived: bool) -> bool {
        match self {
            Access::Public => true,
            Access::Protected => from_derived,
            Access::Private => false,
        }
    }
}

/// How instances of a native interface may be duplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyPolicy {
    /// Public copy and move
    #[default]
    Public,
    /// Copy constructor is protected
    Protected,
    /// Copy constructor is private
    Private,
    /// Copy deleted, move available
    MoveOnly,
    /// Neither copy nor move
    Deleted,
}

impl CopyPolicy {
    /// Whether the copy constructor can be invoked
    pub fn can_copy(self, from_derived: bool) -> bool {
        match self {
            CopyPolicy::Public => true,
            CopyPolicy::Protected => from_derived,
            CopyPolicy::Private | CopyPolicy::MoveOnly | CopyPolicy::Deleted => false,
        }
    }

    /// Whether the move constructor can be invoked
    pub fn can_move(self, from_derived: bool) -> bool {
        match self {
            CopyPolicy::Public | CopyPolicy::MoveOnly => true,
            CopyPolicy::Protected => from_derived,
            CopyPolicy::Private | CopyPolicy::Deleted => false,
        }
    }
}

// ============================================================================
// OwnershipFlag
// ============================================================================

/// Which side is responsible for the final release of a bridged instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnershipFlag {
    /// Native code owns the instance; it may be handed to native callers
    Native,
    /// The dynamic side owns the instance; it is never handed over
    Dynamic,
    /// Both sides hold owning references
    Shared,
}

impl OwnershipFlag {
    /// Encode for atomic storage
    pub fn as_u8(self) -> u8 {
        match self {
            OwnershipFlag::Native => 0,
            OwnershipFlag::Dynamic => 1,
            OwnershipFlag::Shared => 2,
        }
    }

    /// Decode from atomic storage
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => OwnershipFlag::Native,
            2 => OwnershipFlag::Shared,
            _ => OwnershipFlag::Dynamic,
        }
    }

    /// Whether native callers may receive the instance
    pub fn native_may_hold(self) -> bool {
        !matches!(self, OwnershipFlag::Dynamic)
    }
}

impl fmt::Display for OwnershipFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnershipFlag::Native => write!(f, "native"),
            OwnershipFlag::Dynamic => write!(f, "dynamic"),
            OwnershipFlag::Shared => write!(f, "shared"),
        }
    }
}
