//! Field, method and property identities referenced by CIL operands and captured values.

use std::{fmt, sync::Arc};

use bitflags::bitflags;

use crate::metadata::{token::Token, types::CilTypeRc};

/// A reference-counted [`Field`]
pub type FieldRc = Arc<Field>;
/// A reference-counted [`Method`]
pub type MethodRc = Arc<Method>;
/// A reference-counted [`Property`]
pub type PropertyRc = Arc<Property>;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Field attributes (§II.23.1.5)
    pub struct FieldAttributes: u32 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by anyone in the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Field can only be initialized, not written to after init
        const INIT_ONLY = 0x0020;
        /// Value is compile time constant
        const LITERAL = 0x0040;
        /// Field is special
        const SPECIAL_NAME = 0x0200;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Method attributes (§II.23.1.10)
    pub struct MethodAttributes: u32 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by anyone in the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method can not be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special (property accessors, operators)
        const SPECIAL_NAME = 0x0800;
        /// Runtime should check name encoding (constructors)
        const RT_SPECIAL_NAME = 0x1000;
    }
}

/// The resolved identity of a field token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    /// Token of the field within its module
    pub token: Token,
    /// Field name
    pub name: String,
    /// Type declaring the field
    pub declaring_type: CilTypeRc,
    /// Type of the value stored in the field
    pub field_type: CilTypeRc,
    /// Field attributes
    pub flags: FieldAttributes,
}

impl Field {
    /// Returns `true` for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldAttributes::STATIC)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type.fullname(), self.name)
    }
}

/// The resolved identity of a method token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Method {
    /// Token of the method within its module
    pub token: Token,
    /// Method name (`.ctor` for instance constructors)
    pub name: String,
    /// Type declaring the method
    pub declaring_type: CilTypeRc,
    /// Declared parameter types, excluding the implicit receiver
    pub params: Vec<CilTypeRc>,
    /// Return type, `None` for `void`
    pub return_type: Option<CilTypeRc>,
    /// Method attributes
    pub flags: MethodAttributes,
}

impl Method {
    /// Returns `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAttributes::STATIC)
    }

    /// Returns `true` for virtual methods.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.flags.contains(MethodAttributes::VIRTUAL)
    }

    /// Returns `true` for abstract methods.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodAttributes::ABSTRACT)
    }

    /// Returns `true` for instance constructors.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor"
    }

    /// Returns `true` if the method does not return a value.
    #[must_use]
    pub fn returns_void(&self) -> bool {
        self.return_type.as_ref().is_none_or(|ty| ty.is_void())
    }

    /// Number of declared parameters, excluding the implicit receiver.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Values a `call`/`callvirt` of this method pops: its parameters plus the receiver
    /// for instance methods.
    #[must_use]
    pub fn call_pops(&self) -> usize {
        self.params.len() + usize::from(!self.is_static())
    }

    /// Values a call of this method pushes.
    #[must_use]
    pub fn call_pushes(&self) -> usize {
        usize::from(!self.returns_void())
    }

    /// Returns `true` if a direct `call` dispatches to this exact implementation, i.e. the
    /// method is static, its declaring type is sealed, or it can not be overridden.
    #[must_use]
    pub fn is_non_virtual_dispatch(&self) -> bool {
        self.is_static()
            || self.declaring_type.is_sealed()
            || (!self.is_virtual() && !self.is_abstract())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}({})",
            self.declaring_type.fullname(),
            self.name,
            self.params
                .iter()
                .map(|p| p.fullname())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

/// The identity of a property, described by its accessors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Property {
    /// Property name
    pub name: String,
    /// Type declaring the property
    pub declaring_type: CilTypeRc,
    /// Type of the property value
    pub property_type: CilTypeRc,
    /// The `get_` accessor
    pub getter: Option<MethodRc>,
    /// The `set_` accessor
    pub setter: Option<MethodRc>,
}

impl Property {
    /// Returns `true` if the accessors are static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.getter
            .as_ref()
            .or(self.setter.as_ref())
            .is_some_and(|accessor| accessor.is_static())
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type.fullname(), self.name)
    }
}
