//! Type identities referenced by CIL operands.
//!
//! A [`CilType`] is the resolved identity of a type token: enough information to decide how
//! code touching the type must be emitted (sealed or not, value or reference type, open
//! generic parameter or concrete) without carrying a full type system.

use std::{fmt, sync::Arc};

use bitflags::bitflags;

use crate::metadata::token::Token;

/// A reference-counted [`CilType`]
pub type CilTypeRc = Arc<CilType>;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Type attributes relevant for code generation (§II.23.1.15)
    pub struct TypeAttributes: u32 {
        /// Type is visible outside its assembly
        const PUBLIC = 0x0000_0001;
        /// Type is an interface
        const INTERFACE = 0x0000_0020;
        /// Type is abstract
        const ABSTRACT = 0x0000_0080;
        /// Type can not be derived from
        const SEALED = 0x0000_0100;
        /// Type name is special (e.g. compiler generated closure classes)
        const SPECIAL_NAME = 0x0000_0400;
    }
}

/// Position of an open generic parameter within its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenericParameter {
    /// `!n`, the n-th type argument of the enclosing type
    Type(u32),
    /// `!!n`, the n-th type argument of the enclosing method
    Method(u32),
}

/// Broad classification of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFlavor {
    /// `System.Void`, only valid as a return type
    Void,
    /// A reference type
    Class,
    /// A value type (including primitives and enums)
    ValueType,
    /// An open generic parameter that still needs a generic context to become concrete
    GenericParameter(GenericParameter),
}

/// The resolved identity of a type token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CilType {
    /// Token of the type within its module
    pub token: Token,
    /// Namespace, empty for nested and global types
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Name of the assembly defining the type
    pub assembly: String,
    /// Classification of the type
    pub flavor: TypeFlavor,
    /// Type attributes
    pub flags: TypeAttributes,
}

impl CilType {
    /// Create a new reference type identity.
    #[must_use]
    pub fn new(token: Token, namespace: &str, name: &str, assembly: &str) -> Self {
        CilType {
            token,
            namespace: namespace.to_string(),
            name: name.to_string(),
            assembly: assembly.to_string(),
            flavor: TypeFlavor::Class,
            flags: TypeAttributes::PUBLIC,
        }
    }

    /// Replace the flavor of this type.
    #[must_use]
    pub fn with_flavor(mut self, flavor: TypeFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// Replace the attributes of this type.
    #[must_use]
    pub fn with_flags(mut self, flags: TypeAttributes) -> Self {
        self.flags = flags;
        self
    }

    /// `Namespace.Name`, or just `Name` without a namespace.
    #[must_use]
    pub fn fullname(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Returns `true` if the type can not be derived from.
    ///
    /// Value types are implicitly sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.flags.contains(TypeAttributes::SEALED) || self.flavor == TypeFlavor::ValueType
    }

    /// Returns `true` for value types.
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        self.flavor == TypeFlavor::ValueType
    }

    /// Returns `true` for `System.Void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        self.flavor == TypeFlavor::Void
    }

    /// Returns the generic parameter position if this type is still open.
    #[must_use]
    pub fn generic_parameter(&self) -> Option<GenericParameter> {
        match self.flavor {
            TypeFlavor::GenericParameter(parameter) => Some(parameter),
            _ => None,
        }
    }
}

impl fmt::Display for CilType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]{}", self.assembly, self.fullname())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fullname_and_display() {
        let ty = CilType::new(Token::new(0x0200_0002), "System", "String", "System.Runtime");
        assert_eq!(ty.fullname(), "System.String");
        assert_eq!(ty.to_string(), "[System.Runtime]System.String");

        let global = CilType::new(Token::new(0x0200_0001), "", "<Module>", "Demo");
        assert_eq!(global.fullname(), "<Module>");
    }

    #[test]
    fn sealed_and_value_types() {
        let class = CilType::new(Token::new(0x0200_0003), "Demo", "Widget", "Demo");
        assert!(!class.is_sealed());

        let sealed = class.clone().with_flags(TypeAttributes::SEALED);
        assert!(sealed.is_sealed());

        let value = class.with_flavor(TypeFlavor::ValueType);
        assert!(value.is_sealed());
        assert!(value.is_value_type());
    }

    #[test]
    fn generic_parameters() {
        let open = CilType::new(Token::new(0x1B00_0001), "", "T", "Demo")
            .with_flavor(TypeFlavor::GenericParameter(GenericParameter::Method(1)));
        assert_eq!(open.generic_parameter(), Some(GenericParameter::Method(1)));
        assert!(!open.is_void());
    }
}
