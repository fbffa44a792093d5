//! Token resolution for CIL operands.
//!
//! The decoder never interprets metadata itself; every embedded token is handed to a
//! [`SymbolResolver`] together with the [`GenericContext`] of the method being decoded. The
//! resolver must be deterministic for a given module, token and context.
//!
//! [`SymbolTable`] is an in-memory resolver backed by a token map. It is what tests and hosts
//! without a loaded module use, and it substitutes open generic parameters from the supplied
//! context the same way a module-backed resolver would.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use dotemit::metadata::{
//!     token::Token, types::CilType, GenericContext, SymbolResolver, SymbolTable,
//! };
//!
//! let mut table = SymbolTable::new();
//! let ty = Arc::new(CilType::new(Token::new(0x0100_0005), "System", "Object", "System.Runtime"));
//! table.insert_type(ty.clone());
//! table.insert_string(Token::new(0x7000_0001), "hello");
//!
//! let resolved = table.resolve_type(Token::new(0x0100_0005), &GenericContext::default())?;
//! assert_eq!(resolved, ty);
//! assert_eq!(table.resolve_string(Token::new(0x7000_0001))?, "hello");
//! # Ok::<(), dotemit::Error>(())
//! ```

use std::fmt;

use rustc_hash::FxHashMap;

use crate::{
    metadata::{
        members::{FieldRc, MethodRc},
        token::{Token, TokenKind},
        types::{CilTypeRc, GenericParameter},
    },
    Error, Result,
};

/// Generic instantiation in effect while decoding a method body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenericContext {
    /// Type arguments of the enclosing type
    pub type_args: Vec<CilTypeRc>,
    /// Type arguments of the enclosing method
    pub method_args: Vec<CilTypeRc>,
}

impl GenericContext {
    /// Create a context from the enclosing type's and method's type arguments.
    #[must_use]
    pub fn new(type_args: Vec<CilTypeRc>, method_args: Vec<CilTypeRc>) -> Self {
        GenericContext {
            type_args,
            method_args,
        }
    }

    /// Look up the concrete type bound to an open generic parameter.
    #[must_use]
    pub fn bind(&self, parameter: GenericParameter) -> Option<&CilTypeRc> {
        match parameter {
            GenericParameter::Type(index) => self.type_args.get(index as usize),
            GenericParameter::Method(index) => self.method_args.get(index as usize),
        }
    }
}

/// A runtime handle loaded by `ldtoken`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// A type handle
    Type(CilTypeRc),
    /// A field handle
    Field(FieldRc),
    /// A method handle
    Method(MethodRc),
}

impl Symbol {
    /// The metadata token written back when the symbol is encoded.
    #[must_use]
    pub fn token(&self) -> Token {
        match self {
            Symbol::Type(ty) => ty.token,
            Symbol::Field(field) => field.token,
            Symbol::Method(method) => method.token,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Type(ty) => write!(f, "{}", ty.fullname()),
            Symbol::Field(field) => write!(f, "{field}"),
            Symbol::Method(method) => write!(f, "{method}"),
        }
    }
}

/// Maps metadata tokens embedded in CIL to concrete identities.
pub trait SymbolResolver {
    /// Resolve a `TypeDef`, `TypeRef` or `TypeSpec` token.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedToken`] if the token is unknown.
    fn resolve_type(&self, token: Token, context: &GenericContext) -> Result<CilTypeRc>;

    /// Resolve a `Field` or `MemberRef` token to a field.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedToken`] if the token is unknown.
    fn resolve_field(&self, token: Token, context: &GenericContext) -> Result<FieldRc>;

    /// Resolve a `MethodDef`, `MemberRef` or `MethodSpec` token to a method.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedToken`] if the token is unknown.
    fn resolve_method(&self, token: Token, context: &GenericContext) -> Result<MethodRc>;

    /// Resolve a user string token.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedToken`] if the token is unknown.
    fn resolve_string(&self, token: Token) -> Result<String>;

    /// Resolve a `StandAloneSig` token to its raw signature blob.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedToken`] if the token is unknown.
    fn resolve_signature(&self, token: Token) -> Result<Vec<u8>>;

    /// Resolve an `ldtoken` operand by dispatching on the token's table.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedToken`] if the token is unknown or references a
    /// table `ldtoken` can not load.
    fn resolve_symbol(&self, token: Token, context: &GenericContext) -> Result<Symbol> {
        match token.kind() {
            Some(kind) if kind.is_type() => Ok(Symbol::Type(self.resolve_type(token, context)?)),
            Some(TokenKind::Field) => Ok(Symbol::Field(self.resolve_field(token, context)?)),
            Some(TokenKind::MethodDef | TokenKind::MethodSpec) => {
                Ok(Symbol::Method(self.resolve_method(token, context)?))
            }
            Some(TokenKind::MemberRef) => match self.resolve_field(token, context) {
                Ok(field) => Ok(Symbol::Field(field)),
                Err(_) => Ok(Symbol::Method(self.resolve_method(token, context)?)),
            },
            _ => Err(Error::UnresolvedToken(token)),
        }
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Type(CilTypeRc),
    Field(FieldRc),
    Method(MethodRc),
    String(String),
    Signature(Vec<u8>),
}

/// An in-memory [`SymbolResolver`] keyed by token.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: FxHashMap<Token, Entry>,
}

impl SymbolTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Number of registered tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a type under its own token.
    pub fn insert_type(&mut self, ty: CilTypeRc) {
        self.entries.insert(ty.token, Entry::Type(ty));
    }

    /// Register a field under its own token.
    pub fn insert_field(&mut self, field: FieldRc) {
        self.entries.insert(field.token, Entry::Field(field));
    }

    /// Register a method under its own token.
    pub fn insert_method(&mut self, method: MethodRc) {
        self.entries.insert(method.token, Entry::Method(method));
    }

    /// Register a user string.
    pub fn insert_string(&mut self, token: Token, value: &str) {
        self.entries.insert(token, Entry::String(value.to_string()));
    }

    /// Register a stand-alone signature blob.
    pub fn insert_signature(&mut self, token: Token, blob: Vec<u8>) {
        self.entries.insert(token, Entry::Signature(blob));
    }

    /// The token registered for a user string value, if any.
    #[must_use]
    pub fn string_token(&self, value: &str) -> Option<Token> {
        self.entries.iter().find_map(|(token, entry)| match entry {
            Entry::String(s) if s == value => Some(*token),
            _ => None,
        })
    }

    fn get(&self, token: Token) -> Result<&Entry> {
        self.entries
            .get(&token)
            .ok_or(Error::UnresolvedToken(token))
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve_type(&self, token: Token, context: &GenericContext) -> Result<CilTypeRc> {
        match self.get(token)? {
            Entry::Type(ty) => match ty.generic_parameter() {
                Some(parameter) => Ok(context.bind(parameter).unwrap_or(ty).clone()),
                None => Ok(ty.clone()),
            },
            _ => Err(Error::UnresolvedToken(token)),
        }
    }

    fn resolve_field(&self, token: Token, _context: &GenericContext) -> Result<FieldRc> {
        match self.get(token)? {
            Entry::Field(field) => Ok(field.clone()),
            _ => Err(Error::UnresolvedToken(token)),
        }
    }

    fn resolve_method(&self, token: Token, _context: &GenericContext) -> Result<MethodRc> {
        match self.get(token)? {
            Entry::Method(method) => Ok(method.clone()),
            _ => Err(Error::UnresolvedToken(token)),
        }
    }

    fn resolve_string(&self, token: Token) -> Result<String> {
        match self.get(token)? {
            Entry::String(value) => Ok(value.clone()),
            _ => Err(Error::UnresolvedToken(token)),
        }
    }

    fn resolve_signature(&self, token: Token) -> Result<Vec<u8>> {
        match self.get(token)? {
            Entry::Signature(blob) => Ok(blob.clone()),
            _ => Err(Error::UnresolvedToken(token)),
        }
    }
}
