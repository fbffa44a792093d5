//! Symbol identities referenced by CIL instruction operands.
//!
//! This module holds the minimal metadata model the decoder, encoder and template expander
//! operate on. It deliberately stops at identities: a [`types::CilType`], a
//! [`members::Field`], a [`members::Method`] or a [`members::Property`] carry their token,
//! name, owner and the attributes that influence code generation, but no metadata tables.
//!
//! # Key Components
//!
//! - [`token::Token`] - Raw metadata token as embedded in CIL operands
//! - [`types::CilType`] - Resolved type identity
//! - [`members::Field`], [`members::Method`], [`members::Property`] - Member identities
//! - [`resolver::SymbolResolver`] - Injected token resolution capability
//! - [`resolver::SymbolTable`] - In-memory resolver

pub mod members;
pub mod resolver;
pub mod token;
pub mod types;

pub use members::{
    Field, FieldAttributes, FieldRc, Method, MethodAttributes, MethodRc, Property, PropertyRc,
};
pub use resolver::{GenericContext, Symbol, SymbolResolver, SymbolTable};
pub use token::{Token, TokenKind};
pub use types::{CilType, CilTypeRc, GenericParameter, TypeAttributes, TypeFlavor};
