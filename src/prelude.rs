//! # dotemit Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dotemit library. Import this module to get quick access to the essential
//! types for decoding, expanding and encoding method bodies.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotemit operations
pub use crate::Error;

/// The result type used throughout dotemit
pub use crate::Result;

// ================================================================================================
// Metadata
// ================================================================================================

/// Metadata token type for referencing table entries
pub use crate::metadata::Token;

/// Type, member and property identities
pub use crate::metadata::{
    CilType, CilTypeRc, Field, FieldAttributes, FieldRc, Method, MethodAttributes, MethodRc,
    Property, PropertyRc, TypeAttributes, TypeFlavor,
};

/// Token resolution
pub use crate::metadata::{GenericContext, Symbol, SymbolResolver, SymbolTable};

// ================================================================================================
// Instruction Model, Decoding and Encoding
// ================================================================================================

/// Token streams and their building blocks
pub use crate::assembly::{
    BranchCondition, CilToken, Immediate, Instruction, Label, Local, LocalDecl, LocalVariable,
    MethodBody, Operand, StackCount,
};

/// Opcode identities and their static description
pub use crate::assembly::{opcode_info, opcodes, OpCode, OpCodeInfo};

/// Decoding and encoding entry points
pub use crate::assembly::{
    decode_body, encode_body, BytecodeEmitter, CodeSink, EmitOperand, EmittedBody, Encoder,
    EncoderOptions, LocalSlot,
};

// ================================================================================================
// Templating
// ================================================================================================

/// Captured state observed by templates
pub use crate::templating::{
    CaptureContext, CapturedObject, CapturedValue, Closure, ClosureObject, MemberDescriptor,
};

/// Expansion machinery
pub use crate::templating::{
    AccessorRuntime, CaptureTable, ExpanderOptions, MacroExpander, TypeUnderConstruction,
};

/// End-to-end processing
pub use crate::templating::{TemplateMethod, TemplateOptions, TemplateProcessor};
