//! CIL instruction model, decoder and encoder.
//!
//! This module turns raw CIL bytecode into symbolic [`MethodBody`] token streams and back.
//! Between the two directions the stream can be freely rewritten: branch targets are
//! [`Label`]s, local variables are identity-compared [`Local`] handles and every embedded
//! metadata token is already resolved to a type, field, method or string.
//!
//! # Key Types
//! - [`Instruction`] - Typed instruction variants plus [`Instruction::Raw`]
//! - [`CilToken`] - A label or an instruction
//! - [`MethodBody`] - Locals and token stream of one method
//! - [`CodeSink`] - Destination of encoded instructions
//! - [`BytecodeEmitter`] - A [`CodeSink`] producing raw bytes
//!
//! # Main Functions
//! - [`decode_body`] - Decode raw bytes into a [`MethodBody`]
//! - [`encode_body`] - Emit a [`MethodBody`] into a [`CodeSink`]
//!
//! # Example
//! ```rust
//! use dotemit::{
//!     assembly::{decode_body, encode_body, BytecodeEmitter, EncoderOptions},
//!     metadata::{GenericContext, SymbolTable},
//! };
//!
//! // ldarg.1; ldc.i4.2; add; ret
//! let code = [0x03, 0x18, 0x58, 0x2A];
//! let body = decode_body(&code, &[], &SymbolTable::new(), &GenericContext::default())?;
//!
//! let mut emitter = BytecodeEmitter::new();
//! encode_body(&body, &mut emitter, EncoderOptions::default())?;
//! assert_eq!(emitter.finish()?.code, code);
//! # Ok::<(), dotemit::Error>(())
//! ```

mod body;
mod decoder;
mod emitter;
mod encoder;
mod instruction;
pub mod instructions;
pub mod opcodes;

pub use body::{CilToken, Label, Local, LocalDecl, LocalVariable, MethodBody};
pub use decoder::{decode_body, decode_opcode};
pub use emitter::{BytecodeEmitter, EmitLabel, EmittedBody};
pub use encoder::{encode_body, CodeSink, EmitOperand, Encoder, EncoderOptions, LocalSlot};
pub use instruction::{
    BranchCondition, FlowType, Immediate, Instruction, Operand, OperandType, StackCount,
};
pub use instructions::{opcode_info, OpCodeInfo};
pub use opcodes::OpCode;
