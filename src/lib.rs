// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # dotemit
//!
//! [![Crates.io](https://img.shields.io/crates/v/dotemit.svg)](https://crates.io/crates/dotemit)
//! [![Documentation](https://docs.rs/dotemit/badge.svg)](https://docs.rs/dotemit)
//! [![License](https://img.shields.io/badge/license-Apache--2.0-blue.svg)](https://github.com/BinFlip/dotemit/blob/main/LICENSE-APACHE)
//!
//! A CIL template engine: decode compiled method bodies into symbolic token streams, rewrite
//! placeholder call sites into direct member access resolved from captured values, and encode
//! the result back into compact bytecode.
//!
//! ## Features
//!
//! - **Symbolic decoding** - Full ECMA-335 opcode table, labels instead of byte offsets,
//!   metadata tokens resolved through a pluggable [`metadata::SymbolResolver`]
//! - **Compact encoding** - Shortest argument, local and branch forms, `call` vs `callvirt`
//!   selection, label fixups and max-stack tracking in [`assembly::BytecodeEmitter`]
//! - **Macro expansion** - `Get`, `Set`, `Ref` and `Call` placeholders with argument
//!   boundaries recovered from declared stack effects
//! - **Captured objects** - Values without a literal form are handed to generated code through
//!   a claim-once static accessor and the process-wide [`templating::CaptureTable`]
//!
//! ## Quick Start
//!
//! ```rust
//! use dotemit::prelude::*;
//!
//! // ldarg.1; ldc.i4.s 100; add; ret
//! let code = [0x03, 0x1F, 0x64, 0x58, 0x2A];
//! let body = decode_body(&code, &[], &SymbolTable::new(), &GenericContext::default())?;
//!
//! let mut emitter = BytecodeEmitter::new();
//! encode_body(&body, &mut emitter, EncoderOptions::default())?;
//! let emitted = emitter.finish()?;
//!
//! assert_eq!(emitted.code, code);
//! assert_eq!(emitted.max_stack, 2);
//! # Ok::<(), dotemit::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`assembly`] - Instruction model, decoder, encoder and the byte-level emitter
//! - [`metadata`] - Tokens, type and member identities, symbol resolution
//! - [`templating`] - Capture context, placeholder expansion and the end-to-end processor
//! - [`utils`] - Cursors and little-endian I/O
//! - [`Error`] and [`Result`] - Error handling
//!
//! Data flows strictly forward:
//!
//! ```text
//! bytes --decode_body--> MethodBody --MacroExpander--> MethodBody --Encoder--> CodeSink
//! ```
//!
//! ## Error Handling
//!
//! Every operation is all-or-nothing and reports failures through [`Error`]:
//!
//! ```rust
//! use dotemit::{assembly::decode_body, metadata::{GenericContext, SymbolTable}, Error};
//!
//! // ldfld without its 4-byte token
//! match decode_body(&[0x7B, 0x01], &[], &SymbolTable::new(), &GenericContext::default()) {
//!     Err(Error::OutOfBounds) => println!("truncated body"),
//!     Err(e) => println!("other error: {e}"),
//!     Ok(body) => println!("{} tokens", body.tokens.len()),
//! }
//! ```
//!
//! ## Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade and never installs a logger.
//! The encoder traces every emitted instruction at [`assembly::EncoderOptions::log_level`], the
//! expander reports placeholder dispatch and accessor generation at `debug`.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dotemit::prelude::*;
///
/// let mut body = MethodBody::new();
/// body.push(Instruction::LoadArgument(0));
/// body.push(Instruction::Return);
/// assert_eq!(body.instructions().count(), 2);
/// ```
pub mod prelude;

/// The CIL instruction model, decoding and encoding.
///
/// # Key Types
///
/// - [`assembly::Instruction`] - Typed instruction with its operand and stack effect
/// - [`assembly::MethodBody`] - Locals plus the token stream of instructions and labels
/// - [`assembly::CodeSink`] - Destination of encoded instructions
/// - [`assembly::BytecodeEmitter`] - A [`assembly::CodeSink`] producing raw bytecode
///
/// # Main Functions
///
/// - [`assembly::decode_body`] - Bytes to token stream
/// - [`assembly::encode_body`] - Token stream to sink
pub mod assembly;

/// Metadata identities referenced by instructions.
///
/// Types, fields, methods and properties are shared through `Arc` handles and compare by
/// value. Tokens embedded in bytecode are resolved through [`metadata::SymbolResolver`];
/// [`metadata::SymbolTable`] is an in-memory implementation.
pub mod metadata;

/// Placeholder macro expansion over decoded templates.
pub mod templating;

/// Cursors and little-endian I/O helpers.
pub mod utils;

/// `dotemit` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotemit` Error type
///
/// The main error type for all operations in this crate, covering decoding, encoding,
/// macro expansion and the capture table.
pub use error::Error;
