//! Token stream encoding.
//!
//! The [`Encoder`] walks a [`MethodBody`] and emits every instruction into a [`CodeSink`],
//! choosing the most compact encoding for each typed instruction:
//!
//! - argument and local indices 0-3 use the zero-operand forms (`ldarg.0`, `stloc.3`, ...)
//! - indices up to 255 use the one-byte forms (`ldarg.s`, `ldloca.s`, ...)
//! - everything else uses the full two-byte forms
//! - [`Instruction::Call`] becomes `call` when the target dispatches non-virtually and
//!   `callvirt` otherwise
//! - typed branches are emitted in their long form; label distances are only known to the
//!   sink, which may shrink them
//!
//! Raw instructions are re-emitted verbatim. The sink owns physical locals and labels; the
//! encoder only maps the identity-compared logical ones onto them.
//!
//! # Examples
//!
//! ```rust
//! use dotemit::assembly::{encode_body, BytecodeEmitter, EncoderOptions, Instruction, MethodBody};
//!
//! let mut body = MethodBody::new();
//! body.push(Instruction::LoadArgument(1));
//! body.push(Instruction::LoadArgument(300));
//! body.push(Instruction::Return);
//!
//! let mut emitter = BytecodeEmitter::new();
//! encode_body(&body, &mut emitter, EncoderOptions::default())?;
//! let emitted = emitter.finish()?;
//! assert_eq!(emitted.code, vec![0x03, 0xFE, 0x09, 0x2C, 0x01, 0x2A]);
//! # Ok::<(), dotemit::Error>(())
//! ```

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    assembly::{
        body::{CilToken, Label, Local, MethodBody},
        instruction::{Immediate, Instruction, Operand},
        opcodes::{self, OpCode},
    },
    metadata::{CilTypeRc, FieldRc, MethodRc, Symbol},
    Error, Result,
};

/// Index of a physical local variable declared in a [`CodeSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalSlot(pub u16);

/// Operand handed to a [`CodeSink`], with labels already mapped to the sink's own handles.
#[derive(Debug, Clone, PartialEq)]
pub enum EmitOperand<L> {
    /// No operand
    None,
    /// Immediate value
    Immediate(Immediate),
    /// Type reference
    Type(CilTypeRc),
    /// Field reference
    Field(FieldRc),
    /// Method reference
    Method(MethodRc),
    /// User string
    String(String),
    /// `ldtoken` symbol
    Token(Symbol),
    /// Branch target
    Label(L),
    /// Switch jump table
    Switch(Vec<L>),
}

impl<L: fmt::Debug> fmt::Display for EmitOperand<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitOperand::None => Ok(()),
            EmitOperand::Immediate(imm) => write!(f, "{imm}"),
            EmitOperand::Type(ty) => write!(f, "{}", ty.fullname()),
            EmitOperand::Field(field) => write!(f, "{field}"),
            EmitOperand::Method(method) => write!(f, "{method}"),
            EmitOperand::String(value) => write!(f, "{value:?}"),
            EmitOperand::Token(symbol) => write!(f, "{symbol}"),
            EmitOperand::Label(label) => write!(f, "{label:?}"),
            EmitOperand::Switch(labels) => write!(f, "{labels:?}"),
        }
    }
}

/// Destination of encoded instructions.
///
/// Implemented by whatever owns the method body being built: [`crate::assembly::BytecodeEmitter`]
/// in this crate, or a host runtime's IL generator.
pub trait CodeSink {
    /// The sink's handle for a jump target
    type Label: Copy + fmt::Debug;

    /// Declare a new physical local variable.
    ///
    /// # Errors
    /// Returns an error if the sink can not hold another local.
    fn declare_local(&mut self, local_type: &CilTypeRc, pinned: bool) -> Result<LocalSlot>;

    /// Create a new, not yet placed, jump target.
    fn define_label(&mut self) -> Self::Label;

    /// Place a jump target at the current position.
    ///
    /// # Errors
    /// Returns [`crate::Error::DuplicateLabel`] if the label was already placed.
    fn mark_label(&mut self, label: Self::Label) -> Result<()>;

    /// Append one instruction.
    ///
    /// # Errors
    /// Returns an error if the operand does not fit the opcode.
    fn emit(&mut self, opcode: OpCode, operand: EmitOperand<Self::Label>) -> Result<()>;
}

/// Tunables of the [`Encoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Level every emitted instruction is logged at, `None` disables tracing
    pub log_level: Option<log::Level>,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        EncoderOptions {
            log_level: Some(log::Level::Debug),
        }
    }
}

/// Maps a token stream onto a [`CodeSink`].
pub struct Encoder<'a, S: CodeSink + ?Sized> {
    sink: &'a mut S,
    options: EncoderOptions,
    locals: FxHashMap<Local, LocalSlot>,
    labels: FxHashMap<Label, S::Label>,
}

impl<'a, S: CodeSink + ?Sized> Encoder<'a, S> {
    /// Create an encoder with default options.
    pub fn new(sink: &'a mut S) -> Self {
        Self::with_options(sink, EncoderOptions::default())
    }

    /// Create an encoder with explicit options.
    pub fn with_options(sink: &'a mut S, options: EncoderOptions) -> Self {
        Encoder {
            sink,
            options,
            locals: FxHashMap::default(),
            labels: FxHashMap::default(),
        }
    }

    /// Map a logical local onto a slot the sink already declared, e.g. a local of the
    /// method the stream is spliced into.
    pub fn bind_local(&mut self, local: &Local, slot: LocalSlot) {
        self.locals.insert(local.clone(), slot);
    }

    /// Encode a complete body: declare its unbound locals in order, then emit its tokens.
    ///
    /// The whole body is checked before the first local is declared, so a rejected body
    /// leaves the sink untouched.
    ///
    /// # Errors
    /// See [`Encoder::encode_tokens`].
    pub fn encode(&mut self, body: &MethodBody) -> Result<()> {
        self.validate(&body.tokens, &body.locals)?;

        for local in &body.locals {
            if !self.locals.contains_key(local) {
                let slot = self.sink.declare_local(&local.local_type, local.pinned)?;
                self.locals.insert(local.clone(), slot);
            }
        }

        self.emit_tokens(&body.tokens)
    }

    /// Emit a token stream. Nothing reaches the sink unless the whole stream is encodable.
    ///
    /// # Errors
    /// - [`crate::Error::DuplicateLabel`] if a label is marked twice
    /// - [`crate::Error::UndefinedLabel`] if a branch targets a label never marked
    /// - [`crate::Error::UnknownLocal`] if an instruction uses an undeclared local
    /// - [`crate::Error::NotSupported`] for reserved opcodes
    /// - [`crate::Error::NotImplemented`] for signature blob operands
    /// - [`crate::Error::WrongOperandType`] if a raw operand does not fit its opcode
    pub fn encode_tokens(&mut self, tokens: &[CilToken]) -> Result<()> {
        self.validate(tokens, &[])?;
        self.emit_tokens(tokens)
    }

    /// Check `tokens` against the labels they mark and the locals that are bound or about
    /// to be declared from `declared`.
    fn validate(&self, tokens: &[CilToken], declared: &[Local]) -> Result<()> {
        let mut marked = FxHashSet::default();
        for label in tokens.iter().filter_map(CilToken::as_label) {
            if !marked.insert(label) {
                return Err(Error::DuplicateLabel(label.name().to_string()));
            }
        }

        for instruction in tokens.iter().filter_map(CilToken::as_instruction) {
            if let Some(label) = branch_targets(instruction).find(|l| !marked.contains(l)) {
                return Err(Error::UndefinedLabel(label.name().to_string()));
            }

            match instruction {
                Instruction::LoadLocal(local)
                | Instruction::LoadLocalAddress(local)
                | Instruction::StoreLocal(local) => {
                    if !self.locals.contains_key(local) && !declared.contains(local) {
                        return Err(Error::UnknownLocal(local.to_string()));
                    }
                }
                Instruction::Raw { opcode, operand } => check_raw(*opcode, operand)?,
                _ => {}
            }
        }

        Ok(())
    }

    fn emit_tokens(&mut self, tokens: &[CilToken]) -> Result<()> {
        for label in tokens.iter().filter_map(CilToken::as_label) {
            self.physical_label(label);
        }

        for token in tokens {
            match token {
                CilToken::Label(label) => {
                    let physical = self.physical_label(label);
                    if let Some(level) = self.options.log_level {
                        log::log!(level, "{label}:");
                    }
                    self.sink.mark_label(physical)?;
                }
                CilToken::Instruction(instruction) => self.encode_instruction(instruction)?,
            }
        }

        Ok(())
    }

    /// Emit a single instruction in its most compact form.
    ///
    /// # Errors
    /// See [`Encoder::encode_tokens`].
    pub fn encode_instruction(&mut self, instruction: &Instruction) -> Result<()> {
        match instruction {
            Instruction::LoadArgument(index) => self.emit_variable(
                *index,
                Some(opcodes::LDARG_0),
                opcodes::LDARG_S,
                opcodes::LDARG,
            ),
            Instruction::LoadArgumentAddress(index) => {
                self.emit_variable(*index, None, opcodes::LDARGA_S, opcodes::LDARGA)
            }
            Instruction::StoreArgument(index) => {
                self.emit_variable(*index, None, opcodes::STARG_S, opcodes::STARG)
            }
            Instruction::LoadLocal(local) => {
                let LocalSlot(index) = self.slot(local)?;
                self.emit_variable(
                    index,
                    Some(opcodes::LDLOC_0),
                    opcodes::LDLOC_S,
                    opcodes::LDLOC,
                )
            }
            Instruction::LoadLocalAddress(local) => {
                let LocalSlot(index) = self.slot(local)?;
                self.emit_variable(index, None, opcodes::LDLOCA_S, opcodes::LDLOCA)
            }
            Instruction::StoreLocal(local) => {
                let LocalSlot(index) = self.slot(local)?;
                self.emit_variable(
                    index,
                    Some(opcodes::STLOC_0),
                    opcodes::STLOC_S,
                    opcodes::STLOC,
                )
            }
            Instruction::Branch { label, condition } => {
                let target = self.physical_label(label);
                self.emit(condition.long_opcode(), EmitOperand::Label(target))
            }
            Instruction::LoadField(field) => {
                self.emit(opcodes::LDFLD, EmitOperand::Field(field.clone()))
            }
            Instruction::LoadFieldAddress(field) => {
                self.emit(opcodes::LDFLDA, EmitOperand::Field(field.clone()))
            }
            Instruction::StoreField(field) => {
                self.emit(opcodes::STFLD, EmitOperand::Field(field.clone()))
            }
            Instruction::LoadStaticField(field) => {
                self.emit(opcodes::LDSFLD, EmitOperand::Field(field.clone()))
            }
            Instruction::LoadStaticFieldAddress(field) => {
                self.emit(opcodes::LDSFLDA, EmitOperand::Field(field.clone()))
            }
            Instruction::StoreStaticField(field) => {
                self.emit(opcodes::STSFLD, EmitOperand::Field(field.clone()))
            }
            Instruction::Call(method) => {
                let opcode = if method.is_non_virtual_dispatch() {
                    opcodes::CALL
                } else {
                    opcodes::CALLVIRT
                };
                self.emit(opcode, EmitOperand::Method(method.clone()))
            }
            Instruction::Return => self.emit(opcodes::RET, EmitOperand::None),
            Instruction::Raw { opcode, operand } => self.emit_raw(*opcode, operand),
        }
    }

    fn emit_variable(
        &mut self,
        index: u16,
        zero_form: Option<OpCode>,
        short_form: OpCode,
        long_form: OpCode,
    ) -> Result<()> {
        match (zero_form, u8::try_from(index)) {
            (Some(base), Ok(small @ 0..=3)) => {
                self.emit(OpCode(base.0 + u16::from(small)), EmitOperand::None)
            }
            (_, Ok(short)) => {
                self.emit(short_form, EmitOperand::Immediate(Immediate::UInt8(short)))
            }
            (_, Err(_)) => {
                self.emit(long_form, EmitOperand::Immediate(Immediate::UInt16(index)))
            }
        }
    }

    fn emit_raw(&mut self, opcode: OpCode, operand: &Operand) -> Result<()> {
        check_raw(opcode, operand)?;

        let operand = match operand {
            Operand::None => EmitOperand::None,
            Operand::Immediate(imm) => EmitOperand::Immediate(*imm),
            Operand::Type(ty) => EmitOperand::Type(ty.clone()),
            Operand::Field(field) => EmitOperand::Field(field.clone()),
            Operand::Method(method) => EmitOperand::Method(method.clone()),
            Operand::String(value) => EmitOperand::String(value.clone()),
            Operand::Token(symbol) => EmitOperand::Token(symbol.clone()),
            Operand::Label(label) => EmitOperand::Label(self.physical_label(label)),
            Operand::Switch(labels) => EmitOperand::Switch(
                labels
                    .iter()
                    .map(|label| self.physical_label(label))
                    .collect(),
            ),
            Operand::Signature(_) => return Err(signature_operand(opcode.mnemonic())),
        };

        self.emit(opcode, operand)
    }

    fn emit(&mut self, opcode: OpCode, operand: EmitOperand<S::Label>) -> Result<()> {
        if let Some(level) = self.options.log_level {
            match operand {
                EmitOperand::None => log::log!(level, "    {}", opcode.mnemonic()),
                ref operand => log::log!(level, "    {} {}", opcode.mnemonic(), operand),
            }
        }

        self.sink.emit(opcode, operand)
    }

    fn slot(&self, local: &Local) -> Result<LocalSlot> {
        self.locals
            .get(local)
            .copied()
            .ok_or_else(|| Error::UnknownLocal(local.to_string()))
    }

    fn physical_label(&mut self, label: &Label) -> S::Label {
        if let Some(physical) = self.labels.get(label) {
            return *physical;
        }

        let physical = self.sink.define_label();
        self.labels.insert(label.clone(), physical);
        physical
    }
}

fn check_raw(opcode: OpCode, operand: &Operand) -> Result<()> {
    let info = opcode
        .info()
        .ok_or_else(|| Error::NotSupported(format!("reserved opcode {opcode:?}")))?;

    if !operand.matches(info.operand) {
        return Err(Error::WrongOperandType {
            mnemonic: info.mnemonic,
            expected: info.operand.name(),
        });
    }

    if matches!(operand, Operand::Signature(_)) {
        return Err(signature_operand(info.mnemonic));
    }

    Ok(())
}

fn signature_operand(mnemonic: &str) -> Error {
    Error::NotImplemented(format!("'{mnemonic}' with a signature blob operand"))
}

fn branch_targets(instruction: &Instruction) -> Box<dyn Iterator<Item = &Label> + '_> {
    match instruction {
        Instruction::Branch { label, .. }
        | Instruction::Raw {
            operand: Operand::Label(label),
            ..
        } => Box::new(std::iter::once(label)),
        Instruction::Raw {
            operand: Operand::Switch(labels),
            ..
        } => Box::new(labels.iter()),
        _ => Box::new(std::iter::empty()),
    }
}

/// Encode `body` into `sink` with a fresh [`Encoder`].
///
/// # Errors
/// See [`Encoder::encode_tokens`].
pub fn encode_body<S: CodeSink + ?Sized>(
    body: &MethodBody,
    sink: &mut S,
    options: EncoderOptions,
) -> Result<()> {
    Encoder::with_options(sink, options).encode(body)
}
