//! The instruction model: typed instruction variants, raw operands and stack effects.
//!
//! Decoded method bodies are streams of [`crate::assembly::body::CilToken`]s. Every
//! instruction the template machinery needs to reason about (argument and local access,
//! branches, field access, calls, returns) is a dedicated [`Instruction`] variant with a
//! symbolic operand. Every other opcode is carried as [`Instruction::Raw`] with its original
//! opcode and an [`Operand`].
//!
//! Each instruction declares how many stack slots it pops and pushes. These declarations
//! drive the static stack-balance walk used to find placeholder argument boundaries, so they
//! must match the real effect of the operation exactly.
//!
//! # Key Types
//! - [`Instruction`] - Typed instruction variants
//! - [`Operand`] / [`Immediate`] - Operands of raw instructions
//! - [`OperandType`] - Encoded operand shape of an opcode
//! - [`StackCount`] - Declared pop / push class
//! - [`FlowType`] - Control-flow classification
//! - [`BranchCondition`] - Condition of a typed branch

use std::fmt;

use strum::{Display, EnumCount, EnumIter};

use crate::{
    assembly::{
        body::{Label, Local},
        opcodes::{self, OpCode},
    },
    metadata::{CilTypeRc, FieldRc, MethodRc, Symbol},
    Error, Result,
};

/// The encoded shape of an opcode's operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandType {
    /// No operand
    None,
    /// Signed 8-bit immediate (`ldc.i4.s`)
    Int8,
    /// Unsigned 8-bit immediate or short variable index
    UInt8,
    /// Unsigned 16-bit variable index
    UInt16,
    /// Signed 32-bit immediate
    Int32,
    /// Signed 64-bit immediate
    Int64,
    /// 32-bit float immediate
    Float32,
    /// 64-bit float immediate
    Float64,
    /// Signed 8-bit branch offset
    ShortBranch,
    /// Signed 32-bit branch offset
    Branch,
    /// Switch jump table
    Switch,
    /// Type token
    Type,
    /// Field token
    Field,
    /// Method token
    Method,
    /// User string token
    String,
    /// Stand-alone signature token
    Signature,
    /// Type, field or method token (`ldtoken`)
    Token,
}

impl OperandType {
    /// Encoded operand size in bytes, `None` for the variable-length switch table.
    #[must_use]
    pub fn size(self) -> Option<usize> {
        match self {
            OperandType::None => Some(0),
            OperandType::Int8 | OperandType::UInt8 | OperandType::ShortBranch => Some(1),
            OperandType::UInt16 => Some(2),
            OperandType::Int32
            | OperandType::Float32
            | OperandType::Branch
            | OperandType::Type
            | OperandType::Field
            | OperandType::Method
            | OperandType::String
            | OperandType::Signature
            | OperandType::Token => Some(4),
            OperandType::Int64 | OperandType::Float64 => Some(8),
            OperandType::Switch => None,
        }
    }

    /// A short human readable name for error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            OperandType::None => "no operand",
            OperandType::Int8 => "int8",
            OperandType::UInt8 => "uint8",
            OperandType::UInt16 => "uint16",
            OperandType::Int32 => "int32",
            OperandType::Int64 => "int64",
            OperandType::Float32 => "float32",
            OperandType::Float64 => "float64",
            OperandType::ShortBranch | OperandType::Branch => "label",
            OperandType::Switch => "label list",
            OperandType::Type => "type",
            OperandType::Field => "field",
            OperandType::Method => "method",
            OperandType::String => "string",
            OperandType::Signature => "signature",
            OperandType::Token => "ldtoken symbol",
        }
    }
}

/// Control-flow classification of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowType {
    /// Falls through to the next instruction
    Sequential,
    /// Branches or falls through depending on a condition
    ConditionalBranch,
    /// Always branches
    UnconditionalBranch,
    /// Calls a method and continues with the next instruction
    Call,
    /// Leaves the method (`ret`, `jmp`)
    Return,
    /// Multi-way branch
    Switch,
    /// Raises an exception
    Throw,
    /// Ends a `finally`, `fault` or filter block
    EndFinally,
    /// Leaves a protected region
    Leave,
}

impl FlowType {
    /// Returns `true` if control may continue somewhere other than the next instruction.
    #[must_use]
    pub fn is_control_transfer(self) -> bool {
        !matches!(self, FlowType::Sequential | FlowType::Call)
    }
}

/// Declared number of stack slots an instruction pops or pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackCount {
    /// A fixed number of slots
    Fixed(u8),
    /// Depends on the callee's signature
    Variable,
}

/// Immediate operand values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit value
    Int8(i8),
    /// Unsigned 8-bit value
    UInt8(u8),
    /// Unsigned 16-bit value
    UInt16(u16),
    /// Signed 32-bit value
    Int32(i32),
    /// Signed 64-bit value
    Int64(i64),
    /// 32-bit float value
    Float32(f32),
    /// 64-bit float value
    Float64(f64),
}

impl Immediate {
    /// The operand shape this immediate encodes as.
    #[must_use]
    pub fn operand_type(&self) -> OperandType {
        match self {
            Immediate::Int8(_) => OperandType::Int8,
            Immediate::UInt8(_) => OperandType::UInt8,
            Immediate::UInt16(_) => OperandType::UInt16,
            Immediate::Int32(_) => OperandType::Int32,
            Immediate::Int64(_) => OperandType::Int64,
            Immediate::Float32(_) => OperandType::Float32,
            Immediate::Float64(_) => OperandType::Float64,
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(v) => write!(f, "{v}"),
            Immediate::UInt8(v) => write!(f, "{v}"),
            Immediate::UInt16(v) => write!(f, "{v}"),
            Immediate::Int32(v) => write!(f, "{v}"),
            Immediate::Int64(v) => write!(f, "{v}"),
            Immediate::Float32(v) => write!(f, "{v}"),
            Immediate::Float64(v) => write!(f, "{v}"),
        }
    }
}

/// Operand of a [`Instruction::Raw`] instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// Immediate value
    Immediate(Immediate),
    /// Resolved type
    Type(CilTypeRc),
    /// Resolved field
    Field(FieldRc),
    /// Resolved method
    Method(MethodRc),
    /// Resolved user string
    String(String),
    /// Raw stand-alone signature blob
    Signature(Vec<u8>),
    /// Resolved `ldtoken` symbol
    Token(Symbol),
    /// Branch target of `leave` / `leave.s`
    Label(Label),
    /// Jump table of `switch`
    Switch(Vec<Label>),
}

impl Operand {
    /// Returns `true` if the operand is compatible with the given operand shape.
    #[must_use]
    pub fn matches(&self, expected: OperandType) -> bool {
        match self {
            Operand::None => expected == OperandType::None,
            Operand::Immediate(imm) => imm.operand_type() == expected,
            Operand::Type(_) => expected == OperandType::Type,
            Operand::Field(_) => expected == OperandType::Field,
            Operand::Method(_) => expected == OperandType::Method,
            Operand::String(_) => expected == OperandType::String,
            Operand::Signature(_) => expected == OperandType::Signature,
            Operand::Token(_) => expected == OperandType::Token,
            Operand::Label(_) => {
                matches!(expected, OperandType::Branch | OperandType::ShortBranch)
            }
            Operand::Switch(_) => expected == OperandType::Switch,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Immediate(imm) => write!(f, "{imm}"),
            Operand::Type(ty) => write!(f, "{}", ty.fullname()),
            Operand::Field(field) => write!(f, "{field}"),
            Operand::Method(method) => write!(f, "{method}"),
            Operand::String(value) => write!(f, "{value:?}"),
            Operand::Signature(blob) => write!(f, "sig[{} bytes]", blob.len()),
            Operand::Token(symbol) => write!(f, "{symbol}"),
            Operand::Label(label) => write!(f, "{label}"),
            Operand::Switch(labels) => write!(
                f,
                "({})",
                labels
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

/// Condition of a typed branch.
///
/// The unsigned variants compare unsigned integers or unordered floats; `NotEqual` only
/// exists in that form (`bne.un`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount)]
pub enum BranchCondition {
    /// `br`
    Always,
    /// `brtrue`
    True,
    /// `brfalse`
    False,
    /// `beq`
    Equal,
    /// `bne.un`
    NotEqual,
    /// `bgt`
    GreaterThan,
    /// `bge`
    GreaterThanOrEqual,
    /// `blt`
    LessThan,
    /// `ble`
    LessThanOrEqual,
    /// `bgt.un`
    GreaterThanUnsigned,
    /// `bge.un`
    GreaterThanOrEqualUnsigned,
    /// `blt.un`
    LessThanUnsigned,
    /// `ble.un`
    LessThanOrEqualUnsigned,
}

impl BranchCondition {
    /// The 32-bit offset form of the branch.
    #[must_use]
    pub fn long_opcode(self) -> OpCode {
        match self {
            BranchCondition::Always => opcodes::BR,
            BranchCondition::True => opcodes::BRTRUE,
            BranchCondition::False => opcodes::BRFALSE,
            BranchCondition::Equal => opcodes::BEQ,
            BranchCondition::NotEqual => opcodes::BNE_UN,
            BranchCondition::GreaterThan => opcodes::BGT,
            BranchCondition::GreaterThanOrEqual => opcodes::BGE,
            BranchCondition::LessThan => opcodes::BLT,
            BranchCondition::LessThanOrEqual => opcodes::BLE,
            BranchCondition::GreaterThanUnsigned => opcodes::BGT_UN,
            BranchCondition::GreaterThanOrEqualUnsigned => opcodes::BGE_UN,
            BranchCondition::LessThanUnsigned => opcodes::BLT_UN,
            BranchCondition::LessThanOrEqualUnsigned => opcodes::BLE_UN,
        }
    }

    /// The 8-bit offset form of the branch.
    #[must_use]
    pub fn short_opcode(self) -> OpCode {
        // Short forms sit exactly 13 opcodes below their long forms (0x2B..0x37 / 0x38..0x44)
        OpCode(self.long_opcode().0 - 0x0D)
    }

    /// The condition encoded by a short or long branch opcode.
    #[must_use]
    pub fn from_opcode(opcode: OpCode) -> Option<Self> {
        let long = match opcode.0 {
            0x2B..=0x37 => OpCode(opcode.0 + 0x0D),
            0x38..=0x44 => opcode,
            _ => return None,
        };

        match long {
            opcodes::BR => Some(BranchCondition::Always),
            opcodes::BRTRUE => Some(BranchCondition::True),
            opcodes::BRFALSE => Some(BranchCondition::False),
            opcodes::BEQ => Some(BranchCondition::Equal),
            opcodes::BNE_UN => Some(BranchCondition::NotEqual),
            opcodes::BGT => Some(BranchCondition::GreaterThan),
            opcodes::BGE => Some(BranchCondition::GreaterThanOrEqual),
            opcodes::BLT => Some(BranchCondition::LessThan),
            opcodes::BLE => Some(BranchCondition::LessThanOrEqual),
            opcodes::BGT_UN => Some(BranchCondition::GreaterThanUnsigned),
            opcodes::BGE_UN => Some(BranchCondition::GreaterThanOrEqualUnsigned),
            opcodes::BLT_UN => Some(BranchCondition::LessThanUnsigned),
            opcodes::BLE_UN => Some(BranchCondition::LessThanOrEqualUnsigned),
            _ => None,
        }
    }

    /// Number of values the branch pops to evaluate its condition.
    #[must_use]
    pub fn pops(self) -> u8 {
        match self {
            BranchCondition::Always => 0,
            BranchCondition::True | BranchCondition::False => 1,
            _ => 2,
        }
    }
}

/// A single decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// `ldarg` in any width
    LoadArgument(u16),
    /// `ldarga` in any width
    LoadArgumentAddress(u16),
    /// `starg` in any width
    StoreArgument(u16),
    /// `ldloc` in any width
    LoadLocal(Local),
    /// `ldloca` in any width
    LoadLocalAddress(Local),
    /// `stloc` in any width
    StoreLocal(Local),
    /// Conditional or unconditional branch in any width
    Branch {
        /// Branch target
        label: Label,
        /// Branch condition
        condition: BranchCondition,
    },
    /// `ldfld`
    LoadField(FieldRc),
    /// `ldflda`
    LoadFieldAddress(FieldRc),
    /// `stfld`
    StoreField(FieldRc),
    /// `ldsfld`
    LoadStaticField(FieldRc),
    /// `ldsflda`
    LoadStaticFieldAddress(FieldRc),
    /// `stsfld`
    StoreStaticField(FieldRc),
    /// `call` or `callvirt`; the encoder picks the form from the target
    Call(MethodRc),
    /// `ret`
    Return,
    /// Any other opcode with its operand
    Raw {
        /// The original opcode
        opcode: OpCode,
        /// The decoded operand
        operand: Operand,
    },
}

impl Instruction {
    /// A raw instruction without operand.
    #[must_use]
    pub fn raw(opcode: OpCode) -> Self {
        Instruction::Raw {
            opcode,
            operand: Operand::None,
        }
    }

    /// A raw instruction with an operand.
    #[must_use]
    pub fn raw_with(opcode: OpCode, operand: Operand) -> Self {
        Instruction::Raw { opcode, operand }
    }

    /// The most compact `ldc.i4` form loading `value`.
    #[must_use]
    pub fn load_i4(value: i32) -> Self {
        match value {
            -1 => Instruction::raw(opcodes::LDC_I4_M1),
            0..=8 => Instruction::raw(OpCode(opcodes::LDC_I4_0.0 + value.unsigned_abs() as u16)),
            v if i8::try_from(v).is_ok() => Instruction::raw_with(
                opcodes::LDC_I4_S,
                Operand::Immediate(Immediate::Int8(v as i8)),
            ),
            v => Instruction::raw_with(opcodes::LDC_I4, Operand::Immediate(Immediate::Int32(v))),
        }
    }

    /// The constant loaded by an `ldc.i4` instruction in any form.
    #[must_use]
    pub fn as_i4_constant(&self) -> Option<i32> {
        let Instruction::Raw { opcode, operand } = self else {
            return None;
        };

        match (opcode.0, operand) {
            (0x15, Operand::None) => Some(-1),
            (0x16..=0x1E, Operand::None) => Some(i32::from(opcode.0 - 0x16)),
            (0x1F, Operand::Immediate(Immediate::Int8(v))) => Some(i32::from(*v)),
            (0x20, Operand::Immediate(Immediate::Int32(v))) => Some(*v),
            _ => None,
        }
    }

    /// Declared pop class.
    #[must_use]
    pub fn pops(&self) -> StackCount {
        match self {
            Instruction::LoadArgument(_)
            | Instruction::LoadArgumentAddress(_)
            | Instruction::LoadLocal(_)
            | Instruction::LoadLocalAddress(_)
            | Instruction::LoadStaticField(_)
            | Instruction::LoadStaticFieldAddress(_) => StackCount::Fixed(0),
            Instruction::StoreArgument(_)
            | Instruction::StoreLocal(_)
            | Instruction::LoadField(_)
            | Instruction::LoadFieldAddress(_)
            | Instruction::StoreStaticField(_) => StackCount::Fixed(1),
            Instruction::StoreField(_) => StackCount::Fixed(2),
            Instruction::Branch { condition, .. } => StackCount::Fixed(condition.pops()),
            Instruction::Call(_) | Instruction::Return => StackCount::Variable,
            Instruction::Raw { opcode, .. } => {
                opcode.info().map_or(StackCount::Variable, |info| info.pops)
            }
        }
    }

    /// Declared push class.
    #[must_use]
    pub fn pushes(&self) -> StackCount {
        match self {
            Instruction::LoadArgument(_)
            | Instruction::LoadArgumentAddress(_)
            | Instruction::LoadLocal(_)
            | Instruction::LoadLocalAddress(_)
            | Instruction::LoadField(_)
            | Instruction::LoadFieldAddress(_)
            | Instruction::LoadStaticField(_)
            | Instruction::LoadStaticFieldAddress(_) => StackCount::Fixed(1),
            Instruction::StoreArgument(_)
            | Instruction::StoreLocal(_)
            | Instruction::StoreField(_)
            | Instruction::StoreStaticField(_)
            | Instruction::Branch { .. }
            | Instruction::Return => StackCount::Fixed(0),
            Instruction::Call(_) => StackCount::Variable,
            Instruction::Raw { opcode, .. } => {
                opcode.info().map_or(StackCount::Variable, |info| info.pushes)
            }
        }
    }

    /// Number of values popped, with variable counts resolved from the callee.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] when the count depends on information that is
    /// not statically available (indirect calls, `ret`).
    pub fn stack_pops(&self) -> Result<usize> {
        match self.pops() {
            StackCount::Fixed(count) => Ok(usize::from(count)),
            StackCount::Variable => match (self, self.callee()) {
                (Instruction::Raw { opcode, .. }, Some(method)) if *opcode == opcodes::NEWOBJ => {
                    Ok(method.param_count())
                }
                (_, Some(method)) => Ok(method.call_pops()),
                _ => Err(Error::NotSupported(format!(
                    "'{}' has no static stack effect",
                    self.mnemonic()
                ))),
            },
        }
    }

    /// Number of values pushed, with variable counts resolved from the callee.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for indirect calls.
    pub fn stack_pushes(&self) -> Result<usize> {
        match self.pushes() {
            StackCount::Fixed(count) => Ok(usize::from(count)),
            StackCount::Variable => match self.callee() {
                Some(method) => Ok(method.call_pushes()),
                None => Err(Error::NotSupported(format!(
                    "'{}' has no static stack effect",
                    self.mnemonic()
                ))),
            },
        }
    }

    /// The method invoked (or constructed) by a call-like instruction.
    #[must_use]
    pub fn callee(&self) -> Option<&MethodRc> {
        match self {
            Instruction::Call(method) => Some(method),
            Instruction::Raw {
                opcode,
                operand: Operand::Method(method),
            } if matches!(
                *opcode,
                opcodes::CALL | opcodes::CALLVIRT | opcodes::NEWOBJ
            ) =>
            {
                Some(method)
            }
            _ => None,
        }
    }

    /// Returns `true` if control may continue anywhere but the next instruction.
    #[must_use]
    pub fn is_control_transfer(&self) -> bool {
        match self {
            Instruction::Branch { .. } | Instruction::Return => true,
            Instruction::Raw { opcode, .. } => opcode
                .info()
                .is_none_or(|info| info.flow.is_control_transfer()),
            _ => false,
        }
    }

    /// The canonical mnemonic, choosing the long form for width-agnostic variants.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::LoadArgument(_) => "ldarg",
            Instruction::LoadArgumentAddress(_) => "ldarga",
            Instruction::StoreArgument(_) => "starg",
            Instruction::LoadLocal(_) => "ldloc",
            Instruction::LoadLocalAddress(_) => "ldloca",
            Instruction::StoreLocal(_) => "stloc",
            Instruction::Branch { condition, .. } => condition.long_opcode().mnemonic(),
            Instruction::LoadField(_) => "ldfld",
            Instruction::LoadFieldAddress(_) => "ldflda",
            Instruction::StoreField(_) => "stfld",
            Instruction::LoadStaticField(_) => "ldsfld",
            Instruction::LoadStaticFieldAddress(_) => "ldsflda",
            Instruction::StoreStaticField(_) => "stsfld",
            Instruction::Call(_) => "call",
            Instruction::Return => "ret",
            Instruction::Raw { opcode, .. } => opcode.mnemonic(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.mnemonic();
        match self {
            Instruction::LoadArgument(index)
            | Instruction::LoadArgumentAddress(index)
            | Instruction::StoreArgument(index) => write!(f, "{mnemonic} {index}"),
            Instruction::LoadLocal(local)
            | Instruction::LoadLocalAddress(local)
            | Instruction::StoreLocal(local) => write!(f, "{mnemonic} {local}"),
            Instruction::Branch { label, .. } => write!(f, "{mnemonic} {label}"),
            Instruction::LoadField(field)
            | Instruction::LoadFieldAddress(field)
            | Instruction::StoreField(field)
            | Instruction::LoadStaticField(field)
            | Instruction::LoadStaticFieldAddress(field)
            | Instruction::StoreStaticField(field) => write!(f, "{mnemonic} {field}"),
            Instruction::Call(method) => write!(f, "{mnemonic} {method}"),
            Instruction::Return => f.write_str(mnemonic),
            Instruction::Raw {
                operand: Operand::None,
                ..
            } => f.write_str(mnemonic),
            Instruction::Raw { operand, .. } => write!(f, "{mnemonic} {operand}"),
        }
    }
}
