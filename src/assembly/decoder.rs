//! CIL bytecode decoding into symbolic token streams.
//!
//! [`decode_body`] turns the raw IL bytes of a method into a [`MethodBody`]: every opcode is
//! read together with its operand, embedded metadata tokens are resolved through the
//! injected [`SymbolResolver`], and branch offsets are replaced by [`Label`] tokens placed in
//! front of their target instruction.
//!
//! # Decoding Process
//!
//! 1. Read the opcode: one byte, or two if the first byte is the `0xFE` prefix.
//! 2. Read the operand according to the opcode's [`OperandType`].
//! 3. Branch targets are `address of the next instruction + signed offset`; one label is
//!    created per distinct target address.
//! 4. Canonical opcodes (argument and local access, branches, field access, calls, `ret`)
//!    become typed [`Instruction`] variants, everything else stays [`Instruction::Raw`].
//! 5. Labels are spliced into the stream in front of the instruction at their address.
//!
//! Decoding is all-or-nothing: any error aborts the whole body.
//!
//! # Examples
//!
//! ```rust
//! use dotemit::{
//!     assembly::{decode_body, Instruction},
//!     metadata::{GenericContext, SymbolTable},
//! };
//!
//! // ldarg.1; ldarg.s 4; ret
//! let body = decode_body(&[0x03, 0x0E, 0x04, 0x2A], &[], &SymbolTable::new(), &GenericContext::default())?;
//! let instructions: Vec<_> = body.instructions().cloned().collect();
//! assert_eq!(
//!     instructions,
//!     vec![Instruction::LoadArgument(1), Instruction::LoadArgument(4), Instruction::Return]
//! );
//! # Ok::<(), dotemit::Error>(())
//! ```

use rustc_hash::FxHashMap;

use crate::{
    assembly::{
        body::{CilToken, Label, Local, LocalDecl, LocalVariable, MethodBody},
        instruction::{BranchCondition, Immediate, Instruction, Operand, OperandType},
        instructions::OpCodeInfo,
        opcodes::{self, OpCode, FE_PREFIX},
    },
    metadata::{CilTypeRc, FieldRc, GenericContext, MethodRc, SymbolResolver, Token},
    utils::cursor::Parser,
    Error, Result,
};

/// Operand as read from the byte stream, before branch targets become labels.
enum RawOperand {
    Operand(Operand),
    Target(usize),
    Targets(Vec<usize>),
}

/// Read a single opcode, including the `0xFE` prefix byte of two-byte opcodes.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] on truncated input and [`crate::Error::Malformed`]
/// for reserved opcodes.
pub fn decode_opcode(parser: &mut Parser) -> Result<(OpCode, &'static OpCodeInfo)> {
    let first_byte = parser.read_le::<u8>()?;
    let opcode = if first_byte == FE_PREFIX {
        let second_byte = parser.read_le::<u8>()?;
        OpCode::from_bytes(FE_PREFIX, second_byte)
    } else {
        OpCode::from_bytes(0, first_byte)
    };

    match opcode.info() {
        Some(info) => Ok((opcode, info)),
        None if opcode.is_prefixed() => Err(malformed_error!(
            "Reserved opcode: FE {:02X} at offset {}",
            opcode.code(),
            parser.pos() - 2
        )),
        None => Err(malformed_error!(
            "Reserved opcode: {:02X} at offset {}",
            opcode.code(),
            parser.pos() - 1
        )),
    }
}

/// Decode a complete method body.
///
/// `locals` is the method's local variable signature; one [`Local`] named `Local_{n}` is
/// created per entry. Embedded tokens are resolved with `resolver` under `context`.
///
/// # Errors
/// - [`crate::Error::Malformed`] for reserved opcodes, out-of-range local indices and branch
///   targets that do not land on an instruction boundary
/// - [`crate::Error::OutOfBounds`] for truncated operands
/// - [`crate::Error::NotSupported`] for indirect calls and operands resolving to open
///   generic parameters
/// - any error returned by the resolver
pub fn decode_body<R>(
    code: &[u8],
    locals: &[LocalDecl],
    resolver: &R,
    context: &GenericContext,
) -> Result<MethodBody>
where
    R: SymbolResolver + ?Sized,
{
    let decoder = Decoder {
        parser: Parser::new(code),
        resolver,
        context,
        locals: locals
            .iter()
            .enumerate()
            .map(|(index, decl)| {
                Local::new(LocalVariable::new(
                    decl.local_type.clone(),
                    Some(format!("Local_{index}")),
                    decl.pinned,
                ))
            })
            .collect(),
        labels: FxHashMap::default(),
        label_order: Vec::new(),
        decoded: Vec::new(),
    };

    decoder.decode()
}

struct Decoder<'a, R: ?Sized> {
    parser: Parser<'a>,
    resolver: &'a R,
    context: &'a GenericContext,
    locals: Vec<Local>,
    labels: FxHashMap<usize, Label>,
    label_order: Vec<usize>,
    decoded: Vec<(usize, Instruction)>,
}

impl<R: SymbolResolver + ?Sized> Decoder<'_, R> {
    fn decode(mut self) -> Result<MethodBody> {
        while self.parser.has_more_data() {
            let address = self.parser.pos();
            let (opcode, info) = decode_opcode(&mut self.parser)?;
            let operand = self.read_operand(opcode, info)?;
            let instruction = self.lift(opcode, info, operand)?;
            self.decoded.push((address, instruction));
        }

        let end = self.parser.len();
        for address in &self.label_order {
            let on_boundary = *address == end
                || self
                    .decoded
                    .binary_search_by_key(address, |(start, _)| *start)
                    .is_ok();
            if !on_boundary {
                return Err(malformed_error!(
                    "Branch target {} is not an instruction boundary",
                    address
                ));
            }
        }

        let mut tokens = Vec::with_capacity(self.decoded.len() + self.labels.len());
        for (address, instruction) in self.decoded {
            if let Some(label) = self.labels.get(&address) {
                tokens.push(CilToken::Label(label.clone()));
            }
            tokens.push(CilToken::Instruction(instruction));
        }
        if let Some(label) = self.labels.get(&end) {
            tokens.push(CilToken::Label(label.clone()));
        }

        log::trace!(
            "decoded {} bytes into {} tokens ({} labels, {} locals)",
            end,
            tokens.len(),
            self.labels.len(),
            self.locals.len()
        );

        Ok(MethodBody::with_tokens(self.locals, tokens))
    }

    fn read_operand(&mut self, opcode: OpCode, info: &OpCodeInfo) -> Result<RawOperand> {
        if opcode == opcodes::CALLI {
            return Err(Error::NotSupported(format!(
                "indirect call at offset {}",
                self.parser.pos() - 1
            )));
        }

        let parser = &mut self.parser;
        let operand = match info.operand {
            OperandType::None => Operand::None,
            OperandType::Int8 => Operand::Immediate(Immediate::Int8(parser.read_le::<i8>()?)),
            OperandType::UInt8 => Operand::Immediate(Immediate::UInt8(parser.read_le::<u8>()?)),
            OperandType::UInt16 => Operand::Immediate(Immediate::UInt16(parser.read_le::<u16>()?)),
            OperandType::Int32 => Operand::Immediate(Immediate::Int32(parser.read_le::<i32>()?)),
            OperandType::Int64 => Operand::Immediate(Immediate::Int64(parser.read_le::<i64>()?)),
            OperandType::Float32 => {
                Operand::Immediate(Immediate::Float32(parser.read_le::<f32>()?))
            }
            OperandType::Float64 => {
                Operand::Immediate(Immediate::Float64(parser.read_le::<f64>()?))
            }
            OperandType::ShortBranch => {
                let offset = i64::from(parser.read_le::<i8>()?);
                return Ok(RawOperand::Target(branch_target(parser, offset)?));
            }
            OperandType::Branch => {
                let offset = i64::from(parser.read_le::<i32>()?);
                return Ok(RawOperand::Target(branch_target(parser, offset)?));
            }
            OperandType::Switch => {
                let case_count = parser.read_le::<u32>()? as usize;
                parser.ensure_remaining(case_count.saturating_mul(4))?;

                let mut offsets = Vec::with_capacity(case_count);
                for _ in 0..case_count {
                    offsets.push(i64::from(parser.read_le::<i32>()?));
                }

                let mut targets = Vec::with_capacity(case_count);
                for offset in offsets {
                    targets.push(branch_target(parser, offset)?);
                }
                return Ok(RawOperand::Targets(targets));
            }
            OperandType::Type => {
                let token = Token::new(parser.read_le::<u32>()?);
                Operand::Type(self.resolve_type(token)?)
            }
            OperandType::Field => {
                let token = Token::new(parser.read_le::<u32>()?);
                Operand::Field(self.resolve_field(token)?)
            }
            OperandType::Method => {
                let token = Token::new(parser.read_le::<u32>()?);
                Operand::Method(self.resolve_method(token)?)
            }
            OperandType::String => {
                let token = Token::new(parser.read_le::<u32>()?);
                Operand::String(self.resolver.resolve_string(token)?)
            }
            OperandType::Signature => {
                let token = Token::new(parser.read_le::<u32>()?);
                Operand::Signature(self.resolver.resolve_signature(token)?)
            }
            OperandType::Token => {
                let token = Token::new(parser.read_le::<u32>()?);
                Operand::Token(self.resolver.resolve_symbol(token, self.context)?)
            }
        };

        Ok(RawOperand::Operand(operand))
    }

    fn lift(
        &mut self,
        opcode: OpCode,
        info: &OpCodeInfo,
        operand: RawOperand,
    ) -> Result<Instruction> {
        let operand = match operand {
            RawOperand::Target(address) => {
                let label = self.label_at(address);
                return Ok(match BranchCondition::from_opcode(opcode) {
                    Some(condition) => Instruction::Branch { label, condition },
                    None => Instruction::raw_with(opcode, Operand::Label(label)),
                });
            }
            RawOperand::Targets(addresses) => {
                let labels = addresses
                    .into_iter()
                    .map(|address| self.label_at(address))
                    .collect();
                return Ok(Instruction::raw_with(opcode, Operand::Switch(labels)));
            }
            RawOperand::Operand(operand) => operand,
        };

        let instruction = match (opcode, operand) {
            (
                opcodes::LDARG_0 | opcodes::LDARG_1 | opcodes::LDARG_2 | opcodes::LDARG_3,
                Operand::None,
            ) => Instruction::LoadArgument(opcode.0 - opcodes::LDARG_0.0),
            (
                opcodes::LDLOC_0 | opcodes::LDLOC_1 | opcodes::LDLOC_2 | opcodes::LDLOC_3,
                Operand::None,
            ) => Instruction::LoadLocal(self.local((opcode.0 - opcodes::LDLOC_0.0).into())?),
            (
                opcodes::STLOC_0 | opcodes::STLOC_1 | opcodes::STLOC_2 | opcodes::STLOC_3,
                Operand::None,
            ) => Instruction::StoreLocal(self.local((opcode.0 - opcodes::STLOC_0.0).into())?),
            (
                opcodes::LDARG_S
                | opcodes::LDARGA_S
                | opcodes::STARG_S
                | opcodes::LDLOC_S
                | opcodes::LDLOCA_S
                | opcodes::STLOC_S
                | opcodes::LDARG
                | opcodes::LDARGA
                | opcodes::STARG
                | opcodes::LDLOC
                | opcodes::LDLOCA
                | opcodes::STLOC,
                Operand::Immediate(immediate),
            ) => {
                let index = match immediate {
                    Immediate::UInt8(index) => u16::from(index),
                    Immediate::UInt16(index) => index,
                    _ => {
                        return Err(malformed_error!(
                            "Invalid variable operand for {}",
                            info.mnemonic
                        ))
                    }
                };
                match opcode {
                    opcodes::LDARG_S | opcodes::LDARG => Instruction::LoadArgument(index),
                    opcodes::LDARGA_S | opcodes::LDARGA => Instruction::LoadArgumentAddress(index),
                    opcodes::STARG_S | opcodes::STARG => Instruction::StoreArgument(index),
                    opcodes::LDLOC_S | opcodes::LDLOC => {
                        Instruction::LoadLocal(self.local(index.into())?)
                    }
                    opcodes::LDLOCA_S | opcodes::LDLOCA => {
                        Instruction::LoadLocalAddress(self.local(index.into())?)
                    }
                    _ => Instruction::StoreLocal(self.local(index.into())?),
                }
            }
            (opcodes::LDFLD, Operand::Field(field)) => Instruction::LoadField(field),
            (opcodes::LDFLDA, Operand::Field(field)) => Instruction::LoadFieldAddress(field),
            (opcodes::STFLD, Operand::Field(field)) => Instruction::StoreField(field),
            (opcodes::LDSFLD, Operand::Field(field)) => Instruction::LoadStaticField(field),
            (opcodes::LDSFLDA, Operand::Field(field)) => {
                Instruction::LoadStaticFieldAddress(field)
            }
            (opcodes::STSFLD, Operand::Field(field)) => Instruction::StoreStaticField(field),
            (opcodes::CALL | opcodes::CALLVIRT, Operand::Method(method)) => {
                Instruction::Call(method)
            }
            (opcodes::RET, Operand::None) => Instruction::Return,
            (opcode, operand) => Instruction::raw_with(opcode, operand),
        };

        Ok(instruction)
    }

    fn label_at(&mut self, address: usize) -> Label {
        if let Some(label) = self.labels.get(&address) {
            return label.clone();
        }

        let label = Label::new(&format!("Label_{}", self.labels.len()));
        self.labels.insert(address, label.clone());
        self.label_order.push(address);
        label
    }

    fn local(&self, index: usize) -> Result<Local> {
        self.locals.get(index).cloned().ok_or_else(|| {
            malformed_error!(
                "Local index {} out of range ({} locals declared)",
                index,
                self.locals.len()
            )
        })
    }

    fn resolve_type(&self, token: Token) -> Result<CilTypeRc> {
        let ty = self.resolver.resolve_type(token, self.context)?;
        reject_open_generic(&ty, token)?;
        Ok(ty)
    }

    fn resolve_field(&self, token: Token) -> Result<FieldRc> {
        let field = self.resolver.resolve_field(token, self.context)?;
        reject_open_generic(&field.declaring_type, token)?;
        reject_open_generic(&field.field_type, token)?;
        Ok(field)
    }

    fn resolve_method(&self, token: Token) -> Result<MethodRc> {
        let method = self.resolver.resolve_method(token, self.context)?;
        reject_open_generic(&method.declaring_type, token)?;
        Ok(method)
    }
}

fn reject_open_generic(ty: &CilTypeRc, token: Token) -> Result<()> {
    match ty.generic_parameter() {
        Some(parameter) => Err(Error::NotSupported(format!(
            "token {token} references the open generic parameter {parameter:?}"
        ))),
        None => Ok(()),
    }
}

fn branch_target(parser: &Parser, offset: i64) -> Result<usize> {
    let next = i64::try_from(parser.pos())
        .map_err(|_| malformed_error!("Branch origin {} too large", parser.pos()))?;
    let target = next + offset;
    if target < 0 || target > parser.len() as i64 {
        return Err(malformed_error!(
            "Branch target {} outside of the method body ({} bytes)",
            target,
            parser.len()
        ));
    }

    usize::try_from(target).map_err(|_| malformed_error!("Invalid branch target {}", target))
}
