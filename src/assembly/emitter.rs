//! A [`CodeSink`] producing raw CIL bytes.
//!
//! [`BytecodeEmitter`] is the byte-level back end of the encoder. It writes opcodes and
//! operands into a growing buffer, records a fixup for every branch, tracks the evaluation
//! stack depth, collects the local signature and interns user strings. [`BytecodeEmitter::finish`]
//! shrinks long branches whose target is close enough, resolves every fixup and hands back an
//! [`EmittedBody`].
//!
//! # Branch Shrinking
//!
//! Long branches are first emitted with a 4-byte offset. On finish, every long branch whose
//! short form can reach its target is rewritten into its 2-byte short form; this is repeated
//! until no further branch can be shrunk, since every shrink can bring other targets within
//! reach. Branches emitted in short form must reach their target or finishing fails with
//! [`crate::Error::InvalidBranch`].
//!
//! # Examples
//!
//! ```rust
//! use dotemit::assembly::{opcodes, BytecodeEmitter, CodeSink, EmitOperand};
//!
//! let mut emitter = BytecodeEmitter::new();
//! let end = emitter.define_label();
//!
//! emitter.emit(opcodes::LDARG_0, EmitOperand::None)?;
//! emitter.emit(opcodes::BRFALSE, EmitOperand::Label(end))?;
//! emitter.emit(opcodes::NOP, EmitOperand::None)?;
//! emitter.mark_label(end)?;
//! emitter.emit(opcodes::RET, EmitOperand::None)?;
//!
//! let emitted = emitter.finish()?;
//! assert_eq!(emitted.code, vec![0x02, 0x2C, 0x01, 0x00, 0x2A]);
//! assert_eq!(emitted.max_stack, 1);
//! # Ok::<(), dotemit::Error>(())
//! ```

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    assembly::{
        body::LocalDecl,
        encoder::{CodeSink, EmitOperand, LocalSlot},
        instruction::{BranchCondition, FlowType, Immediate, OperandType, StackCount},
        instructions::OpCodeInfo,
        opcodes::{self, OpCode, FE_PREFIX},
    },
    metadata::{CilTypeRc, Token, TokenKind},
    utils::io::write_le,
    Error, Result,
};

/// Handle of a label inside a [`BytecodeEmitter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EmitLabel(u32);

/// Pending branch offset awaiting label resolution.
#[derive(Debug, Clone)]
struct LabelFixup {
    label: EmitLabel,
    /// Position of the offset field
    fixup_position: usize,
    /// Width of the offset field, 1 or 4
    offset_size: u8,
    /// Position of the branch opcode
    instruction_position: usize,
    /// Short form to try on finish, for long branches only
    short_form: Option<OpCode>,
}

/// Pending switch table awaiting label resolution.
#[derive(Debug, Clone)]
struct SwitchFixup {
    labels: Vec<EmitLabel>,
    /// Position of the first 4-byte target
    fixup_position: usize,
    /// Offsets are relative to this position
    instruction_end_position: usize,
}

/// Result of [`BytecodeEmitter::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedBody {
    /// CIL bytecode with all branches resolved
    pub code: Vec<u8>,
    /// Maximum evaluation stack depth reached
    pub max_stack: u16,
    /// Local signature in slot order
    pub locals: Vec<LocalDecl>,
    /// Interned user strings and the tokens `ldstr` refers to them with
    pub user_strings: Vec<(String, Token)>,
}

/// Byte-level [`CodeSink`].
#[derive(Debug, Default)]
pub struct BytecodeEmitter {
    /// Generated bytecode buffer
    bytecode: Vec<u8>,
    /// Label positions, `None` until marked
    labels: Vec<Option<u32>>,
    fixups: Vec<LabelFixup>,
    switch_fixups: Vec<SwitchFixup>,
    locals: Vec<LocalDecl>,
    strings: FxHashMap<String, Token>,
    string_order: Vec<String>,
    next_string_row: u32,
    current_stack_depth: i32,
    max_stack_depth: u16,
    /// Expected depth at branch targets, recorded at the first reachable branch or fall-through
    label_stack_depths: FxHashMap<EmitLabel, i32>,
    /// Set after unconditional transfers until the next label
    unreachable: bool,
}

impl BytecodeEmitter {
    /// Create an empty emitter.
    #[must_use]
    pub fn new() -> Self {
        BytecodeEmitter {
            next_string_row: 1,
            ..BytecodeEmitter::default()
        }
    }

    /// Seed the user string table, e.g. with the strings of the module a body was decoded
    /// from. New strings get rows after the highest seeded one.
    #[must_use]
    pub fn with_user_strings<I>(mut self, strings: I) -> Self
    where
        I: IntoIterator<Item = (String, Token)>,
    {
        for (value, token) in strings {
            self.next_string_row = self.next_string_row.max(token.row() + 1);
            if !self.strings.contains_key(&value) {
                self.string_order.push(value.clone());
            }
            self.strings.insert(value, token);
        }
        self
    }

    /// Current bytecode length.
    #[must_use]
    pub fn position(&self) -> usize {
        self.bytecode.len()
    }

    /// Maximum stack depth reached so far.
    #[must_use]
    pub fn max_stack_depth(&self) -> u16 {
        self.max_stack_depth
    }

    /// Current stack depth.
    #[must_use]
    pub fn current_stack_depth(&self) -> i32 {
        self.current_stack_depth
    }

    /// Shrink branches, resolve all label references and return the finished body.
    ///
    /// # Errors
    /// - [`crate::Error::UndefinedLabel`] if a referenced label was never marked
    /// - [`crate::Error::InvalidBranch`] if a short branch can not reach its target
    pub fn finish(mut self) -> Result<EmittedBody> {
        self.optimize_branch_forms()?;

        let fixups = std::mem::take(&mut self.fixups);
        for fixup in &fixups {
            let target = self.label_position(fixup.label)?;
            let next = fixup.fixup_position + usize::from(fixup.offset_size);
            let offset = relative_offset(target, next)?;
            self.write_branch_offset(offset, fixup)?;
        }

        let switch_fixups = std::mem::take(&mut self.switch_fixups);
        for switch in &switch_fixups {
            for (index, label) in switch.labels.iter().enumerate() {
                let target = self.label_position(*label)?;
                let offset = relative_offset(target, switch.instruction_end_position)?;
                let position = switch.fixup_position + index * 4;
                self.bytecode[position..position + 4].copy_from_slice(&offset.to_le_bytes());
            }
        }

        let user_strings = self
            .string_order
            .into_iter()
            .filter_map(|value| {
                let token = self.strings.get(&value).copied()?;
                Some((value, token))
            })
            .collect();

        Ok(EmittedBody {
            code: self.bytecode,
            max_stack: self.max_stack_depth,
            locals: self.locals,
            user_strings,
        })
    }

    fn label_position(&self, label: EmitLabel) -> Result<u32> {
        self.labels
            .get(label.0 as usize)
            .copied()
            .flatten()
            .ok_or_else(|| Error::UndefinedLabel(format!("{label:?}")))
    }

    fn intern_string(&mut self, value: String) -> Token {
        if let Some(token) = self.strings.get(&value) {
            return *token;
        }

        let token = Token::from_parts(TokenKind::String, self.next_string_row);
        self.next_string_row += 1;
        self.string_order.push(value.clone());
        self.strings.insert(value, token);
        token
    }

    fn emit_branch(&mut self, opcode: OpCode, label: EmitLabel, operand: OperandType) {
        let instruction_position = self.bytecode.len();
        self.write_opcode(opcode);

        let (offset_size, short_form) = match operand {
            OperandType::ShortBranch => (1, None),
            _ => (4, short_branch_form(opcode)),
        };

        self.fixups.push(LabelFixup {
            label,
            fixup_position: self.bytecode.len(),
            offset_size,
            instruction_position,
            short_form,
        });
        self.bytecode
            .resize(self.bytecode.len() + usize::from(offset_size), 0);
    }

    fn emit_switch(&mut self, labels: Vec<EmitLabel>) -> Result<()> {
        let count = u32::try_from(labels.len())
            .map_err(|_| Error::InvalidBranch("switch table too large".to_string()))?;

        self.write_opcode(opcodes::SWITCH);
        write_le(&mut self.bytecode, count);

        let fixup_position = self.bytecode.len();
        self.bytecode.resize(fixup_position + labels.len() * 4, 0);
        self.switch_fixups.push(SwitchFixup {
            labels,
            fixup_position,
            instruction_end_position: self.bytecode.len(),
        });
        Ok(())
    }

    fn write_opcode(&mut self, opcode: OpCode) {
        if opcode.is_prefixed() {
            self.bytecode.push(FE_PREFIX);
        }
        self.bytecode.push(opcode.code());
    }

    fn write_operand(&mut self, info: &OpCodeInfo, operand: EmitOperand<EmitLabel>) -> Result<()> {
        let mismatch = || Error::WrongOperandType {
            mnemonic: info.mnemonic,
            expected: info.operand.name(),
        };

        match (info.operand, operand) {
            (OperandType::None, EmitOperand::None) => {}
            (OperandType::Int8, EmitOperand::Immediate(Immediate::Int8(value))) => {
                write_le(&mut self.bytecode, value);
            }
            (OperandType::UInt8, EmitOperand::Immediate(Immediate::UInt8(value))) => {
                write_le(&mut self.bytecode, value);
            }
            (OperandType::UInt16, EmitOperand::Immediate(Immediate::UInt16(value))) => {
                write_le(&mut self.bytecode, value);
            }
            (OperandType::Int32, EmitOperand::Immediate(Immediate::Int32(value))) => {
                write_le(&mut self.bytecode, value);
            }
            (OperandType::Int64, EmitOperand::Immediate(Immediate::Int64(value))) => {
                write_le(&mut self.bytecode, value);
            }
            (OperandType::Float32, EmitOperand::Immediate(Immediate::Float32(value))) => {
                write_le(&mut self.bytecode, value);
            }
            (OperandType::Float64, EmitOperand::Immediate(Immediate::Float64(value))) => {
                write_le(&mut self.bytecode, value);
            }
            (OperandType::Type, EmitOperand::Type(ty)) => {
                write_le(&mut self.bytecode, ty.token.value());
            }
            (OperandType::Field, EmitOperand::Field(field)) => {
                write_le(&mut self.bytecode, field.token.value());
            }
            (OperandType::Method, EmitOperand::Method(method)) => {
                write_le(&mut self.bytecode, method.token.value());
            }
            (OperandType::Token, EmitOperand::Token(symbol)) => {
                write_le(&mut self.bytecode, symbol.token().value());
            }
            (OperandType::String, EmitOperand::String(value)) => {
                let token = self.intern_string(value);
                write_le(&mut self.bytecode, token.value());
            }
            (OperandType::Signature, _) => {
                return Err(Error::NotImplemented(format!(
                    "'{}' requires a signature blob",
                    info.mnemonic
                )))
            }
            _ => return Err(mismatch()),
        }

        Ok(())
    }

    fn stack_effect(
        &self,
        opcode: OpCode,
        info: &OpCodeInfo,
        operand: &EmitOperand<EmitLabel>,
    ) -> Result<(i32, i32)> {
        let method = match operand {
            EmitOperand::Method(method) => Some(method),
            _ => None,
        };

        let pops = match (info.pops, method) {
            (StackCount::Fixed(count), _) => i32::from(count),
            (StackCount::Variable, Some(method)) if opcode == opcodes::NEWOBJ => {
                count(method.param_count())?
            }
            (StackCount::Variable, Some(method)) => count(method.call_pops())?,
            // ret pops the return value if there is one
            (StackCount::Variable, None) if opcode == opcodes::RET => {
                self.current_stack_depth.min(1)
            }
            (StackCount::Variable, None) => {
                return Err(Error::NotSupported(format!(
                    "no static stack effect for '{}'",
                    info.mnemonic
                )))
            }
        };

        let pushes = match (info.pushes, method) {
            (StackCount::Fixed(count), _) => i32::from(count),
            (StackCount::Variable, Some(_)) if opcode == opcodes::NEWOBJ => 1,
            (StackCount::Variable, Some(method)) => count(method.call_pushes())?,
            (StackCount::Variable, None) => 0,
        };

        Ok((pops, pushes))
    }

    fn update_stack_depth(&mut self, pops: i32, pushes: i32, mnemonic: &str) -> Result<()> {
        self.current_stack_depth -= pops;
        if self.current_stack_depth < 0 {
            if !self.unreachable {
                return Err(malformed_error!(
                    "Stack underflow at '{}': depth {} after popping {}",
                    mnemonic,
                    self.current_stack_depth,
                    pops
                ));
            }
            self.current_stack_depth = 0;
        }

        self.current_stack_depth += pushes;
        let depth = u16::try_from(self.current_stack_depth)
            .map_err(|_| malformed_error!("Stack depth {} too large", self.current_stack_depth))?;
        self.max_stack_depth = self.max_stack_depth.max(depth);
        Ok(())
    }

    fn record_label_stack_depth(&mut self, label: EmitLabel) -> Result<()> {
        if self.unreachable {
            return Ok(());
        }

        match self.label_stack_depths.get(&label) {
            Some(&expected) if expected != self.current_stack_depth => Err(malformed_error!(
                "Stack depth mismatch for branch to {:?}: expected {}, got {}",
                label,
                expected,
                self.current_stack_depth
            )),
            Some(_) => Ok(()),
            None => {
                self.label_stack_depths
                    .insert(label, self.current_stack_depth);
                Ok(())
            }
        }
    }

    fn optimize_branch_forms(&mut self) -> Result<()> {
        loop {
            let shrinkable = self.find_shrinkable_branches()?;
            if shrinkable.is_empty() {
                return Ok(());
            }
            self.apply_branch_shrinking(&shrinkable);
        }
    }

    fn find_shrinkable_branches(&self) -> Result<Vec<usize>> {
        let mut shrinkable = Vec::new();

        for (index, fixup) in self.fixups.iter().enumerate() {
            if fixup.short_form.is_none() {
                continue;
            }

            let target = self.label_position(fixup.label)?;
            // short form: opcode + 1-byte offset
            let offset = relative_offset(target, fixup.instruction_position + 2)?;
            if i8::try_from(offset).is_ok() {
                shrinkable.push(index);
            }
        }

        Ok(shrinkable)
    }

    fn apply_branch_shrinking(&mut self, shrinkable: &[usize]) {
        let shrink: FxHashSet<usize> = shrinkable.iter().copied().collect();

        // Each shrunk branch saves 3 bytes after its original end
        let mut adjustments: Vec<(usize, usize)> = Vec::with_capacity(shrinkable.len());
        let mut saved = 0;
        for &index in shrinkable {
            let fixup = &self.fixups[index];
            saved += 3;
            adjustments.push((fixup.fixup_position + 4, saved));
        }

        let adjust = |position: usize| -> usize {
            let delta = adjustments
                .iter()
                .take_while(|(threshold, _)| position >= *threshold)
                .last()
                .map_or(0, |(_, saved)| *saved);
            position - delta
        };

        let mut bytecode = Vec::with_capacity(self.bytecode.len());
        let mut source = 0;
        for (index, fixup) in self.fixups.iter().enumerate() {
            bytecode.extend_from_slice(&self.bytecode[source..fixup.instruction_position]);

            let end = fixup.fixup_position + usize::from(fixup.offset_size);
            match fixup.short_form {
                Some(short) if shrink.contains(&index) => {
                    bytecode.push(short.code());
                    bytecode.push(0);
                }
                _ => bytecode.extend_from_slice(&self.bytecode[fixup.instruction_position..end]),
            }
            source = end;
        }
        bytecode.extend_from_slice(&self.bytecode[source..]);

        for position in self.labels.iter_mut().flatten() {
            *position = adjust(*position as usize) as u32;
        }

        for (index, fixup) in self.fixups.iter_mut().enumerate() {
            let instruction_position = adjust(fixup.instruction_position);
            if shrink.contains(&index) {
                fixup.instruction_position = instruction_position;
                fixup.fixup_position = instruction_position + 1;
                fixup.offset_size = 1;
                fixup.short_form = None;
            } else {
                fixup.instruction_position = instruction_position;
                fixup.fixup_position = adjust(fixup.fixup_position);
            }
        }

        for switch in &mut self.switch_fixups {
            switch.fixup_position = adjust(switch.fixup_position);
            switch.instruction_end_position = adjust(switch.instruction_end_position);
        }

        self.bytecode = bytecode;
    }

    fn write_branch_offset(&mut self, offset: i32, fixup: &LabelFixup) -> Result<()> {
        match fixup.offset_size {
            1 => {
                let short = i8::try_from(offset).map_err(|_| {
                    Error::InvalidBranch(format!(
                        "offset {offset} out of range for a short branch"
                    ))
                })?;
                self.bytecode[fixup.fixup_position] = short.to_le_bytes()[0];
            }
            _ => {
                self.bytecode[fixup.fixup_position..fixup.fixup_position + 4]
                    .copy_from_slice(&offset.to_le_bytes());
            }
        }
        Ok(())
    }
}

impl CodeSink for BytecodeEmitter {
    type Label = EmitLabel;

    fn declare_local(&mut self, local_type: &CilTypeRc, pinned: bool) -> Result<LocalSlot> {
        let slot = u16::try_from(self.locals.len())
            .map_err(|_| Error::NotSupported("more than 65535 locals".to_string()))?;
        self.locals.push(LocalDecl::new(local_type.clone(), pinned));
        Ok(LocalSlot(slot))
    }

    fn define_label(&mut self) -> EmitLabel {
        self.labels.push(None);
        EmitLabel((self.labels.len() - 1) as u32)
    }

    fn mark_label(&mut self, label: EmitLabel) -> Result<()> {
        let position = u32::try_from(self.bytecode.len())
            .map_err(|_| malformed_error!("Bytecode length exceeds u32 range"))?;
        let slot = self
            .labels
            .get_mut(label.0 as usize)
            .ok_or_else(|| Error::UndefinedLabel(format!("{label:?}")))?;
        if slot.is_some() {
            return Err(Error::DuplicateLabel(format!("{label:?}")));
        }
        *slot = Some(position);

        // All paths reaching a label must agree on the stack depth
        match self.label_stack_depths.get(&label) {
            Some(&expected) if self.unreachable => self.current_stack_depth = expected,
            Some(&expected) if expected != self.current_stack_depth => {
                return Err(malformed_error!(
                    "Stack depth mismatch at {:?}: expected {}, got {}",
                    label,
                    expected,
                    self.current_stack_depth
                ))
            }
            Some(_) => {}
            None if self.unreachable => self.current_stack_depth = 0,
            None => {
                self.label_stack_depths
                    .insert(label, self.current_stack_depth);
            }
        }
        self.unreachable = false;
        Ok(())
    }

    fn emit(&mut self, opcode: OpCode, operand: EmitOperand<EmitLabel>) -> Result<()> {
        let info = opcode
            .info()
            .ok_or_else(|| Error::NotSupported(format!("reserved opcode {opcode:?}")))?;
        let (pops, pushes) = self.stack_effect(opcode, info, &operand)?;

        match (info.operand, operand) {
            (OperandType::ShortBranch | OperandType::Branch, EmitOperand::Label(label)) => {
                self.emit_branch(opcode, label, info.operand);
                self.update_stack_depth(pops, pushes, info.mnemonic)?;
                self.record_label_stack_depth(label)?;
            }
            (OperandType::Switch, EmitOperand::Switch(labels)) => {
                self.update_stack_depth(pops, pushes, info.mnemonic)?;
                for label in &labels {
                    self.record_label_stack_depth(*label)?;
                }
                self.emit_switch(labels)?;
            }
            (OperandType::ShortBranch | OperandType::Branch | OperandType::Switch, _) => {
                return Err(Error::WrongOperandType {
                    mnemonic: info.mnemonic,
                    expected: info.operand.name(),
                })
            }
            (_, operand) => {
                let start = self.bytecode.len();
                self.write_opcode(opcode);
                if let Err(error) = self.write_operand(info, operand) {
                    self.bytecode.truncate(start);
                    return Err(error);
                }
                self.update_stack_depth(pops, pushes, info.mnemonic)?;
            }
        }

        if matches!(
            info.flow,
            FlowType::UnconditionalBranch
                | FlowType::Return
                | FlowType::Throw
                | FlowType::EndFinally
                | FlowType::Leave
        ) {
            self.unreachable = true;
        }

        Ok(())
    }
}

fn short_branch_form(opcode: OpCode) -> Option<OpCode> {
    if opcode == opcodes::LEAVE {
        return Some(opcodes::LEAVE_S);
    }
    BranchCondition::from_opcode(opcode)
        .filter(|condition| condition.long_opcode() == opcode)
        .map(BranchCondition::short_opcode)
}

fn count(value: usize) -> Result<i32> {
    i32::try_from(value).map_err(|_| malformed_error!("Stack effect {} too large", value))
}

fn relative_offset(target: u32, next: usize) -> Result<i32> {
    let target = i64::from(target);
    let next = i64::try_from(next).map_err(|_| malformed_error!("Position exceeds i64 range"))?;
    i32::try_from(target - next)
        .map_err(|_| Error::InvalidBranch(format!("offset {} out of range", target - next)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{create_method, create_type};

    #[test]
    fn simple_instructions() -> Result<()> {
        let mut emitter = BytecodeEmitter::new();
        emitter.emit(opcodes::NOP, EmitOperand::None)?;
        emitter.emit(opcodes::LDC_I4_S, EmitOperand::Immediate(Immediate::Int8(42)))?;
        emitter.emit(opcodes::RET, EmitOperand::None)?;

        let emitted = emitter.finish()?;
        assert_eq!(emitted.code, vec![0x00, 0x1F, 42, 0x2A]);
        assert_eq!(emitted.max_stack, 1);
        Ok(())
    }

    #[test]
    fn two_byte_opcodes_and_tokens() -> Result<()> {
        let owner = create_type(2, "Demo", "Widget");
        let run = create_method(7, "Run", &owner, 1, true);

        let mut emitter = BytecodeEmitter::new();
        emitter.emit(opcodes::LDARG, EmitOperand::Immediate(Immediate::UInt16(0x0102)))?;
        emitter.emit(opcodes::CALL, EmitOperand::Method(run))?;
        emitter.emit(opcodes::LDFTN, EmitOperand::Method(create_method(8, "F", &owner, 0, true)))?;
        emitter.emit(opcodes::POP, EmitOperand::None)?;

        let emitted = emitter.finish()?;
        assert_eq!(
            emitted.code,
            vec![
                0xFE, 0x09, 0x02, 0x01, 0x28, 0x07, 0x00, 0x00, 0x06, 0xFE, 0x06, 0x08, 0x00,
                0x00, 0x06, 0x26
            ]
        );
        Ok(())
    }

    #[test]
    fn long_branches_shrink() -> Result<()> {
        let mut emitter = BytecodeEmitter::new();
        let target = emitter.define_label();
        emitter.emit(opcodes::NOP, EmitOperand::None)?;
        emitter.emit(opcodes::BR, EmitOperand::Label(target))?;
        emitter.emit(opcodes::NOP, EmitOperand::None)?;
        emitter.mark_label(target)?;
        emitter.emit(opcodes::RET, EmitOperand::None)?;

        let emitted = emitter.finish()?;
        assert_eq!(emitted.code, vec![0x00, 0x2B, 0x01, 0x00, 0x2A]);
        Ok(())
    }

    #[test]
    fn distant_branches_stay_long() -> Result<()> {
        let mut emitter = BytecodeEmitter::new();
        let target = emitter.define_label();
        emitter.emit(opcodes::BR, EmitOperand::Label(target))?;
        for _ in 0..200 {
            emitter.emit(opcodes::NOP, EmitOperand::None)?;
        }
        emitter.mark_label(target)?;
        emitter.emit(opcodes::RET, EmitOperand::None)?;

        let emitted = emitter.finish()?;
        assert_eq!(emitted.code[0], 0x38);
        let offset = [emitted.code[1], emitted.code[2], emitted.code[3], emitted.code[4]];
        assert_eq!(i32::from_le_bytes(offset), 200);
        assert_eq!(emitted.code.len(), 206);
        Ok(())
    }

    #[test]
    fn backward_branch_after_shrunk_branch() -> Result<()> {
        let mut emitter = BytecodeEmitter::new();
        let head = emitter.define_label();
        let exit = emitter.define_label();

        emitter.mark_label(head)?;
        emitter.emit(opcodes::LDARG_0, EmitOperand::None)?;
        emitter.emit(opcodes::BRTRUE, EmitOperand::Label(exit))?;
        emitter.emit(opcodes::BR, EmitOperand::Label(head))?;
        emitter.mark_label(exit)?;
        emitter.emit(opcodes::RET, EmitOperand::None)?;

        let emitted = emitter.finish()?;
        // 0: ldarg.0 1: brtrue.s +2 3: br.s -5 5: ret
        assert_eq!(emitted.code, vec![0x02, 0x2D, 0x02, 0x2B, 0xFB, 0x2A]);
        Ok(())
    }

    #[test]
    fn short_branch_out_of_range() -> Result<()> {
        let mut emitter = BytecodeEmitter::new();
        let target = emitter.define_label();
        emitter.emit(opcodes::BR_S, EmitOperand::Label(target))?;
        for _ in 0..200 {
            emitter.emit(opcodes::NOP, EmitOperand::None)?;
        }
        emitter.mark_label(target)?;

        assert!(matches!(emitter.finish(), Err(Error::InvalidBranch(_))));
        Ok(())
    }

    #[test]
    fn label_errors() -> Result<()> {
        let mut emitter = BytecodeEmitter::new();
        let label = emitter.define_label();
        emitter.mark_label(label)?;
        assert!(matches!(
            emitter.mark_label(label),
            Err(Error::DuplicateLabel(_))
        ));

        let mut emitter = BytecodeEmitter::new();
        let label = emitter.define_label();
        emitter.emit(opcodes::BR, EmitOperand::Label(label))?;
        assert!(matches!(emitter.finish(), Err(Error::UndefinedLabel(_))));
        Ok(())
    }

    #[test]
    fn switch_targets_resolve() -> Result<()> {
        let mut emitter = BytecodeEmitter::new();
        let first = emitter.define_label();
        let second = emitter.define_label();
        emitter.emit(opcodes::LDARG_0, EmitOperand::None)?;
        emitter.emit(opcodes::SWITCH, EmitOperand::Switch(vec![first, second]))?;
        emitter.mark_label(first)?;
        emitter.emit(opcodes::NOP, EmitOperand::None)?;
        emitter.mark_label(second)?;
        emitter.emit(opcodes::RET, EmitOperand::None)?;

        let emitted = emitter.finish()?;
        assert_eq!(
            emitted.code,
            vec![
                0x02, 0x45, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00,
                0x00, 0x00, 0x2A
            ]
        );
        Ok(())
    }

    #[test]
    fn user_strings_are_interned() -> Result<()> {
        let mut emitter = BytecodeEmitter::new()
            .with_user_strings([("known".to_string(), Token::new(0x7000_0010))]);
        emitter.emit(opcodes::LDSTR, EmitOperand::String("known".to_string()))?;
        emitter.emit(opcodes::LDSTR, EmitOperand::String("fresh".to_string()))?;
        emitter.emit(opcodes::LDSTR, EmitOperand::String("fresh".to_string()))?;

        let emitted = emitter.finish()?;
        assert_eq!(&emitted.code[1..5], &0x7000_0010u32.to_le_bytes());
        assert_eq!(&emitted.code[6..10], &0x7000_0011u32.to_le_bytes());
        assert_eq!(&emitted.code[11..15], &0x7000_0011u32.to_le_bytes());
        assert_eq!(
            emitted.user_strings,
            vec![
                ("known".to_string(), Token::new(0x7000_0010)),
                ("fresh".to_string(), Token::new(0x7000_0011)),
            ]
        );
        assert_eq!(emitted.max_stack, 3);
        Ok(())
    }

    #[test]
    fn operand_mismatch_leaves_no_bytes() {
        let mut emitter = BytecodeEmitter::new();
        let result = emitter.emit(opcodes::LDC_I4, EmitOperand::Immediate(Immediate::Int8(1)));
        assert!(matches!(result, Err(Error::WrongOperandType { .. })));
        assert_eq!(emitter.position(), 0);

        let label = emitter.define_label();
        let result = emitter.emit(opcodes::NOP, EmitOperand::Label(label));
        assert!(matches!(result, Err(Error::WrongOperandType { .. })));
    }

    #[test]
    fn stack_tracking() -> Result<()> {
        let owner = create_type(2, "Demo", "Widget");
        let ctor = create_method(1, ".ctor", &owner, 2, false);

        let mut emitter = BytecodeEmitter::new();
        let int32 = create_type(5, "System", "Int32");
        assert_eq!(emitter.declare_local(&int32, false)?, LocalSlot(0));
        assert_eq!(emitter.declare_local(&int32, true)?, LocalSlot(1));

        emitter.emit(opcodes::LDC_I4_1, EmitOperand::None)?;
        emitter.emit(opcodes::LDC_I4_2, EmitOperand::None)?;
        emitter.emit(opcodes::NEWOBJ, EmitOperand::Method(ctor))?;
        assert_eq!(emitter.current_stack_depth(), 1);
        emitter.emit(opcodes::RET, EmitOperand::None)?;

        assert!(matches!(
            emitter.emit(opcodes::POP, EmitOperand::None),
            Ok(())
        ));

        let emitted = emitter.finish()?;
        assert_eq!(emitted.max_stack, 2);
        assert_eq!(emitted.locals.len(), 2);
        assert!(emitted.locals[1].pinned);

        let mut emitter = BytecodeEmitter::new();
        assert!(matches!(
            emitter.emit(opcodes::POP, EmitOperand::None),
            Err(Error::Malformed { .. })
        ));
        Ok(())
    }
}
