//! Literal materialization of captured primitive values.

use crate::{
    assembly::{opcodes, Immediate, Instruction, Operand},
    templating::capture::CapturedValue,
};

/// The single instruction loading `value` as a literal, if it has one.
///
/// Integers of up to 32 bits widen to `ldc.i4` in its most compact form, 64-bit integers use
/// `ldc.i8` and floats keep their width. Unsigned values are reinterpreted bit for bit.
/// Members, delegates and arbitrary objects have no literal form and yield `None`.
///
/// # Examples
///
/// ```rust
/// use dotemit::{assembly::{opcodes, Instruction}, templating::{literal_instruction, CapturedValue}};
///
/// assert_eq!(literal_instruction(&CapturedValue::Bool(true)), Some(Instruction::raw(opcodes::LDC_I4_1)));
/// assert_eq!(literal_instruction(&CapturedValue::I32(42)), Some(Instruction::load_i4(42)));
/// assert_eq!(literal_instruction(&CapturedValue::Null), Some(Instruction::raw(opcodes::LDNULL)));
/// ```
#[must_use]
pub fn literal_instruction(value: &CapturedValue) -> Option<Instruction> {
    let instruction = match value {
        CapturedValue::Null => Instruction::raw(opcodes::LDNULL),
        CapturedValue::Bool(v) => Instruction::load_i4(i32::from(*v)),
        CapturedValue::Char(v) => Instruction::load_i4(i32::from(*v)),
        CapturedValue::I8(v) => Instruction::load_i4(i32::from(*v)),
        CapturedValue::U8(v) => Instruction::load_i4(i32::from(*v)),
        CapturedValue::I16(v) => Instruction::load_i4(i32::from(*v)),
        CapturedValue::U16(v) => Instruction::load_i4(i32::from(*v)),
        CapturedValue::I32(v) => Instruction::load_i4(*v),
        CapturedValue::U32(v) => Instruction::load_i4(i32::from_ne_bytes(v.to_ne_bytes())),
        CapturedValue::I64(v) => {
            Instruction::raw_with(opcodes::LDC_I8, Operand::Immediate(Immediate::Int64(*v)))
        }
        CapturedValue::U64(v) => Instruction::raw_with(
            opcodes::LDC_I8,
            Operand::Immediate(Immediate::Int64(i64::from_ne_bytes(v.to_ne_bytes()))),
        ),
        CapturedValue::F32(v) => {
            Instruction::raw_with(opcodes::LDC_R4, Operand::Immediate(Immediate::Float32(*v)))
        }
        CapturedValue::F64(v) => {
            Instruction::raw_with(opcodes::LDC_R8, Operand::Immediate(Immediate::Float64(*v)))
        }
        CapturedValue::String(v) => Instruction::raw_with(opcodes::LDSTR, Operand::String(v.clone())),
        CapturedValue::Member(_) | CapturedValue::Delegate(_) | CapturedValue::Object(_) => {
            return None
        }
    };
    Some(instruction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        templating::{CapturedObject, MemberDescriptor},
        test::{create_field, create_type},
    };

    fn ldc_i8_value(instruction: &Instruction) -> Option<i64> {
        match instruction {
            Instruction::Raw {
                opcode,
                operand: Operand::Immediate(Immediate::Int64(v)),
            } if *opcode == opcodes::LDC_I8 => Some(*v),
            _ => None,
        }
    }

    #[test]
    fn small_integers_widen_to_i4() {
        let cases = [
            (CapturedValue::Bool(false), 0),
            (CapturedValue::Char(u16::from(b'A')), 65),
            (CapturedValue::I8(-5), -5),
            (CapturedValue::U8(200), 200),
            (CapturedValue::I16(-300), -300),
            (CapturedValue::U16(65535), 65535),
            (CapturedValue::I32(7), 7),
            (CapturedValue::U32(u32::MAX), -1),
        ];
        for (value, expected) in cases {
            let instruction = literal_instruction(&value).unwrap();
            assert_eq!(instruction.as_i4_constant(), Some(expected), "{value}");
        }
        assert_eq!(
            literal_instruction(&CapturedValue::I32(7)),
            Some(Instruction::raw(opcodes::LDC_I4_7))
        );
    }

    #[test]
    fn wide_integers_and_floats() {
        assert_eq!(
            ldc_i8_value(&literal_instruction(&CapturedValue::I64(1 << 40)).unwrap()),
            Some(1 << 40)
        );
        assert_eq!(
            ldc_i8_value(&literal_instruction(&CapturedValue::U64(u64::MAX)).unwrap()),
            Some(-1)
        );
        assert_eq!(
            literal_instruction(&CapturedValue::F32(1.5)),
            Some(Instruction::raw_with(
                opcodes::LDC_R4,
                Operand::Immediate(Immediate::Float32(1.5))
            ))
        );
        assert_eq!(
            literal_instruction(&CapturedValue::F64(-0.25)),
            Some(Instruction::raw_with(
                opcodes::LDC_R8,
                Operand::Immediate(Immediate::Float64(-0.25))
            ))
        );
    }

    #[test]
    fn strings_and_null() {
        assert_eq!(
            literal_instruction(&CapturedValue::String("hi".to_string())),
            Some(Instruction::raw_with(
                opcodes::LDSTR,
                Operand::String("hi".to_string())
            ))
        );
        assert_eq!(
            literal_instruction(&CapturedValue::Null),
            Some(Instruction::raw(opcodes::LDNULL))
        );
    }

    #[test]
    fn non_literals() {
        let owner = create_type(2, "Demo", "Widget");
        let field = create_field(1, "count", &owner, &owner, false);
        assert_eq!(
            literal_instruction(&CapturedValue::Member(MemberDescriptor::Field(field))),
            None
        );
        assert_eq!(
            literal_instruction(&CapturedValue::Object(CapturedObject::new(owner, ()))),
            None
        );
    }
}
