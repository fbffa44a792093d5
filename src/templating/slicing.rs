//! Static reconstruction of placeholder argument boundaries.
//!
//! Compiled code evaluates the arguments of a call left to right, each one leaving exactly
//! one value on the stack. Walking the instructions between a placeholder access and its call
//! backwards while summing the declared stack effects finds where each argument starts: a
//! counter starting at `-1` returns to `0` exactly at the first instruction of the argument.
//!
//! The walk runs in two phases. Phase one groups the instructions into units, fusing a
//! `stloc X` immediately followed by `ldloc X` of the same local into one unit that pops and
//! pushes a single value (compilers emit this pair for temporaries). Phase two is the pure
//! backward balance walk over the units.

use std::ops::Range;

use crate::{
    assembly::{CilToken, Instruction},
    utils::cursor::Cursor,
    Error, Result,
};

/// A group of consecutive tokens with a combined stack effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StackUnit {
    start: usize,
    end: usize,
    pops: usize,
    pushes: usize,
}

/// Partition `tokens` into `arity` consecutive argument expressions.
///
/// The returned ranges index into `tokens`, are in argument order and together cover the
/// whole slice.
///
/// # Errors
/// - [`crate::Error::ControlFlowInPlaceholder`] for labels or control transfers in the span
/// - [`crate::Error::UnbalancedArguments`] if the span does not split into exactly `arity`
///   balanced expressions
/// - [`crate::Error::NotSupported`] for instructions without a static stack effect
///
/// # Examples
///
/// ```rust
/// use dotemit::{assembly::{CilToken, Instruction}, templating::slice_arguments};
///
/// // ldarg.1; ldarg.2; add; ldc.i4.3
/// let tokens: Vec<CilToken> = vec![
///     Instruction::LoadArgument(1).into(),
///     Instruction::LoadArgument(2).into(),
///     Instruction::raw(dotemit::assembly::opcodes::ADD).into(),
///     Instruction::load_i4(3).into(),
/// ];
/// assert_eq!(slice_arguments(&tokens, 2)?, vec![0..3, 3..4]);
/// # Ok::<(), dotemit::Error>(())
/// ```
pub fn slice_arguments(tokens: &[CilToken], arity: usize) -> Result<Vec<Range<usize>>> {
    slice_span(Cursor::new(tokens), arity)
}

/// [`slice_arguments`] over the window of `span`. Ranges are relative to the window, token
/// positions in errors are absolute.
pub(crate) fn slice_span(span: Cursor<'_, CilToken>, arity: usize) -> Result<Vec<Range<usize>>> {
    let units = fuse_units(span)?;
    balance(&units, arity)
}

fn fuse_units(mut cursor: Cursor<'_, CilToken>) -> Result<Vec<StackUnit>> {
    let mut units = Vec::with_capacity(cursor.remaining());
    while let Some(token) = cursor.peek() {
        let start = cursor.pos();
        let instruction = straight_line(token, cursor.absolute_pos())?;

        if let (
            Instruction::StoreLocal(stored),
            Some(CilToken::Instruction(Instruction::LoadLocal(loaded))),
        ) = (instruction, cursor.peek_nth(1))
        {
            if stored == loaded {
                cursor.take(2)?;
                units.push(StackUnit {
                    start,
                    end: cursor.pos(),
                    pops: 1,
                    pushes: 1,
                });
                continue;
            }
        }

        cursor.advance()?;
        units.push(StackUnit {
            start,
            end: cursor.pos(),
            pops: instruction.stack_pops()?,
            pushes: instruction.stack_pushes()?,
        });
    }
    Ok(units)
}

fn straight_line(token: &CilToken, index: usize) -> Result<&Instruction> {
    match token {
        CilToken::Label(label) => Err(Error::ControlFlowInPlaceholder(format!(
            "label '{label}' at token {index}"
        ))),
        CilToken::Instruction(instruction) if instruction.is_control_transfer() => Err(
            Error::ControlFlowInPlaceholder(format!("'{instruction}' at token {index}")),
        ),
        CilToken::Instruction(instruction) => Ok(instruction),
    }
}

fn balance(units: &[StackUnit], arity: usize) -> Result<Vec<Range<usize>>> {
    let mut arguments = Vec::with_capacity(arity);
    let mut argument_end = units.len();
    let mut cursor = units.len();
    let mut counter: i64 = -1;

    while cursor > 0 && arguments.len() < arity {
        cursor -= 1;
        let unit = &units[cursor];
        counter += unit.pushes as i64 - unit.pops as i64;

        if counter > 0 {
            return Err(Error::UnbalancedArguments {
                expected: arity,
                message: format!(
                    "argument {} leaves {} surplus value(s) at token {}",
                    arity - arguments.len(),
                    counter,
                    unit.start
                ),
            });
        }

        if counter == 0 {
            arguments.push(unit.start..units[argument_end - 1].end);
            argument_end = cursor;
            counter = -1;
        }
    }

    if arguments.len() != arity {
        return Err(Error::UnbalancedArguments {
            expected: arity,
            message: format!("found {} balanced argument(s)", arguments.len()),
        });
    }

    if cursor != 0 {
        return Err(Error::UnbalancedArguments {
            expected: arity,
            message: format!(
                "tokens 0..{} do not belong to any argument",
                units[cursor - 1].end
            ),
        });
    }

    arguments.reverse();
    Ok(arguments)
}
