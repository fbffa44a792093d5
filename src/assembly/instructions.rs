//! Static opcode tables for the complete CIL instruction set.
//!
//! [`INSTRUCTIONS`] is indexed by single-byte opcode value, [`INSTRUCTIONS_FE`] by the second
//! byte of `0xFE`-prefixed opcodes. Reserved values hold an entry with an empty mnemonic.
//! Every entry records the operand shape, the declared pop and push counts and the
//! control-flow class (ECMA-335 §III and the `StackBehaviour` table of the runtime).

use crate::assembly::{
    instruction::{FlowType, OperandType, StackCount},
    opcodes::OpCode,
};

/// Static description of a single opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpCodeInfo {
    /// Mnemonic, empty for reserved opcodes
    pub mnemonic: &'static str,
    /// Encoded operand shape
    pub operand: OperandType,
    /// Declared pop count
    pub pops: StackCount,
    /// Declared push count
    pub pushes: StackCount,
    /// Control-flow class
    pub flow: FlowType,
}

impl OpCodeInfo {
    /// Returns `true` for reserved opcode slots.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.mnemonic.is_empty()
    }
}

const RESERVED: OpCodeInfo = OpCodeInfo {
    mnemonic: "",
    operand: OperandType::None,
    pops: StackCount::Fixed(0),
    pushes: StackCount::Fixed(0),
    flow: FlowType::Sequential,
};

macro_rules! stack {
    (V) => {
        StackCount::Variable
    };
    ($n:literal) => {
        StackCount::Fixed($n)
    };
}

macro_rules! op {
    ($mnemonic:literal, $operand:ident, $pops:tt, $pushes:tt, $flow:ident) => {
        OpCodeInfo {
            mnemonic: $mnemonic,
            operand: OperandType::$operand,
            pops: stack!($pops),
            pushes: stack!($pushes),
            flow: FlowType::$flow,
        }
    };
}

/// Single-byte opcodes `0x00` – `0xE0`.
pub static INSTRUCTIONS: [OpCodeInfo; 0xE1] = [
    op!("nop", None, 0, 0, Sequential), // 0x00
    op!("break", None, 0, 0, Sequential), // 0x01
    op!("ldarg.0", None, 0, 1, Sequential), // 0x02
    op!("ldarg.1", None, 0, 1, Sequential), // 0x03
    op!("ldarg.2", None, 0, 1, Sequential), // 0x04
    op!("ldarg.3", None, 0, 1, Sequential), // 0x05
    op!("ldloc.0", None, 0, 1, Sequential), // 0x06
    op!("ldloc.1", None, 0, 1, Sequential), // 0x07
    op!("ldloc.2", None, 0, 1, Sequential), // 0x08
    op!("ldloc.3", None, 0, 1, Sequential), // 0x09
    op!("stloc.0", None, 1, 0, Sequential), // 0x0A
    op!("stloc.1", None, 1, 0, Sequential), // 0x0B
    op!("stloc.2", None, 1, 0, Sequential), // 0x0C
    op!("stloc.3", None, 1, 0, Sequential), // 0x0D
    op!("ldarg.s", UInt8, 0, 1, Sequential), // 0x0E
    op!("ldarga.s", UInt8, 0, 1, Sequential), // 0x0F
    op!("starg.s", UInt8, 1, 0, Sequential), // 0x10
    op!("ldloc.s", UInt8, 0, 1, Sequential), // 0x11
    op!("ldloca.s", UInt8, 0, 1, Sequential), // 0x12
    op!("stloc.s", UInt8, 1, 0, Sequential), // 0x13
    op!("ldnull", None, 0, 1, Sequential), // 0x14
    op!("ldc.i4.m1", None, 0, 1, Sequential), // 0x15
    op!("ldc.i4.0", None, 0, 1, Sequential), // 0x16
    op!("ldc.i4.1", None, 0, 1, Sequential), // 0x17
    op!("ldc.i4.2", None, 0, 1, Sequential), // 0x18
    op!("ldc.i4.3", None, 0, 1, Sequential), // 0x19
    op!("ldc.i4.4", None, 0, 1, Sequential), // 0x1A
    op!("ldc.i4.5", None, 0, 1, Sequential), // 0x1B
    op!("ldc.i4.6", None, 0, 1, Sequential), // 0x1C
    op!("ldc.i4.7", None, 0, 1, Sequential), // 0x1D
    op!("ldc.i4.8", None, 0, 1, Sequential), // 0x1E
    op!("ldc.i4.s", Int8, 0, 1, Sequential), // 0x1F
    op!("ldc.i4", Int32, 0, 1, Sequential), // 0x20
    op!("ldc.i8", Int64, 0, 1, Sequential), // 0x21
    op!("ldc.r4", Float32, 0, 1, Sequential), // 0x22
    op!("ldc.r8", Float64, 0, 1, Sequential), // 0x23
    RESERVED, // 0x24
    op!("dup", None, 1, 2, Sequential), // 0x25
    op!("pop", None, 1, 0, Sequential), // 0x26
    op!("jmp", Method, 0, 0, Return), // 0x27
    op!("call", Method, V, V, Call), // 0x28
    op!("calli", Signature, V, V, Call), // 0x29
    op!("ret", None, V, 0, Return), // 0x2A
    op!("br.s", ShortBranch, 0, 0, UnconditionalBranch), // 0x2B
    op!("brfalse.s", ShortBranch, 1, 0, ConditionalBranch), // 0x2C
    op!("brtrue.s", ShortBranch, 1, 0, ConditionalBranch), // 0x2D
    op!("beq.s", ShortBranch, 2, 0, ConditionalBranch), // 0x2E
    op!("bge.s", ShortBranch, 2, 0, ConditionalBranch), // 0x2F
    op!("bgt.s", ShortBranch, 2, 0, ConditionalBranch), // 0x30
    op!("ble.s", ShortBranch, 2, 0, ConditionalBranch), // 0x31
    op!("blt.s", ShortBranch, 2, 0, ConditionalBranch), // 0x32
    op!("bne.un.s", ShortBranch, 2, 0, ConditionalBranch), // 0x33
    op!("bge.un.s", ShortBranch, 2, 0, ConditionalBranch), // 0x34
    op!("bgt.un.s", ShortBranch, 2, 0, ConditionalBranch), // 0x35
    op!("ble.un.s", ShortBranch, 2, 0, ConditionalBranch), // 0x36
    op!("blt.un.s", ShortBranch, 2, 0, ConditionalBranch), // 0x37
    op!("br", Branch, 0, 0, UnconditionalBranch), // 0x38
    op!("brfalse", Branch, 1, 0, ConditionalBranch), // 0x39
    op!("brtrue", Branch, 1, 0, ConditionalBranch), // 0x3A
    op!("beq", Branch, 2, 0, ConditionalBranch), // 0x3B
    op!("bge", Branch, 2, 0, ConditionalBranch), // 0x3C
    op!("bgt", Branch, 2, 0, ConditionalBranch), // 0x3D
    op!("ble", Branch, 2, 0, ConditionalBranch), // 0x3E
    op!("blt", Branch, 2, 0, ConditionalBranch), // 0x3F
    op!("bne.un", Branch, 2, 0, ConditionalBranch), // 0x40
    op!("bge.un", Branch, 2, 0, ConditionalBranch), // 0x41
    op!("bgt.un", Branch, 2, 0, ConditionalBranch), // 0x42
    op!("ble.un", Branch, 2, 0, ConditionalBranch), // 0x43
    op!("blt.un", Branch, 2, 0, ConditionalBranch), // 0x44
    op!("switch", Switch, 1, 0, Switch), // 0x45
    op!("ldind.i1", None, 1, 1, Sequential), // 0x46
    op!("ldind.u1", None, 1, 1, Sequential), // 0x47
    op!("ldind.i2", None, 1, 1, Sequential), // 0x48
    op!("ldind.u2", None, 1, 1, Sequential), // 0x49
    op!("ldind.i4", None, 1, 1, Sequential), // 0x4A
    op!("ldind.u4", None, 1, 1, Sequential), // 0x4B
    op!("ldind.i8", None, 1, 1, Sequential), // 0x4C
    op!("ldind.i", None, 1, 1, Sequential), // 0x4D
    op!("ldind.r4", None, 1, 1, Sequential), // 0x4E
    op!("ldind.r8", None, 1, 1, Sequential), // 0x4F
    op!("ldind.ref", None, 1, 1, Sequential), // 0x50
    op!("stind.ref", None, 2, 0, Sequential), // 0x51
    op!("stind.i1", None, 2, 0, Sequential), // 0x52
    op!("stind.i2", None, 2, 0, Sequential), // 0x53
    op!("stind.i4", None, 2, 0, Sequential), // 0x54
    op!("stind.i8", None, 2, 0, Sequential), // 0x55
    op!("stind.r4", None, 2, 0, Sequential), // 0x56
    op!("stind.r8", None, 2, 0, Sequential), // 0x57
    op!("add", None, 2, 1, Sequential), // 0x58
    op!("sub", None, 2, 1, Sequential), // 0x59
    op!("mul", None, 2, 1, Sequential), // 0x5A
    op!("div", None, 2, 1, Sequential), // 0x5B
    op!("div.un", None, 2, 1, Sequential), // 0x5C
    op!("rem", None, 2, 1, Sequential), // 0x5D
    op!("rem.un", None, 2, 1, Sequential), // 0x5E
    op!("and", None, 2, 1, Sequential), // 0x5F
    op!("or", None, 2, 1, Sequential), // 0x60
    op!("xor", None, 2, 1, Sequential), // 0x61
    op!("shl", None, 2, 1, Sequential), // 0x62
    op!("shr", None, 2, 1, Sequential), // 0x63
    op!("shr.un", None, 2, 1, Sequential), // 0x64
    op!("neg", None, 1, 1, Sequential), // 0x65
    op!("not", None, 1, 1, Sequential), // 0x66
    op!("conv.i1", None, 1, 1, Sequential), // 0x67
    op!("conv.i2", None, 1, 1, Sequential), // 0x68
    op!("conv.i4", None, 1, 1, Sequential), // 0x69
    op!("conv.i8", None, 1, 1, Sequential), // 0x6A
    op!("conv.r4", None, 1, 1, Sequential), // 0x6B
    op!("conv.r8", None, 1, 1, Sequential), // 0x6C
    op!("conv.u4", None, 1, 1, Sequential), // 0x6D
    op!("conv.u8", None, 1, 1, Sequential), // 0x6E
    op!("callvirt", Method, V, V, Call), // 0x6F
    op!("cpobj", Type, 2, 0, Sequential), // 0x70
    op!("ldobj", Type, 1, 1, Sequential), // 0x71
    op!("ldstr", String, 0, 1, Sequential), // 0x72
    op!("newobj", Method, V, 1, Call), // 0x73
    op!("castclass", Type, 1, 1, Sequential), // 0x74
    op!("isinst", Type, 1, 1, Sequential), // 0x75
    op!("conv.r.un", None, 1, 1, Sequential), // 0x76
    RESERVED, // 0x77
    RESERVED, // 0x78
    op!("unbox", Type, 1, 1, Sequential), // 0x79
    op!("throw", None, 1, 0, Throw), // 0x7A
    op!("ldfld", Field, 1, 1, Sequential), // 0x7B
    op!("ldflda", Field, 1, 1, Sequential), // 0x7C
    op!("stfld", Field, 2, 0, Sequential), // 0x7D
    op!("ldsfld", Field, 0, 1, Sequential), // 0x7E
    op!("ldsflda", Field, 0, 1, Sequential), // 0x7F
    op!("stsfld", Field, 1, 0, Sequential), // 0x80
    op!("stobj", Type, 2, 0, Sequential), // 0x81
    op!("conv.ovf.i1.un", None, 1, 1, Sequential), // 0x82
    op!("conv.ovf.i2.un", None, 1, 1, Sequential), // 0x83
    op!("conv.ovf.i4.un", None, 1, 1, Sequential), // 0x84
    op!("conv.ovf.i8.un", None, 1, 1, Sequential), // 0x85
    op!("conv.ovf.u1.un", None, 1, 1, Sequential), // 0x86
    op!("conv.ovf.u2.un", None, 1, 1, Sequential), // 0x87
    op!("conv.ovf.u4.un", None, 1, 1, Sequential), // 0x88
    op!("conv.ovf.u8.un", None, 1, 1, Sequential), // 0x89
    op!("conv.ovf.i.un", None, 1, 1, Sequential), // 0x8A
    op!("conv.ovf.u.un", None, 1, 1, Sequential), // 0x8B
    op!("box", Type, 1, 1, Sequential), // 0x8C
    op!("newarr", Type, 1, 1, Sequential), // 0x8D
    op!("ldlen", None, 1, 1, Sequential), // 0x8E
    op!("ldelema", Type, 2, 1, Sequential), // 0x8F
    op!("ldelem.i1", None, 2, 1, Sequential), // 0x90
    op!("ldelem.u1", None, 2, 1, Sequential), // 0x91
    op!("ldelem.i2", None, 2, 1, Sequential), // 0x92
    op!("ldelem.u2", None, 2, 1, Sequential), // 0x93
    op!("ldelem.i4", None, 2, 1, Sequential), // 0x94
    op!("ldelem.u4", None, 2, 1, Sequential), // 0x95
    op!("ldelem.i8", None, 2, 1, Sequential), // 0x96
    op!("ldelem.i", None, 2, 1, Sequential), // 0x97
    op!("ldelem.r4", None, 2, 1, Sequential), // 0x98
    op!("ldelem.r8", None, 2, 1, Sequential), // 0x99
    op!("ldelem.ref", None, 2, 1, Sequential), // 0x9A
    op!("stelem.i", None, 3, 0, Sequential), // 0x9B
    op!("stelem.i1", None, 3, 0, Sequential), // 0x9C
    op!("stelem.i2", None, 3, 0, Sequential), // 0x9D
    op!("stelem.i4", None, 3, 0, Sequential), // 0x9E
    op!("stelem.i8", None, 3, 0, Sequential), // 0x9F
    op!("stelem.r4", None, 3, 0, Sequential), // 0xA0
    op!("stelem.r8", None, 3, 0, Sequential), // 0xA1
    op!("stelem.ref", None, 3, 0, Sequential), // 0xA2
    op!("ldelem", Type, 2, 1, Sequential), // 0xA3
    op!("stelem", Type, 3, 0, Sequential), // 0xA4
    op!("unbox.any", Type, 1, 1, Sequential), // 0xA5
    RESERVED, // 0xA6
    RESERVED, // 0xA7
    RESERVED, // 0xA8
    RESERVED, // 0xA9
    RESERVED, // 0xAA
    RESERVED, // 0xAB
    RESERVED, // 0xAC
    RESERVED, // 0xAD
    RESERVED, // 0xAE
    RESERVED, // 0xAF
    RESERVED, // 0xB0
    RESERVED, // 0xB1
    RESERVED, // 0xB2
    op!("conv.ovf.i1", None, 1, 1, Sequential), // 0xB3
    op!("conv.ovf.u1", None, 1, 1, Sequential), // 0xB4
    op!("conv.ovf.i2", None, 1, 1, Sequential), // 0xB5
    op!("conv.ovf.u2", None, 1, 1, Sequential), // 0xB6
    op!("conv.ovf.i4", None, 1, 1, Sequential), // 0xB7
    op!("conv.ovf.u4", None, 1, 1, Sequential), // 0xB8
    op!("conv.ovf.i8", None, 1, 1, Sequential), // 0xB9
    op!("conv.ovf.u8", None, 1, 1, Sequential), // 0xBA
    RESERVED, // 0xBB
    RESERVED, // 0xBC
    RESERVED, // 0xBD
    RESERVED, // 0xBE
    RESERVED, // 0xBF
    RESERVED, // 0xC0
    RESERVED, // 0xC1
    op!("refanyval", Type, 1, 1, Sequential), // 0xC2
    op!("ckfinite", None, 1, 1, Sequential), // 0xC3
    RESERVED, // 0xC4
    RESERVED, // 0xC5
    op!("mkrefany", Type, 1, 1, Sequential), // 0xC6
    RESERVED, // 0xC7
    RESERVED, // 0xC8
    RESERVED, // 0xC9
    RESERVED, // 0xCA
    RESERVED, // 0xCB
    RESERVED, // 0xCC
    RESERVED, // 0xCD
    RESERVED, // 0xCE
    RESERVED, // 0xCF
    op!("ldtoken", Token, 0, 1, Sequential), // 0xD0
    op!("conv.u2", None, 1, 1, Sequential), // 0xD1
    op!("conv.u1", None, 1, 1, Sequential), // 0xD2
    op!("conv.i", None, 1, 1, Sequential), // 0xD3
    op!("conv.ovf.i", None, 1, 1, Sequential), // 0xD4
    op!("conv.ovf.u", None, 1, 1, Sequential), // 0xD5
    op!("add.ovf", None, 2, 1, Sequential), // 0xD6
    op!("add.ovf.un", None, 2, 1, Sequential), // 0xD7
    op!("mul.ovf", None, 2, 1, Sequential), // 0xD8
    op!("mul.ovf.un", None, 2, 1, Sequential), // 0xD9
    op!("sub.ovf", None, 2, 1, Sequential), // 0xDA
    op!("sub.ovf.un", None, 2, 1, Sequential), // 0xDB
    op!("endfinally", None, 0, 0, EndFinally), // 0xDC
    op!("leave", Branch, 0, 0, Leave), // 0xDD
    op!("leave.s", ShortBranch, 0, 0, Leave), // 0xDE
    op!("stind.i", None, 2, 0, Sequential), // 0xDF
    op!("conv.u", None, 1, 1, Sequential), // 0xE0
];

/// Two-byte opcodes `0xFE 0x00` – `0xFE 0x1E`.
pub static INSTRUCTIONS_FE: [OpCodeInfo; 0x1F] = [
    op!("arglist", None, 0, 1, Sequential), // 0x00
    op!("ceq", None, 2, 1, Sequential), // 0x01
    op!("cgt", None, 2, 1, Sequential), // 0x02
    op!("cgt.un", None, 2, 1, Sequential), // 0x03
    op!("clt", None, 2, 1, Sequential), // 0x04
    op!("clt.un", None, 2, 1, Sequential), // 0x05
    op!("ldftn", Method, 0, 1, Sequential), // 0x06
    op!("ldvirtftn", Method, 1, 1, Sequential), // 0x07
    RESERVED, // 0x08
    op!("ldarg", UInt16, 0, 1, Sequential), // 0x09
    op!("ldarga", UInt16, 0, 1, Sequential), // 0x0A
    op!("starg", UInt16, 1, 0, Sequential), // 0x0B
    op!("ldloc", UInt16, 0, 1, Sequential), // 0x0C
    op!("ldloca", UInt16, 0, 1, Sequential), // 0x0D
    op!("stloc", UInt16, 1, 0, Sequential), // 0x0E
    op!("localloc", None, 1, 1, Sequential), // 0x0F
    RESERVED, // 0x10
    op!("endfilter", None, 1, 0, EndFinally), // 0x11
    op!("unaligned.", UInt8, 0, 0, Sequential), // 0x12
    op!("volatile.", None, 0, 0, Sequential), // 0x13
    op!("tail.", None, 0, 0, Sequential), // 0x14
    op!("initobj", Type, 1, 0, Sequential), // 0x15
    op!("constrained.", Type, 0, 0, Sequential), // 0x16
    op!("cpblk", None, 3, 0, Sequential), // 0x17
    op!("initblk", None, 3, 0, Sequential), // 0x18
    op!("no.", UInt8, 0, 0, Sequential), // 0x19
    op!("rethrow", None, 0, 0, Throw), // 0x1A
    RESERVED, // 0x1B
    op!("sizeof", Type, 0, 1, Sequential), // 0x1C
    op!("refanytype", None, 1, 1, Sequential), // 0x1D
    op!("readonly.", None, 0, 0, Sequential), // 0x1E
];

/// Look up the static description of an opcode, `None` for reserved or out-of-range values.
#[must_use]
pub fn opcode_info(opcode: OpCode) -> Option<&'static OpCodeInfo> {
    let table: &'static [OpCodeInfo] = if opcode.is_prefixed() {
        if opcode.0 >> 8 != 0xFE {
            return None;
        }
        &INSTRUCTIONS_FE
    } else {
        &INSTRUCTIONS
    };

    table
        .get(usize::from(opcode.code()))
        .filter(|info| !info.is_reserved())
}
