//! CIL opcode values (ECMA-335 §III).
//!
//! An [`OpCode`] stores single-byte opcodes as their byte value and two-byte opcodes as
//! `0xFE00 | second byte`, so every opcode of the instruction set fits a single `u16` and
//! compares cheaply. Constants are named after their mnemonic (e.g. [`CALL`] = `0x28`,
//! [`CEQ`] = `0xFE 0x01`); trailing dots of prefix mnemonics are dropped.
#![allow(missing_docs)]

use std::fmt;

use crate::assembly::instructions::{opcode_info, OpCodeInfo};

/// The shared first byte of every two-byte opcode.
pub const FE_PREFIX: u8 = 0xFE;

/// A single- or two-byte CIL opcode.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpCode(pub u16);

impl OpCode {
    /// Build an opcode from its encoded bytes (`prefix` is `0` for single-byte opcodes).
    #[must_use]
    pub fn from_bytes(prefix: u8, code: u8) -> Self {
        if prefix == FE_PREFIX {
            OpCode(0xFE00 | u16::from(code))
        } else {
            OpCode(u16::from(code))
        }
    }

    /// Returns `true` for opcodes encoded with the `0xFE` prefix.
    #[must_use]
    pub fn is_prefixed(self) -> bool {
        self.0 > 0xFF
    }

    /// The final opcode byte (the byte following `0xFE` for two-byte opcodes).
    #[must_use]
    pub fn code(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Encoded size of the opcode itself, excluding its operand.
    #[must_use]
    pub fn size(self) -> usize {
        if self.is_prefixed() {
            2
        } else {
            1
        }
    }

    /// Static description of this opcode, `None` for reserved values.
    #[must_use]
    pub fn info(self) -> Option<&'static OpCodeInfo> {
        opcode_info(self)
    }

    /// The opcode mnemonic, `"???"` for reserved values.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.info().map_or("???", |info| info.mnemonic)
    }
}

impl fmt::Debug for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpCode({:#06x} {})", self.0, self.mnemonic())
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

// ── Single-byte opcodes (0x00 – 0xE0) ──────────────────────────────────────

pub const NOP: OpCode = OpCode(0x00);
pub const BREAK: OpCode = OpCode(0x01);
pub const LDARG_0: OpCode = OpCode(0x02);
pub const LDARG_1: OpCode = OpCode(0x03);
pub const LDARG_2: OpCode = OpCode(0x04);
pub const LDARG_3: OpCode = OpCode(0x05);
pub const LDLOC_0: OpCode = OpCode(0x06);
pub const LDLOC_1: OpCode = OpCode(0x07);
pub const LDLOC_2: OpCode = OpCode(0x08);
pub const LDLOC_3: OpCode = OpCode(0x09);
pub const STLOC_0: OpCode = OpCode(0x0A);
pub const STLOC_1: OpCode = OpCode(0x0B);
pub const STLOC_2: OpCode = OpCode(0x0C);
pub const STLOC_3: OpCode = OpCode(0x0D);
pub const LDARG_S: OpCode = OpCode(0x0E);
pub const LDARGA_S: OpCode = OpCode(0x0F);
pub const STARG_S: OpCode = OpCode(0x10);
pub const LDLOC_S: OpCode = OpCode(0x11);
pub const LDLOCA_S: OpCode = OpCode(0x12);
pub const STLOC_S: OpCode = OpCode(0x13);
pub const LDNULL: OpCode = OpCode(0x14);
pub const LDC_I4_M1: OpCode = OpCode(0x15);
pub const LDC_I4_0: OpCode = OpCode(0x16);
pub const LDC_I4_1: OpCode = OpCode(0x17);
pub const LDC_I4_2: OpCode = OpCode(0x18);
pub const LDC_I4_3: OpCode = OpCode(0x19);
pub const LDC_I4_4: OpCode = OpCode(0x1A);
pub const LDC_I4_5: OpCode = OpCode(0x1B);
pub const LDC_I4_6: OpCode = OpCode(0x1C);
pub const LDC_I4_7: OpCode = OpCode(0x1D);
pub const LDC_I4_8: OpCode = OpCode(0x1E);
pub const LDC_I4_S: OpCode = OpCode(0x1F);
pub const LDC_I4: OpCode = OpCode(0x20);
pub const LDC_I8: OpCode = OpCode(0x21);
pub const LDC_R4: OpCode = OpCode(0x22);
pub const LDC_R8: OpCode = OpCode(0x23);
pub const DUP: OpCode = OpCode(0x25);
pub const POP: OpCode = OpCode(0x26);
pub const JMP: OpCode = OpCode(0x27);
pub const CALL: OpCode = OpCode(0x28);
pub const CALLI: OpCode = OpCode(0x29);
pub const RET: OpCode = OpCode(0x2A);
pub const BR_S: OpCode = OpCode(0x2B);
pub const BRFALSE_S: OpCode = OpCode(0x2C);
pub const BRTRUE_S: OpCode = OpCode(0x2D);
pub const BEQ_S: OpCode = OpCode(0x2E);
pub const BGE_S: OpCode = OpCode(0x2F);
pub const BGT_S: OpCode = OpCode(0x30);
pub const BLE_S: OpCode = OpCode(0x31);
pub const BLT_S: OpCode = OpCode(0x32);
pub const BNE_UN_S: OpCode = OpCode(0x33);
pub const BGE_UN_S: OpCode = OpCode(0x34);
pub const BGT_UN_S: OpCode = OpCode(0x35);
pub const BLE_UN_S: OpCode = OpCode(0x36);
pub const BLT_UN_S: OpCode = OpCode(0x37);
pub const BR: OpCode = OpCode(0x38);
pub const BRFALSE: OpCode = OpCode(0x39);
pub const BRTRUE: OpCode = OpCode(0x3A);
pub const BEQ: OpCode = OpCode(0x3B);
pub const BGE: OpCode = OpCode(0x3C);
pub const BGT: OpCode = OpCode(0x3D);
pub const BLE: OpCode = OpCode(0x3E);
pub const BLT: OpCode = OpCode(0x3F);
pub const BNE_UN: OpCode = OpCode(0x40);
pub const BGE_UN: OpCode = OpCode(0x41);
pub const BGT_UN: OpCode = OpCode(0x42);
pub const BLE_UN: OpCode = OpCode(0x43);
pub const BLT_UN: OpCode = OpCode(0x44);
pub const SWITCH: OpCode = OpCode(0x45);
pub const LDIND_I1: OpCode = OpCode(0x46);
pub const LDIND_U1: OpCode = OpCode(0x47);
pub const LDIND_I2: OpCode = OpCode(0x48);
pub const LDIND_U2: OpCode = OpCode(0x49);
pub const LDIND_I4: OpCode = OpCode(0x4A);
pub const LDIND_U4: OpCode = OpCode(0x4B);
pub const LDIND_I8: OpCode = OpCode(0x4C);
pub const LDIND_I: OpCode = OpCode(0x4D);
pub const LDIND_R4: OpCode = OpCode(0x4E);
pub const LDIND_R8: OpCode = OpCode(0x4F);
pub const LDIND_REF: OpCode = OpCode(0x50);
pub const STIND_REF: OpCode = OpCode(0x51);
pub const STIND_I1: OpCode = OpCode(0x52);
pub const STIND_I2: OpCode = OpCode(0x53);
pub const STIND_I4: OpCode = OpCode(0x54);
pub const STIND_I8: OpCode = OpCode(0x55);
pub const STIND_R4: OpCode = OpCode(0x56);
pub const STIND_R8: OpCode = OpCode(0x57);
pub const ADD: OpCode = OpCode(0x58);
pub const SUB: OpCode = OpCode(0x59);
pub const MUL: OpCode = OpCode(0x5A);
pub const DIV: OpCode = OpCode(0x5B);
pub const DIV_UN: OpCode = OpCode(0x5C);
pub const REM: OpCode = OpCode(0x5D);
pub const REM_UN: OpCode = OpCode(0x5E);
pub const AND: OpCode = OpCode(0x5F);
pub const OR: OpCode = OpCode(0x60);
pub const XOR: OpCode = OpCode(0x61);
pub const SHL: OpCode = OpCode(0x62);
pub const SHR: OpCode = OpCode(0x63);
pub const SHR_UN: OpCode = OpCode(0x64);
pub const NEG: OpCode = OpCode(0x65);
pub const NOT: OpCode = OpCode(0x66);
pub const CONV_I1: OpCode = OpCode(0x67);
pub const CONV_I2: OpCode = OpCode(0x68);
pub const CONV_I4: OpCode = OpCode(0x69);
pub const CONV_I8: OpCode = OpCode(0x6A);
pub const CONV_R4: OpCode = OpCode(0x6B);
pub const CONV_R8: OpCode = OpCode(0x6C);
pub const CONV_U4: OpCode = OpCode(0x6D);
pub const CONV_U8: OpCode = OpCode(0x6E);
pub const CALLVIRT: OpCode = OpCode(0x6F);
pub const CPOBJ: OpCode = OpCode(0x70);
pub const LDOBJ: OpCode = OpCode(0x71);
pub const LDSTR: OpCode = OpCode(0x72);
pub const NEWOBJ: OpCode = OpCode(0x73);
pub const CASTCLASS: OpCode = OpCode(0x74);
pub const ISINST: OpCode = OpCode(0x75);
pub const CONV_R_UN: OpCode = OpCode(0x76);
pub const UNBOX: OpCode = OpCode(0x79);
pub const THROW: OpCode = OpCode(0x7A);
pub const LDFLD: OpCode = OpCode(0x7B);
pub const LDFLDA: OpCode = OpCode(0x7C);
pub const STFLD: OpCode = OpCode(0x7D);
pub const LDSFLD: OpCode = OpCode(0x7E);
pub const LDSFLDA: OpCode = OpCode(0x7F);
pub const STSFLD: OpCode = OpCode(0x80);
pub const STOBJ: OpCode = OpCode(0x81);
pub const CONV_OVF_I1_UN: OpCode = OpCode(0x82);
pub const CONV_OVF_I2_UN: OpCode = OpCode(0x83);
pub const CONV_OVF_I4_UN: OpCode = OpCode(0x84);
pub const CONV_OVF_I8_UN: OpCode = OpCode(0x85);
pub const CONV_OVF_U1_UN: OpCode = OpCode(0x86);
pub const CONV_OVF_U2_UN: OpCode = OpCode(0x87);
pub const CONV_OVF_U4_UN: OpCode = OpCode(0x88);
pub const CONV_OVF_U8_UN: OpCode = OpCode(0x89);
pub const CONV_OVF_I_UN: OpCode = OpCode(0x8A);
pub const CONV_OVF_U_UN: OpCode = OpCode(0x8B);
pub const BOX: OpCode = OpCode(0x8C);
pub const NEWARR: OpCode = OpCode(0x8D);
pub const LDLEN: OpCode = OpCode(0x8E);
pub const LDELEMA: OpCode = OpCode(0x8F);
pub const LDELEM_I1: OpCode = OpCode(0x90);
pub const LDELEM_U1: OpCode = OpCode(0x91);
pub const LDELEM_I2: OpCode = OpCode(0x92);
pub const LDELEM_U2: OpCode = OpCode(0x93);
pub const LDELEM_I4: OpCode = OpCode(0x94);
pub const LDELEM_U4: OpCode = OpCode(0x95);
pub const LDELEM_I8: OpCode = OpCode(0x96);
pub const LDELEM_I: OpCode = OpCode(0x97);
pub const LDELEM_R4: OpCode = OpCode(0x98);
pub const LDELEM_R8: OpCode = OpCode(0x99);
pub const LDELEM_REF: OpCode = OpCode(0x9A);
pub const STELEM_I: OpCode = OpCode(0x9B);
pub const STELEM_I1: OpCode = OpCode(0x9C);
pub const STELEM_I2: OpCode = OpCode(0x9D);
pub const STELEM_I4: OpCode = OpCode(0x9E);
pub const STELEM_I8: OpCode = OpCode(0x9F);
pub const STELEM_R4: OpCode = OpCode(0xA0);
pub const STELEM_R8: OpCode = OpCode(0xA1);
pub const STELEM_REF: OpCode = OpCode(0xA2);
pub const LDELEM: OpCode = OpCode(0xA3);
pub const STELEM: OpCode = OpCode(0xA4);
pub const UNBOX_ANY: OpCode = OpCode(0xA5);
pub const CONV_OVF_I1: OpCode = OpCode(0xB3);
pub const CONV_OVF_U1: OpCode = OpCode(0xB4);
pub const CONV_OVF_I2: OpCode = OpCode(0xB5);
pub const CONV_OVF_U2: OpCode = OpCode(0xB6);
pub const CONV_OVF_I4: OpCode = OpCode(0xB7);
pub const CONV_OVF_U4: OpCode = OpCode(0xB8);
pub const CONV_OVF_I8: OpCode = OpCode(0xB9);
pub const CONV_OVF_U8: OpCode = OpCode(0xBA);
pub const REFANYVAL: OpCode = OpCode(0xC2);
pub const CKFINITE: OpCode = OpCode(0xC3);
pub const MKREFANY: OpCode = OpCode(0xC6);
pub const LDTOKEN: OpCode = OpCode(0xD0);
pub const CONV_U2: OpCode = OpCode(0xD1);
pub const CONV_U1: OpCode = OpCode(0xD2);
pub const CONV_I: OpCode = OpCode(0xD3);
pub const CONV_OVF_I: OpCode = OpCode(0xD4);
pub const CONV_OVF_U: OpCode = OpCode(0xD5);
pub const ADD_OVF: OpCode = OpCode(0xD6);
pub const ADD_OVF_UN: OpCode = OpCode(0xD7);
pub const MUL_OVF: OpCode = OpCode(0xD8);
pub const MUL_OVF_UN: OpCode = OpCode(0xD9);
pub const SUB_OVF: OpCode = OpCode(0xDA);
pub const SUB_OVF_UN: OpCode = OpCode(0xDB);
pub const ENDFINALLY: OpCode = OpCode(0xDC);
pub const LEAVE: OpCode = OpCode(0xDD);
pub const LEAVE_S: OpCode = OpCode(0xDE);
pub const STIND_I: OpCode = OpCode(0xDF);
pub const CONV_U: OpCode = OpCode(0xE0);

// ── Two-byte opcodes (0xFE 0x00 – 0xFE 0x1E) ───────────────────────────────

pub const ARGLIST: OpCode = OpCode(0xFE00);
pub const CEQ: OpCode = OpCode(0xFE01);
pub const CGT: OpCode = OpCode(0xFE02);
pub const CGT_UN: OpCode = OpCode(0xFE03);
pub const CLT: OpCode = OpCode(0xFE04);
pub const CLT_UN: OpCode = OpCode(0xFE05);
pub const LDFTN: OpCode = OpCode(0xFE06);
pub const LDVIRTFTN: OpCode = OpCode(0xFE07);
pub const LDARG: OpCode = OpCode(0xFE09);
pub const LDARGA: OpCode = OpCode(0xFE0A);
pub const STARG: OpCode = OpCode(0xFE0B);
pub const LDLOC: OpCode = OpCode(0xFE0C);
pub const LDLOCA: OpCode = OpCode(0xFE0D);
pub const STLOC: OpCode = OpCode(0xFE0E);
pub const LOCALLOC: OpCode = OpCode(0xFE0F);
pub const ENDFILTER: OpCode = OpCode(0xFE11);
pub const UNALIGNED: OpCode = OpCode(0xFE12);
pub const VOLATILE: OpCode = OpCode(0xFE13);
pub const TAIL: OpCode = OpCode(0xFE14);
pub const INITOBJ: OpCode = OpCode(0xFE15);
pub const CONSTRAINED: OpCode = OpCode(0xFE16);
pub const CPBLK: OpCode = OpCode(0xFE17);
pub const INITBLK: OpCode = OpCode(0xFE18);
pub const NO: OpCode = OpCode(0xFE19);
pub const RETHROW: OpCode = OpCode(0xFE1A);
pub const SIZEOF: OpCode = OpCode(0xFE1C);
pub const REFANYTYPE: OpCode = OpCode(0xFE1D);
pub const READONLY: OpCode = OpCode(0xFE1E);
