//! Metadata token representation for CIL operands.
//!
//! Every symbolic operand in a CIL instruction stream (a type, field, method, signature or
//! user string) is encoded as a 4-byte metadata token. The high byte selects the metadata
//! table (or heap) the reference points into, the low 24 bits are the row index.
//!
//! # Examples
//!
//! ```rust
//! use dotemit::metadata::token::{Token, TokenKind};
//!
//! let token = Token::new(0x0A00_0012);
//! assert_eq!(token.table(), 0x0A);
//! assert_eq!(token.row(), 0x12);
//! assert_eq!(token.kind(), Some(TokenKind::MemberRef));
//! ```

use std::fmt;

use strum::{EnumCount, EnumIter};

/// A metadata token: table identifier in the high byte, row index in the low 24 bits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

/// The metadata tables (and heaps) that CIL operand tokens may point into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum TokenKind {
    /// `TypeRef` table (0x01)
    TypeRef,
    /// `TypeDef` table (0x02)
    TypeDef,
    /// `Field` table (0x04)
    Field,
    /// `MethodDef` table (0x06)
    MethodDef,
    /// `MemberRef` table (0x0A), may reference a field or a method
    MemberRef,
    /// `StandAloneSig` table (0x11)
    Signature,
    /// `TypeSpec` table (0x1B)
    TypeSpec,
    /// `MethodSpec` table (0x2B)
    MethodSpec,
    /// `#US` user string heap (0x70)
    String,
}

impl TokenKind {
    /// The table byte used in the high byte of a token of this kind.
    #[must_use]
    pub fn table(self) -> u8 {
        match self {
            TokenKind::TypeRef => 0x01,
            TokenKind::TypeDef => 0x02,
            TokenKind::Field => 0x04,
            TokenKind::MethodDef => 0x06,
            TokenKind::MemberRef => 0x0A,
            TokenKind::Signature => 0x11,
            TokenKind::TypeSpec => 0x1B,
            TokenKind::MethodSpec => 0x2B,
            TokenKind::String => 0x70,
        }
    }

    /// Returns `true` for the tables that hold type identities.
    #[must_use]
    pub fn is_type(self) -> bool {
        matches!(
            self,
            TokenKind::TypeRef | TokenKind::TypeDef | TokenKind::TypeSpec
        )
    }
}

impl Token {
    /// Create a token from its raw value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Create a token from a kind and a row index.
    #[must_use]
    pub fn from_parts(kind: TokenKind, row: u32) -> Self {
        Token((u32::from(kind.table()) << 24) | (row & 0x00FF_FFFF))
    }

    /// The raw 32-bit value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The table identifier (high byte).
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The row index (low 24 bits).
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns `true` for the all-zero token.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// The table kind, or `None` for tables no CIL operand can reference.
    #[must_use]
    pub fn kind(&self) -> Option<TokenKind> {
        match self.table() {
            0x01 => Some(TokenKind::TypeRef),
            0x02 => Some(TokenKind::TypeDef),
            0x04 => Some(TokenKind::Field),
            0x06 => Some(TokenKind::MethodDef),
            0x0A => Some(TokenKind::MemberRef),
            0x11 => Some(TokenKind::Signature),
            0x1B => Some(TokenKind::TypeSpec),
            0x2B => Some(TokenKind::MethodSpec),
            0x70 => Some(TokenKind::String),
            _ => None,
        }
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
