//! Little-endian primitive reading and writing for CIL byte streams.
//!
//! CIL operands are always stored little-endian. This module provides the
//! [`crate::utils::io::CilIO`] trait, implemented for every primitive an operand can hold,
//! together with bounds-checked helpers to read a value at an offset and to append a value
//! to a growing byte buffer.
//!
//! # Supported Types
//! - **Unsigned integers**: `u8`, `u16`, `u32`, `u64`
//! - **Signed integers**: `i8`, `i16`, `i32`, `i64`
//! - **Floating point**: `f32`, `f64`
//!
//! # Examples
//!
//! ```rust
//! use dotemit::utils::io::{read_le_at, write_le};
//!
//! let mut buffer = Vec::new();
//! write_le(&mut buffer, 0x0A00_0001u32);
//! write_le(&mut buffer, -2i8);
//!
//! let mut offset = 0;
//! let token: u32 = read_le_at(&buffer, &mut offset)?;
//! let delta: i8 = read_le_at(&buffer, &mut offset)?;
//! assert_eq!(token, 0x0A00_0001);
//! assert_eq!(delta, -2);
//! assert_eq!(offset, 5);
//! # Ok::<(), dotemit::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Trait for primitive types that can be read from and written to little-endian byte
/// buffers.
pub trait CilIO: Sized + Copy {
    /// Associated type representing the byte array type for this numeric type.
    ///
    /// This type must be convertible from a byte slice and is used for reading
    /// binary data.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty),*) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Reads a value of type `T` at `offset` and advances the offset past it.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let end = offset.checked_add(type_len).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Reads a value of type `T` from the start of `data`.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0;
    read_le_at(data, &mut offset)
}

/// Appends `value` to `buffer` in little-endian byte order.
pub fn write_le<T: CilIO>(buffer: &mut Vec<u8>, value: T) {
    buffer.extend_from_slice(value.to_le_bytes().as_ref());
}

/// Overwrites the bytes at `offset` with `value` in little-endian byte order.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit at `offset`.
pub fn write_le_at<T: CilIO>(data: &mut [u8], offset: usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let end = offset.checked_add(bytes.len()).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[offset..end].copy_from_slice(bytes);
    Ok(())
}
