//! Bounds-checked, position-aware reads over immutable sequences.
//!
//! [`Cursor`] is generic over its element type. The decoder walks raw CIL bytes with a byte
//! cursor ([`Parser`]) and reads little-endian operands through it. The argument slicer and
//! the macro expander walk decoded token streams with the same cursor. A sub-range never
//! copies: it borrows the same backing slice and remembers its absolute offset, so positions
//! reported from a placeholder span relate back to the full stream.
//!
//! # Examples
//!
//! ```rust
//! use dotemit::utils::cursor::Parser;
//!
//! let mut parser = Parser::new(&[0x1F, 0x2A, 0x2A]);
//! assert_eq!(parser.read_le::<u8>()?, 0x1F);
//! assert_eq!(parser.read_le::<i8>()?, 42);
//! assert_eq!(parser.pos(), 2);
//! assert!(parser.has_more_data());
//! # Ok::<(), dotemit::Error>(())
//! ```

use std::ops::Range;

use crate::{
    utils::io::{read_le_at, CilIO},
    Error::OutOfBounds,
    Result,
};

/// A read cursor over a borrowed slice.
///
/// The cursor tracks a position relative to the start of its own window and the absolute
/// index of that window within the sequence it was sliced from.
#[derive(Debug)]
pub struct Cursor<'a, T> {
    data: &'a [T],
    /// Absolute index of `data[0]` within the outermost sequence
    base: usize,
    position: usize,
}

/// A cursor over raw bytes.
pub type Parser<'a> = Cursor<'a, u8>;

impl<T> Clone for Cursor<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Cursor<'_, T> {}

impl<'a, T> Cursor<'a, T> {
    /// Create a new cursor positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [T]) -> Self {
        Cursor {
            data,
            base: 0,
            position: 0,
        }
    }

    /// Number of elements in this cursor's window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the window holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` while unread elements remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Current position relative to the window start.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Current position as an index into the outermost sequence.
    #[must_use]
    pub fn absolute_pos(&self) -> usize {
        self.base + self.position
    }

    /// Absolute index of the first element of this window.
    #[must_use]
    pub fn base(&self) -> usize {
        self.base
    }

    /// The complete window, independent of the position.
    #[must_use]
    pub fn data(&self) -> &'a [T] {
        self.data
    }

    /// Number of unread elements.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Move to a window-relative position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` is past the end of the window.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Skip a single element.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the window.
    pub fn advance(&mut self) -> Result<()> {
        self.advance_by(1)
    }

    /// Skip `step` elements.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `step` elements remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        self.ensure_remaining(step)?;
        self.position += step;
        Ok(())
    }

    /// Verify that at least `needed` elements remain.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] otherwise.
    pub fn ensure_remaining(&self, needed: usize) -> Result<()> {
        if needed > self.remaining() {
            return Err(OutOfBounds);
        }
        Ok(())
    }

    /// The element at the current position, without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<&'a T> {
        self.data.get(self.position)
    }

    /// The element `n` places after the current position, without consuming anything.
    #[must_use]
    pub fn peek_nth(&self, n: usize) -> Option<&'a T> {
        self.data.get(self.position.checked_add(n)?)
    }

    /// Consume and return the element at the current position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the window.
    pub fn consume(&mut self) -> Result<&'a T> {
        let item = self.data.get(self.position).ok_or(OutOfBounds)?;
        self.position += 1;
        Ok(item)
    }

    /// Consume the next `count` elements and return them as a slice.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `count` elements remain.
    pub fn take(&mut self, count: usize) -> Result<&'a [T]> {
        self.ensure_remaining(count)?;
        let start = self.position;
        self.position += count;
        Ok(&self.data[start..self.position])
    }

    /// A new cursor over a window-relative range, positioned at its start.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range is inverted or exceeds the window.
    pub fn slice(&self, range: Range<usize>) -> Result<Cursor<'a, T>> {
        if range.start > range.end || range.end > self.data.len() {
            return Err(OutOfBounds);
        }

        Ok(Cursor {
            data: &self.data[range.clone()],
            base: self.base + range.start,
            position: 0,
        })
    }
}

impl<'a> Cursor<'a, u8> {
    /// Read a little-endian value and advance past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough bytes remain.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn parser_reads_and_advances() {
        let data = [0x20, 0x78, 0x56, 0x34, 0x12, 0x2A];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_le::<u8>().unwrap(), 0x20);
        assert_eq!(parser.pos(), 1);
        assert_eq!(parser.read_le::<i32>().unwrap(), 0x1234_5678);
        assert_eq!(parser.peek(), Some(&0x2A));
        assert_eq!(parser.remaining(), 1);
        assert!(matches!(parser.ensure_remaining(2), Err(Error::OutOfBounds)));
        parser.advance().unwrap();
        assert!(!parser.has_more_data());
        assert!(matches!(parser.read_le::<u8>(), Err(Error::OutOfBounds)));
    }

    #[test]
    fn cursor_peek_consume_take() {
        let items = ["a", "b", "c", "d"];
        let mut cursor = Cursor::new(&items);

        assert_eq!(cursor.peek(), Some(&"a"));
        assert_eq!(cursor.peek_nth(2), Some(&"c"));
        assert_eq!(cursor.peek_nth(usize::MAX), None);
        assert_eq!(cursor.consume().unwrap(), &"a");
        assert_eq!(cursor.take(2).unwrap(), &["b", "c"]);
        assert!(matches!(cursor.take(2), Err(Error::OutOfBounds)));
        assert_eq!(cursor.consume().unwrap(), &"d");
        assert!(matches!(cursor.consume(), Err(Error::OutOfBounds)));
        assert!(matches!(cursor.advance_by(1), Err(Error::OutOfBounds)));
        assert_eq!(cursor.pos(), 4);
        assert_eq!(cursor.len(), 4);
    }

    #[test]
    fn cursor_slices_keep_absolute_positions() {
        let items: Vec<u32> = (0..10).collect();
        let cursor = Cursor::new(&items);

        let mut outer = cursor.slice(2..8).unwrap();
        assert_eq!(outer.base(), 2);
        assert_eq!(outer.len(), 6);
        outer.advance_by(2).unwrap();
        assert_eq!(outer.pos(), 2);
        assert_eq!(outer.absolute_pos(), 4);

        let inner = outer.slice(3..5).unwrap();
        assert_eq!(inner.base(), 5);
        assert_eq!(inner.data(), &[5, 6]);

        assert!(matches!(cursor.slice(4..11), Err(Error::OutOfBounds)));
        #[allow(clippy::reversed_empty_ranges)]
        let inverted = cursor.slice(5..4);
        assert!(matches!(inverted, Err(Error::OutOfBounds)));
    }

    #[test]
    fn cursor_seek_bounds() {
        let items = [1u8, 2, 3];
        let mut cursor = Cursor::new(&items);
        cursor.seek(3).unwrap();
        assert!(!cursor.has_more_data());
        assert_eq!(cursor.peek(), None);
        assert!(matches!(cursor.seek(4), Err(Error::OutOfBounds)));
        assert!(matches!(cursor.advance(), Err(Error::OutOfBounds)));

        cursor.seek(1).unwrap();
        assert_eq!(cursor.peek(), Some(&2));
    }
}
