//! Low-level helpers shared by the decoder and the emitter.
//!
//! - [`cursor`] - Bounds-checked, position-aware windows over byte and token sequences
//! - [`io`] - Little-endian primitive reading and writing

pub mod cursor;
pub mod io;
