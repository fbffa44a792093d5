//! Compile-time macro expansion of CIL templates.
//!
//! A template is ordinary compiled code calling placeholder operations (`Get`, `Set`, `Ref`,
//! `Call`) on a well-known namespace type. Expansion replaces every placeholder call site with
//! direct member access resolved from values the template captured, so the rewritten body
//! never touches the placeholder namespace at run time.
//!
//! # Key Components
//!
//! - [`CaptureContext`] - The template and callback closures and the values they captured
//! - [`PlaceholderNamespace`] - Recognizes placeholder accesses and calls
//! - [`slice_arguments`] - Recovers argument boundaries from declared stack effects
//! - [`literal_instruction`] - Materializes primitive captures as constants
//! - [`define_accessor`] / [`CaptureTable`] - Materialize any other captured object through a
//!   generated static accessor
//! - [`MacroExpander`] - The rewriting pass over a decoded body
//! - [`TemplateProcessor`] - Decode, expand and encode in one call
//!
//! # Expansion Flow
//!
//! ```text
//! template IL --decode--> tokens --MacroExpander--> tokens --encode--> CodeSink
//!                                      |
//!                       CaptureContext + TypeUnderConstruction
//! ```
//!
//! Argument indices are shifted by `(destination has receiver) - (template has receiver)`.
//! Any structural anomaly aborts the expansion, see [`crate::Error`].

mod accessor;
mod capture;
mod expander;
mod literal;
mod placeholder;
mod processor;
mod slicing;
mod table;

pub use accessor::{
    accessor_body, define_accessor, AccessorRuntime, CapturedAccessor, TypeUnderConstruction,
};
pub use capture::{
    CaptureContext, CapturedObject, CapturedValue, Closure, ClosureKind, ClosureObject,
    MemberDescriptor,
};
pub use expander::{argument_offset, ExpanderOptions, MacroExpander};
pub use literal::literal_instruction;
pub use placeholder::{PlaceholderKind, PlaceholderNamespace};
pub use processor::{TemplateMethod, TemplateOptions, TemplateProcessor};
pub use slicing::slice_arguments;
pub use table::CaptureTable;
