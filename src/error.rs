use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every failure in this crate is fatal for the operation that raised it: a method body is
/// either decoded, expanded and encoded completely, or the whole operation is aborted and no
/// partial output is produced.
///
/// # Error Categories
///
/// ## Decode Errors
/// - [`Error::Malformed`] - Reserved opcode, truncated operand or invalid branch target
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of the byte stream
/// - [`Error::NotSupported`] - Instruction or operand outside the supported subset
/// - [`Error::UnresolvedToken`] - The symbol resolver has no identity for a token
///
/// ## Encode Errors
/// - [`Error::NotImplemented`] - Operand kind that cannot be re-emitted
/// - [`Error::UndefinedLabel`] / [`Error::DuplicateLabel`] - Label bookkeeping failures
/// - [`Error::InvalidBranch`] - Branch offset does not fit the selected encoding
/// - [`Error::UnknownLocal`] - Local variable that was never declared for the body
/// - [`Error::WrongOperandType`] - Operand does not match the opcode's operand shape
/// - [`Error::InvalidArgumentIndex`] - Argument index out of the encodable range
///
/// ## Template Expansion Errors
/// - [`Error::UnbalancedArguments`] - Stack-balance walk could not partition the arguments
/// - [`Error::ControlFlowInPlaceholder`] - Branch or label inside a placeholder expression
/// - [`Error::UnresolvableCapture`] - Receiver access that does not resolve to a capture
/// - [`Error::UnsupportedPlaceholder`] - Unknown placeholder operation or arity
/// - [`Error::UnterminatedPlaceholder`] - Placeholder access without a matching call
/// - [`Error::WrongMemberKind`] - Member kind not valid for the placeholder operation
/// - [`Error::InstanceMemberInStaticContext`] - Instance member used from a static destination
///
/// ## Resource Errors
/// - [`Error::CaptureKeyCollision`] / [`Error::CaptureKeyMissing`] - Capture table misuse
/// - [`Error::LockError`] - Poisoned capture table lock
///
/// # Examples
///
/// ```rust
/// use dotemit::{assembly::decode_body, metadata::{GenericContext, SymbolTable}, Error};
///
/// // 0xA6 is a reserved opcode
/// match decode_body(&[0xA6], &[], &SymbolTable::new(), &GenericContext::default()) {
///     Err(Error::Malformed { message, .. }) => assert!(message.contains("Reserved")),
///     other => panic!("unexpected {:?}", other.map(|_| ())),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Decode errors
    /// The byte stream is damaged and could not be decoded.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading a stream.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The instruction or operand belongs to the explicitly unsupported subset.
    ///
    /// Indirect calls, `InlinePhi` operands and open generic parameters are rejected
    /// instead of guessing their semantics.
    #[error("Not supported - {0}")]
    NotSupported(String),

    /// The symbol resolver could not map a metadata token to an identity.
    #[error("Failed to resolve token {0}")]
    UnresolvedToken(Token),

    // Encode errors
    /// The operand kind cannot be re-emitted by the encoder.
    #[error("Not implemented - {0}")]
    NotImplemented(String),

    /// A branch refers to a label that was never defined or marked.
    #[error("Undefined label - {0}")]
    UndefinedLabel(String),

    /// A label was defined or marked twice.
    #[error("Duplicate label - {0}")]
    DuplicateLabel(String),

    /// The branch offset cannot be represented with the chosen instruction form.
    #[error("Invalid branch - {0}")]
    InvalidBranch(String),

    /// A local variable is used that was not declared for this method body.
    #[error("Unknown local variable - {0}")]
    UnknownLocal(String),

    /// The operand does not match the operand shape required by the opcode.
    #[error("Wrong operand type for '{mnemonic}', expected {expected}")]
    WrongOperandType {
        /// Mnemonic of the instruction being emitted
        mnemonic: &'static str,
        /// Human readable name of the expected operand shape
        expected: &'static str,
    },

    /// An argument index is negative after adjustment or otherwise unencodable.
    #[error("Invalid argument index - {0}")]
    InvalidArgumentIndex(i64),

    // Template expansion errors
    /// Argument slicing did not produce exactly the declared number of balanced sub-spans.
    #[error("Unbalanced placeholder arguments - expected {expected}, {message}")]
    UnbalancedArguments {
        /// Declared arity of the placeholder operation
        expected: usize,
        /// Description of where the stack-balance walk failed
        message: String,
    },

    /// A control-transfer instruction or a branch target was found inside a placeholder
    /// argument expression.
    #[error("Control transfer inside placeholder expression - {0}")]
    ControlFlowInPlaceholder(String),

    /// An access through the template receiver does not resolve to a known capture.
    #[error("Unresolvable capture - {0}")]
    UnresolvableCapture(String),

    /// The called placeholder operation is unknown or has an unsupported arity / type.
    #[error("Unsupported placeholder - {0}")]
    UnsupportedPlaceholder(String),

    /// A placeholder namespace access was not followed by a placeholder call.
    #[error("Placeholder access at token {0} is never invoked")]
    UnterminatedPlaceholder(usize),

    /// The resolved member cannot be used with the requested operation (e.g. `Ref` on a
    /// property).
    #[error("'{operation}' can not be applied to {member}")]
    WrongMemberKind {
        /// Name of the placeholder operation
        operation: &'static str,
        /// Description of the offending member
        member: String,
    },

    /// An instance member was referenced while expanding into a static destination.
    #[error("Instance member '{0}' can not be accessed from a static destination")]
    InstanceMemberInStaticContext(String),

    // Resource errors
    /// A capture table key was inserted twice.
    #[error("Capture key {0} is already present")]
    CaptureKeyCollision(u64),

    /// A capture table key was read that is not (or no longer) present.
    #[error("Capture key {0} is missing")]
    CaptureKeyMissing(u64),

    /// Failed to lock target.
    #[error("Failed to lock target")]
    LockError,

    /// Generic error for miscellaneous cases.
    #[error("{0}")]
    Error(String),
}
