//! Runtime core error types

use std::fmt;

use thiserror::Error;

use crate::dispatch::Arity;
use crate::quark::Quark;

/// Recoverable runtime conditions.
///
/// These unwind to the nearest interpreter-level handler. Lock-discipline
/// violations are not represented here: they panic.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No type in the receiver's ancestry declares the method
    #[error("unbound-method: no method `{method}` for object of type {type_name}")]
    UnboundMethod {
        /// Method name
        method: String,
        /// Receiver type name
        type_name: &'static str,
    },

    /// Quark that was never produced by interning
    #[error("unknown-symbol: quark #{0} was never interned")]
    UnknownSymbol(u32),

    /// Symbol with no binding in the evaluation environment
    #[error("unbound-symbol: {0}")]
    UnboundSymbol(String),

    /// Second slot of a cons cell set to something other than a cell or nil
    #[error("cons-type-error: {0}")]
    ConsType(String),

    /// List position past the end
    #[error("index-error: index {index} is out of range for length {length}")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Actual length
        length: usize,
    },

    /// Wrong number of arguments for a native method
    #[error("arity-error: `{method}` expects {expected} argument(s), got {got}")]
    Arity {
        /// Method name
        method: String,
        /// Accepted argument counts
        expected: Arity,
        /// Supplied argument count
        got: usize,
    },

    /// Argument or operand of the wrong type
    #[error("type-error: {0}")]
    TypeError(String),

    /// Object in operator position cannot be applied
    #[error("apply-error: object of type {0} is not callable")]
    NotCallable(&'static str),

    /// Object does not support cloning
    #[error("clone-error: object of type {0} cannot be cloned")]
    CloneUnsupported(&'static str),

    /// Evaluation nested deeper than the configured limit
    #[error("stack-overflow: maximum evaluation depth {0} exceeded")]
    StackOverflow(usize),

    /// Traversal met a cons chain that loops back on itself
    #[error("cons-cycle: list is cyclic")]
    CyclicList,

    /// Serialization failure
    #[error(transparent)]
    Serial(#[from] SerialError),

    /// Malformed engine configuration
    #[error("config-error: {0}")]
    Config(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a cons type error
    pub fn cons_type(msg: impl Into<String>) -> Self {
        Self::ConsType(msg.into())
    }

    /// Create an unbound-method error for `quark` on a receiver of `type_name`
    pub fn unbound_method(quark: Quark, type_name: &'static str) -> Self {
        Self::UnboundMethod {
            method: quark.to_string(),
            type_name,
        }
    }

    /// Create an unbound-symbol error
    pub fn unbound_symbol(quark: Quark) -> Self {
        Self::UnboundSymbol(quark.to_string())
    }
}

/// Result type for runtime core operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Byte offset in a stream, when the stream can report one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamOffset(pub Option<u64>);

impl fmt::Display for StreamOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(pos) => write!(f, " at offset {pos}"),
            None => Ok(()),
        }
    }
}

/// Serialization protocol errors
#[derive(Debug, Error)]
pub enum SerialError {
    /// Header names a family with no registered decoder
    #[error("serial-error: unknown family 0x{did:04x}{at}")]
    UnknownFamily {
        /// Dispatch id read from the stream
        did: u16,
        /// Where the header started
        at: StreamOffset,
    },

    /// Family decoder does not know the sub-id
    #[error("serial-error: family 0x{did:04x} has no sub-id 0x{sid:04x}{at}")]
    UnknownSubId {
        /// Dispatch id
        did: u16,
        /// Sub-id
        sid: u16,
        /// Where the header started
        at: StreamOffset,
    },

    /// Decoder built an object whose header differs from the one read
    #[error(
        "serial-error: header 0x{did:04x}/0x{sid:04x} decoded to object of type {type_name} (0x{found_did:04x}/0x{found_sid:04x}){at}"
    )]
    FamilyMismatch {
        /// Dispatch id read
        did: u16,
        /// Sub-id read
        sid: u16,
        /// Dispatch id of the constructed object
        found_did: u16,
        /// Sub-id of the constructed object
        found_sid: u16,
        /// Type of the constructed object
        type_name: &'static str,
        /// Where the header started
        at: StreamOffset,
    },

    /// Object has no serial representation
    #[error("serial-error: object of type {0} is not serializable")]
    NotSerializable(&'static str),

    /// Family id already has a decoder
    #[error("serial-error: family 0x{0:04x} is already registered")]
    FamilyRegistered(u16),

    /// Family id reserved by the protocol
    #[error("serial-error: family 0x{0:04x} is reserved")]
    ReservedFamily(u16),

    /// Malformed payload
    #[error("serial-error: {message}{at}")]
    InvalidData {
        /// Description
        message: String,
        /// Where the bad data was found
        at: StreamOffset,
    },

    /// Composite nesting deeper than the configured limit
    #[error("serial-error: nesting deeper than {0} levels")]
    TooDeep(usize),

    /// Underlying stream failure
    #[error("serial-error: {0}")]
    Io(#[from] std::io::Error),
}

impl SerialError {
    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>, at: StreamOffset) -> Self {
        Self::InvalidData {
            message: message.into(),
            at,
        }
    }
}

/// Result type for serialization operations
pub type SerialResult<T> = std::result::Result<T, SerialError>;
