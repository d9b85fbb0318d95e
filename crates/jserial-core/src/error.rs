//! Error types for the jserial-core library.
//!
//! Every failure aborts the decode session it happened in. The only
//! condition the top-level read loop treats as a normal terminator is
//! [`Error::EndOfStream`] between two content items.

use crate::model::Handle;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for jserial operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all jserial operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The byte source failed for a reason other than running dry
    #[error("read error at offset {offset}: {source}")]
    Io {
        /// Byte offset of the failed read
        offset: u64,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The byte source ran out before a read could be satisfied
    #[error("unexpected end of stream at offset {offset}")]
    EndOfStream {
        /// Byte offset where the stream ended
        offset: u64,
    },

    /// The stream does not start with 0xACED
    #[error("bad stream magic: expected 0xaced, got {found:#06x}")]
    BadMagic {
        /// The magic value actually present
        found: u16,
    },

    /// The stream version is not 5
    #[error("unsupported stream version: expected 5, got {found}")]
    BadVersion {
        /// The version actually present
        found: u16,
    },

    /// A framing byte is inconsistent with the grammar at this position
    #[error("malformed stream at offset {offset}: {details}")]
    MalformedStream {
        /// Byte offset where the error occurred
        offset: u64,
        /// Detailed description of the issue
        details: String,
    },

    /// An opcode outside the protocol's content opcodes
    #[error("unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode {
        /// Byte offset of the opcode
        offset: u64,
        /// The offending byte
        opcode: u8,
    },

    /// A valid opcode used where the grammar forbids it
    #[error("protocol violation at offset {offset}: {details}")]
    ProtocolViolation {
        /// Byte offset where the error occurred
        offset: u64,
        /// Detailed description of the issue
        details: String,
    },

    /// A declared length or element count is negative or too large
    #[error("invalid length {length} at offset {offset}")]
    InvalidLength {
        /// Byte offset following the length prefix
        offset: u64,
        /// The declared length
        length: i64,
    },

    /// A class description declares a negative field count
    #[error("invalid field count {count} at offset {offset}")]
    InvalidFieldCount {
        /// Byte offset following the count
        offset: u64,
        /// The declared count
        count: i16,
    },

    /// A handle was registered twice within one generation
    #[error("handle {handle} is already registered")]
    DuplicateHandle {
        /// The handle in question
        handle: Handle,
    },

    /// A handle is not present in the current generation
    #[error("handle {handle} is not registered")]
    UnknownHandle {
        /// The handle in question
        handle: Handle,
    },

    /// A TC_REFERENCE names a handle that cannot be resolved
    #[error("unresolved reference to handle {handle} at offset {offset}")]
    UnresolvedReference {
        /// Byte offset following the handle
        offset: u64,
        /// The referenced handle
        handle: Handle,
    },

    /// Class description flags that cannot be combined
    #[error("conflicting flags {flags:#04x} on class '{class}'")]
    ConflictingFlags {
        /// Name of the class
        class: String,
        /// The description flags byte
        flags: u8,
    },

    /// Externalized data written without block-data framing
    #[error("class '{class}' is externalizable without block data; its payload cannot be parsed")]
    UnsupportedExternalization {
        /// Name of the class
        class: String,
    },

    /// Invalid modified UTF-8
    #[error("malformed modified UTF-8 at byte {position}: {details}")]
    MalformedText {
        /// Position inside the encoded buffer
        position: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// Content of the wrong kind, or a type disagreeing with structure
    #[error("type mismatch: {details}")]
    TypeMismatch {
        /// Detailed description of the issue
        details: String,
    },

    /// TC_RESET where an exception object was expected
    #[error("unexpected reset while reading exception object at offset {offset}")]
    UnexpectedReset {
        /// Byte offset of the reset opcode
        offset: u64,
    },

    /// TC_EXCEPTION not followed by a non-null object
    #[error("malformed exception at offset {offset}: {details}")]
    MalformedException {
        /// Byte offset where the error occurred
        offset: u64,
        /// Detailed description of the issue
        details: String,
    },

    /// An outer-instance field on a class whose name has no enclosing part
    #[error("class '{class}' has outer-instance field '{field}' but its name has no enclosing class")]
    MalformedNaming {
        /// Name of the class
        class: String,
        /// Name of the field
        field: String,
    },

    /// An inner class whose enclosing class is absent from the stream
    #[error("enclosing class '{outer}' of inner class '{class}' not found")]
    UnresolvedOuterClass {
        /// Name of the inner class
        class: String,
        /// Name of the expected enclosing class
        outer: String,
    },

    /// A member-class rename would shadow another class
    #[error("cannot rename class '{from}' to '{to}': name already in use")]
    NameCollision {
        /// Current name
        from: String,
        /// Intended simple name
        to: String,
    },

    /// A decoded entity violates a model invariant
    #[error("validity error: {0}")]
    Validity(String),
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new malformed stream error
    pub fn malformed_stream(offset: u64, details: impl Into<String>) -> Self {
        Self::MalformedStream {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new protocol violation error
    pub fn protocol_violation(offset: u64, details: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new malformed text error
    pub fn malformed_text(position: usize, details: impl Into<String>) -> Self {
        Self::MalformedText {
            position,
            details: details.into(),
        }
    }

    /// Creates a new type mismatch error
    pub fn type_mismatch(details: impl Into<String>) -> Self {
        Self::TypeMismatch {
            details: details.into(),
        }
    }

    /// Creates a new malformed exception error
    pub fn malformed_exception(offset: u64, details: impl Into<String>) -> Self {
        Self::MalformedException {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new validity error
    pub fn validity(msg: impl Into<String>) -> Self {
        Self::Validity(msg.into())
    }

    /// Returns true if the byte source simply ran out
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownOpcode {
            offset: 4,
            opcode: 0x42,
        };
        assert_eq!(err.to_string(), "unknown opcode 0x42 at offset 4");

        let err = Error::BadMagic { found: 0xcafe };
        assert!(err.to_string().contains("0xcafe"));
    }

    #[test]
    fn test_handle_display_in_errors() {
        let err = Error::UnknownHandle {
            handle: Handle(0x7e0003),
        };
        assert!(err.to_string().contains("0x7e0003"));
    }

    #[test]
    fn test_is_end_of_stream() {
        assert!(Error::EndOfStream { offset: 0 }.is_end_of_stream());
        assert!(!Error::malformed_stream(0, "x").is_end_of_stream());
    }
}
