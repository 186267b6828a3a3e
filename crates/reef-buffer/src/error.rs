//! The error currency of the storage layer.
//!
//! Buffer errors are sticky: once a buffer enters an error state, every
//! subsequent operation on it (and on every clone derived from it) surfaces
//! the same error. That requires the type to be cheaply cloneable, so it is a
//! single enum shared by the buffer core and the blob access layer rather
//! than one enum per crate converted at the boundaries.

use reef_digest::DigestError;

/// gRPC-style status code attached to every storage error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Cancelled,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    PermissionDenied,
    Internal,
    Unavailable,
}

/// Errors surfaced by buffers and blob accessors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// The stream ended before the declared size was reached.
    #[error("Buffer is {actual} bytes in size, while {expected} bytes were expected")]
    SizeTooSmall { actual: u64, expected: u64 },

    /// The stream produced more bytes than the declared size.
    #[error("Buffer is at least {actual} bytes in size, while {expected} bytes were expected")]
    SizeTooLarge { actual: u64, expected: u64 },

    /// The stream's checksum contradicts the digest.
    #[error("Buffer has checksum {actual}, while {expected} was expected")]
    ChecksumMismatch { actual: String, expected: String },

    /// A read was requested at a negative offset.
    #[error("Negative read offset: {0}")]
    NegativeOffset(i64),

    /// A read was requested past the end of the buffer.
    #[error("Buffer is {size} bytes in size, while a read at offset {offset} was requested")]
    ReadBeyondEnd { size: u64, offset: i64 },

    /// The buffer exceeds the caller's size limit.
    #[error("Buffer is {size} bytes in size, while a maximum of {maximum} bytes is permitted")]
    MaximumSizeExceeded { size: u64, maximum: u64 },

    /// The payload failed to deserialize as the expected message.
    ///
    /// Carries `Code::Internal` when the payload came from content-addressed
    /// storage (garbage there is backend corruption) and
    /// `Code::InvalidArgument` for action cache payloads.
    #[error("Failed to unmarshal message: {reason}")]
    MalformedMessage { reason: String, code: Code },

    /// The blob is absent from the store.
    #[error("Blob not found")]
    NotFound,

    /// A repair attempt itself failed; replaces the corruption error.
    #[error("Failed to repair blob: {0}")]
    RepairFailed(Box<BufferError>),

    /// A backend, transport, or authorization error passed through verbatim.
    #[error("{message}")]
    Status { code: Code, message: String },
}

impl BufferError {
    /// Construct a pass-through error with an explicit code.
    pub fn with_code(code: Code, message: impl Into<String>) -> BufferError {
        BufferError::Status {
            code,
            message: message.into(),
        }
    }

    /// An `Internal` pass-through error.
    pub fn internal(message: impl Into<String>) -> BufferError {
        BufferError::with_code(Code::Internal, message)
    }

    /// An `InvalidArgument` pass-through error.
    pub fn invalid_argument(message: impl Into<String>) -> BufferError {
        BufferError::with_code(Code::InvalidArgument, message)
    }

    /// An `Unavailable` pass-through error.
    pub fn unavailable(message: impl Into<String>) -> BufferError {
        BufferError::with_code(Code::Unavailable, message)
    }

    /// A `PermissionDenied` pass-through error.
    pub fn permission_denied(message: impl Into<String>) -> BufferError {
        BufferError::with_code(Code::PermissionDenied, message)
    }

    /// A `Cancelled` pass-through error.
    pub fn cancelled(message: impl Into<String>) -> BufferError {
        BufferError::with_code(Code::Cancelled, message)
    }

    /// The status code this error maps to on the wire.
    pub fn code(&self) -> Code {
        match self {
            BufferError::SizeTooSmall { .. }
            | BufferError::SizeTooLarge { .. }
            | BufferError::ChecksumMismatch { .. }
            | BufferError::RepairFailed(_) => Code::Internal,
            BufferError::NegativeOffset(_)
            | BufferError::ReadBeyondEnd { .. }
            | BufferError::MaximumSizeExceeded { .. } => Code::InvalidArgument,
            BufferError::MalformedMessage { code, .. } => *code,
            BufferError::NotFound => Code::NotFound,
            BufferError::Status { code, .. } => *code,
        }
    }
}

impl From<std::io::Error> for BufferError {
    fn from(error: std::io::Error) -> BufferError {
        let code = match error.kind() {
            std::io::ErrorKind::TimedOut => Code::DeadlineExceeded,
            _ => Code::Internal,
        };
        BufferError::with_code(code, error.to_string())
    }
}

impl From<DigestError> for BufferError {
    fn from(error: DigestError) -> BufferError {
        BufferError::invalid_argument(error.to_string())
    }
}
