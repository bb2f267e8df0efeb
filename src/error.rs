//! Contains the `Error` and `Result` types that this crate uses.

use bson::Document;
use thiserror::Error;

/// The result type for all fallible operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur while assembling, splitting, or executing a
/// write batch.
///
/// Mirrors the shape production MongoDB drivers use: a cloneable outer
/// struct wrapping a boxed [`ErrorKind`], so the same error can be stored
/// both on a [`ResultAccumulator`](crate::results::ResultAccumulator) and
/// returned to the caller.
#[derive(Clone, Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: Box<ErrorKind>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
        }
    }

    /// The server error code associated with this error, if any.
    pub fn code(&self) -> Option<i32> {
        match &*self.kind {
            ErrorKind::TooLarge { code, .. } => Some(*code),
            ErrorKind::ServerWriteError { code, .. } => Some(*code),
            ErrorKind::ServerWriteConcernError { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn invalid_arg(message: impl Into<String>) -> Self {
        ErrorKind::InvalidArg {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn empty_batch() -> Self {
        ErrorKind::EmptyBatch.into()
    }

    pub(crate) fn too_large(index: i64, message: impl Into<String>) -> Self {
        ErrorKind::TooLarge {
            index,
            code: 2,
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn malformed_update(index: i64, message: impl Into<String>) -> Self {
        ErrorKind::MalformedUpdate {
            index,
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn transport_failure(message: impl Into<String>) -> Self {
        ErrorKind::TransportFailure {
            message: message.into(),
        }
        .into()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

/// The kinds of errors that can occur while building or executing a write
/// batch. Variant names match the error kinds named by the write-core
/// design: `InvalidArg`, `EmptyBatch`, `TooLarge`, `MalformedUpdate`,
/// `TransportFailure`, `ServerWriteError`, `ServerWriteConcernError`.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The write concern supplied by the caller was rejected before any I/O
    /// was attempted.
    #[error("invalid argument: {message}")]
    InvalidArg { message: String },

    /// An executor was invoked with a buffer that has no entries.
    #[error("executor invoked with an empty write batch")]
    EmptyBatch,

    /// A single document exceeded `max_bson_object_size` even by itself, so
    /// it cannot be sent no matter how the batch is split.
    #[error("document at index {index} is too large: {message}")]
    TooLarge {
        index: i64,
        code: i32,
        message: String,
    },

    /// A non-operator update document had a dollar-prefixed or dotted key,
    /// or contained invalid UTF-8.
    #[error("update document at index {index} is malformed: {message}")]
    MalformedUpdate { index: i64, message: String },

    /// Sending or receiving a wire message failed.
    #[error("transport failure: {message}")]
    TransportFailure { message: String },

    /// The server reported a per-operation write error.
    #[error("server write error at index {index}: {message} (code {code})")]
    ServerWriteError {
        index: i64,
        code: i32,
        message: String,
    },

    /// The server reported a write concern error.
    #[error("server write concern error: {message} (code {code})")]
    ServerWriteConcernError { code: i32, message: String },
}

impl ErrorKind {
    /// Render this error kind as the `{index, code, errmsg}` shape used to
    /// seed a write error record, for kinds that carry an index.
    pub(crate) fn as_write_error_doc(&self) -> Option<Document> {
        match self {
            ErrorKind::TooLarge {
                index,
                code,
                message,
            } => Some(bson::doc! {
                "index": *index,
                "code": *code,
                "errmsg": message.clone(),
            }),
            ErrorKind::MalformedUpdate { index, message } => Some(bson::doc! {
                "index": *index,
                "code": 2,
                "errmsg": message.clone(),
            }),
            _ => None,
        }
    }
}
