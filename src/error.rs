use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Status codes returned across the boundary.
///
/// Negative values are failures. A successful operation reports `Ok`; the raw
/// value handed to the caller is then the length of the diagnostics text (see
/// [`Outcome::raw`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Operation completed; diagnostics, if any, are advisory
    Ok,
    /// Caller misuse, such as validating against an unknown schema name
    ApiError,
    /// The engine aborted the operation on a structural parse/compile failure
    EngineError,
    /// File read or map failure, oversize file, short read
    IoError,
    /// The path does not resolve to a readable regular file
    FileNotFound,
}

impl Status {
    pub const OK: i32 = 0;
    pub const API_ERROR: i32 = -1;
    pub const ENGINE_ERROR: i32 = -2;
    pub const IO_ERROR: i32 = -3;
    pub const FILE_NOT_FOUND_ERROR: i32 = -4;

    /// Numeric code of this status
    pub const fn code(self) -> i32 {
        match self {
            Status::Ok => Self::OK,
            Status::ApiError => Self::API_ERROR,
            Status::EngineError => Self::ENGINE_ERROR,
            Status::IoError => Self::IO_ERROR,
            Status::FileNotFound => Self::FILE_NOT_FOUND_ERROR,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

/// Result of one session operation: a status and the length of the text left
/// in the output region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub status: Status,
    pub len: usize,
}

impl Outcome {
    pub fn new(status: Status, len: usize) -> Self {
        Self { status, len }
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// Whether a successful operation left diagnostics behind
    pub fn has_diagnostics(&self) -> bool {
        self.is_ok() && self.len > 0
    }

    /// Value returned across the C boundary: the error code for failures, the
    /// output length otherwise.
    pub fn raw(&self) -> i32 {
        match self.status {
            Status::Ok => i32::try_from(self.len).unwrap_or(i32::MAX),
            status => status.code(),
        }
    }
}

/// Session-level failures. Every variant maps onto exactly one [`Status`].
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("schema '{name}' not loaded")]
    SchemaNotLoaded { name: String },

    #[error("{}: {reason}", path.display())]
    FileNotFound { path: PathBuf, reason: String },

    #[error("file too large (limit is {limit} bytes): {}", path.display())]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("unexpected short read: {} ({read} of {expected} bytes)", path.display())]
    ShortRead {
        path: PathBuf,
        read: usize,
        expected: u64,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("output buffer too small: {capacity} bytes (need at least {minimum})")]
    BufferTooSmall { capacity: usize, minimum: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SessionError {
    pub fn status(&self) -> Status {
        match self {
            SessionError::SchemaNotLoaded { .. }
            | SessionError::BufferTooSmall { .. }
            | SessionError::InvalidArgument(_) => Status::ApiError,
            SessionError::FileNotFound { .. } => Status::FileNotFound,
            SessionError::FileTooLarge { .. }
            | SessionError::ShortRead { .. }
            | SessionError::Io { .. } => Status::IoError,
            SessionError::Engine(err) => err.status(),
        }
    }
}

/// Failures raised by a schema engine that abort the current operation.
///
/// Recoverable findings are not errors: they go through the
/// [`ErrorHandler`](crate::engine::ErrorHandler) callback instead.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{message}")]
    Parse { message: String },

    #[error("unsupported schema syntax: {0}")]
    Unsupported(String),

    #[error("engine internal error (code {code})")]
    Internal { code: i32 },

    #[error("engine could not allocate {what}")]
    Allocation { what: &'static str },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl EngineError {
    pub fn parse(message: impl Into<String>) -> Self {
        EngineError::Parse {
            message: message.into(),
        }
    }

    pub fn status(&self) -> Status {
        match self {
            EngineError::Io(err) if err.kind() == io::ErrorKind::NotFound => Status::FileNotFound,
            EngineError::Io(_) => Status::IoError,
            EngineError::Parse { .. }
            | EngineError::Unsupported(_)
            | EngineError::Internal { .. }
            | EngineError::Allocation { .. } => Status::EngineError,
        }
    }
}

/// Session result type alias
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Engine result type alias
pub type EngineResult<T> = std::result::Result<T, EngineError>;
