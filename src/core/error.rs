use rusqlite;
use std::fmt;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StarlogError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid range: start {start} is after end {end}")]
    InvalidRange { start: String, end: String },
    #[error("Ambiguous query: provide a session id or a date range")]
    AmbiguousQuery,
    #[error("Session already open: {0}")]
    SessionAlreadyOpen(String),
    #[error("No open session for project '{0}'")]
    NoOpenSession(String),
    #[error("Cyclic reference: {0}")]
    CyclicReference(String),
    #[error("Resolution depth exceeded (max {max}) at {at}")]
    ResolutionDepthExceeded { max: usize, at: String },
    #[error("External dependency failure: {0}")]
    ExternalDependencyFailure(String),
    #[error("Not a STARLOG project: {0}")]
    NotAProject(String),
}

/// Error taxonomy shared by every surface (CLI envelopes, placeholders).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    StateConflict,
    CyclicReference,
    ResolutionDepthExceeded,
    ExternalDependencyFailure,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::StateConflict => "state_conflict",
            ErrorKind::CyclicReference => "cyclic_reference",
            ErrorKind::ResolutionDepthExceeded => "resolution_depth_exceeded",
            ErrorKind::ExternalDependencyFailure => "external_dependency_failure",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StarlogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StarlogError::NotFound(_) | StarlogError::NotAProject(_) => ErrorKind::NotFound,
            StarlogError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            StarlogError::InvalidArgument(_)
            | StarlogError::InvalidRange { .. }
            | StarlogError::AmbiguousQuery
            | StarlogError::ConfigError(_) => ErrorKind::InvalidArgument,
            StarlogError::SessionAlreadyOpen(_) | StarlogError::NoOpenSession(_) => {
                ErrorKind::StateConflict
            }
            StarlogError::CyclicReference(_) => ErrorKind::CyclicReference,
            StarlogError::ResolutionDepthExceeded { .. } => ErrorKind::ResolutionDepthExceeded,
            StarlogError::ExternalDependencyFailure(_) => ErrorKind::ExternalDependencyFailure,
            StarlogError::RusqliteError(_)
            | StarlogError::IoError(_)
            | StarlogError::JsonError(_) => ErrorKind::Internal,
        }
    }
}
