use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::types::{Argument, CorrelationId, TypeTag};

/// No constructor or method overload accepts the given arguments.
///
/// Carries the rejected arguments and every candidate signature that was
/// considered, so the requester can see why resolution failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoMatchError {
    /// Arguments as the caller sent them
    pub arguments: Vec<Argument>,
    /// Candidate parameter lists in registration order
    pub candidates: Vec<Vec<TypeTag>>,
}

impl NoMatchError {
    pub fn new(arguments: Vec<Argument>, candidates: Vec<Vec<TypeTag>>) -> Self {
        Self {
            arguments,
            candidates,
        }
    }
}

impl fmt::Display for NoMatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arguments = serde_json::to_string(&self.arguments).map_err(|_| fmt::Error)?;
        let candidates = serde_json::to_string(&self.candidates).map_err(|_| fmt::Error)?;
        write!(
            f,
            "no signature matches arguments {}; candidates are {}",
            arguments, candidates
        )
    }
}

impl std::error::Error for NoMatchError {}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("class '{0}' is already registered")]
    DuplicateClass(String),

    #[error("unknown class '{0}'")]
    UnknownClass(String),

    #[error("object handle '{0}' is already bound")]
    DuplicateHandle(String),

    #[error("unknown object handle '{0}'")]
    UnknownHandle(String),

    #[error("{0}")]
    NoMatch(#[from] NoMatchError),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("no pending call for correlation id {0}")]
    LateOrUnknownReturn(CorrelationId),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("call timed out after {0}ms")]
    Timeout(u64),

    #[error("invocation failed: {0}")]
    Invocation(String),

    #[error("{0}")]
    Remote(RemoteError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// The kind this error is reported as in an Error frame.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::DuplicateClass(_) => ErrorKind::DuplicateClass,
            BridgeError::UnknownClass(_) => ErrorKind::UnknownClass,
            BridgeError::DuplicateHandle(_) => ErrorKind::DuplicateHandle,
            BridgeError::UnknownHandle(_) => ErrorKind::UnknownHandle,
            BridgeError::NoMatch(_) => ErrorKind::NoMatch,
            BridgeError::MalformedFrame(_) | BridgeError::Json(_) => ErrorKind::MalformedFrame,
            BridgeError::LateOrUnknownReturn(_) => ErrorKind::LateOrUnknownReturn,
            BridgeError::ConnectionLost(_) => ErrorKind::ConnectionLost,
            BridgeError::Timeout(_) => ErrorKind::Timeout,
            BridgeError::Invocation(_) => ErrorKind::Invocation,
            BridgeError::Remote(remote) => remote.kind,
            BridgeError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            BridgeError::Connection(_) | BridgeError::Io(_) => ErrorKind::Other,
        }
    }

    /// Converts this error into the diagnostic carried by an Error frame.
    pub fn to_remote(&self) -> RemoteError {
        match self {
            BridgeError::Remote(remote) => remote.clone(),
            other => RemoteError::new(other.kind(), other.to_string()),
        }
    }
}

impl From<RemoteError> for BridgeError {
    /// Lifts an Error frame received from the broker into a local error.
    ///
    /// `ConnectionLost` and `Invocation` keep their dedicated variants so
    /// callers can match on them; everything else stays `Remote`.
    fn from(remote: RemoteError) -> Self {
        match remote.kind {
            ErrorKind::ConnectionLost => BridgeError::ConnectionLost(remote.message),
            ErrorKind::Invocation => BridgeError::Invocation(remote.message),
            _ => BridgeError::Remote(remote),
        }
    }
}

/// Kind prefix of an Error frame diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DuplicateClass,
    UnknownClass,
    DuplicateHandle,
    UnknownHandle,
    NoMatch,
    MalformedFrame,
    LateOrUnknownReturn,
    ConnectionLost,
    Timeout,
    Invocation,
    InvalidRequest,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DuplicateClass => "DuplicateClass",
            ErrorKind::UnknownClass => "UnknownClass",
            ErrorKind::DuplicateHandle => "DuplicateHandle",
            ErrorKind::UnknownHandle => "UnknownHandle",
            ErrorKind::NoMatch => "NoMatch",
            ErrorKind::MalformedFrame => "MalformedFrame",
            ErrorKind::LateOrUnknownReturn => "LateOrUnknownReturn",
            ErrorKind::ConnectionLost => "ConnectionLost",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Invocation => "Invocation",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::Other => "Error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "DuplicateClass" => ErrorKind::DuplicateClass,
            "UnknownClass" => ErrorKind::UnknownClass,
            "DuplicateHandle" => ErrorKind::DuplicateHandle,
            "UnknownHandle" => ErrorKind::UnknownHandle,
            "NoMatch" => ErrorKind::NoMatch,
            "MalformedFrame" => ErrorKind::MalformedFrame,
            "LateOrUnknownReturn" => ErrorKind::LateOrUnknownReturn,
            "ConnectionLost" => ErrorKind::ConnectionLost,
            "Timeout" => ErrorKind::Timeout,
            "Invocation" => ErrorKind::Invocation,
            "InvalidRequest" => ErrorKind::InvalidRequest,
            _ => return Err(()),
        })
    }
}

/// Diagnostic carried by an Error frame: `"<Kind>: <message>"`.
///
/// The payload stays plain text on the wire. Text without a recognised
/// kind prefix parses as [`ErrorKind::Other`] with the whole text as the
/// message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn parse(text: &str) -> Self {
        if let Some((prefix, rest)) = text.split_once(": ") {
            if let Ok(kind) = prefix.parse::<ErrorKind>() {
                return Self::new(kind, rest);
            }
        }
        Self::new(ErrorKind::Other, text)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RemoteError {}

pub type Result<T> = std::result::Result<T, BridgeError>;
