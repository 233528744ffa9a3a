use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Target document absent. Callers usually treat this as nothing to do.
    NotFound,
    /// Transport failure or timeout. The only retryable kind.
    Network,
    PermissionDenied,
    /// Malformed input, rejected before any remote call.
    Validation,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Network => "network",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::Validation => "validation",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// The single failure type that leaves the store layer. Backend and
/// transport errors are folded into `cause` as text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct StoreError {
    pub kind: ErrorKind,
    pub message: String,
    pub cause: Option<String>,
}

impl StoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), cause: None }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Network
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn envelope<T>(&self) -> Envelope<T> {
        Envelope::failure(self)
    }
}

/// Uniform success/failure shape handed to UI code and HTTP callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, message: None, data: Some(data), error: None, kind: None }
    }

    pub fn failure(err: &StoreError) -> Self {
        Self {
            success: false,
            message: Some(err.message.clone()),
            data: None,
            error: err.cause.clone(),
            kind: Some(err.kind),
        }
    }
}

impl<T> From<StoreResult<T>> for Envelope<T> {
    fn from(result: StoreResult<T>) -> Self {
        match result {
            Ok(data) => Envelope::ok(data),
            Err(err) => Envelope::failure(&err),
        }
    }
}

/// Closed result of a single-document read.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ok(T),
    NotFound,
    Failed(StoreError),
}

impl<T> Outcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Ok(value) => Outcome::Ok(f(value)),
            Outcome::NotFound => Outcome::NotFound,
            Outcome::Failed(err) => Outcome::Failed(err),
        }
    }
}

impl<T> From<StoreResult<Option<T>>> for Outcome<T> {
    fn from(result: StoreResult<Option<T>>) -> Self {
        match result {
            Ok(Some(value)) => Outcome::Ok(value),
            Ok(None) => Outcome::NotFound,
            Err(err) if err.is_not_found() => Outcome::NotFound,
            Err(err) => Outcome::Failed(err),
        }
    }
}
