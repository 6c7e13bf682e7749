//! Crate-wide error taxonomy.
//!
//! Every fallible operation returns `Result<T, AdaptError>`. `AdaptError`
//! pairs an [`ErrorKind`] (the taxonomy a caller branches on) with a message
//! and the call site that raised it, so a user-visible diagnostic can print
//! `file:line in function: kind: message` without the caller threading that
//! information through by hand.

use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// The seven-way error taxonomy every subsystem reports through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    DivByZero,
    ImplementMissing,
    InvariantViolated,
    IOFailure,
    CADFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidArgument => "InvalidArgument",
            Self::NotFound => "NotFound",
            Self::DivByZero => "DivByZero",
            Self::ImplementMissing => "ImplementMissing",
            Self::InvariantViolated => "InvariantViolated",
            Self::IOFailure => "IOFailure",
            Self::CADFailure => "CADFailure",
        };
        write!(f, "{s}")
    }
}

/// A single crate-wide error type, carrying enough to reproduce the
/// single-line diagnostic format from the product's failure convention:
/// filename, line, function, error kind, message. Derives `thiserror::Error`
/// rather than hand-rolling `std::error::Error`, matching the
/// `KernelOpError` convention every other subsystem in this crate follows.
#[derive(Debug, Clone, Error)]
#[error("{file}:{line}: {kind}: {message}")]
pub struct AdaptError {
    pub kind: ErrorKind,
    pub message: String,
    file: &'static str,
    line: u32,
}

impl AdaptError {
    #[track_caller]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let loc = Location::caller();
        Self {
            kind,
            message: message.into(),
            file: loc.file(),
            line: loc.line(),
        }
    }

    #[track_caller]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    #[track_caller]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    #[track_caller]
    pub fn invariant_violated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvariantViolated, message)
    }

    #[track_caller]
    pub fn cad_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CADFailure, message)
    }

    #[track_caller]
    pub fn implement_missing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ImplementMissing, message)
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind, ErrorKind::InvariantViolated | ErrorKind::InvalidArgument)
    }
}

pub type AdaptResult<T> = Result<T, AdaptError>;
