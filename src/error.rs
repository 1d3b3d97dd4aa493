//! Crate-wide error type
//!
//! Each component reports failures through its own error enum. This module
//! unifies them and classifies every failure into the taxonomy clients see,
//! so the facade can turn any of them into a structured failure response.

use serde::Serialize;
use thiserror::Error;

use crate::{
    arbiter, colors, names, registry, session,
    ids::{SessionId, TeamId},
};

/// Classification of a failure as reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or inconsistent input, such as an unknown id
    Validation,
    /// A bounded resource ran out (team seats, palette colors)
    Capacity,
    /// The session is not in a state that allows the operation
    State,
    /// The operation collided with existing state or lost a race
    Conflict,
    /// A lock could not be acquired within the configured bound
    Unavailable,
    /// Shared state is inconsistent; the host should stop serving it
    Fatal,
}

/// An entity whose lock was contended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    /// A team lock
    #[display("team {_0}")]
    Team(TeamId),
    /// A session lock
    #[display("session {_0}")]
    Session(SessionId),
}

/// Any failure of a coordinator operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Team membership failure
    #[error(transparent)]
    Registry(#[from] registry::Error),
    /// Color assignment failure
    #[error(transparent)]
    Color(#[from] colors::Error),
    /// Answer arbitration failure
    #[error(transparent)]
    Arbiter(#[from] arbiter::Error),
    /// Session lifecycle failure
    #[error(transparent)]
    Session(#[from] session::Error),
    /// Name validation failure
    #[error(transparent)]
    Name(#[from] names::Error),
    /// A request failed validation
    #[error("invalid request: {0}")]
    Invalid(String),
    /// Waiting for a lock exceeded the configured bound
    #[error("{0} is busy, try again")]
    Busy(Entity),
    /// An internal record contradicts another one
    #[error("corrupted record: {0}")]
    Corrupted(String),
}

impl Error {
    /// Classifies this error for clients
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Registry(e) => e.kind(),
            Self::Color(e) => e.kind(),
            Self::Arbiter(e) => e.kind(),
            Self::Session(e) => e.kind(),
            Self::Name(names::Error::Used) => ErrorKind::Conflict,
            Self::Name(names::Error::Exhausted) => ErrorKind::Capacity,
            Self::Name(_) | Self::Invalid(_) => ErrorKind::Validation,
            Self::Busy(_) => ErrorKind::Unavailable,
            Self::Corrupted(_) => ErrorKind::Fatal,
        }
    }

    /// Whether the host should treat this failure as unrecoverable
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

impl From<garde::Report> for Error {
    fn from(report: garde::Report) -> Self {
        Self::Invalid(report.to_string())
    }
}

/// Result type used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;
