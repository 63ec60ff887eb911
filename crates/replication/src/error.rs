//! Error types for replicated logs and their supervision

use std::fmt;

use proven_agency::AgencyStoreError;
use thiserror::Error;

use crate::types::ParticipantId;

/// Result type for replication operations
pub type ReplicationResult<T> = Result<T, Error>;

/// Main error type for replication
#[derive(Debug, Error)]
pub struct Error {
    /// Error kind
    kind: ErrorKind,
    /// Error context
    context: ErrorContext,
}

impl Error {
    /// Create a new error
    #[must_use]
    pub const fn new(kind: ErrorKind, context: ErrorContext) -> Self {
        Self { kind, context }
    }

    /// Create error with string context
    pub fn with_context(kind: ErrorKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: ErrorContext::Message(context.into()),
        }
    }

    /// Get error kind
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get error context
    #[must_use]
    pub const fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::with_context(ErrorKind::NotFound, what)
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::with_context(ErrorKind::InvalidConfig, msg)
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::with_context(ErrorKind::InvalidState, msg)
    }

    /// Create a conflict error (compare-and-swap retries exhausted)
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::with_context(ErrorKind::Conflict, msg)
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::with_context(ErrorKind::Timeout, msg)
    }

    /// Create a cancelled error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::with_context(ErrorKind::Cancelled, msg)
    }

    /// Create an unavailable participant error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::with_context(ErrorKind::Unavailable, msg)
    }

    /// Wrap an agency backend error
    pub fn agency<E: AgencyStoreError>(err: E) -> Self {
        Self {
            kind: ErrorKind::Agency,
            context: ErrorContext::Chain {
                message: "Agency request failed".to_string(),
                source: Box::new(err),
            },
        }
    }

    /// Create a not leader error
    pub fn not_leader(msg: impl Into<String>, current_leader: Option<ParticipantId>) -> Self {
        Self {
            kind: ErrorKind::NotLeader,
            context: ErrorContext::Leadership {
                message: msg.into(),
                current_leader,
            },
        }
    }

    /// Check if this is a not-leader error
    #[must_use]
    pub const fn is_not_leader(&self) -> bool {
        matches!(self.kind, ErrorKind::NotLeader)
    }

    /// Get the current leader from a not-leader error
    #[must_use]
    pub fn get_leader(&self) -> Option<&ParticipantId> {
        match &self.context {
            ErrorContext::Leadership { current_leader, .. } => current_leader.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            ErrorContext::Message(msg) => write!(f, "{}: {}", self.kind, msg),
            ErrorContext::Chain { message, source } => {
                write!(f, "{}: {} (caused by: {})", self.kind, message, source)
            }
            ErrorContext::Leadership {
                message,
                current_leader,
            } => {
                if let Some(leader) = current_leader {
                    write!(f, "{}: {} (current leader: {})", self.kind, message, leader)
                } else {
                    write!(f, "{}: {} (no known leader)", self.kind, message)
                }
            }
        }
    }
}

/// Error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Resource not found
    NotFound,
    /// Structurally invalid configuration, rejected at submission time
    InvalidConfig,
    /// Invalid state for operation
    InvalidState,
    /// Lost too many compare-and-swap races
    Conflict,
    /// Operation timed out
    Timeout,
    /// Operation was cancelled
    Cancelled,
    /// Participant unreachable or stopped
    Unavailable,
    /// Agency backend error
    Agency,
    /// Not the leader
    NotLeader,
    /// Internal error
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "Not found"),
            Self::InvalidConfig => write!(f, "Invalid configuration"),
            Self::InvalidState => write!(f, "Invalid state"),
            Self::Conflict => write!(f, "Conflict"),
            Self::Timeout => write!(f, "Timeout"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Unavailable => write!(f, "Unavailable"),
            Self::Agency => write!(f, "Agency error"),
            Self::NotLeader => write!(f, "Not the leader"),
            Self::Internal => write!(f, "Internal error"),
        }
    }
}

/// Error context
#[derive(Debug)]
pub enum ErrorContext {
    /// Simple message
    Message(String),
    /// Error chain with source
    Chain {
        /// Error message
        message: String,
        /// Source error
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Leadership error with info
    Leadership {
        /// Error message
        message: String,
        /// Current leader if known
        current_leader: Option<ParticipantId>,
    },
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self {
            kind: ErrorKind::Internal,
            context: ErrorContext::Chain {
                message: "Serialization error".to_string(),
                source: Box::new(err),
            },
        }
    }
}

impl From<proven_agency::Error> for Error {
    fn from(err: proven_agency::Error) -> Self {
        Self {
            kind: ErrorKind::Agency,
            context: ErrorContext::Chain {
                message: "Agency document error".to_string(),
                source: Box::new(err),
            },
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self {
            kind: ErrorKind::Internal,
            context: ErrorContext::Chain {
                message: "Task join error".to_string(),
                source: Box::new(err),
            },
        }
    }
}
