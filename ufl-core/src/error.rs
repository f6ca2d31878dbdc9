// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the Uniform File Layer

use crate::Location;
use thiserror::Error;

/// Result type alias
pub type UflResult<T> = Result<T, UflError>;

/// Main error type
///
/// Every backend reports failures through these variants so callers can
/// render the same message regardless of which layer produced it.
#[derive(Error, Debug)]
pub enum UflError {
    #[error("Malformed location: {0}")]
    MalformedLocation(String),

    #[error("Unknown scheme: {0}")]
    UnknownScheme(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Connect timed out: {0}")]
    ConnectTimeout(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt archive {archive}{}: {message}", entry_suffix(.entry))]
    CorruptArchive {
        archive: String,
        entry: Option<String>,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cancelled")]
    Cancelled,
}

fn entry_suffix(entry: &Option<String>) -> String {
    entry
        .as_deref()
        .map(|e| format!(" (entry {e})"))
        .unwrap_or_default()
}

impl UflError {
    /// Map an io error raised while touching `location` to the typed variant
    /// the rest of the stack expects.
    pub fn io_at(err: std::io::Error, location: &Location) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => UflError::NotFound(location.to_string()),
            ErrorKind::PermissionDenied => UflError::PermissionDenied(location.to_string()),
            ErrorKind::AlreadyExists => UflError::AlreadyExists(location.to_string()),
            ErrorKind::TimedOut => UflError::Timeout(location.to_string()),
            ErrorKind::NotADirectory => UflError::NotADirectory(location.to_string()),
            ErrorKind::IsADirectory => UflError::NotAFile(location.to_string()),
            _ => UflError::Io(err),
        }
    }

    /// Errors a caller may reasonably retry. The layer itself never does.
    pub fn is_retryable(&self) -> bool {
        match self {
            UflError::ConnectTimeout(_) | UflError::Timeout(_) => true,
            UflError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// The location does not name the kind of object asked for. Callers
    /// probing a path may move on; anything else must be reported.
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            UflError::NotFound(_) | UflError::NotADirectory(_) | UflError::NotAFile(_)
        )
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, UflError::Authentication(_))
    }

    /// Whether a pooled session that produced this error must be discarded
    /// instead of being handed to the next caller.
    pub fn poisons_session(&self) -> bool {
        match self {
            UflError::Authentication(_) | UflError::Timeout(_) => true,
            UflError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}
