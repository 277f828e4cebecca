//! Error types for process execution

use thiserror::Error;

/// Unified error type for process execution.
///
/// Every driver translates its backend-specific failure signal into exactly
/// one of these variants; backend vocabulary never reaches the caller.
/// Messages are prefixed with the offending program name and, for remote
/// targets, the host name.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The named remote target could not be resolved or reached before the
    /// command could start.
    #[error("{host}: {message}")]
    UnknownHost {
        /// The remote host that could not be reached
        host: String,
        /// The backend's description of the failure
        message: String,
    },

    /// The program named in `argv[0]` does not exist or is not executable.
    #[error("{message}")]
    NotFound {
        /// Description of the missing program
        message: String,
    },

    /// Privilege elevation or remote authentication was required and failed.
    #[error("{host}: {message}")]
    AuthenticationFailed {
        /// The host that rejected authentication
        host: String,
        /// The backend's description of the failure
        message: String,
    },

    /// The process started, ran, and exited with a non-zero status while the
    /// caller requested that this count as failure.
    #[error("{message} ({exit_status})")]
    NonZeroExit {
        /// Captured stderr, prefixed with program and host names
        message: String,
        /// The non-zero exit status
        exit_status: i32,
    },

    /// Catch-all for any other backend-reported problem, including contract
    /// violations such as writing to a process that never started.
    #[error("{message}")]
    Failed {
        /// Description of the failure
        message: String,
        /// The underlying backend error, when one exists
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ProcessError {
    /// Create a catch-all failure with no underlying cause.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a catch-all failure wrapping a backend error.
    pub fn failed_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Failed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ProcessError>;
