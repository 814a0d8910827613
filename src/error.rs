//! Error types for the Ubiquity CSI plugin
//!
//! Provides structured error types for the remote storage client, the
//! attach/detach workflows, the per-backend mounters and the controller API.

use thiserror::Error;

/// Unified error type for the plugin
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Remote Storage API Errors
    // =========================================================================
    #[error("Remote storage API unavailable during {operation}: {reason}")]
    RemoteUnavailable { operation: String, reason: String },

    #[error("Remote storage API rejected {operation} ({code}): {description}")]
    RemoteRejected {
        operation: String,
        code: u16,
        description: String,
    },

    #[error("Failed to decode {operation} response: {reason}")]
    DecodeFailure { operation: String, reason: String },

    // =========================================================================
    // Mounter Errors
    // =========================================================================
    #[error("Mounter not found for backend: {backend}")]
    MounterNotFound { backend: String },

    #[error("Mount failed ({backend}): {reason}")]
    MountFailed { backend: String, reason: String },

    #[error("Unmount failed ({backend}): {reason}")]
    UnmountFailed { backend: String, reason: String },

    #[error(
        "Post-detach action failed ({backend}): {reason}; the volume is already detached on the server"
    )]
    PostDetachFailed { backend: String, reason: String },

    #[error("Command failed: {command} - {reason}")]
    CommandFailed { command: String, reason: String },

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Validation failed: {0}")]
    Validation(String),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Protocol-level error code reported to the orchestration caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    Unavailable,
    Internal,
}

impl ErrorCode {
    /// Stable snake_case name used in API error bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::NotFound => "not_found",
            ErrorCode::AlreadyExists => "already_exists",
            ErrorCode::FailedPrecondition => "failed_precondition",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Map this error onto the nearest protocol-level code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Validation(_) => ErrorCode::InvalidArgument,

            Error::RemoteUnavailable { .. } => ErrorCode::Unavailable,

            Error::RemoteRejected { code, .. } => match *code {
                400 => ErrorCode::InvalidArgument,
                404 => ErrorCode::NotFound,
                409 => ErrorCode::AlreadyExists,
                _ => ErrorCode::Internal,
            },

            Error::MounterNotFound { .. } => ErrorCode::FailedPrecondition,

            Error::DecodeFailure { .. }
            | Error::MountFailed { .. }
            | Error::UnmountFailed { .. }
            | Error::PostDetachFailed { .. }
            | Error::CommandFailed { .. }
            | Error::Configuration(_)
            | Error::Internal(_)
            | Error::YamlParse(_)
            | Error::Io(_) => ErrorCode::Internal,
        }
    }

    /// Check if this error is transient (the caller may retry the whole operation)
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::RemoteUnavailable { .. })
    }

    /// Whether the remote side already considers the volume detached
    pub fn remote_detached(&self) -> bool {
        matches!(self, Error::PostDetachFailed { .. })
    }
}

/// Result type alias for the plugin
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = Error::Validation("missing hostname".into());
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        let err = Error::RemoteRejected {
            operation: "get-volume".into(),
            code: 404,
            description: "volume not found".into(),
        };
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err = Error::RemoteRejected {
            operation: "create-volume".into(),
            code: 500,
            description: "boom".into(),
        };
        assert_eq!(err.code(), ErrorCode::Internal);

        let err = Error::MounterNotFound {
            backend: "unknown-family".into(),
        };
        assert_eq!(err.code(), ErrorCode::FailedPrecondition);
    }

    #[test]
    fn test_error_transient() {
        let transient = Error::RemoteUnavailable {
            operation: "attach".into(),
            reason: "connection refused".into(),
        };
        assert!(transient.is_transient());
        assert_eq!(transient.code(), ErrorCode::Unavailable);

        let rejected = Error::RemoteRejected {
            operation: "attach".into(),
            code: 400,
            description: "bad".into(),
        };
        assert!(!rejected.is_transient());
    }

    #[test]
    fn test_post_detach_reports_remote_detached() {
        let err = Error::PostDetachFailed {
            backend: "scbe".into(),
            reason: "multipath flush failed".into(),
        };
        assert!(err.remote_detached());
        assert!(err.to_string().contains("already detached"));
    }
}
