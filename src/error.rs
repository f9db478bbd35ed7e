use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// In particular this means that use of Internal is never a guarantee
    /// the error is not, for example due to a user error - merely that it
    /// cannot be confidently determined by the code.
    Internal,

    /// The user provided invalid input or performed an action that is
    /// unsupported or impossible to complete.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The input does not start with the container magic, or the header is
    /// otherwise unusable.
    FormatInvalid,
    /// The input is a container, but of a format revision we do not support.
    VersionUnsupported,
    /// Input data ended before the expected header field could be read.
    TruncatedInput,
    /// Authentication failed due to an incorrect password or tampering
    /// or corruption.
    AuthenticationFailed,
    /// Key derivation cost parameters are out of range or rejected by Argon2.
    InvalidParameters,
    /// Low-level Argon2 key derivation failed.
    KdfFailure,
    /// AES-256-GCM failed to seal data.
    CipherFailure,
    /// No password could be obtained, or the confirmation did not match.
    PasswordUnavailable,
    /// Destination tree is the source tree or lives inside it.
    PathCollision,
    /// A path expected to be a directory is not one.
    NotADirectory,
    /// Unexpected state reached within cchaos logic.
    InternalInvariant,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct CchaosError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag for consumers that need to
    /// branch their behavior. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl CchaosError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that retains the originating source error.
    pub fn with_source(
        category: ErrorCategory,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: None,
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// The single authentication failure every tag mismatch maps to.
    ///
    /// The message is identical for a wrong password and for damaged data.
    pub fn authentication_failed() -> Self {
        Self::with_kind(
            ErrorCategory::User,
            ErrorKind::AuthenticationFailed,
            "authentication failed: wrong password or corrupted/tampered data",
        )
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }

    /// True for errors detected from the header alone, before any key derivation.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self.kind,
            Some(
                ErrorKind::FormatInvalid
                    | ErrorKind::VersionUnsupported
                    | ErrorKind::TruncatedInput
            )
        )
    }

    pub fn is_authentication_failure(&self) -> bool {
        self.kind == Some(ErrorKind::AuthenticationFailed)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CchaosError>;
