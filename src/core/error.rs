//! Error handling for appsync
//!
//! This module provides the typed failure taxonomy shared by every component of the
//! reconciliation loop, plus user-friendly error reporting for the CLI. The error
//! system is designed around two principles:
//! 1. **Strongly-typed errors** so the [`Reconciler`](crate::reconcile::Reconciler) can
//!    decide between retry, abort and fatal without inspecting strings
//! 2. **User-friendly messages** with actionable suggestions for operators
//!
//! # Error Classes
//!
//! Every [`DeployError`] belongs to exactly one [`ErrorClass`]:
//! - **Transient**: network timeouts, rate limits, temporary filesystem contention.
//!   Retried with exponential backoff up to the configured attempt count.
//! - **Malformed**: responses missing required fields, empty or multi-root archives.
//!   Surfaced immediately; retrying an unchanging response is pointless.
//! - **Integrity**: swap preconditions violated (empty snapshot, digest mismatch).
//!   Surfaced immediately and never promoted.
//! - **Fatal**: lock contention, invalid configuration, exhausted retries. Terminal
//!   for the cycle; the live installation is left untouched.
//!
//! Components never retry internally. They surface a typed failure and leave the
//! policy to the reconciler.
//!
//! # Examples
//!
//! ```rust,no_run
//! use appsync_cli::core::{DeployError, ErrorClass, user_friendly_error};
//!
//! let error = DeployError::ExtractError {
//!     reason: "archive contains 2 top-level entries".to_string(),
//! };
//! assert_eq!(error.class(), ErrorClass::Malformed);
//!
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display(); // Shows colored error with suggestions
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// Retry classification of a [`DeployError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected to succeed on retry without changing any input.
    Transient,
    /// The remote returned something unusable; retrying will not help.
    Malformed,
    /// A safety precondition of the swap was violated.
    Integrity,
    /// Terminal for the cycle.
    Fatal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transient => "transient",
            Self::Malformed => "malformed",
            Self::Integrity => "integrity",
            Self::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Why the version oracle could not produce a [`VersionRecord`](crate::oracle::VersionRecord).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableCause {
    /// Connection refused, DNS failure, reset, and similar.
    Network,
    /// The request exceeded the oracle timeout.
    Timeout,
    /// HTTP 429 or an exhausted API rate limit.
    RateLimited,
    /// Any other non-success HTTP status.
    Status(u16),
    /// The body was not valid JSON or lacked required fields.
    Malformed,
}

impl fmt::Display for UnavailableCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => f.write_str("network error"),
            Self::Timeout => f.write_str("timed out"),
            Self::RateLimited => f.write_str("rate limited"),
            Self::Status(code) => write!(f, "HTTP {code}"),
            Self::Malformed => f.write_str("malformed response"),
        }
    }
}

/// Typed failures surfaced by the reconciliation components.
#[derive(Error, Debug, Clone)]
pub enum DeployError {
    /// The version oracle could not resolve "latest".
    #[error("Version oracle at {endpoint} is unavailable ({cause}): {reason}")]
    Unavailable {
        endpoint: String,
        cause: UnavailableCause,
        reason: String,
    },

    /// Downloading a snapshot archive failed before it was complete.
    #[error("Failed to download snapshot from {url}: {reason}")]
    NetworkError {
        url: String,
        reason: String,
    },

    /// The downloaded archive could not be opened or decoded.
    #[error("Snapshot archive {path} is corrupt: {reason}")]
    CorruptArchive {
        path: String,
        reason: String,
    },

    /// The local filesystem refused a staging operation (disk full, permissions, contention).
    #[error("Failed to stage snapshot at {path}: {reason}")]
    StagingIo {
        path: String,
        reason: String,
    },

    /// Extraction failed or did not yield exactly one content root.
    #[error("Failed to extract snapshot: {reason}")]
    ExtractError {
        reason: String,
    },

    /// A staged snapshot failed the promote preconditions.
    #[error("Refusing to promote snapshot: {reason}")]
    IntegrityViolation {
        reason: String,
    },

    /// A tree no longer matches the digest recorded for it.
    #[error("Content digest mismatch for {path}: expected {expected}, found {actual}")]
    DigestMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Moving the snapshot into place failed; the prior live tree is intact.
    #[error("Failed to promote snapshot into {live_path}: {reason}")]
    SwapFailed {
        live_path: String,
        reason: String,
    },

    /// The installation state record could not be written.
    #[error("Failed to persist installation state to {path}: {reason}")]
    PersistError {
        path: String,
        reason: String,
    },

    /// Another process holds the lock for this live installation path.
    #[error("Installation at {live_path} is locked by another process ({lock_path})")]
    LockUnavailable {
        live_path: String,
        lock_path: String,
    },

    /// The deploy configuration is unusable.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },

    /// An external collaborator (dependency installer, launcher, provisioning) failed.
    #[error("{name} failed: {reason}")]
    HookFailed {
        name: String,
        reason: String,
    },

    /// A transient failure persisted through every allowed attempt.
    #[error("Giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<DeployError>,
    },

    /// The cycle was aborted at a wait boundary.
    #[error("Reconciliation cancelled")]
    Cancelled,
}

impl DeployError {
    /// Returns the retry classification of this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Unavailable { cause, .. } => match cause {
                UnavailableCause::Network
                | UnavailableCause::Timeout
                | UnavailableCause::RateLimited => ErrorClass::Transient,
                UnavailableCause::Status(code) if *code >= 500 || *code == 408 => {
                    ErrorClass::Transient
                }
                UnavailableCause::Status(_) | UnavailableCause::Malformed => ErrorClass::Malformed,
            },
            Self::NetworkError { .. }
            | Self::StagingIo { .. }
            | Self::SwapFailed { .. }
            | Self::PersistError { .. } => ErrorClass::Transient,
            Self::CorruptArchive { .. }
            | Self::ExtractError { .. } => ErrorClass::Malformed,
            Self::IntegrityViolation { .. }
            | Self::DigestMismatch { .. } => ErrorClass::Integrity,
            Self::LockUnavailable { .. }
            | Self::Config { .. }
            | Self::HookFailed { .. }
            | Self::RetriesExhausted { .. }
            | Self::Cancelled => ErrorClass::Fatal,
        }
    }

    /// Whether the reconciler may retry after this error.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Error context wrapper that adds user-friendly messages and suggestions.
///
/// `ErrorContext` wraps a [`DeployError`] and adds optional details and a
/// suggestion for the operator. `main` renders it with colors on stderr.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: DeployError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Creates a new error context from a [`DeployError`].
    #[must_use]
    pub const fn new(error: DeployError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Adds a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Adds additional details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Displays the error context to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Converts any error into a user-friendly [`ErrorContext`].
///
/// Recognized [`DeployError`] variants get tailored suggestions; I/O and TOML
/// errors are mapped to configuration hints; anything else is wrapped as a
/// generic configuration error carrying the full `anyhow` chain.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(ctx) = error.downcast_ref::<ErrorContext>() {
        return ErrorContext {
            error: ctx.error.clone(),
            suggestion: ctx.suggestion.clone(),
            details: ctx.details.clone(),
        };
    }

    if let Some(deploy_error) = error.downcast_ref::<DeployError>() {
        return create_error_context(deploy_error.clone());
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(DeployError::Config {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax of your appsync config file")
        .with_details("Run `appsync config path` to see which file was loaded");
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>()
        && io_error.kind() == std::io::ErrorKind::PermissionDenied
    {
        return ErrorContext::new(DeployError::Config {
            message: format!("{error:#}"),
        })
        .with_suggestion("Check ownership of the live, staging and state paths");
    }

    ErrorContext::new(DeployError::Config {
        message: format!("{error:#}"),
    })
}

fn create_error_context(error: DeployError) -> ErrorContext {
    match &error {
        DeployError::Unavailable { .. } => ErrorContext::new(error)
            .with_suggestion("Check network connectivity and the [source] oracle_endpoint setting")
            .with_details("The installed version, if any, was left untouched"),
        DeployError::NetworkError { .. } => ErrorContext::new(error)
            .with_suggestion("Retry later or raise [timeouts] snapshot_secs for slow connections"),
        DeployError::StagingIo { .. } => ErrorContext::new(error)
            .with_suggestion("Check free disk space and permissions of [paths] staging_root"),
        DeployError::CorruptArchive { .. }
        | DeployError::ExtractError { .. } => ErrorContext::new(error)
            .with_suggestion("Verify that snapshot_endpoint_template points at a zip archive")
            .with_details("Archives must contain exactly one top-level directory"),
        DeployError::IntegrityViolation { .. }
        | DeployError::DigestMismatch { .. } => ErrorContext::new(error)
            .with_details("The snapshot was not promoted; the prior installation is unchanged"),
        DeployError::LockUnavailable { .. } => ErrorContext::new(error)
            .with_suggestion("Wait for the other appsync process to finish, or stop the watcher")
            .with_details("Only one process may update a live installation at a time"),
        DeployError::PersistError { .. } => ErrorContext::new(error)
            .with_suggestion("Check free disk space and permissions of [paths] state_path"),
        DeployError::RetriesExhausted { .. } => ErrorContext::new(error)
            .with_suggestion("Raise [retry] max_attempts or run again later")
            .with_details("The previous installation, if any, is still launchable"),
        DeployError::Config { .. } => ErrorContext::new(error)
            .with_suggestion("Run `appsync config init` to write an annotated example config"),
        DeployError::SwapFailed { .. }
        | DeployError::HookFailed { .. }
        | DeployError::Cancelled => ErrorContext::new(error),
    }
}
