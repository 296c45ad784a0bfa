//! Core types shared by every appsync component.
//!
//! The core module holds the failure taxonomy of the reconciliation loop:
//! - **Strongly-typed errors** ([`DeployError`]) surfaced by each component
//! - **Retry classes** ([`ErrorClass`]) that let the reconciler centralize retry policy
//! - **User-friendly contexts** ([`ErrorContext`]) with actionable suggestions for the CLI

pub mod error;

pub use error::{DeployError, ErrorClass, ErrorContext, UnavailableCause, user_friendly_error};
