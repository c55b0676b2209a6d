// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error handling facilities for the portable compute layer
//!
//! Read operations never signal "not found" through this type: a lookup
//! by id returns `Option`, a list returns a possibly-empty collection,
//! and an existence-sensitive delete returns `bool`.  `Error` is
//! reserved for conditions the caller must actually handle.

use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;

/// An error that can be generated within the portable compute layer
///
/// General best practices for error design apply here.  Where possible,
/// we want to reuse existing variants rather than inventing new ones to
/// distinguish cases that no programmatic consumer needs to distinguish.
#[derive(Clone, Debug, Deserialize, thiserror::Error, PartialEq, Serialize)]
pub enum Error {
    /// An object needed as part of this operation was not found, and the
    /// operation cannot express absence through its return type (e.g.
    /// the source node of an image build vanished mid-operation).
    #[error("Object (of type {type_name:?}) not found: {id}")]
    ObjectNotFound { type_name: ResourceType, id: String },
    /// The specified input field is not valid.  Raised by pure
    /// validation, before any provider call is made.
    #[error("Invalid Value: {label}, {message}")]
    InvalidValue { label: String, message: String },
    /// Two provider calls that should agree disagreed (e.g. the location
    /// listing and a resource listing reported different scopes).  Fatal
    /// for the affected resource; never retried.
    #[error("Inconsistent provider state: {message}")]
    InconsistentState { message: String },
    /// A polling predicate did not reach its target state within the
    /// deadline.  Distinct from outright provider failure: the resource
    /// may still be creating.
    #[error("Timed out: {message}")]
    TimedOut { message: String },
    /// The provider (or part of it) is transiently unavailable.
    #[error("Service Unavailable: {internal_message}")]
    ServiceUnavailable { internal_message: String },
    /// The system encountered an unhandled operational error.
    #[error("Internal Error: {internal_message}")]
    InternalError { internal_message: String },
}

/// The kind of resource named by an [`Error::ObjectNotFound`]
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize,
)]
pub enum ResourceType {
    Node,
    Image,
    Hardware,
    SecurityGroup,
    PlacementGroup,
    KeyPair,
    Address,
    Location,
}

impl Error {
    /// Returns whether the error is likely transient and could
    /// reasonably be retried
    pub fn retryable(&self) -> bool {
        match self {
            Error::ServiceUnavailable { .. } => true,

            Error::ObjectNotFound { .. }
            | Error::InvalidValue { .. }
            | Error::InconsistentState { .. }
            | Error::TimedOut { .. }
            | Error::InternalError { .. } => false,
        }
    }

    /// Generates an [`Error::ObjectNotFound`] for a resource identified
    /// by its portable or native id.
    pub fn not_found(type_name: ResourceType, id: &str) -> Error {
        Error::ObjectNotFound { type_name, id: id.to_owned() }
    }

    /// Generates an [`Error::InvalidValue`] naming the offending field.
    pub fn invalid_value(label: &str, message: &str) -> Error {
        Error::InvalidValue {
            label: label.to_owned(),
            message: message.to_owned(),
        }
    }

    /// Generates an [`Error::InconsistentState`] error.
    ///
    /// This is the failure mode for contract violations between two
    /// provider calls.  Silently guessing would produce wrong portable
    /// ids, so callers surface this as a hard error.
    pub fn inconsistent_state(message: &str) -> Error {
        Error::InconsistentState { message: message.to_owned() }
    }

    /// Generates an [`Error::TimedOut`] error.
    pub fn timed_out(message: &str) -> Error {
        Error::TimedOut { message: message.to_owned() }
    }

    /// Generates an [`Error::ServiceUnavailable`] error with the
    /// specific message
    ///
    /// This should be used for transient failures where the caller might
    /// be expected to retry.  Logic errors or other problems indicating
    /// that a retry would not work should probably be an InternalError
    /// (if it's a provider problem) or InvalidValue (if it's a caller
    /// problem) instead.
    pub fn unavail(message: &str) -> Error {
        Error::ServiceUnavailable { internal_message: message.to_owned() }
    }

    /// Generates an [`Error::InternalError`] error with the specific
    /// message
    ///
    /// InternalError should be used for operational conditions that
    /// should not happen but that we cannot reasonably handle at runtime.
    pub fn internal_error(internal_message: &str) -> Error {
        Error::InternalError { internal_message: internal_message.to_owned() }
    }

    /// Given an [`Error`] with an internal message, return the same
    /// error with `context` prepended to it to provide more context
    ///
    /// If the error has no internal message, then it is returned
    /// unchanged.
    pub fn internal_context<C>(self, context: C) -> Error
    where
        C: Display + Send + Sync + 'static,
    {
        match self {
            Error::ObjectNotFound { .. }
            | Error::InvalidValue { .. }
            | Error::InconsistentState { .. }
            | Error::TimedOut { .. } => self,
            Error::ServiceUnavailable { internal_message } => {
                Error::ServiceUnavailable {
                    internal_message: format!(
                        "{}: {}",
                        context, internal_message
                    ),
                }
            }
            Error::InternalError { internal_message } => Error::InternalError {
                internal_message: format!("{}: {}", context, internal_message),
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::internal_error(&e.to_string())
    }
}

/// Implements a pattern similar to [`anyhow::Context`] for providing
/// extra context for internal error messages
///
/// Unlike `anyhow::Context`, this does not add a new Error to the cause
/// chain.  It replaces the given Error with one that has the modified
/// `internal_message`.
pub trait InternalContext<T> {
    fn internal_context<C>(self, s: C) -> Result<T, Error>
    where
        C: Display + Send + Sync + 'static;

    fn with_internal_context<C, F>(self, f: F) -> Result<T, Error>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> InternalContext<T> for Result<T, Error> {
    fn internal_context<C>(self, context: C) -> Result<T, Error>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|error| error.internal_context(context))
    }

    fn with_internal_context<C, F>(self, make_context: F) -> Result<T, Error>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|error| error.internal_context(make_context()))
    }
}

#[cfg(test)]
mod test {
    use super::Error;
    use super::InternalContext;
    use super::ResourceType;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::unavail("placement group in use").retryable());
        assert!(!Error::invalid_value("group", "bad").retryable());
        assert!(!Error::inconsistent_state("scope mismatch").retryable());
        assert!(!Error::timed_out("node not running").retryable());
        assert!(!Error::not_found(ResourceType::Node, "i-123").retryable());
    }

    #[test]
    fn test_context() {
        let error: Result<(), Error> = Err(Error::internal_error("boom"));
        match error.internal_context("uh-oh") {
            Err(Error::InternalError { internal_message }) => {
                assert_eq!(internal_message, "uh-oh: boom");
            }
            _ => panic!("returned wrong type"),
        };

        let error: Result<(), Error> = Err(Error::unavail("boom"));
        match error.with_internal_context(|| format!("region {}", "us-east-1"))
        {
            Err(Error::ServiceUnavailable { internal_message }) => {
                assert_eq!(internal_message, "region us-east-1: boom");
            }
            _ => panic!("returned wrong type"),
        };

        // Variants without an internal message pass through unchanged.
        let error: Result<(), Error> =
            Err(Error::invalid_value("scope", "bad"));
        assert!(matches!(
            error.internal_context("foo"),
            Err(Error::InvalidValue { .. })
        ));
    }
}
