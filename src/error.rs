//! Unified error types for odata-track.
//!
//! Usage errors (bad arguments, illegal state transitions, deep-insert policy
//! violations) fail fast before any request is built. Server-side problems are
//! reported through [`DataServiceRequestError`], which carries the per-operation
//! responses so callers can see which nodes succeeded.

use crate::response::SaveChangesResponse;
use crate::transport::TransportError;
use std::fmt;
use thiserror::Error;

/// Main error type for odata-track operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ODataError {
    /// The caller asked for something the current tracking state forbids
    #[error("Invalid operation: {context}")]
    InvalidOperation {
        context: String,
        #[source]
        source: InvalidOperationKind,
    },

    /// The requested transition or feature is never supported
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// A required argument was missing
    #[error("Value cannot be null: {0}")]
    ArgumentNull(String),

    /// An argument was present but unusable
    #[error("Invalid argument '{param}': {message}")]
    Argument { param: String, message: String },

    /// Errors while rendering a request payload
    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: SerializationErrorKind,
    },

    /// Aggregate failure reported by the service (`DataServiceRequestException`)
    #[error(transparent)]
    Request(Box<DataServiceRequestError>),

    /// Failures from the transport collaborator, propagated unchanged
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// IO errors with context
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Specific invalid-operation kinds
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidOperationKind {
    #[error("the entity is not contained in the context")]
    EntityNotContained,

    #[error("the entity is already being tracked by the context")]
    AlreadyTracked,

    #[error("the context is already tracking a different entity with identity '{0}'")]
    IdentityConflict(String),

    #[error("cannot change state from {from} to {to}")]
    StateTransition { from: String, to: String },

    #[error("only one top-level entity is supported for deep insert")]
    OnlyOneTopLevelEntity,

    #[error("the related entity was deleted or modified and cannot be part of a deep insert")]
    DeepInsertDeletedOrModified,

    #[error("the top-level entity of a deep insert must be in the Added state")]
    DeepInsertRootNotAdded,

    #[error("the entity has been deleted")]
    EntityDeleted,

    #[error("the link already exists")]
    LinkExists,

    #[error("the link is not tracked by the context")]
    LinkNotTracked,

    #[error("cannot delete a link to an entity that has not been saved yet")]
    NoRelationWithInsertEnd,

    #[error("'{navigation}' is not a navigation property of '{entity_type}'")]
    UnknownNavigation {
        entity_type: String,
        navigation: String,
    },

    #[error("navigation '{0}' is a collection; use add_link/delete_link")]
    CollectionNavigation(String),

    #[error("navigation '{0}' is single-valued; use set_link")]
    SingleValuedNavigation(String),
}

/// Specific serialization error kinds
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SerializationErrorKind {
    #[error("no entity set could be resolved for '{0}'")]
    UnresolvedEntitySet(String),

    #[error("key property '{property}' of '{entity_type}' has no value")]
    MissingKey {
        entity_type: String,
        property: String,
    },

    #[error("value cannot be written as a literal: {0}")]
    InvalidLiteral(String),

    #[error("JSON writer failed: {0}")]
    Write(#[from] std::io::Error),
}

/// Error returned by the service while processing one operation.
///
/// This is the "inner exception" of an aggregate [`DataServiceRequestError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// HTTP-style status code reported for the operation
    pub status_code: u16,
    /// OData error code, when the service supplied one
    pub code: Option<String>,
    /// Human-readable message from the service
    pub message: String,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {} ({code})", self.status_code, self.message),
            None => write!(f, "[{}] {}", self.status_code, self.message),
        }
    }
}

impl std::error::Error for ServerError {}

/// Aggregate failure of a save operation.
///
/// The `response` holds the per-node outcomes that were correlated before the
/// failure was raised. For validation failures it is empty.
#[derive(Error, Debug)]
#[error("An error occurred while processing this request: {message}")]
pub struct DataServiceRequestError {
    pub message: String,
    #[source]
    pub inner: Option<ServerError>,
    pub response: SaveChangesResponse,
}

// ============================================================================
// Result type alias
// ============================================================================

/// Convenient Result type for odata-track operations
pub type Result<T> = std::result::Result<T, ODataError>;

// ============================================================================
// Error construction helpers
// ============================================================================

impl ODataError {
    /// Create an invalid-operation error with context
    pub fn invalid_operation(context: impl Into<String>, source: InvalidOperationKind) -> Self {
        Self::InvalidOperation {
            context: context.into(),
            source,
        }
    }

    /// Create a serialization error with context
    pub fn serialization(context: impl Into<String>, source: SerializationErrorKind) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Create an argument-null error for the named parameter
    pub fn argument_null(param: impl Into<String>) -> Self {
        Self::ArgumentNull(param.into())
    }

    /// Create an argument error
    pub fn argument(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Argument {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Create an aggregate request error
    pub fn request(
        message: impl Into<String>,
        inner: Option<ServerError>,
        response: SaveChangesResponse,
    ) -> Self {
        Self::Request(Box::new(DataServiceRequestError {
            message: message.into(),
            inner,
            response,
        }))
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// The invalid-operation kind, if this is an invalid-operation error
    pub fn invalid_operation_kind(&self) -> Option<&InvalidOperationKind> {
        match self {
            Self::InvalidOperation { source, .. } => Some(source),
            _ => None,
        }
    }

    /// The aggregate request error, if this is one
    pub fn as_request_error(&self) -> Option<&DataServiceRequestError> {
        match self {
            Self::Request(err) => Some(err),
            _ => None,
        }
    }
}

// ============================================================================
// Conversions from existing error types
// ============================================================================

impl From<std::io::Error> for ODataError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{err}"),
            source: err,
        }
    }
}

// ============================================================================
// Error context extension trait
// ============================================================================

/// Extension trait for adding context to errors.
///
/// The context string is prepended to the error's existing context, so a
/// failure deep inside graph construction reads like
/// `"bulk update: building graph: the entity is not contained in the context"`.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context from a closure (only evaluated on error).
    fn with_context<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: Into<ODataError>> ErrorContext<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        let ctx: String = context.into();
        self.map_err(|e| add_context_to_error(e.into(), &ctx))
    }

    fn with_context<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| {
            let ctx: String = f().into();
            add_context_to_error(e.into(), &ctx)
        })
    }
}

/// Add context to an error, chaining with any existing context.
///
/// Request and transport errors are passed through untouched: their message is
/// owned by the service.
fn add_context_to_error(err: ODataError, new_ctx: &str) -> ODataError {
    match err {
        ODataError::InvalidOperation {
            context: existing,
            source,
        } => ODataError::InvalidOperation {
            context: chain_context(new_ctx, &existing),
            source,
        },
        ODataError::Serialization {
            context: existing,
            source,
        } => ODataError::Serialization {
            context: chain_context(new_ctx, &existing),
            source,
        },
        ODataError::Io { message, source } => ODataError::Io {
            message: chain_context(new_ctx, &message),
            source,
        },
        ODataError::Config(msg) => ODataError::Config(chain_context(new_ctx, &msg)),
        ODataError::Validation(msg) => ODataError::Validation(chain_context(new_ctx, &msg)),
        other => other,
    }
}

/// Chain two context strings together.
///
/// If the existing context is empty, returns just the new context.
/// Otherwise, returns "`new_context`: `existing_context`".
fn chain_context(new: &str, existing: &str) -> String {
    if existing.is_empty() {
        new.to_string()
    } else {
        format!("{new}: {existing}")
    }
}

/// Extension trait for Option types to convert to errors with context.
pub trait OptionContext<T> {
    /// Convert None to an error with the given context.
    fn context_none(self, context: impl Into<String>) -> Result<T>;

    /// Convert None to an error with context from a closure.
    fn with_context_none<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T> OptionContext<T> for Option<T> {
    fn context_none(self, context: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| ODataError::Validation(context.into()))
    }

    fn with_context_none<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.ok_or_else(|| ODataError::Validation(f().into()))
    }
}
