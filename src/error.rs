//! Error handling for the Penn Clubs client

use clubs_rust_realtime::RealtimeError;
use clubs_rust_rest::RestError;
use clubs_rust_schema::{FieldErrors, SchemaError};
use std::fmt;
use thiserror::Error;

/// Unified error type for the Penn Clubs client
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid field schema or file
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Errors from the REST resource client
    #[error(transparent)]
    Rest(#[from] RestError),

    /// WebSocket errors
    #[error("Realtime error: {0}")]
    Realtime(#[from] RealtimeError),

    /// A form action was attempted with no open session
    #[error("No form is open")]
    NoSession,

    /// Submit refused: a submit is already in flight
    #[error("A submit is already in progress")]
    AlreadySubmitting,

    /// Submit refused: nothing changed since the form was opened
    #[error("Nothing to save")]
    NotDirty,

    /// Submit refused: client-side validation failed
    #[error("Invalid form: {0:?}")]
    Validation(FieldErrors),

    /// A value was set for a field the schema does not declare
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// An instance carries no usable value for the key field
    #[error("Instance has no `{0}` key")]
    MissingKey(String),

    /// A membership capability that is switched off for this list
    #[error("Action not available: {0}")]
    CapabilityDisabled(&'static str),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Create a new general error
    pub fn general<T: fmt::Display>(msg: T) -> Self {
        Error::General(msg.to_string())
    }

    /// Create a missing-key error for `key_field`
    pub fn missing_key<T: fmt::Display>(key_field: T) -> Self {
        Error::MissingKey(key_field.to_string())
    }

    /// The server reported the resource as not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Rest(RestError::NotFound { .. }))
    }

    /// Server field errors, when the server rejected the request
    pub fn rejection(&self) -> Option<&clubs_rust_rest::ApiErrorBody> {
        match self {
            Error::Rest(RestError::Rejected { errors, .. }) => Some(errors),
            _ => None,
        }
    }
}
