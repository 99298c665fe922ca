//! Error types for the entity REST client.
//!
//! # Design
//! Failures are split by where they happened: the network (`Transport`),
//! the HTTP layer (`Protocol`, i.e. an unexpected status group or a body
//! that is not the JSON envelope), or the remote service itself (`Service`,
//! the envelope carried a non-zero status). Callers can tell "the request
//! never made it" apart from "the server refused the data".

use std::collections::BTreeMap;

use thiserror::Error;

/// Top-level error returned by every client operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    /// A batch returned a different number of results than rows submitted.
    #[error("request length [{requested}] and response length [{returned}] are different")]
    LengthMismatch { requested: usize, returned: usize },

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A record could not be converted into the caller's declared shape.
    #[error("cannot map {entity} record: {reason}")]
    Mapping { entity: String, reason: String },
}

impl Error {
    /// Per-field messages when the service rejected a row's values.
    pub fn field_errors(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Error::Service(ServiceError::Validation(errors)) => Some(errors),
            _ => None,
        }
    }
}

/// The round trip itself failed: connection, TLS, timeout or I/O.
#[derive(Debug, Error)]
#[error("transport failure for {url}: {source}")]
pub struct TransportError {
    pub url: String,
    #[source]
    pub source: ureq::Error,
}

/// The server answered, but not with something the client can interpret.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("response code [{status}] is not 200 (Success) url [{url}]")]
    Status { status: u16, url: String },

    #[error("content type [{}] is not JSON url [{url}]", .content_type.as_deref().unwrap_or(""))]
    NotJson {
        content_type: Option<String>,
        url: String,
    },

    #[error("malformed response body from [{url}]: {reason}")]
    MalformedBody { url: String, reason: String },
}

/// The service reported a non-zero envelope status.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Generic failure; `message` is the server-supplied message or, when
    /// there is none, the raw response payload.
    #[error("service status [{status}]: {message}")]
    Status { status: i64, message: String },

    /// Status -4: one or more fields were rejected.
    #[error("one or more fields contain illegal values, check the errors of each field: {0:?}")]
    Validation(BTreeMap<String, String>),
}
