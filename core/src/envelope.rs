//! The service's JSON response envelope and the checks every response
//! goes through before its payload is trusted.
//!
//! Order of checks: HTTP status group, content type, JSON shape, then the
//! envelope's own `status` field. A failure at one step means later steps
//! are never attempted.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Error, ProtocolError, ServiceError};
use crate::http::HttpResponse;
use crate::types::value_to_text;

/// Envelope status for a request that succeeded.
pub const STATUS_OK: i64 = 0;
/// Envelope status carrying a single `error.message`.
pub const STATUS_FAILURE: i64 = -1;
/// Envelope status carrying per-field `errors`.
pub const STATUS_VALIDATION: i64 = -4;

#[derive(Debug, Deserialize)]
struct Wire {
    response: Envelope,
}

/// Contents of `{"response": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub errors: Option<Map<String, Value>>,
    #[serde(default)]
    pub error: Option<EnvelopeError>,
    /// The undecoded response body, used as the message of generic errors.
    #[serde(skip)]
    pub raw: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EnvelopeError {
    #[serde(default)]
    pub message: Option<String>,
}

/// Rejects anything outside the 2xx group. Other 2xx codes pass with a
/// warning.
pub fn check_status(response: &HttpResponse, url: &str) -> Result<(), ProtocolError> {
    let status = response.status;
    if status - status % 100 != 200 {
        return Err(ProtocolError::Status {
            status,
            url: url.to_string(),
        });
    }
    if status != 200 {
        warn!(status, url, "response code is considered as success");
    }
    Ok(())
}

pub fn check_content_type(response: &HttpResponse, url: &str) -> Result<(), ProtocolError> {
    if response.content_type.is_none() {
        warn!(url, "empty header content-type");
    }
    if !response.is_json() {
        return Err(ProtocolError::NotJson {
            content_type: response.content_type.clone(),
            url: url.to_string(),
        });
    }
    Ok(())
}

/// Runs the HTTP-level checks and decodes the envelope. The envelope's own
/// status is left for the caller to interpret.
pub fn read_envelope(response: &HttpResponse, url: &str) -> Result<Envelope, ProtocolError> {
    check_status(response, url)?;
    check_content_type(response, url)?;

    let raw = response.body_text().into_owned();
    let wire: Wire = serde_json::from_str(&raw).map_err(|e| ProtocolError::MalformedBody {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let mut envelope = wire.response;
    envelope.raw = raw;
    Ok(envelope)
}

impl Envelope {
    /// Fails unless the status is 0. A missing status counts as a failure.
    pub fn ensure_ok(&self) -> Result<(), ServiceError> {
        match self.status.unwrap_or(STATUS_FAILURE) {
            STATUS_OK => Ok(()),
            status => Err(ServiceError::Status {
                status,
                message: self.raw.clone(),
            }),
        }
    }

    /// Row-level interpretation used by batch writes: field validation,
    /// a server message, or the raw payload.
    pub fn row_error(&self) -> Option<ServiceError> {
        let status = self.status.unwrap_or(STATUS_FAILURE);
        match status {
            STATUS_OK => None,
            STATUS_VALIDATION => Some(ServiceError::Validation(self.field_errors())),
            STATUS_FAILURE => Some(ServiceError::Status {
                status,
                message: self
                    .error
                    .as_ref()
                    .and_then(|e| e.message.clone())
                    .unwrap_or_else(|| self.raw.clone()),
            }),
            _ => Some(ServiceError::Status {
                status,
                message: self.raw.clone(),
            }),
        }
    }

    pub fn field_errors(&self) -> BTreeMap<String, String> {
        self.errors
            .iter()
            .flatten()
            .map(|(field, message)| (field.clone(), value_to_text(message)))
            .collect()
    }

    /// `data` as a single object.
    pub fn data_object(&self, url: &str) -> Result<&Map<String, Value>, Error> {
        match self.data.as_ref() {
            Some(Value::Object(map)) => Ok(map),
            other => Err(malformed(url, "data is not an object", other)),
        }
    }

    /// `data` as an array of objects.
    pub fn data_rows(&self, url: &str) -> Result<Vec<Map<String, Value>>, Error> {
        match self.data.as_ref() {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(map.clone()),
                    other => Err(malformed(url, "data row is not an object", Some(other))),
                })
                .collect(),
            other => Err(malformed(url, "data is not an array", other)),
        }
    }
}

fn malformed(url: &str, what: &str, found: Option<&Value>) -> Error {
    let found = match found {
        None => "nothing".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(_)) => "a boolean".to_string(),
        Some(Value::Number(_)) => "a number".to_string(),
        Some(Value::String(_)) => "a string".to_string(),
        Some(Value::Array(_)) => "an array".to_string(),
        Some(Value::Object(_)) => "an object".to_string(),
    };
    Error::Protocol(ProtocolError::MalformedBody {
        url: url.to_string(),
        reason: format!("{what}, found {found}"),
    })
}
