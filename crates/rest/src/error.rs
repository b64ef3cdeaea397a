use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Keys the backend uses for errors that belong to no single field
const NON_FIELD_KEYS: [&str; 2] = ["detail", "non_field_errors"];

/// Structured body of a rejected request: field name -> messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiErrorBody {
    messages: BTreeMap<String, Vec<String>>,
}

impl ApiErrorBody {
    /// Parse a rejection body.
    ///
    /// Objects map fields to a message or a list of messages; nested objects
    /// (nested serializers) flatten to `parent.child`. A bare list becomes
    /// `non_field_errors`, a bare string becomes `detail`.
    pub fn from_value(body: &Value) -> Self {
        let mut messages = BTreeMap::new();
        match body {
            Value::Object(object) => {
                for (field, value) in object {
                    collect_messages(&mut messages, field, value);
                }
            }
            Value::Array(_) => collect_messages(&mut messages, "non_field_errors", body),
            Value::Null => {}
            other => collect_messages(&mut messages, "detail", other),
        }
        Self { messages }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.messages.get(field).map(Vec::as_slice)
    }

    /// All messages for `field` joined into one line
    pub fn joined(&self, field: &str) -> Option<String> {
        self.get(field).map(|messages| messages.join(" "))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.messages
            .iter()
            .map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }

    /// Human-readable notice, one line per field
    pub fn format(&self) -> String {
        self.messages
            .iter()
            .map(|(field, messages)| {
                if NON_FIELD_KEYS.contains(&field.as_str()) {
                    messages.join(" ")
                } else {
                    format!("{}: {}", field, messages.join(" "))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

fn collect_messages(messages: &mut BTreeMap<String, Vec<String>>, field: &str, value: &Value) {
    match value {
        Value::Object(nested) => {
            for (child, child_value) in nested {
                collect_messages(messages, &format!("{}.{}", field, child), child_value);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_messages(messages, field, item);
            }
        }
        Value::String(text) => messages
            .entry(field.to_string())
            .or_default()
            .push(text.clone()),
        Value::Null => {}
        other => messages
            .entry(field.to_string())
            .or_default()
            .push(other.to_string()),
    }
}

/// Render a rejection body the way the admin cards show it in a notice
pub fn format_response(body: &Value) -> String {
    ApiErrorBody::from_value(body).format()
}

/// エラー型
#[derive(Error, Debug)]
pub enum RestError {
    #[error("Request rejected (Status: {status}): {errors}")]
    Rejected {
        status: reqwest::StatusCode,
        errors: ApiErrorBody,
    },

    #[error("API error (unparsed): {message} (Status: {status})")]
    UnparsedApiError {
        message: String,
        status: reqwest::StatusCode,
    },

    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl RestError {
    /// HTTP status of a response-level error
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            RestError::Rejected { status, .. } | RestError::UnparsedApiError { status, .. } => {
                Some(*status)
            }
            RestError::NotFound { .. } => Some(reqwest::StatusCode::NOT_FOUND),
            RestError::NetworkError(error) => error.status(),
            _ => None,
        }
    }

    /// Network failure or a body that could not be understood
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RestError::NetworkError(_)
                | RestError::UnparsedApiError { .. }
                | RestError::DeserializationError(_)
        )
    }
}
