//! Boundary error for identity API calls. Remote failures are classified once,
//! here, so the session logic matches on a tag instead of probing response bodies.

use serde_json::Value;
use thiserror::Error;

/// Maximum number of body characters kept as diagnostic detail.
const MAX_DETAIL_CHARS: usize = 200;

/// Field name paired with every message the server reported for it.
pub type FieldErrors = Vec<(String, Vec<String>)>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The server rejected the input field by field.
    #[error("validation failed: {}", flatten(.fields))]
    Validation {
        message: Option<String>,
        fields: FieldErrors,
    },
    /// The server rejected the request with one human-readable message.
    #[error("{0}")]
    Message(String),
    /// Transport failure, timeout, malformed body, or a rejection without a message.
    /// The detail is diagnostic only and never shown to users.
    #[error("request failed: {0}")]
    Unknown(String),
}

impl ApiError {
    /// Classifies an error response body.
    ///
    /// A non-empty `errors` object wins over `message`; a blank `message` counts
    /// as absent.
    #[must_use]
    pub fn from_response_body(status: u16, body: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(body) else {
            return Self::Unknown(format!("HTTP {status}: {}", sanitize_body(body)));
        };

        let message = value
            .get("message")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|message| !message.is_empty())
            .map(ToString::to_string);

        let fields = value
            .get("errors")
            .and_then(Value::as_object)
            .map(|errors| {
                errors
                    .iter()
                    .map(|(field, messages)| (field.clone(), field_messages(messages)))
                    .filter(|(_, messages)| !messages.is_empty())
                    .collect::<FieldErrors>()
            })
            .unwrap_or_default();

        if !fields.is_empty() {
            return Self::Validation { message, fields };
        }

        match message {
            Some(message) => Self::Message(message),
            None => Self::Unknown(format!("HTTP {status}: {}", sanitize_body(body))),
        }
    }

    /// Top-level message, if the server sent one.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Validation { message, .. } => message.as_deref(),
            Self::Message(message) => Some(message),
            Self::Unknown(_) => None,
        }
    }

    /// All validation messages joined by newlines, in field order.
    #[must_use]
    pub fn validation_summary(&self) -> Option<String> {
        match self {
            Self::Validation { fields, .. } => Some(flatten(fields)),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Unknown("request timed out".to_string())
        } else if err.is_decode() {
            Self::Unknown(format!("failed to decode response: {err}"))
        } else {
            Self::Unknown(format!("unable to reach the server: {err}"))
        }
    }
}

fn field_messages(value: &Value) -> Vec<String> {
    match value {
        Value::String(message) => vec![message.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn flatten(fields: &FieldErrors) -> String {
    fields
        .iter()
        .flat_map(|(_, messages)| messages.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}

fn sanitize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.chars().take(MAX_DETAIL_CHARS).collect()
    }
}
