use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Non-2xx REST response with its display-ready message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (status {status})")]
pub struct RequestError {
    pub status: u16,
    pub message: String,
}

impl RequestError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Builds the error from a raw response body, falling back to `fallback`
    /// when the body carries nothing usable.
    pub fn from_body(status: u16, raw_body: &str, fallback: &str) -> Self {
        let message = normalize_error_body(raw_body).unwrap_or_else(|| fallback.to_string());
        Self { status, message }
    }
}

/// Error payload shapes the backend produces:
/// `{"detail": string | [{"msg": string}, ...]}` or `{"message": string}`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
}

fn detail_message(detail: &Value) -> Option<String> {
    match detail {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            }
        }
        _ => None,
    }
}

/// Extracts a display message from an error body: `detail` first, then
/// `message`, then the raw text. Returns `None` for an empty body.
pub fn normalize_error_body(raw_body: &str) -> Option<String> {
    let trimmed = raw_body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(body) = serde_json::from_str::<ErrorBody>(trimmed) {
        if let Some(message) = body.detail.as_ref().and_then(detail_message) {
            return Some(message);
        }
        if let Some(Value::String(message)) = body.message {
            if !message.trim().is_empty() {
                return Some(message);
            }
        }
    }

    Some(trimmed.to_string())
}

/// Reasons an inbound live-feed frame is rejected.
#[derive(Debug, Error)]
pub enum FeedParseError {
    #[error("malformed feed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("feed frame kind `{received}` does not match conversation kind `{expected}`")]
    KindMismatch {
        expected: &'static str,
        received: &'static str,
    },
    #[error("feed frame for group {received} delivered on group {expected}")]
    ForeignGroup { expected: i64, received: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_string_wins_over_message() {
        let body = r#"{"detail":"Join the group first","message":"ignored"}"#;
        assert_eq!(
            normalize_error_body(body).as_deref(),
            Some("Join the group first")
        );
    }

    #[test]
    fn detail_array_joins_msgs() {
        let body = r#"{"detail":[{"msg":"field required","loc":["body"]},{"msg":"too long"}]}"#;
        assert_eq!(
            normalize_error_body(body).as_deref(),
            Some("field required; too long")
        );
    }

    #[test]
    fn message_field_used_without_detail() {
        assert_eq!(
            normalize_error_body(r#"{"message":"rate limited"}"#).as_deref(),
            Some("rate limited")
        );
    }

    #[test]
    fn unrecognized_json_falls_back_to_raw_body() {
        assert_eq!(
            normalize_error_body(r#"{"detail":42}"#).as_deref(),
            Some(r#"{"detail":42}"#)
        );
    }

    #[test]
    fn raw_text_is_kept() {
        assert_eq!(
            normalize_error_body("Internal Server Error\n").as_deref(),
            Some("Internal Server Error")
        );
    }

    #[test]
    fn empty_body_uses_fallback() {
        let err = RequestError::from_body(500, "   ", "Failed to send message");
        assert_eq!(err.status, 500);
        assert_eq!(err.message, "Failed to send message");
    }
}
