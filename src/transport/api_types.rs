//! Serde-deserializable types matching API error responses.

use serde::Deserialize;
use std::fmt;

// ============================================================================
// Error bundle as sent by the API
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorRequest {
  pub url: Option<String>,
  pub query_string: Option<String>,
  pub method: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBundle {
  pub error: Option<String>,
  pub error_description: Option<String>,
  pub error_detail: Option<String>,
  pub error_propagate: Option<bool>,
  #[serde(default)]
  pub error_parameters: serde_json::Map<String, serde_json::Value>,
  pub request: Option<ApiErrorRequest>,
}

// ============================================================================
// Non-2xx response
// ============================================================================

/// A failed HTTP response, with the error bundle when the body carried one.
#[derive(Debug, Clone)]
pub struct ApiError {
  pub status: u16,
  pub bundle: Option<ApiErrorBundle>,
  pub body: String,
}

impl ApiError {
  /// Build from a response status and raw body.
  pub fn from_response(status: u16, body: &[u8]) -> Self {
    let bundle = serde_json::from_slice::<ApiErrorBundle>(body)
      .ok()
      .filter(|b| b.error.is_some() || b.error_description.is_some());

    Self {
      status,
      bundle,
      body: String::from_utf8_lossy(body).into_owned(),
    }
  }

  /// Whether the API asked for the error to be shown to the user.
  pub fn propagate(&self) -> bool {
    self
      .bundle
      .as_ref()
      .and_then(|b| b.error_propagate)
      .unwrap_or(false)
  }

  pub fn error(&self) -> Option<&str> {
    self.bundle.as_ref()?.error.as_deref()
  }

  pub fn description(&self) -> Option<&str> {
    self.bundle.as_ref()?.error_description.as_deref()
  }

  /// An error parameter rendered as a string.
  pub fn parameter(&self, name: &str) -> Option<String> {
    let value = self.bundle.as_ref()?.error_parameters.get(name)?;
    match value {
      serde_json::Value::String(s) => Some(s.clone()),
      other => Some(other.to_string()),
    }
  }
}

impl fmt::Display for ApiError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match (self.error(), self.description()) {
      (Some(error), Some(description)) => {
        write!(f, "HTTP {}: {} ({})", self.status, description, error)
      }
      (None, Some(description)) => write!(f, "HTTP {}: {}", self.status, description),
      (Some(error), None) => write!(f, "HTTP {}: {}", self.status, error),
      (None, None) if self.body.trim().is_empty() => write!(f, "HTTP {}", self.status),
      (None, None) => write!(f, "HTTP {}: {}", self.status, self.body.trim()),
    }
  }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_bundle_is_parsed() {
    let body = br#"{
      "error": "not_found",
      "error_description": "Object not found",
      "error_propagate": true,
      "error_parameters": {"id": 42},
      "request": {"url": "https://api.example.com/item/42", "method": "GET"}
    }"#;

    let error = ApiError::from_response(404, body);
    assert_eq!(error.error(), Some("not_found"));
    assert!(error.propagate());
    assert_eq!(error.parameter("id"), Some("42".to_string()));
    assert_eq!(error.to_string(), "HTTP 404: Object not found (not_found)");
  }

  #[test]
  fn test_plain_body_is_kept() {
    let error = ApiError::from_response(502, b"Bad Gateway");
    assert!(error.bundle.is_none());
    assert!(!error.propagate());
    assert_eq!(error.to_string(), "HTTP 502: Bad Gateway");
  }

  #[test]
  fn test_empty_body() {
    assert_eq!(ApiError::from_response(500, b"").to_string(), "HTTP 500");
  }
}
