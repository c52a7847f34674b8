//! Error taxonomy for everything that talks to the library API.

use serde_json::Value;
use std::collections::BTreeMap;

/// Errors surfaced by the API client, the cache and the mutation executor.
///
/// Entries keep the last error they saw, so this type is `Clone` and holds
/// messages rather than source errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
  /// The request never reached the server.
  #[error("network error: {message}")]
  Network { message: String },

  /// The server answered with a 4xx/5xx status.
  #[error("server error ({status}): {}", .rejection.summary())]
  Server { status: u16, rejection: Rejection },

  /// Local input was malformed and nothing was sent.
  #[error("invalid input: {message}")]
  Validation { message: String },

  /// The server answered 2xx but the body could not be decoded.
  #[error("invalid response: {message}")]
  InvalidResponse { message: String },
}

impl ApiError {
  pub fn network(message: impl Into<String>) -> Self {
    Self::Network {
      message: message.into(),
    }
  }

  pub fn validation(message: impl Into<String>) -> Self {
    Self::Validation {
      message: message.into(),
    }
  }

  pub fn invalid_response(message: impl Into<String>) -> Self {
    Self::InvalidResponse {
      message: message.into(),
    }
  }

  /// Build a server error from the status and the raw response body.
  pub fn server(status: u16, body: impl Into<String>) -> Self {
    Self::Server {
      status,
      rejection: Rejection::from_body(body),
    }
  }

  /// HTTP status for server errors.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Server { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// Static text a view can show for this error.
  pub fn user_message(&self) -> String {
    match self {
      Self::Network { .. } => "Could not reach the library server. Please try again.".to_string(),
      Self::Server { rejection, .. } => rejection.summary(),
      Self::Validation { message } => message.clone(),
      Self::InvalidResponse { .. } => "The library server sent an unexpected response.".to_string(),
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(err: serde_json::Error) -> Self {
    Self::invalid_response(err.to_string())
  }
}

/// A server rejection: the verbatim body plus whatever structure could be
/// recovered from a REST-framework style error document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rejection {
  /// Raw response body, untouched.
  pub body: String,
  /// Per-field messages (`{"email": ["already taken"]}`).
  pub fields: BTreeMap<String, Vec<String>>,
  pub non_field_errors: Vec<String>,
  pub detail: Option<String>,
  pub message: Option<String>,
}

impl Rejection {
  pub fn from_body(body: impl Into<String>) -> Self {
    let body = body.into();
    let mut rejection = Rejection {
      body,
      ..Default::default()
    };

    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&rejection.body) else {
      return rejection;
    };

    for (name, value) in map {
      match name.as_str() {
        "detail" => rejection.detail = value.as_str().map(String::from),
        "message" => rejection.message = value.as_str().map(String::from),
        "non_field_errors" => rejection.non_field_errors = messages(&value),
        _ => {
          let msgs = messages(&value);
          if !msgs.is_empty() {
            rejection.fields.insert(name, msgs);
          }
        }
      }
    }

    rejection
  }

  /// Human readable description, field errors first.
  ///
  /// `"Username: already taken. Password: too short"`, then the first
  /// non-field error, then `detail`, falling back to `message`.
  pub fn summary(&self) -> String {
    let mut parts: Vec<String> = self
      .fields
      .iter()
      .filter_map(|(field, msgs)| msgs.first().map(|m| format!("{}: {}", label(field), m)))
      .collect();

    if let Some(first) = self.non_field_errors.first() {
      parts.push(first.clone());
    }
    if let Some(detail) = &self.detail {
      parts.push(detail.clone());
    }

    if !parts.is_empty() {
      return parts.join(". ");
    }

    if let Some(message) = &self.message {
      return message.clone();
    }

    if self.body.trim().is_empty() {
      "Request was rejected by the server".to_string()
    } else {
      self.body.trim().to_string()
    }
  }
}

/// Field values are either a list of strings or a single string.
fn messages(value: &Value) -> Vec<String> {
  match value {
    Value::String(s) => vec![s.clone()],
    Value::Array(items) => items
      .iter()
      .filter_map(|v| v.as_str().map(String::from))
      .collect(),
    _ => Vec::new(),
  }
}

/// `first_name` -> `First name`
fn label(field: &str) -> String {
  let spaced = field.replace('_', " ");
  let mut chars = spaced.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_field_errors_are_listed_in_summary() {
    let rejection =
      Rejection::from_body(r#"{"username": ["already exists"], "password": ["too short"]}"#);
    assert_eq!(
      rejection.summary(),
      "Password: too short. Username: already exists"
    );
  }

  #[test]
  fn test_detail_and_non_field_errors() {
    let rejection = Rejection::from_body(
      r#"{"non_field_errors": ["Already reviewed"], "detail": "Not allowed"}"#,
    );
    assert_eq!(rejection.summary(), "Already reviewed. Not allowed");
  }

  #[test]
  fn test_message_fallback() {
    let rejection = Rejection::from_body(r#"{"message": "Book is not available"}"#);
    assert_eq!(rejection.summary(), "Book is not available");
  }

  #[test]
  fn test_non_json_body_kept_verbatim() {
    let err = ApiError::server(502, "Bad Gateway");
    match &err {
      ApiError::Server { status, rejection } => {
        assert_eq!(*status, 502);
        assert_eq!(rejection.body, "Bad Gateway");
        assert!(rejection.fields.is_empty());
      }
      _ => panic!("expected server error"),
    }
    assert_eq!(err.user_message(), "Bad Gateway");
  }

  #[test]
  fn test_label_capitalizes_and_spaces() {
    assert_eq!(label("first_name"), "First name");
    assert_eq!(label("email"), "Email");
  }

  #[test]
  fn test_validation_message_is_shown_as_is() {
    let err = ApiError::validation("Title is required");
    assert_eq!(err.user_message(), "Title is required");
    assert_eq!(err.status(), None);
  }
}
