/* src/server/core/rust/src/errors.rs */

use std::fmt;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::StatusCode;

use crate::responses::ServerResponse;

/// Framework-level failure: routing misses, malformed route tables and
/// programming errors in user route modules.
#[derive(Debug, Clone)]
pub struct RidgeError {
  code: String,
  message: String,
  status: u16,
}

fn default_status(code: &str) -> u16 {
  match code {
    "BAD_REQUEST" => 400,
    "FORBIDDEN" => 403,
    "NOT_FOUND" => 404,
    "METHOD_NOT_ALLOWED" => 405,
    "INVALID_ROUTES" => 500,
    "INVALID_MANIFEST" => 500,
    "INTERNAL_ERROR" => 500,
    _ => 500,
  }
}

impl RidgeError {
  pub fn new(code: impl Into<String>, message: impl Into<String>, status: u16) -> Self {
    Self { code: code.into(), message: message.into(), status }
  }

  pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
    let code = code.into();
    let status = default_status(&code);
    Self { code, message: message.into(), status }
  }

  pub fn bad_request(msg: impl Into<String>) -> Self {
    Self::with_code("BAD_REQUEST", msg)
  }

  pub fn forbidden(msg: impl Into<String>) -> Self {
    Self::with_code("FORBIDDEN", msg)
  }

  pub fn not_found(msg: impl Into<String>) -> Self {
    Self::with_code("NOT_FOUND", msg)
  }

  pub fn method_not_allowed(msg: impl Into<String>) -> Self {
    Self::with_code("METHOD_NOT_ALLOWED", msg)
  }

  pub fn invalid_routes(msg: impl Into<String>) -> Self {
    Self::with_code("INVALID_ROUTES", msg)
  }

  pub fn invalid_manifest(msg: impl Into<String>) -> Self {
    Self::with_code("INVALID_MANIFEST", msg)
  }

  pub fn internal(msg: impl Into<String>) -> Self {
    Self::with_code("INTERNAL_ERROR", msg)
  }

  pub fn code(&self) -> &str {
    &self.code
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn status(&self) -> u16 {
    self.status
  }

  /// JSON error body in the `{ ok, error: { code, message } }` shape.
  pub fn into_response(self) -> ServerResponse {
    let body = serde_json::json!({
      "ok": false,
      "error": {
        "code": self.code,
        "message": self.message,
      }
    });
    let mut res = ServerResponse::new(Bytes::from(body.to_string()));
    *res.status_mut() =
      StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    res
      .headers_mut()
      .insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
    res
  }
}

impl fmt::Display for RidgeError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.code, self.message)
  }
}

impl std::error::Error for RidgeError {}
