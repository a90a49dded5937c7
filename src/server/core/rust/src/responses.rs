/* src/server/core/rust/src/responses.rs */

// Response constructors and predicates shared by route modules and the data pipeline.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderValue, LOCATION};
use http::StatusCode;

pub type ServerRequest = http::Request<Bytes>;
pub type ServerResponse = http::Response<Bytes>;

/// Marks a thrown, non-redirect response so infrastructure can tell an
/// intentional short-circuit apart from a successful load.
pub const CATCH_HEADER: &str = "x-ridge-catch";
/// Carries the redirect target of a data request (the redirect itself is
/// replaced by a 204 so client-side navigation can follow it).
pub const REDIRECT_HEADER: &str = "x-ridge-redirect";
/// Marks a data response produced by an unexpected loader/action error.
pub const ERROR_HEADER: &str = "x-ridge-error";

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// 200 JSON response.
pub fn json(value: &serde_json::Value) -> ServerResponse {
  json_with(value, StatusCode::OK, HeaderMap::new())
}

/// JSON response with an explicit status and extra headers.
/// A `Content-Type` in `headers` wins over the JSON default.
pub fn json_with(value: &serde_json::Value, status: StatusCode, headers: HeaderMap) -> ServerResponse {
  let body = serde_json::to_vec(value).unwrap_or_default();
  let mut res = ServerResponse::new(Bytes::from(body));
  *res.status_mut() = status;
  *res.headers_mut() = headers;
  if !res.headers().contains_key(CONTENT_TYPE) {
    res.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
  }
  res
}

/// 302 redirect.
pub fn redirect(url: &str) -> ServerResponse {
  redirect_with(url, StatusCode::FOUND)
}

pub fn redirect_with(url: &str, status: StatusCode) -> ServerResponse {
  let mut res = ServerResponse::new(Bytes::new());
  *res.status_mut() = status;
  let location = HeaderValue::from_str(url).unwrap_or_else(|_| HeaderValue::from_static("/"));
  res.headers_mut().insert(LOCATION, location);
  res
}

pub fn is_redirect_status(status: StatusCode) -> bool {
  matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

pub fn is_redirect_response(res: &ServerResponse) -> bool {
  is_redirect_status(res.status())
}

pub fn is_catch_response(res: &ServerResponse) -> bool {
  res.headers().contains_key(CATCH_HEADER)
}

/// Decode a response body the way the browser runtime would: JSON when the
/// content type says so, plain text otherwise.
pub fn extract_data(res: &ServerResponse) -> serde_json::Value {
  let is_json = res
    .headers()
    .get(CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .is_some_and(is_json_content_type);
  if is_json && let Ok(value) = serde_json::from_slice(res.body()) {
    return value;
  }
  serde_json::Value::String(String::from_utf8_lossy(res.body()).into_owned())
}

fn is_json_content_type(content_type: &str) -> bool {
  content_type
    .split(';')
    .next()
    .map(str::trim)
    .is_some_and(|mime| mime.eq_ignore_ascii_case("application/json"))
}

/// Copy a response. `http::Response` is not `Clone`; extensions are dropped.
pub fn clone_response(res: &ServerResponse) -> ServerResponse {
  let mut copy = ServerResponse::new(res.body().clone());
  *copy.status_mut() = res.status();
  *copy.version_mut() = res.version();
  *copy.headers_mut() = res.headers().clone();
  copy
}
