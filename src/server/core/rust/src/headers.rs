/* src/server/core/rust/src/headers.rs */

// Document response headers: folded root to leaf through each route's
// headers export, carrying every Set-Cookie along the way.

use std::collections::HashMap;

use http::header::{HeaderMap, HeaderValue, SET_COOKIE};

use crate::matcher::RouteMatch;
use crate::module::{HeadersArgs, HeadersExport};
use crate::responses::ServerResponse;
use crate::route::RouteLike;
use crate::server::ServerRoute;

/// Compute the headers of a document response. `loader_responses` is keyed by
/// route id so the fold order never depends on loader completion order.
pub fn merge_route_headers(
  matches: &[RouteMatch<ServerRoute>],
  loader_responses: &HashMap<String, ServerResponse>,
  action_response: Option<&ServerResponse>,
) -> HeaderMap {
  let empty = HeaderMap::new();
  let action_headers = action_response.map(|r| r.headers()).unwrap_or(&empty);

  matches.iter().fold(HeaderMap::new(), |parent_headers, m| {
    let loader_headers = loader_responses.get(m.route.id()).map(|r| r.headers()).unwrap_or(&empty);
    let mut headers = match &m.route.module.headers {
      Some(HeadersExport::Function(f)) => {
        f(&HeadersArgs { loader_headers, parent_headers: &parent_headers, action_headers })
      }
      Some(HeadersExport::Static(h)) => h.clone(),
      None => HeaderMap::new(),
    };
    prepend_cookies(&mut headers, &[action_headers, loader_headers, &parent_headers]);
    headers
  })
}

/// Put every Set-Cookie of `sources` (in order) ahead of the cookies already in
/// `headers`. Exact duplicates keep their first position.
fn prepend_cookies(headers: &mut HeaderMap, sources: &[&HeaderMap]) {
  let mut cookies: Vec<String> = Vec::new();
  for source in sources.iter().copied().chain(std::iter::once(&*headers)) {
    for value in source.get_all(SET_COOKIE) {
      let Ok(raw) = value.to_str() else { continue };
      for cookie in split_cookies_string(raw) {
        if !cookies.contains(&cookie) {
          cookies.push(cookie);
        }
      }
    }
  }

  headers.remove(SET_COOKIE);
  for cookie in cookies {
    if let Ok(value) = HeaderValue::from_str(&cookie) {
      headers.append(SET_COOKIE, value);
    }
  }
}

/// Split a comma-joined Set-Cookie value into individual cookies. Commas
/// inside attribute values such as `Expires=Wed, 21 Oct 2015 ...` are kept.
pub fn split_cookies_string(input: &str) -> Vec<String> {
  let bytes = input.as_bytes();
  let mut cookies = Vec::new();
  let mut start = 0;
  let mut pos = 0;

  while pos < bytes.len() {
    if bytes[pos] != b',' {
      pos += 1;
      continue;
    }
    // A comma separates cookies only when the next token is `name=`.
    let separator = pos;
    let mut next = pos + 1;
    while next < bytes.len() && bytes[next].is_ascii_whitespace() {
      next += 1;
    }
    let token_start = next;
    while next < bytes.len() && !matches!(bytes[next], b'=' | b';' | b',') {
      next += 1;
    }
    if next < bytes.len() && bytes[next] == b'=' && next > token_start {
      let cookie = input[start..separator].trim();
      if !cookie.is_empty() {
        cookies.push(cookie.to_string());
      }
      start = token_start;
    }
    pos = separator + 1;
  }

  let last = input[start..].trim();
  if !last.is_empty() {
    cookies.push(last.to_string());
  }
  cookies
}
