/* src/server/core/rust/src/data.rs */

// Loader and action invocation. Thrown control flow from user code is turned
// into a tagged result here so boundary routing downstream is a plain match.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue};
use http::{Method, Uri, Version};
use tracing::error;
use url::form_urlencoded;

use crate::errors::RidgeError;
use crate::module::{DataFn, DataFunctionArgs, DataValue, LoadContext, RouteError, Thrown};
use crate::responses::{self, CATCH_HEADER, ServerRequest, ServerResponse};
use crate::server::ServerRoute;

/// Outcome of one loader or action call.
pub enum AppLoadResult {
  /// Normal completion; JSON values are already wrapped in a 200 response.
  Value(ServerResponse),
  /// A redirect, returned or thrown. Never carries the catch header.
  Redirect(ServerResponse),
  /// A thrown non-redirect response, tagged with [`CATCH_HEADER`].
  Caught(ServerResponse),
  Errored(RouteError),
}

impl AppLoadResult {
  pub fn response(&self) -> Option<&ServerResponse> {
    match self {
      Self::Value(res) | Self::Redirect(res) | Self::Caught(res) => Some(res),
      Self::Errored(_) => None,
    }
  }
}

impl fmt::Debug for AppLoadResult {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Value(res) => write!(f, "Value({})", res.status()),
      Self::Redirect(res) => write!(f, "Redirect({})", res.status()),
      Self::Caught(res) => write!(f, "Caught({})", res.status()),
      Self::Errored(err) => write!(f, "Errored({err})"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFunctionKind {
  Loader,
  Action,
}

impl DataFunctionKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Loader => "loader",
      Self::Action => "action",
    }
  }
}

/// Owned copy of an incoming request that can mint a fresh
/// [`ServerRequest`] for each data function call.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
  pub method: Method,
  pub uri: Uri,
  pub version: Version,
  pub headers: HeaderMap,
  pub body: Bytes,
}

impl RequestSnapshot {
  pub fn from_request(request: ServerRequest) -> Self {
    let (parts, body) = request.into_parts();
    Self { method: parts.method, uri: parts.uri, version: parts.version, headers: parts.headers, body }
  }

  pub fn to_request(&self) -> ServerRequest {
    let mut request = ServerRequest::new(self.body.clone());
    *request.method_mut() = self.method.clone();
    *request.uri_mut() = self.uri.clone();
    *request.version_mut() = self.version;
    *request.headers_mut() = self.headers.clone();
    request
  }

  /// Request as user code sees it: see [`strip_internal_params`].
  pub fn to_user_request(&self) -> ServerRequest {
    let mut request = self.to_request();
    *request.uri_mut() = strip_internal_params(&self.uri);
    request
  }

  pub fn query_param(&self, name: &str) -> Option<String> {
    let query = self.uri.query()?;
    form_urlencoded::parse(query.as_bytes()).find(|(k, _)| k == name).map(|(_, v)| v.into_owned())
  }

  pub fn has_query_param(&self, name: &str) -> bool {
    self
      .uri
      .query()
      .is_some_and(|q| form_urlencoded::parse(q.as_bytes()).any(|(k, _)| k == name))
  }
}

/// Remove the `_data` parameter and every `index` parameter, then re-append
/// the non-empty `index` values in their original order.
pub fn strip_internal_params(uri: &Uri) -> Uri {
  let Some(query) = uri.query() else {
    return uri.clone();
  };

  let mut kept = Vec::new();
  let mut index_values = Vec::new();
  for (key, value) in form_urlencoded::parse(query.as_bytes()) {
    match key.as_ref() {
      "_data" => {}
      "index" => {
        if !value.is_empty() {
          index_values.push(value.into_owned());
        }
      }
      _ => kept.push((key.into_owned(), value.into_owned())),
    }
  }

  let mut serializer = form_urlencoded::Serializer::new(String::new());
  for (key, value) in &kept {
    serializer.append_pair(key, value);
  }
  for value in &index_values {
    serializer.append_pair("index", value);
  }
  let query = serializer.finish();

  let mut rebuilt = String::new();
  if let Some(scheme) = uri.scheme_str() {
    rebuilt.push_str(scheme);
    rebuilt.push_str("://");
  }
  if let Some(authority) = uri.authority() {
    rebuilt.push_str(authority.as_str());
  }
  rebuilt.push_str(uri.path());
  if !query.is_empty() {
    rebuilt.push('?');
    rebuilt.push_str(&query);
  }
  rebuilt.parse().unwrap_or_else(|_| uri.clone())
}

pub async fn call_route_loader(
  route: &ServerRoute,
  request: &RequestSnapshot,
  params: HashMap<String, String>,
  context: LoadContext,
) -> Result<AppLoadResult, RidgeError> {
  let Some(loader) = &route.module.loader else {
    return Err(RidgeError::bad_request(format!(
      "You made a {} request to {} but did not provide a default component or `loader` for route \"{}\", so there is no way to handle the request.",
      request.method,
      request.uri,
      route.def.id
    )));
  };
  invoke(loader, DataFunctionKind::Loader, route, request, params, context).await
}

pub async fn call_route_action(
  route: &ServerRoute,
  request: &RequestSnapshot,
  params: HashMap<String, String>,
  context: LoadContext,
) -> Result<AppLoadResult, RidgeError> {
  let Some(action) = &route.module.action else {
    let mut res = RidgeError::method_not_allowed(format!(
      "You made a {} request to {} but did not provide an `action` for route \"{}\", so there is no way to handle the request.",
      request.method,
      request.uri,
      route.def.id
    ))
    .into_response();
    res.headers_mut().insert(CATCH_HEADER, HeaderValue::from_static("yes"));
    return Ok(AppLoadResult::Caught(res));
  };
  invoke(action, DataFunctionKind::Action, route, request, params, context).await
}

async fn invoke(
  func: &DataFn,
  kind: DataFunctionKind,
  route: &ServerRoute,
  request: &RequestSnapshot,
  params: HashMap<String, String>,
  context: LoadContext,
) -> Result<AppLoadResult, RidgeError> {
  let args = DataFunctionArgs { request: request.to_user_request(), params, context };
  match func(args).await {
    Ok(DataValue::Json(value)) => Ok(AppLoadResult::Value(responses::json(&value))),
    Ok(DataValue::Response(res)) if responses::is_redirect_response(&res) => {
      Ok(AppLoadResult::Redirect(res))
    }
    Ok(DataValue::Response(res)) => Ok(AppLoadResult::Value(res)),
    Ok(DataValue::Undefined) => {
      let message = format!(
        "You defined {} for route \"{}\" but didn't return anything from your `{}` function. Please return a value or `null`.",
        article(kind),
        route.def.id,
        kind.as_str()
      );
      error!(route = %route.def.id, kind = kind.as_str(), "{message}");
      Err(RidgeError::internal(message))
    }
    // Thrown redirects are followed, not caught: no catch header.
    Err(Thrown::Response(res)) if responses::is_redirect_response(&res) => {
      Ok(AppLoadResult::Redirect(res))
    }
    Err(Thrown::Response(mut res)) => {
      res.headers_mut().insert(CATCH_HEADER, HeaderValue::from_static("yes"));
      Ok(AppLoadResult::Caught(res))
    }
    Err(Thrown::Error(err)) => Ok(AppLoadResult::Errored(err)),
  }
}

fn article(kind: DataFunctionKind) -> &'static str {
  match kind {
    DataFunctionKind::Loader => "a loader",
    DataFunctionKind::Action => "an action",
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use http::StatusCode;

  use super::*;
  use crate::module::RouteModule;
  use crate::route::tests::def;

  fn snapshot(method: Method, uri: &str) -> RequestSnapshot {
    RequestSnapshot {
      method,
      uri: uri.parse().unwrap(),
      version: Version::HTTP_11,
      headers: HeaderMap::new(),
      body: Bytes::new(),
    }
  }

  fn route(module: RouteModule) -> ServerRoute {
    ServerRoute { def: def("routes/child", Some("root"), Some("child")), module }
  }

  fn ctx() -> LoadContext {
    Arc::new(())
  }

  #[test]
  fn strips_empty_index_and_data() {
    let uri: Uri = "/parent/child?index&foo=bar&_data=routes%2Fchild".parse().unwrap();
    assert_eq!(strip_internal_params(&uri).to_string(), "/parent/child?foo=bar");
  }

  #[test]
  fn keeps_non_empty_index_values_in_order() {
    let uri: Uri = "/p?index=a&x=1&index&index=b".parse().unwrap();
    assert_eq!(strip_internal_params(&uri).to_string(), "/p?x=1&index=a&index=b");
  }

  #[test]
  fn absolute_uri_keeps_authority() {
    let uri: Uri = "http://example.com/p?_data=root".parse().unwrap();
    assert_eq!(strip_internal_params(&uri).to_string(), "http://example.com/p");
  }

  #[tokio::test]
  async fn loader_sees_stripped_url() {
    let module = RouteModule::new().loader(|args: DataFunctionArgs| async move {
      Ok(DataValue::Json(serde_json::json!(args.request.uri().to_string())))
    });
    let req = snapshot(Method::GET, "/parent/child?index&foo=bar");
    let result = call_route_loader(&route(module), &req, HashMap::new(), ctx()).await.unwrap();
    let AppLoadResult::Value(res) = result else { panic!("expected value") };
    assert_eq!(responses::extract_data(&res), "/parent/child?foo=bar");
  }

  #[tokio::test]
  async fn thrown_redirect_is_not_tagged() {
    let module = RouteModule::new()
      .loader(|_| async { Err(Thrown::Response(responses::redirect("/login"))) });
    let req = snapshot(Method::GET, "/child");
    let result = call_route_loader(&route(module), &req, HashMap::new(), ctx()).await.unwrap();
    let AppLoadResult::Redirect(res) = result else { panic!("expected redirect") };
    assert_eq!(res.status(), StatusCode::FOUND);
    assert!(!res.headers().contains_key(CATCH_HEADER));
  }

  #[tokio::test]
  async fn thrown_response_is_tagged_as_caught() {
    let module = RouteModule::new().loader(|_| async {
      Err(Thrown::Response(responses::json_with(
        &serde_json::json!("nope"),
        StatusCode::NOT_FOUND,
        HeaderMap::new(),
      )))
    });
    let req = snapshot(Method::GET, "/child");
    let result = call_route_loader(&route(module), &req, HashMap::new(), ctx()).await.unwrap();
    let AppLoadResult::Caught(res) = result else { panic!("expected caught") };
    assert_eq!(res.headers()[CATCH_HEADER], "yes");
  }

  #[tokio::test]
  async fn undefined_return_fails_loudly() {
    let module = RouteModule::new().loader(|_| async { Ok(DataValue::Undefined) });
    let req = snapshot(Method::GET, "/child");
    let err = call_route_loader(&route(module), &req, HashMap::new(), ctx()).await.unwrap_err();
    assert_eq!(err.status(), 500);
    assert!(err.message().contains("routes/child"));
    assert!(err.message().contains("`loader`"));
  }

  #[tokio::test]
  async fn null_return_is_a_value() {
    let module = RouteModule::new().loader(|_| async { Ok(DataValue::Json(serde_json::Value::Null)) });
    let req = snapshot(Method::GET, "/child");
    let result = call_route_loader(&route(module), &req, HashMap::new(), ctx()).await.unwrap();
    assert!(matches!(result, AppLoadResult::Value(_)));
  }

  #[tokio::test]
  async fn missing_loader_is_bad_request() {
    let req = snapshot(Method::GET, "/child");
    let err =
      call_route_loader(&route(RouteModule::new()), &req, HashMap::new(), ctx()).await.unwrap_err();
    assert_eq!(err.status(), 400);
  }

  #[tokio::test]
  async fn missing_action_is_caught_405() {
    let req = snapshot(Method::POST, "/child");
    let result =
      call_route_action(&route(RouteModule::new()), &req, HashMap::new(), ctx()).await.unwrap();
    let AppLoadResult::Caught(res) = result else { panic!("expected caught") };
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers()[CATCH_HEADER], "yes");
    let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["error"]["code"], "METHOD_NOT_ALLOWED");
    assert!(body["error"]["message"].as_str().unwrap().contains("`action`"));
  }

  #[tokio::test]
  async fn context_is_downcast() {
    let module = RouteModule::new().loader(|args: DataFunctionArgs| async move {
      let user = args.context::<String>().cloned().unwrap_or_default();
      Ok(DataValue::Json(serde_json::json!(user)))
    });
    let req = snapshot(Method::GET, "/child");
    let context: LoadContext = Arc::new("ada".to_string());
    let result = call_route_loader(&route(module), &req, HashMap::new(), context).await.unwrap();
    let AppLoadResult::Value(res) = result else { panic!("expected value") };
    assert_eq!(responses::extract_data(&res), "ada");
  }
}
