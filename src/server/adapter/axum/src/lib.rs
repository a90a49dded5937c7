/* src/server/adapter/axum/src/lib.rs */

mod error;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::header::CONTENT_LENGTH;
use axum::http::request::Parts;
use axum::response::Response;
use http_body_util::LengthLimitError;
use ridge_server::{LoadContext, RequestHandler, RidgeError, ServerRequest};
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::error::AxumError;

/// Re-export ridge-server core for convenience
pub use ridge_server;

/// Largest request body read before the handler runs, matching axum's default limit.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

type ContextFn = Arc<dyn Fn(&Parts) -> LoadContext + Send + Sync>;

/// Hosts a [`RequestHandler`] on axum. Every request that no other route
/// claims goes to `handle_request`; the browser build is served as static
/// files under its public path.
pub struct RidgeRouter {
  handler: Arc<RequestHandler>,
  static_files: Option<(String, PathBuf)>,
  context: ContextFn,
  body_limit: usize,
}

impl RidgeRouter {
  pub fn new(handler: Arc<RequestHandler>) -> Self {
    Self {
      handler,
      static_files: None,
      context: Arc::new(empty_context),
      body_limit: DEFAULT_BODY_LIMIT,
    }
  }

  /// Serve `dir` at `public_path` (e.g. `/build/`).
  pub fn static_files(mut self, public_path: &str, dir: impl Into<PathBuf>) -> Self {
    self.static_files = Some((public_path.trim_end_matches('/').to_string(), dir.into()));
    self
  }

  /// Builds the load context handed to every loader and action of a request.
  pub fn load_context<F>(mut self, f: F) -> Self
  where
    F: Fn(&Parts) -> LoadContext + Send + Sync + 'static,
  {
    self.context = Arc::new(f);
    self
  }

  pub fn body_limit(mut self, limit: usize) -> Self {
    self.body_limit = limit;
    self
  }
}

fn empty_context(_: &Parts) -> LoadContext {
  Arc::new(())
}

fn payload_too_large() -> RidgeError {
  RidgeError::new("PAYLOAD_TOO_LARGE", "request body exceeds the configured limit", 413)
}

fn is_length_limit(err: &axum::Error) -> bool {
  let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
  while let Some(e) = source {
    if e.is::<LengthLimitError>() {
      return true;
    }
    source = e.source();
  }
  false
}

struct AdapterState {
  handler: Arc<RequestHandler>,
  context: ContextFn,
  body_limit: usize,
}

async fn handle(State(state): State<Arc<AdapterState>>, request: Request) -> Result<Response, AxumError> {
  let (parts, body) = request.into_parts();
  let declared = parts
    .headers
    .get(CONTENT_LENGTH)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.parse::<usize>().ok());
  if declared.is_some_and(|len| len > state.body_limit) {
    return Err(payload_too_large().into());
  }
  let bytes = to_bytes(body, state.body_limit).await.map_err(|e| {
    // chunked bodies only hit the limit while streaming
    if is_length_limit(&e) {
      payload_too_large()
    } else {
      RidgeError::bad_request(format!("failed to read request body: {e}"))
    }
  })?;

  let context = (state.context)(&parts);
  let response = state.handler.handle_request(ServerRequest::from_parts(parts, bytes), context).await;
  Ok(response.map(Body::from))
}

/// Extension trait that converts a ridge host into an Axum router.
pub trait IntoAxumRouter {
  fn into_axum_router(self) -> Router;
  fn serve(
    self,
    addr: &str,
  ) -> impl std::future::Future<Output = Result<(), Box<dyn std::error::Error>>> + Send;
}

impl IntoAxumRouter for RidgeRouter {
  fn into_axum_router(self) -> Router {
    let state =
      Arc::new(AdapterState { handler: self.handler, context: self.context, body_limit: self.body_limit });
    let mut router = Router::new();
    match self.static_files {
      // axum refuses to nest at the root
      Some((mount, _)) if mount.is_empty() => {
        warn!("static files cannot be mounted at the root path, skipping");
      }
      Some((mount, dir)) => router = router.nest_service(&mount, ServeDir::new(dir)),
      None => {}
    }
    router.fallback(handle).with_state(state)
  }

  async fn serve(self, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let router = self.into_axum_router();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "ridge server listening");
    axum::serve(listener, router).await?;
    Ok(())
  }
}

impl IntoAxumRouter for Arc<RequestHandler> {
  fn into_axum_router(self) -> Router {
    RidgeRouter::new(self).into_axum_router()
  }

  async fn serve(self, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    RidgeRouter::new(self).serve(addr).await
  }
}

#[cfg(test)]
mod tests {
  use axum::http::{Method, StatusCode};
  use http_body_util::BodyExt;
  use ridge_server::{DataFunctionArgs, DataValue, RouteDef, RouteModule, ServerBuild};
  use serde_json::{Value, json};
  use tower::ServiceExt;

  use super::*;

  fn def(id: &str, parent: Option<&str>, path: Option<&str>) -> RouteDef {
    RouteDef {
      id: id.into(),
      parent_id: parent.map(Into::into),
      path: path.map(Into::into),
      index: false,
      case_sensitive: false,
      file: format!("{id}.jsx"),
    }
  }

  fn handler() -> Arc<RequestHandler> {
    let build = ServerBuild::builder()
      .route(
        def("root", None, Some("")),
        RouteModule::new().component().loader(|args: DataFunctionArgs| async move {
          let user = args.context::<String>().cloned().unwrap_or_default();
          Ok(DataValue::Json(json!({ "user": user })))
        }),
      )
      .route(
        def("routes/echo", Some("root"), Some("echo")),
        RouteModule::new().component().action(|args: DataFunctionArgs| async move {
          let text = String::from_utf8_lossy(args.request.body()).into_owned();
          Ok(DataValue::Json(json!(text)))
        }),
      )
      .build()
      .unwrap();
    Arc::new(RequestHandler::new(build))
  }

  fn request(method: Method, uri: &str, body: &str) -> Request {
    Request::builder().method(method).uri(uri).body(Body::from(body.to_string())).unwrap()
  }

  async fn json_body(res: Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
  }

  #[tokio::test]
  async fn data_requests_reach_the_handler_with_context() {
    let router = RidgeRouter::new(handler())
      .load_context(|parts: &Parts| Arc::new(parts.uri.path().to_string()) as LoadContext)
      .into_axum_router();
    let res = router.oneshot(request(Method::GET, "/?_data=root", "")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await, json!({ "user": "/" }));
  }

  #[tokio::test]
  async fn request_bodies_are_forwarded_to_actions() {
    let router = handler().into_axum_router();
    let res = router.oneshot(request(Method::POST, "/echo?_data=routes%2Fecho", "hello")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await, json!("hello"));
  }

  #[tokio::test]
  async fn oversized_bodies_are_rejected() {
    let router = RidgeRouter::new(handler()).body_limit(4).into_axum_router();
    let mut req = request(Method::POST, "/echo?_data=routes%2Fecho", "too long");
    req.headers_mut().insert(CONTENT_LENGTH, "8".parse().unwrap());
    let res = router.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(res).await["error"]["code"], "PAYLOAD_TOO_LARGE");
  }

  #[tokio::test]
  async fn oversized_bodies_without_length_are_rejected() {
    let router = RidgeRouter::new(handler()).body_limit(4).into_axum_router();
    let req = request(Method::POST, "/echo?_data=routes%2Fecho", "too long");
    assert!(req.headers().get(CONTENT_LENGTH).is_none());
    let res = router.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(res).await["error"]["code"], "PAYLOAD_TOO_LARGE");
  }

  #[tokio::test]
  async fn unmatched_paths_are_not_found() {
    let router = handler().into_axum_router();
    let res = router.oneshot(request(Method::GET, "/nowhere?_data=root", "")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn browser_build_is_served_under_the_public_path() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("entry.client-ABC123.js"), "console.log(1)").unwrap();
    let router = RidgeRouter::new(handler()).static_files("/build/", tmp.path()).into_axum_router();

    let res = router.clone().oneshot(request(Method::GET, "/build/entry.client-ABC123.js", "")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"console.log(1)");

    let res = router.oneshot(request(Method::GET, "/?_data=root", "")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
  }
}
