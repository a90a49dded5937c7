/* src/server/core/rust/src/module.rs */

// The server-side view of a route module: optional loader, action and headers
// exports plus flags for what the UI layer renders.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::HeaderMap;

use crate::responses::{ServerRequest, ServerResponse};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Host-supplied value handed to every loader and action of a request.
pub type LoadContext = Arc<dyn Any + Send + Sync>;

/// Context for a loader or action call. `request` already has the internal
/// `_data` and empty `index` query parameters stripped.
pub struct DataFunctionArgs {
  pub request: ServerRequest,
  pub params: HashMap<String, String>,
  pub context: LoadContext,
}

impl DataFunctionArgs {
  pub fn context<T: Any + Send + Sync>(&self) -> Option<&T> {
    self.context.downcast_ref::<T>()
  }
}

/// What a loader or action returned.
pub enum DataValue {
  Json(serde_json::Value),
  Response(ServerResponse),
  /// The function completed without producing a value. Always a bug in the
  /// route module; `Json(Value::Null)` is the explicit "nothing".
  Undefined,
}

impl From<serde_json::Value> for DataValue {
  fn from(value: serde_json::Value) -> Self {
    Self::Json(value)
  }
}

impl From<ServerResponse> for DataValue {
  fn from(res: ServerResponse) -> Self {
    Self::Response(res)
  }
}

/// Unexpected failure inside user route code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteError {
  message: String,
}

impl RouteError {
  pub fn new(message: impl Into<String>) -> Self {
    Self { message: message.into() }
  }

  pub fn message(&self) -> &str {
    &self.message
  }
}

impl fmt::Display for RouteError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.message)
  }
}

impl std::error::Error for RouteError {}

/// Early exit from a loader or action. A response short-circuits to the
/// nearest catch boundary (or is followed, for redirects); an error goes to
/// the nearest error boundary.
pub enum Thrown {
  Response(ServerResponse),
  Error(RouteError),
}

impl Thrown {
  pub fn error(message: impl Into<String>) -> Self {
    Self::Error(RouteError::new(message))
  }
}

impl From<ServerResponse> for Thrown {
  fn from(res: ServerResponse) -> Self {
    Self::Response(res)
  }
}

impl From<RouteError> for Thrown {
  fn from(err: RouteError) -> Self {
    Self::Error(err)
  }
}

pub type DataFn = Arc<dyn Fn(DataFunctionArgs) -> BoxFuture<Result<DataValue, Thrown>> + Send + Sync>;

/// Inputs of a route's headers function.
pub struct HeadersArgs<'a> {
  pub loader_headers: &'a HeaderMap,
  pub parent_headers: &'a HeaderMap,
  pub action_headers: &'a HeaderMap,
}

pub type HeadersFn = Arc<dyn Fn(&HeadersArgs<'_>) -> HeaderMap + Send + Sync>;

#[derive(Clone)]
pub enum HeadersExport {
  Function(HeadersFn),
  Static(HeaderMap),
}

#[derive(Clone, Default)]
pub struct RouteModule {
  pub loader: Option<DataFn>,
  pub action: Option<DataFn>,
  pub headers: Option<HeadersExport>,
  pub has_component: bool,
  pub has_catch_boundary: bool,
  pub has_error_boundary: bool,
  pub handle: Option<serde_json::Value>,
}

impl RouteModule {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn loader<F, Fut>(mut self, f: F) -> Self
  where
    F: Fn(DataFunctionArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<DataValue, Thrown>> + Send + 'static,
  {
    self.loader = Some(box_data_fn(f));
    self
  }

  pub fn action<F, Fut>(mut self, f: F) -> Self
  where
    F: Fn(DataFunctionArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<DataValue, Thrown>> + Send + 'static,
  {
    self.action = Some(box_data_fn(f));
    self
  }

  pub fn headers<F>(mut self, f: F) -> Self
  where
    F: Fn(&HeadersArgs<'_>) -> HeaderMap + Send + Sync + 'static,
  {
    self.headers = Some(HeadersExport::Function(Arc::new(f)));
    self
  }

  pub fn static_headers(mut self, headers: HeaderMap) -> Self {
    self.headers = Some(HeadersExport::Static(headers));
    self
  }

  pub fn component(mut self) -> Self {
    self.has_component = true;
    self
  }

  pub fn catch_boundary(mut self) -> Self {
    self.has_catch_boundary = true;
    self
  }

  pub fn error_boundary(mut self) -> Self {
    self.has_error_boundary = true;
    self
  }

  pub fn handle(mut self, handle: serde_json::Value) -> Self {
    self.handle = Some(handle);
    self
  }
}

fn box_data_fn<F, Fut>(f: F) -> DataFn
where
  F: Fn(DataFunctionArgs) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<DataValue, Thrown>> + Send + 'static,
{
  Arc::new(move |args| Box::pin(f(args)))
}

impl fmt::Debug for RouteModule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RouteModule")
      .field("loader", &self.loader.is_some())
      .field("action", &self.action.is_some())
      .field("headers", &self.headers.is_some())
      .field("has_component", &self.has_component)
      .field("has_catch_boundary", &self.has_catch_boundary)
      .field("has_error_boundary", &self.has_error_boundary)
      .finish()
  }
}
