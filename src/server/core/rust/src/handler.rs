/* src/server/core/rust/src/handler.rs */

// Request entry point shared by every hosting adapter.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, LOCATION, SET_COOKIE};
use http::{Method, StatusCode};
use tokio::task::JoinSet;
use tracing::{debug, error};
use url::form_urlencoded;

use crate::data::{AppLoadResult, RequestSnapshot, call_route_action, call_route_loader};
use crate::entry::{CatchInfo, DocumentContext, ErrorInfo, RenderedMatch};
use crate::errors::RidgeError;
use crate::headers::merge_route_headers;
use crate::matcher::RouteMatch;
use crate::module::{LoadContext, RouteError, RouteModule};
use crate::responses::{self, ERROR_HEADER, REDIRECT_HEADER, ServerRequest, ServerResponse};
use crate::route::RouteLike;
use crate::server::{ServerBuild, ServerRoute};

type Matches = Vec<RouteMatch<ServerRoute>>;

/// Owns the current build. Requests load a snapshot once and use it to the
/// end, so a concurrent [`replace_build`](Self::replace_build) is never seen
/// half-applied.
pub struct RequestHandler {
  build: ArcSwap<ServerBuild>,
}

impl RequestHandler {
  pub fn new(build: ServerBuild) -> Self {
    Self { build: ArcSwap::from_pointee(build) }
  }

  pub fn replace_build(&self, build: ServerBuild) {
    debug!(version = %build.assets.version, routes = build.routes.len(), "replacing server build");
    self.build.store(Arc::new(build));
  }

  pub fn current_build(&self) -> Arc<ServerBuild> {
    self.build.load_full()
  }

  pub async fn handle_request(&self, request: ServerRequest, context: LoadContext) -> ServerResponse {
    let build = self.build.load_full();
    let request = RequestSnapshot::from_request(request);
    let matches = build.routes.match_path(request.uri.path());

    if let Some(route_id) = request.query_param("_data") {
      return handle_data_request(&request, matches, &route_id, context).await;
    }
    handle_document_request(&build, &request, matches, context).await
  }
}

fn is_action_method(method: &Method) -> bool {
  matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

/// `?index` with an empty value addresses the index route instead of its layout.
fn has_index_param(request: &RequestSnapshot) -> bool {
  request
    .uri
    .query()
    .is_some_and(|q| form_urlencoded::parse(q.as_bytes()).any(|(k, v)| k == "index" && v.is_empty()))
}

fn action_target(matches: &Matches, request: &RequestSnapshot) -> usize {
  let leaf = matches.len() - 1;
  if leaf > 0 && matches[leaf].route.def.index && !has_index_param(request) { leaf - 1 } else { leaf }
}

/// Nearest route at or above `from` that satisfies `has_boundary`, else the root.
fn nearest_boundary(matches: &Matches, from: usize, has_boundary: fn(&RouteModule) -> bool) -> usize {
  (0..=from).rev().find(|&i| has_boundary(&matches[i].route.module)).unwrap_or(0)
}

// -- Data requests --

async fn handle_data_request(
  request: &RequestSnapshot,
  matches: Option<Matches>,
  route_id: &str,
  context: LoadContext,
) -> ServerResponse {
  let path = request.uri.path();
  let Some(matches) = matches else {
    return error_data_response(&RidgeError::not_found(format!("No route matches URL \"{path}\"")));
  };
  let Some(m) = matches.iter().find(|m| m.route.id() == route_id) else {
    return error_data_response(&RidgeError::forbidden(format!(
      "Route \"{route_id}\" does not match URL \"{path}\""
    )));
  };

  let result = if is_action_method(&request.method) {
    call_route_action(&m.route, request, m.params.clone(), context).await
  } else {
    call_route_loader(&m.route, request, m.params.clone(), context).await
  };

  match result {
    Ok(AppLoadResult::Value(res) | AppLoadResult::Caught(res)) => res,
    Ok(AppLoadResult::Redirect(res)) => data_redirect(&res),
    Ok(AppLoadResult::Errored(err)) => {
      error_data_response(&RidgeError::internal(err.message().to_string()))
    }
    Err(err) => error_data_response(&err),
  }
}

/// Client navigation cannot follow a redirect on a fetch, so the target travels
/// in a header on a 204.
fn data_redirect(res: &ServerResponse) -> ServerResponse {
  let mut headers = HeaderMap::new();
  if let Some(location) = res.headers().get(LOCATION) {
    headers.insert(REDIRECT_HEADER, location.clone());
  }
  for cookie in res.headers().get_all(SET_COOKIE) {
    headers.append(SET_COOKIE, cookie.clone());
  }
  let mut out = ServerResponse::new(Bytes::new());
  *out.status_mut() = StatusCode::NO_CONTENT;
  *out.headers_mut() = headers;
  out
}

fn error_data_response(err: &RidgeError) -> ServerResponse {
  let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
  let mut headers = HeaderMap::new();
  headers.insert(ERROR_HEADER, HeaderValue::from_static("yes"));
  responses::json_with(&serde_json::json!({ "message": err.message() }), status, headers)
}

// -- Document requests --

async fn handle_document_request(
  build: &ServerBuild,
  request: &RequestSnapshot,
  matches: Option<Matches>,
  context: LoadContext,
) -> ServerResponse {
  let user_request = request.to_user_request();
  let Some(matches) = matches.filter(|m| !m.is_empty()) else {
    return render_not_found(build, &user_request);
  };

  let is_action = is_action_method(&request.method);
  let leaf = &matches[matches.len() - 1];
  if !is_action && leaf.route.module.loader.is_none() && !leaf.route.module.has_component {
    return RidgeError::bad_request(format!(
      "You made a {} request to {} but did not provide a default component or `loader` for route \"{}\", so there is no way to handle the request.",
      request.method,
      request.uri,
      leaf.route.id()
    ))
    .into_response();
  }

  let mut action_response: Option<ServerResponse> = None;
  let mut catch: Option<(usize, ServerResponse)> = None;
  let mut failure: Option<(usize, RouteError)> = None;

  // The action completes before any loader starts.
  if is_action {
    let target = action_target(&matches, request);
    let m = &matches[target];
    match call_route_action(&m.route, request, m.params.clone(), context.clone()).await {
      Ok(AppLoadResult::Value(res)) => action_response = Some(res),
      Ok(AppLoadResult::Redirect(res)) => return res,
      Ok(AppLoadResult::Caught(res)) => catch = Some((target, res)),
      Ok(AppLoadResult::Errored(err)) => failure = Some((target, err)),
      Err(err) => failure = Some((target, RouteError::new(err.message()))),
    }
  }

  let load_until = render_end(&matches, catch.as_ref().map(|c| c.0), failure.as_ref().map(|f| f.0));
  let mut results = run_loaders(&matches[..load_until], request, &context).await;

  let mut loader_responses = HashMap::new();
  let mut loader_data = BTreeMap::new();
  for (i, m) in matches[..load_until].iter().enumerate() {
    let id = m.route.id().to_string();
    let Some(result) = results.remove(&id) else { continue };
    match result {
      AppLoadResult::Redirect(res) => return res,
      AppLoadResult::Value(res) => {
        loader_data.insert(id.clone(), responses::extract_data(&res));
        loader_responses.insert(id, res);
      }
      AppLoadResult::Caught(res) => {
        if catch.is_none() {
          catch = Some((i, responses::clone_response(&res)));
        }
        loader_responses.insert(id, res);
      }
      AppLoadResult::Errored(err) => {
        if failure.is_none() {
          failure = Some((i, err));
        }
      }
    }
  }

  let end = render_end(&matches, catch.as_ref().map(|c| c.0), failure.as_ref().map(|f| f.0));
  let rendered = &matches[..end];
  loader_data.retain(|id, _| rendered.iter().any(|m| m.route.id() == id));

  let status = document_status(rendered, &catch, &failure, action_response.as_ref(), &loader_responses);
  let headers = merge_route_headers(rendered, &loader_responses, action_response.as_ref());

  let document = DocumentContext {
    version: build.assets.version.clone(),
    matches: rendered.iter().map(rendered_match).collect(),
    loader_data,
    action_data: action_response.as_ref().map(responses::extract_data),
    catch: catch.as_ref().map(|(i, res)| CatchInfo {
      status: res.status().as_u16(),
      data: responses::extract_data(res),
      boundary_id: matches[nearest_boundary(&matches, *i, |m| m.has_catch_boundary)]
        .route
        .id()
        .to_string(),
    }),
    error: failure.as_ref().map(|(i, err)| ErrorInfo {
      message: err.message().to_string(),
      boundary_id: matches[nearest_boundary(&matches, *i, |m| m.has_error_boundary)]
        .route
        .id()
        .to_string(),
    }),
  };
  build.entry.render(&user_request, status, headers, &document)
}

/// Exclusive end of the rendered chain: everything below the shallowest
/// active boundary is dropped.
fn render_end(matches: &Matches, catch_at: Option<usize>, error_at: Option<usize>) -> usize {
  let catch_boundary = catch_at.map(|i| nearest_boundary(matches, i, |m| m.has_catch_boundary));
  let error_boundary = error_at.map(|i| nearest_boundary(matches, i, |m| m.has_error_boundary));
  [catch_boundary, error_boundary].into_iter().flatten().min().map_or(matches.len(), |b| b + 1)
}

/// Run every loader in `matches` concurrently. Results are keyed by route id;
/// completion order carries no meaning.
async fn run_loaders(
  matches: &[RouteMatch<ServerRoute>],
  request: &RequestSnapshot,
  context: &LoadContext,
) -> HashMap<String, AppLoadResult> {
  let mut set = JoinSet::new();
  let mut pending = Vec::new();
  for m in matches.iter().filter(|m| m.route.module.loader.is_some()) {
    let route = m.route.clone();
    let params = m.params.clone();
    let request = request.clone();
    let context = context.clone();
    pending.push(route.id().to_string());
    set.spawn(async move {
      let result = call_route_loader(&route, &request, params, context).await;
      (route.def.id.clone(), result)
    });
  }

  let mut results = HashMap::with_capacity(pending.len());
  while let Some(joined) = set.join_next().await {
    match joined {
      Ok((id, Ok(result))) => {
        results.insert(id, result);
      }
      Ok((id, Err(err))) => {
        results.insert(id, AppLoadResult::Errored(RouteError::new(err.message())));
      }
      Err(err) => error!("loader task failed: {err}"),
    }
  }
  for id in pending {
    results.entry(id).or_insert_with_key(|id| {
      AppLoadResult::Errored(RouteError::new(format!("loader for route \"{id}\" panicked")))
    });
  }
  results
}

/// Error beats catch; otherwise the first non-200 of the action response and
/// then the loader responses in chain order.
fn document_status(
  rendered: &[RouteMatch<ServerRoute>],
  catch: &Option<(usize, ServerResponse)>,
  failure: &Option<(usize, RouteError)>,
  action_response: Option<&ServerResponse>,
  loader_responses: &HashMap<String, ServerResponse>,
) -> StatusCode {
  if failure.is_some() {
    return StatusCode::INTERNAL_SERVER_ERROR;
  }
  if let Some((_, res)) = catch {
    return res.status();
  }
  action_response
    .map(|r| r.status())
    .filter(|s| *s != StatusCode::OK)
    .or_else(|| {
      rendered
        .iter()
        .filter_map(|m| loader_responses.get(m.route.id()))
        .map(|r| r.status())
        .find(|s| *s != StatusCode::OK)
    })
    .unwrap_or(StatusCode::OK)
}

fn rendered_match(m: &RouteMatch<ServerRoute>) -> RenderedMatch {
  RenderedMatch { id: m.route.id().to_string(), pathname: m.pathname.clone(), params: m.params.clone() }
}

/// No route matched: the root catch boundary renders a 404.
fn render_not_found(build: &ServerBuild, request: &ServerRequest) -> ServerResponse {
  let Some(root) = build.routes.children(None).into_iter().next() else {
    return RidgeError::not_found(format!("No route matches URL \"{}\"", request.uri().path()))
      .into_response();
  };
  let document = DocumentContext {
    version: build.assets.version.clone(),
    matches: vec![RenderedMatch {
      id: root.id().to_string(),
      pathname: "/".to_string(),
      params: HashMap::new(),
    }],
    catch: Some(CatchInfo {
      status: StatusCode::NOT_FOUND.as_u16(),
      data: serde_json::Value::Null,
      boundary_id: root.id().to_string(),
    }),
    ..DocumentContext::default()
  };
  build.entry.render(request, StatusCode::NOT_FOUND, HeaderMap::new(), &document)
}
