/* src/server/core/rust/src/lib.rs */

pub mod assets;
pub mod data;
pub mod entry;
pub mod errors;
pub mod handler;
pub mod headers;
pub mod matcher;
pub mod module;
pub mod responses;
pub mod route;
pub mod server;

// Re-exports for ergonomic use
pub use assets::{AssetsManifest, EntryAssets, ManifestRoute, load_assets_manifest};
pub use data::{
  AppLoadResult, DataFunctionKind, RequestSnapshot, call_route_action, call_route_loader,
  strip_internal_params,
};
pub use entry::{CatchInfo, DocumentContext, EntryServer, ErrorInfo, JsonDocumentRenderer, RenderedMatch};
pub use errors::RidgeError;
pub use handler::RequestHandler;
pub use headers::{merge_route_headers, split_cookies_string};
pub use matcher::RouteMatch;
pub use module::{
  BoxFuture, DataFn, DataFunctionArgs, DataValue, HeadersArgs, HeadersExport, HeadersFn,
  LoadContext, RouteError, RouteModule, Thrown,
};
pub use responses::{
  CATCH_HEADER, ERROR_HEADER, REDIRECT_HEADER, ServerRequest, ServerResponse, extract_data,
  is_catch_response, is_redirect_response, json, json_with, redirect, redirect_with,
};
pub use route::{RouteDef, RouteGraph, RouteLike};
pub use server::{ServerBuild, ServerBuildBuilder, ServerRoute};
