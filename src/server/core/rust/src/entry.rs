/* src/server/core/rust/src/entry.rs */

// Document rendering hook. The UI layer plugs in here; the core only hands it
// the data it gathered.

use std::collections::{BTreeMap, HashMap};

use http::{HeaderMap, StatusCode};
use serde::Serialize;

use crate::responses::{self, ServerRequest, ServerResponse};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedMatch {
  pub id: String,
  pub pathname: String,
  pub params: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatchInfo {
  pub status: u16,
  pub data: serde_json::Value,
  /// Route whose catch boundary renders the response.
  pub boundary_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
  pub message: String,
  pub boundary_id: String,
}

/// Everything gathered for one document request. `matches` stops at the
/// rendering boundary; routes below it are not part of the render.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentContext {
  pub version: String,
  pub matches: Vec<RenderedMatch>,
  pub loader_data: BTreeMap<String, serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub action_data: Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub catch: Option<CatchInfo>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<ErrorInfo>,
}

impl DocumentContext {
  pub fn route_ids(&self) -> Vec<&str> {
    self.matches.iter().map(|m| m.id.as_str()).collect()
  }
}

pub trait EntryServer: Send + Sync {
  fn render(
    &self,
    request: &ServerRequest,
    status: StatusCode,
    headers: HeaderMap,
    context: &DocumentContext,
  ) -> ServerResponse;
}

/// Renders the document context itself as JSON. Useful for headless hosts
/// and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDocumentRenderer;

impl EntryServer for JsonDocumentRenderer {
  fn render(
    &self,
    _request: &ServerRequest,
    status: StatusCode,
    headers: HeaderMap,
    context: &DocumentContext,
  ) -> ServerResponse {
    let value = serde_json::to_value(context).unwrap_or(serde_json::Value::Null);
    responses::json_with(&value, status, headers)
  }
}
