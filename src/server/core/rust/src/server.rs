/* src/server/core/rust/src/server.rs */

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::assets::AssetsManifest;
use crate::entry::{EntryServer, JsonDocumentRenderer};
use crate::errors::RidgeError;
use crate::module::RouteModule;
use crate::route::{RouteDef, RouteGraph, RouteLike};

/// A route definition bound to its loaded module.
#[derive(Debug)]
pub struct ServerRoute {
  pub def: RouteDef,
  pub module: RouteModule,
}

impl RouteLike for ServerRoute {
  fn def(&self) -> &RouteDef {
    &self.def
  }
}

/// Everything the request handler needs from one compiled build. Immutable;
/// a rebuild produces a new value that replaces this one wholesale.
pub struct ServerBuild {
  pub routes: RouteGraph<ServerRoute>,
  pub assets: AssetsManifest,
  pub entry: Arc<dyn EntryServer>,
}

impl ServerBuild {
  pub fn builder() -> ServerBuildBuilder {
    ServerBuildBuilder::new()
  }
}

pub struct ServerBuildBuilder {
  assets: AssetsManifest,
  modules: HashMap<String, RouteModule>,
  routes: Vec<ServerRoute>,
  entry: Option<Arc<dyn EntryServer>>,
}

impl ServerBuildBuilder {
  pub fn new() -> Self {
    Self { assets: AssetsManifest::default(), modules: HashMap::new(), routes: Vec::new(), entry: None }
  }

  /// Routes listed in the manifest are declared in route-id order, ahead of
  /// any routes added with [`route`](Self::route).
  pub fn assets(mut self, assets: AssetsManifest) -> Self {
    self.assets = assets;
    self
  }

  /// Module for a route declared by the assets manifest.
  pub fn module(mut self, id: impl Into<String>, module: RouteModule) -> Self {
    self.modules.insert(id.into(), module);
    self
  }

  /// A route that is not part of the assets manifest.
  pub fn route(mut self, def: RouteDef, module: RouteModule) -> Self {
    self.routes.push(ServerRoute { def, module });
    self
  }

  pub fn entry(mut self, entry: Arc<dyn EntryServer>) -> Self {
    self.entry = Some(entry);
    self
  }

  pub fn build(self) -> Result<ServerBuild, RidgeError> {
    let mut modules = self.modules;
    let mut routes = Vec::with_capacity(self.assets.routes.len() + self.routes.len());

    for (id, manifest_route) in &self.assets.routes {
      let module = modules.remove(id).ok_or_else(|| {
        RidgeError::invalid_manifest(format!("no module registered for route \"{id}\""))
      })?;
      if manifest_route.has_loader != module.loader.is_some()
        || manifest_route.has_action != module.action.is_some()
      {
        warn!(route = %id, "route module exports disagree with the assets manifest");
      }
      routes.push(ServerRoute { def: manifest_route.to_def(), module });
    }

    if let Some(id) = modules.keys().next() {
      return Err(RidgeError::invalid_manifest(format!(
        "module registered for route \"{id}\" which is not in the assets manifest"
      )));
    }

    routes.extend(self.routes);
    let entry = self.entry.unwrap_or_else(|| Arc::new(JsonDocumentRenderer));
    Ok(ServerBuild { routes: RouteGraph::new(routes)?, assets: self.assets, entry })
  }
}

impl Default for ServerBuildBuilder {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assets::ManifestRoute;

  fn manifest_route(id: &str, parent: Option<&str>, path: Option<&str>) -> ManifestRoute {
    ManifestRoute {
      id: id.to_string(),
      parent_id: parent.map(str::to_string),
      path: path.map(str::to_string),
      index: None,
      case_sensitive: None,
      module: format!("/build/{id}.js"),
      imports: Vec::new(),
      has_loader: false,
      has_action: false,
      has_catch_boundary: false,
      has_error_boundary: false,
    }
  }

  fn manifest() -> AssetsManifest {
    let mut assets = AssetsManifest::default();
    for route in [
      manifest_route("routes/b", Some("root"), Some("b")),
      manifest_route("root", None, Some("")),
      manifest_route("routes/a", Some("root"), Some("a")),
    ] {
      assets.routes.insert(route.id.clone(), route);
    }
    assets
  }

  #[test]
  fn manifest_routes_declared_in_id_order() {
    let build = ServerBuild::builder()
      .assets(manifest())
      .module("root", RouteModule::new().component())
      .module("routes/a", RouteModule::new())
      .module("routes/b", RouteModule::new())
      .build()
      .unwrap();
    let ids: Vec<&str> = build.routes.iter().map(|r| r.id()).collect();
    assert_eq!(ids, ["root", "routes/a", "routes/b"]);
  }

  #[test]
  fn missing_module_is_rejected() {
    let err = ServerBuild::builder()
      .assets(manifest())
      .module("root", RouteModule::new())
      .build()
      .err()
      .unwrap();
    assert_eq!(err.code(), "INVALID_MANIFEST");
  }

  #[test]
  fn stray_module_is_rejected() {
    let err = ServerBuild::builder().module("ghost", RouteModule::new()).build().err().unwrap();
    assert!(err.message().contains("ghost"));
  }
}
