/* src/server/core/rust/src/route.rs */

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::RidgeError;
use crate::matcher::{self, Branch, RouteMatch};

/// One route definition. Routes form a forest through `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDef {
  pub id: String,
  #[serde(default)]
  pub parent_id: Option<String>,
  /// Relative URL pattern. `None` marks a pathless layout route.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub index: bool,
  #[serde(default)]
  pub case_sensitive: bool,
  /// Route module file, relative to the app directory.
  pub file: String,
}

/// Anything that carries a [`RouteDef`]: the plain definition at build time,
/// or a definition bundled with its module at request time.
pub trait RouteLike {
  fn def(&self) -> &RouteDef;

  fn id(&self) -> &str {
    &self.def().id
  }
}

impl RouteLike for RouteDef {
  fn def(&self) -> &RouteDef {
    self
  }
}

/// Immutable route forest in declaration order, with the ranked branch list
/// used by the matcher computed once up front.
pub struct RouteGraph<R> {
  routes: Vec<Arc<R>>,
  by_id: HashMap<String, usize>,
  branches: Vec<Branch>,
}

impl<R: RouteLike> RouteGraph<R> {
  /// Validate and index `routes`. Rejects duplicate ids, dangling parents and cycles.
  pub fn new(routes: Vec<R>) -> Result<Self, RidgeError> {
    let mut by_id = HashMap::with_capacity(routes.len());
    for (i, route) in routes.iter().enumerate() {
      if by_id.insert(route.id().to_string(), i).is_some() {
        return Err(RidgeError::invalid_routes(format!("duplicate route id \"{}\"", route.id())));
      }
    }

    for route in &routes {
      if let Some(parent) = &route.def().parent_id
        && !by_id.contains_key(parent)
      {
        return Err(RidgeError::invalid_routes(format!(
          "route \"{}\" has unknown parent \"{parent}\"",
          route.id()
        )));
      }
    }

    for route in &routes {
      let mut seen = HashSet::new();
      let mut current = Some(route.def());
      while let Some(def) = current {
        if !seen.insert(def.id.as_str()) {
          return Err(RidgeError::invalid_routes(format!(
            "route \"{}\" is part of a parent cycle",
            route.id()
          )));
        }
        current = def.parent_id.as_ref().and_then(|p| by_id.get(p)).map(|&i| routes[i].def());
      }
    }

    let routes: Vec<Arc<R>> = routes.into_iter().map(Arc::new).collect();
    let branches = matcher::flatten_branches(&routes);
    Ok(Self { routes, by_id, branches })
  }

  pub fn get(&self, id: &str) -> Option<&Arc<R>> {
    self.by_id.get(id).map(|&i| &self.routes[i])
  }

  pub fn iter(&self) -> impl Iterator<Item = &Arc<R>> {
    self.routes.iter()
  }

  pub fn len(&self) -> usize {
    self.routes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.routes.is_empty()
  }

  /// Direct children of `parent` (`None` = top-level routes), in declaration order.
  pub fn children(&self, parent: Option<&str>) -> Vec<&Arc<R>> {
    self.routes.iter().filter(|r| r.def().parent_id.as_deref() == parent).collect()
  }

  /// Ancestor chain of `id`, root first, ending with the route itself.
  pub fn ancestors(&self, id: &str) -> Vec<&Arc<R>> {
    let mut chain = Vec::new();
    let mut current = self.get(id);
    while let Some(route) = current {
      chain.push(route);
      current = route.def().parent_id.as_deref().and_then(|p| self.get(p));
    }
    chain.reverse();
    chain
  }

  /// Match a URL pathname, returning the matched chain root-to-leaf.
  pub fn match_path(&self, pathname: &str) -> Option<Vec<RouteMatch<R>>> {
    matcher::match_branches(&self.branches, &self.routes, pathname)
  }
}
