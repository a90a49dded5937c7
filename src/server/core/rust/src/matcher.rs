/* src/server/core/rust/src/matcher.rs */

// Nested route matching: flatten the forest into ranked root-to-leaf branches,
// then walk them in rank order until one consumes the whole pathname.

use std::collections::HashMap;
use std::sync::Arc;

use percent_encoding::percent_decode_str;

use crate::route::RouteLike;

const STATIC_SEGMENT_VALUE: i32 = 10;
const DYNAMIC_SEGMENT_VALUE: i32 = 3;
const INDEX_ROUTE_VALUE: i32 = 2;
const EMPTY_SEGMENT_VALUE: i32 = 1;
const SPLAT_PENALTY: i32 = -2;

/// One matched route in a chain. `params` holds every parameter captured by
/// this route and its ancestors.
#[derive(Debug)]
pub struct RouteMatch<R> {
  pub route: Arc<R>,
  pub params: HashMap<String, String>,
  pub pathname: String,
}

impl<R> Clone for RouteMatch<R> {
  fn clone(&self) -> Self {
    Self { route: self.route.clone(), params: self.params.clone(), pathname: self.pathname.clone() }
  }
}

/// A matchable chain of route indices, root first.
#[derive(Debug, Clone)]
pub(crate) struct Branch {
  pub(crate) path: String,
  pub(crate) score: i32,
  pub(crate) chain: Vec<usize>,
}

pub(crate) fn flatten_branches<R: RouteLike>(routes: &[Arc<R>]) -> Vec<Branch> {
  let mut branches = Vec::new();
  let mut chain = Vec::new();
  for (i, route) in routes.iter().enumerate() {
    if route.def().parent_id.is_none() {
      flatten_into(routes, i, &mut chain, "", &mut branches);
    }
  }
  // Stable: equal scores keep flatten (declaration) order.
  branches.sort_by(|a, b| b.score.cmp(&a.score));
  branches
}

fn flatten_into<R: RouteLike>(
  routes: &[Arc<R>],
  idx: usize,
  chain: &mut Vec<usize>,
  parent_path: &str,
  out: &mut Vec<Branch>,
) {
  let def = routes[idx].def();
  let path = join_paths(parent_path, def.path.as_deref().unwrap_or(""));
  chain.push(idx);

  for (child_idx, child) in routes.iter().enumerate() {
    if child.def().parent_id.as_deref() == Some(def.id.as_str()) {
      flatten_into(routes, child_idx, chain, &path, out);
    }
  }

  // Pathless layouts only match through their children.
  if def.path.is_some() || def.index {
    out.push(Branch { score: compute_score(&path, def.index), path, chain: chain.clone() });
  }
  chain.pop();
}

fn join_paths(parent: &str, child: &str) -> String {
  let joined = format!("{parent}/{child}");
  let mut out = String::with_capacity(joined.len());
  let mut prev_slash = false;
  for ch in joined.chars() {
    if ch == '/' && prev_slash {
      continue;
    }
    prev_slash = ch == '/';
    out.push(ch);
  }
  out
}

pub(crate) fn compute_score(path: &str, index: bool) -> i32 {
  let segments: Vec<&str> = path.split('/').collect();
  let mut score = segments.len() as i32;
  if segments.contains(&"*") {
    score += SPLAT_PENALTY;
  }
  if index {
    score += INDEX_ROUTE_VALUE;
  }
  segments.iter().filter(|s| **s != "*").fold(score, |acc, segment| {
    acc
      + if is_param(segment) {
        DYNAMIC_SEGMENT_VALUE
      } else if segment.is_empty() {
        EMPTY_SEGMENT_VALUE
      } else {
        STATIC_SEGMENT_VALUE
      }
  })
}

fn is_param(segment: &str) -> bool {
  segment.strip_prefix(':').is_some_and(|name| {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
  })
}

pub(crate) fn match_branches<R: RouteLike>(
  branches: &[Branch],
  routes: &[Arc<R>],
  pathname: &str,
) -> Option<Vec<RouteMatch<R>>> {
  let segments: Vec<&str> = pathname.split('/').filter(|s| !s.is_empty()).collect();
  branches.iter().find_map(|branch| match_branch(branch, routes, &segments))
}

fn match_branch<R: RouteLike>(
  branch: &Branch,
  routes: &[Arc<R>],
  segments: &[&str],
) -> Option<Vec<RouteMatch<R>>> {
  let mut params = HashMap::new();
  let mut offset = 0;
  let mut matches = Vec::with_capacity(branch.chain.len());
  let last = branch.chain.len() - 1;

  for (k, &idx) in branch.chain.iter().enumerate() {
    let def = routes[idx].def();
    let pattern = def.path.as_deref().unwrap_or("");
    let (captured, consumed) =
      match_segments(pattern, def.case_sensitive, k == last, &segments[offset..])?;
    params.extend(captured);
    offset += consumed;
    matches.push(RouteMatch {
      route: routes[idx].clone(),
      params: params.clone(),
      pathname: format!("/{}", segments[..offset].join("/")),
    });
  }
  Some(matches)
}

/// Match one route pattern against the front of `segments`. `end` requires the
/// pattern to consume every remaining segment. Returns captured params and the
/// number of segments consumed.
fn match_segments(
  pattern: &str,
  case_sensitive: bool,
  end: bool,
  segments: &[&str],
) -> Option<(HashMap<String, String>, usize)> {
  let mut params = HashMap::new();
  let mut i = 0;

  for part in pattern.split('/').filter(|s| !s.is_empty()) {
    if part == "*" {
      params.insert("*".to_string(), decode(&segments[i..].join("/")));
      return Some((params, segments.len()));
    }
    let segment = segments.get(i)?;
    if let Some(name) = part.strip_prefix(':') {
      params.insert(name.to_string(), decode(segment));
    } else if case_sensitive {
      if part != *segment {
        return None;
      }
    } else if !part.eq_ignore_ascii_case(segment) {
      return None;
    }
    i += 1;
  }

  if end && i != segments.len() {
    return None;
  }
  Some((params, i))
}

fn decode(raw: &str) -> String {
  percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::route::tests::def;
  use crate::route::{RouteDef, RouteGraph};

  fn index(id: &str, parent: &str) -> RouteDef {
    RouteDef { index: true, ..def(id, Some(parent), None) }
  }

  fn ids(matches: &[RouteMatch<RouteDef>]) -> Vec<&str> {
    matches.iter().map(|m| m.route.id.as_str()).collect()
  }

  fn graph() -> RouteGraph<RouteDef> {
    RouteGraph::new(vec![
      def("root", None, Some("")),
      index("routes/index", "root"),
      def("routes/users", Some("root"), Some("users")),
      def("routes/users/$id", Some("routes/users"), Some(":id")),
      def("routes/users/new", Some("routes/users"), Some("new")),
      index("routes/users/index", "routes/users"),
      def("routes/__auth", Some("root"), None),
      def("routes/__auth/login", Some("routes/__auth"), Some("login")),
      def("routes/files/$", Some("root"), Some("files/*")),
    ])
    .unwrap()
  }

  #[test]
  fn static_segment_outranks_dynamic() {
    let g = graph();
    let m = g.match_path("/users/new").unwrap();
    assert_eq!(ids(&m), ["root", "routes/users", "routes/users/new"]);
    let m = g.match_path("/users/42").unwrap();
    assert_eq!(ids(&m), ["root", "routes/users", "routes/users/$id"]);
    assert_eq!(m[2].params["id"], "42");
  }

  #[test]
  fn index_route_matches_parent_path() {
    let g = graph();
    assert_eq!(ids(&g.match_path("/").unwrap()), ["root", "routes/index"]);
    assert_eq!(ids(&g.match_path("/users").unwrap()), ["root", "routes/users", "routes/users/index"]);
  }

  #[test]
  fn pathless_layout_stays_in_chain() {
    let g = graph();
    let m = g.match_path("/login").unwrap();
    assert_eq!(ids(&m), ["root", "routes/__auth", "routes/__auth/login"]);
    assert_eq!(m[1].pathname, "/");
    assert_eq!(m[2].pathname, "/login");
  }

  #[test]
  fn splat_captures_rest() {
    let g = graph();
    let m = g.match_path("/files/a/b%20c.txt").unwrap();
    assert_eq!(ids(&m), ["root", "routes/files/$"]);
    assert_eq!(m[1].params["*"], "a/b c.txt");
  }

  #[test]
  fn no_match_returns_none() {
    assert!(graph().match_path("/nope/deeper").is_none());
  }

  #[test]
  fn case_sensitivity_is_per_route() {
    let mut strict = def("routes/About", Some("root"), Some("About"));
    strict.case_sensitive = true;
    let g = RouteGraph::new(vec![def("root", None, Some("")), strict]).unwrap();
    assert!(g.match_path("/About").is_some());
    assert!(g.match_path("/about").is_none());

    let g = RouteGraph::new(vec![def("root", None, Some("")), def("routes/about", Some("root"), Some("About"))])
      .unwrap();
    assert!(g.match_path("/about").is_some());
  }

  #[test]
  fn ties_resolve_by_declaration_order() {
    let g = RouteGraph::new(vec![
      def("root", None, Some("")),
      def("routes/$a", Some("root"), Some(":a")),
      def("routes/$b", Some("root"), Some(":b")),
    ])
    .unwrap();
    for _ in 0..5 {
      assert_eq!(ids(&g.match_path("/x").unwrap()), ["root", "routes/$a"]);
    }
  }

  #[test]
  fn params_accumulate_down_the_chain() {
    let g = RouteGraph::new(vec![
      def("root", None, Some("")),
      def("routes/$org", Some("root"), Some(":org")),
      def("routes/$org/$repo", Some("routes/$org"), Some(":repo")),
    ])
    .unwrap();
    let m = g.match_path("/rust-lang/cargo").unwrap();
    assert_eq!(m[2].params["org"], "rust-lang");
    assert_eq!(m[2].params["repo"], "cargo");
    assert!(!m[1].params.contains_key("repo"));
  }

  #[test]
  fn score_prefers_static_over_dynamic() {
    assert!(compute_score("/users/new", false) > compute_score("/users/:id", false));
    assert!(compute_score("/users/:id", false) > compute_score("/users/*", false));
    assert!(compute_score("/users", true) > compute_score("/users", false));
  }
}
