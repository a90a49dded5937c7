/* src/cli/core/src/routes.rs */

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use ridge_compiler::read_config;
use ridge_server::RouteDef;

use crate::ui;

/// URL pattern of `route` given its parent's full pattern.
fn full_pattern(parent: &str, route: &RouteDef) -> String {
  match route.path.as_deref() {
    None | Some("") => parent.to_string(),
    Some(path) if path.starts_with('/') => path.to_string(),
    Some(path) => format!("{}/{path}", parent.trim_end_matches('/')),
  }
}

fn render_children(out: &mut String, routes: &[RouteDef], parent: Option<&str>, prefix: &str, depth: usize) {
  for route in routes.iter().filter(|r| r.parent_id.as_deref() == parent) {
    let pattern = full_pattern(prefix, route);
    let kind = match (route.index, route.path.is_none()) {
      (true, _) => " (index)",
      (false, true) => " (layout)",
      (false, false) => "",
    };
    let _ = writeln!(out, "{}{}  {pattern}{kind}  {}", "  ".repeat(depth), route.id, route.file);
    render_children(out, routes, Some(&route.id), &pattern, depth + 1);
  }
}

/// Indented route tree in declaration order, one line per route:
/// `id  /full/pattern  file`.
pub fn render_route_tree(routes: &[RouteDef]) -> String {
  let mut out = String::new();
  render_children(&mut out, routes, None, "/", 0);
  out
}

pub fn run_routes(root: &Path, json: bool) -> Result<()> {
  let config = read_config(root).with_context(|| format!("failed to read project at {}", root.display()))?;
  if json {
    let text = serde_json::to_string_pretty(&config.routes).context("failed to serialize routes")?;
    ui::plain(&text);
  } else {
    ui::plain(render_route_tree(&config.routes).trim_end());
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn route(id: &str, parent: Option<&str>, path: Option<&str>, index: bool, file: &str) -> RouteDef {
    RouteDef {
      id: id.into(),
      parent_id: parent.map(Into::into),
      path: path.map(Into::into),
      index,
      case_sensitive: false,
      file: file.into(),
    }
  }

  #[test]
  fn tree_nests_children_under_parents() {
    let routes = vec![
      route("root", None, Some(""), false, "root.jsx"),
      route("routes/__auth", Some("root"), None, false, "routes/__auth.jsx"),
      route("routes/__auth/login", Some("routes/__auth"), Some("login"), false, "routes/__auth/login.jsx"),
      route("routes/index", Some("root"), None, true, "routes/index.jsx"),
      route("routes/users", Some("root"), Some("users"), false, "routes/users.jsx"),
      route("routes/users/$id", Some("routes/users"), Some(":id"), false, "routes/users/$id.jsx"),
    ];
    let tree = render_route_tree(&routes);
    let lines: Vec<&str> = tree.lines().collect();
    assert_eq!(
      lines,
      vec![
        "root  /  root.jsx",
        "  routes/__auth  / (layout)  routes/__auth.jsx",
        "    routes/__auth/login  /login  routes/__auth/login.jsx",
        "  routes/index  / (index)  routes/index.jsx",
        "  routes/users  /users  routes/users.jsx",
        "    routes/users/$id  /users/:id  routes/users/$id.jsx",
      ]
    );
  }

  #[test]
  fn json_uses_camel_case_keys() {
    let json = serde_json::to_value(vec![route("routes/a", Some("root"), Some("a"), false, "routes/a.jsx")]).unwrap();
    assert_eq!(json[0]["parentId"], "root");
    assert_eq!(json[0]["caseSensitive"], false);
  }
}
