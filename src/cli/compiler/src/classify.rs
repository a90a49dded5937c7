/* src/cli/compiler/src/classify.rs */

use std::collections::HashSet;
use std::path::Path;

use crate::scan::{ImportedName, ScanOptions, StatementKind, SyntaxError, scan_module};

/// Suffix marking the browser view of a route module.
pub const BROWSER_VIEW_SUFFIX: &str = "?browser";

/// Route exports that may reach the browser bundle.
pub const BROWSER_SAFE_EXPORTS: [&str; 6] =
  ["default", "meta", "links", "handle", "ErrorBoundary", "CatchBoundary"];

/// Route exports that only ever run on the server. They are dropped from the
/// browser view even when another statement mentions the same name.
pub const SERVER_ONLY_EXPORTS: [&str; 3] = ["loader", "action", "headers"];

/// Source synthesized for whitespace-only modules. A bare empty file would be
/// treated as CommonJS and gain a `default` export.
pub const EMPTY_MODULE: &str = "export {};\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderKind {
  Js,
  Jsx,
  Ts,
  Tsx,
  Json,
  Css,
  Text,
  /// `.md`/`.mdx`, compiled to a JSX module before scanning.
  Markdown,
  File,
}

impl LoaderKind {
  pub fn from_path(path: &Path) -> Self {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    match ext.to_ascii_lowercase().as_str() {
      "js" | "mjs" | "cjs" => Self::Js,
      "jsx" => Self::Jsx,
      "ts" | "mts" | "cts" => Self::Ts,
      "tsx" => Self::Tsx,
      "json" => Self::Json,
      "css" => Self::Css,
      "txt" => Self::Text,
      "md" | "mdx" => Self::Markdown,
      _ => Self::File,
    }
  }

  pub fn is_script(self) -> bool {
    matches!(self, Self::Js | Self::Jsx | Self::Ts | Self::Tsx)
  }

  /// Assets are emitted as separate hashed files; their module value is the URL.
  pub fn is_asset(self) -> bool {
    matches!(self, Self::Css | Self::File)
  }

  pub fn scan_options(self) -> ScanOptions {
    ScanOptions {
      jsx: matches!(self, Self::Js | Self::Jsx | Self::Tsx | Self::Markdown),
      typescript: matches!(self, Self::Ts | Self::Tsx),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualKind {
  /// A route file restricted to its browser-safe exports.
  RouteBrowserView,
  /// A whitespace-only script, compiled as `export {}`.
  EmptyModule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
  pub loader: LoaderKind,
  pub is_virtual: bool,
  pub virtual_kind: Option<VirtualKind>,
}

/// Pick the loader for `path` and decide whether it is a synthetic module.
/// `contents` is only consulted for the empty-module check.
pub fn classify(path: &str, contents: Option<&str>) -> Classification {
  let (file, browser_view) = match path.strip_suffix(BROWSER_VIEW_SUFFIX) {
    Some(file) => (file, true),
    None => (path, false),
  };
  let loader = LoaderKind::from_path(Path::new(file));
  let virtual_kind = if loader.is_script() && contents.is_some_and(|c| c.trim().is_empty()) {
    Some(VirtualKind::EmptyModule)
  } else if browser_view {
    Some(VirtualKind::RouteBrowserView)
  } else {
    None
  };
  Classification { loader, is_virtual: virtual_kind.is_some(), virtual_kind }
}

fn is_browser_safe(name: &str) -> bool {
  BROWSER_SAFE_EXPORTS.contains(&name)
}

/// Rewrite a route module so only its browser-safe exports remain, then drop
/// every top-level declaration and import binding no longer reachable from
/// what is left. Server-only exports are never kept. Removed statements keep their line breaks so diagnostics
/// still point at the right lines.
pub fn browser_view_source(source: &str, loader: LoaderKind) -> Result<String, SyntaxError> {
  if source.trim().is_empty() {
    return Ok(EMPTY_MODULE.to_string());
  }
  let scan = scan_module(source, loader.scan_options())?;
  let count = scan.statements.len();
  let mut live = vec![false; count];
  let mut replacement: Vec<Option<String>> = vec![None; count];
  let mut declares: Vec<Vec<&str>> = vec![Vec::new(); count];
  let mut refs: Vec<Vec<&str>> = Vec::with_capacity(count);

  for (i, stmt) in scan.statements.iter().enumerate() {
    let mut stmt_refs = scan.references(stmt, source);
    match &stmt.kind {
      StatementKind::Import { bindings, .. } => {
        if bindings.is_empty() {
          live[i] = true;
        }
        declares[i] = bindings.iter().map(|b| b.local.as_str()).collect();
      }
      StatementKind::ExportDecl { names, decl_start } => {
        if names.iter().any(|n| SERVER_ONLY_EXPORTS.contains(&n.as_str())) {
          stmt_refs.clear();
        } else if names.iter().any(|n| is_browser_safe(n)) {
          live[i] = true;
        } else {
          declares[i] = names.iter().map(String::as_str).collect();
          replacement[i] = Some(source[*decl_start..stmt.end].to_string());
        }
      }
      StatementKind::ExportDefaultDecl { .. } | StatementKind::ExportDefaultExpr { .. } => live[i] = true,
      StatementKind::ExportList { items } => {
        let kept: Vec<&(String, String)> = items.iter().filter(|(_, e)| is_browser_safe(e)).collect();
        stmt_refs = kept.iter().map(|(local, _)| local.as_str()).collect();
        if kept.is_empty() {
          replacement[i] = Some(String::new());
        } else {
          live[i] = true;
          let list: Vec<String> = kept.iter().map(|(l, e)| specifier(l, e)).collect();
          replacement[i] = Some(format!("export {{ {} }};", list.join(", ")));
        }
      }
      StatementKind::ExportFrom { source: from, items } => {
        stmt_refs.clear();
        let kept: Vec<&(ImportedName, String)> = items.iter().filter(|(_, e)| is_browser_safe(e)).collect();
        if kept.is_empty() {
          replacement[i] = Some(String::new());
        } else {
          live[i] = true;
          let from = serde_json::to_string(from).unwrap_or_default();
          replacement[i] = Some(match kept.as_slice() {
            [(ImportedName::Namespace, ns)] => format!("export * as {ns} from {from};"),
            _ => {
              let list: Vec<String> = kept
                .iter()
                .filter_map(|(imported, e)| match imported {
                  ImportedName::Default => Some(specifier("default", e)),
                  ImportedName::Named(n) => Some(specifier(n, e)),
                  ImportedName::Namespace => None,
                })
                .collect();
              format!("export {{ {} }} from {from};", list.join(", "))
            }
          });
        }
      }
      StatementKind::ExportStar { .. } | StatementKind::Other => live[i] = true,
      StatementKind::Decl { names } => declares[i] = names.iter().map(String::as_str).collect(),
      StatementKind::TypeOnly => {}
    }
    refs.push(stmt_refs);
  }

  loop {
    let referenced: HashSet<&str> =
      (0..count).filter(|&i| live[i]).flat_map(|i| refs[i].iter().copied()).collect();
    let mut changed = false;
    for i in 0..count {
      if !live[i] && declares[i].iter().any(|n| referenced.contains(n)) {
        live[i] = true;
        changed = true;
      }
    }
    if !changed {
      break;
    }
  }

  let mut out = String::with_capacity(source.len());
  let mut cursor = 0;
  let mut has_module_syntax = false;
  for (i, stmt) in scan.statements.iter().enumerate() {
    out.push_str(&source[cursor..stmt.start]);
    let original = &source[stmt.start..stmt.end];
    match (&replacement[i], live[i]) {
      (Some(text), true) => out.push_str(text),
      (None, true) => out.push_str(original),
      _ => out.extend(original.chars().filter(|&c| c == '\n')),
    }
    has_module_syntax |= live[i]
      && match stmt.kind {
        StatementKind::Decl { .. } | StatementKind::Other | StatementKind::TypeOnly => false,
        StatementKind::ExportDecl { .. } => replacement[i].is_none(),
        _ => replacement[i].as_ref().is_none_or(|r| !r.is_empty()),
      };
    cursor = stmt.end;
  }
  out.push_str(&source[cursor..]);
  if !has_module_syntax {
    out.push_str("\nexport {};\n");
  }
  Ok(out)
}

fn specifier(local: &str, exported: &str) -> String {
  if local == exported { local.to_string() } else { format!("{local} as {exported}") }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn loaders_follow_extensions() {
    assert_eq!(classify("app/routes/a.tsx", None).loader, LoaderKind::Tsx);
    assert_eq!(classify("data.json", None).loader, LoaderKind::Json);
    assert_eq!(classify("styles/app.css", None).loader, LoaderKind::Css);
    assert_eq!(classify("logo.svg", None).loader, LoaderKind::File);
    assert!(!classify("app/root.jsx", None).is_virtual);
  }

  #[test]
  fn browser_view_and_empty_modules_are_virtual() {
    let view = classify("app/routes/a.jsx?browser", Some("export default 1"));
    assert_eq!(view.loader, LoaderKind::Jsx);
    assert_eq!(view.virtual_kind, Some(VirtualKind::RouteBrowserView));

    let empty = classify("app/routes/a.jsx?browser", Some("  \n\t"));
    assert_eq!(empty.virtual_kind, Some(VirtualKind::EmptyModule));
    let empty = classify("app/routes/b.tsx", Some("\n"));
    assert!(empty.is_virtual);
    assert_eq!(empty.virtual_kind, Some(VirtualKind::EmptyModule));

    assert_eq!(classify("notes.txt", Some("")).virtual_kind, None);
  }

  #[test]
  fn browser_view_drops_server_exports_and_their_imports() {
    let src = r#"import { db } from "~/db.server";
import { helper } from "~/utils";
import Button from "~/components/button";
import "./global-side-effect";

function queryUsers() {
  return db.users.all();
}

export async function loader() {
  return queryUsers();
}

export const action = async () => db.save();

export function headers() { return {}; }

export const meta = () => ({ title: helper("x") });

export default function Users() {
  return <Button />;
}
"#;
    let view = browser_view_source(src, LoaderKind::Jsx).unwrap();
    assert!(!view.contains("db.server"));
    assert!(!view.contains("queryUsers"));
    assert!(!view.contains("loader"));
    assert!(!view.contains("db.save"));
    assert!(!view.contains("headers"));
    assert!(view.contains("import { helper } from \"~/utils\";"));
    assert!(view.contains("import Button from \"~/components/button\";"));
    assert!(view.contains("import \"./global-side-effect\";"));
    assert!(view.contains("export const meta"));
    assert!(view.contains("export default function Users()"));
    assert_eq!(view.lines().count(), src.lines().count());
  }

  #[test]
  fn object_keys_do_not_keep_server_exports() {
    let src = r#"import { db } from "~/db.server";
export async function action() { return db.save(); }
export default function Page() { return submit({ action: "/x" }); }
"#;
    let view = browser_view_source(src, LoaderKind::Jsx).unwrap();
    assert!(!view.contains("db.server"));
    assert!(!view.contains("db.save"));
    assert!(!view.contains("async function action"));
    assert!(view.contains("submit({ action: \"/x\" })"));
  }

  #[test]
  fn shadowing_locals_do_not_keep_server_exports() {
    let src = r#"import { secret } from "~/secret.server";
export function loader() { return secret(); }
export default function Page() { const loader = 1; return loader; }
"#;
    let view = browser_view_source(src, LoaderKind::Jsx).unwrap();
    assert!(!view.contains("secret"));
    assert!(!view.contains("function loader"));
    assert!(view.contains("const loader = 1;"));
  }

  #[test]
  fn server_exports_are_dropped_even_when_referenced() {
    let src = "export const loader = () => 1;\nexport default function Page() { return loader(); }\n";
    let view = browser_view_source(src, LoaderKind::Jsx).unwrap();
    assert!(!view.contains("() => 1"));
    assert!(view.contains("return loader();"));
  }

  #[test]
  fn helpers_used_through_parameters_are_kept() {
    let src = r#"import { format } from "~/utils";
import { query } from "~/db.server";
const label = (n) => format(n);
export const loader = ({ params }) => query(params.id);
export default function List({ items }) { return items.map((item) => label(item)); }
"#;
    let view = browser_view_source(src, LoaderKind::Jsx).unwrap();
    assert!(view.contains("import { format } from \"~/utils\";"));
    assert!(view.contains("const label = (n) => format(n);"));
    assert!(!view.contains("query"));
  }

  #[test]
  fn non_safe_exports_survive_only_when_used() {
    let src = "export const shared = 1;\nexport const unused = 2;\nexport default function Page() { return shared; }\n";
    let view = browser_view_source(src, LoaderKind::Jsx).unwrap();
    assert!(view.contains("const shared = 1;"));
    assert!(!view.contains("export const shared"));
    assert!(!view.contains("unused"));
  }

  #[test]
  fn export_lists_are_filtered() {
    let src = "function loader() {}\nfunction Page() {}\nexport { loader, Page as default };\nexport { action, meta } from \"./shared\";\n";
    let view = browser_view_source(src, LoaderKind::Js).unwrap();
    assert!(view.contains("export { Page as default };"));
    assert!(view.contains("export { meta } from \"./shared\";"));
    assert!(!view.contains("function loader"));
  }

  #[test]
  fn whitespace_or_server_only_routes_still_are_modules() {
    assert_eq!(browser_view_source(" \n ", LoaderKind::Jsx).unwrap(), EMPTY_MODULE);
    let view = browser_view_source("export function loader() { return 1; }\n", LoaderKind::Jsx).unwrap();
    assert!(view.contains("export {};"));
    assert!(!view.contains("loader"));
  }
}
