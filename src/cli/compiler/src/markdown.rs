/* src/cli/compiler/src/markdown.rs */

// Markdown route modules. Front matter is YAML; `meta` and `headers` keys
// become the matching route exports and the body renders as static HTML.

use std::fmt::Write as _;
use std::path::Path;

use pulldown_cmark::{Options, Parser, html};
use serde_json::Value;

use crate::classify::LoaderKind;
use crate::scan::SyntaxError;

/// Split a leading `---` fenced block off `source`.
fn front_matter(source: &str) -> Option<(&str, &str)> {
  let rest = source.strip_prefix("---")?;
  let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;
  let mut offset = 0;
  for line in rest.split_inclusive('\n') {
    if line.trim_end() == "---" {
      return Some((&rest[..offset], &rest[offset + line.len()..]));
    }
    offset += line.len();
  }
  None
}

fn attributes(yaml: &str) -> Result<Value, SyntaxError> {
  if yaml.trim().is_empty() {
    return Ok(Value::Object(serde_json::Map::new()));
  }
  let value: Value = serde_yaml::from_str(yaml).map_err(|e| {
    let (line, column) = e.location().map_or((1, 0), |l| (l.line() + 1, l.column().saturating_sub(1)));
    SyntaxError { message: format!("Invalid front matter: {e}"), line, column }
  })?;
  match value {
    Value::Object(_) => Ok(value),
    Value::Null => Ok(Value::Object(serde_json::Map::new())),
    _ => Err(SyntaxError { message: "Front matter must be a mapping".into(), line: 2, column: 0 }),
  }
}

fn render_html(body: &str) -> String {
  let mut options = Options::empty();
  options.insert(Options::ENABLE_TABLES);
  options.insert(Options::ENABLE_FOOTNOTES);
  options.insert(Options::ENABLE_STRIKETHROUGH);
  options.insert(Options::ENABLE_TASKLISTS);
  let mut out = String::with_capacity(body.len() * 3 / 2);
  html::push_html(&mut out, Parser::new_ext(body, options));
  out
}

/// Compile a `.md`/`.mdx` route into a JSX module exporting `attributes`,
/// optional `meta`/`headers` functions and a default component.
pub fn compile_markdown(source: &str) -> Result<String, SyntaxError> {
  let (attrs, body) = match front_matter(source) {
    Some((yaml, body)) => (attributes(yaml)?, body),
    None => (Value::Object(serde_json::Map::new()), source),
  };

  let mut out = String::new();
  let _ = writeln!(out, "export const attributes = {attrs};");
  if let Some(meta) = attrs.get("meta") {
    let _ = writeln!(out, "export function meta() {{ return {meta}; }}");
  }
  if let Some(headers) = attrs.get("headers") {
    let _ = writeln!(out, "export function headers() {{ return {headers}; }}");
  }
  let _ = writeln!(out, "const html = {};", Value::String(render_html(body)));
  out.push_str("export default function MarkdownRoute() {\n  return <div dangerouslySetInnerHTML={{ __html: html }} />;\n}\n");
  Ok(out)
}

/// Script source for a route file: markdown is compiled, everything else
/// passes through with its own loader.
pub fn route_module_source(file: &Path, source: String) -> Result<(String, LoaderKind), SyntaxError> {
  match LoaderKind::from_path(file) {
    LoaderKind::Markdown => Ok((compile_markdown(&source)?, LoaderKind::Jsx)),
    loader => Ok((source, loader)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::scan::{ScanOptions, scan_module};

  #[test]
  fn front_matter_becomes_exports() {
    let src = "---\ntitle: About\nmeta:\n  title: About us\nheaders:\n  Cache-Control: max-age=60\n---\n# About\n\nIt's a page\n";
    let module = compile_markdown(src).unwrap();
    assert!(module.contains(r#"export function meta() { return {"title":"About us"}; }"#));
    assert!(module.contains(r#"export function headers() { return {"Cache-Control":"max-age=60"}; }"#));
    assert!(module.contains(r#"const html = "<h1>About</h1>\n<p>It"#));

    let scan = scan_module(&module, ScanOptions { jsx: true, typescript: false }).unwrap();
    assert_eq!(scan.export_names(), vec!["attributes", "meta", "headers", "default"]);
  }

  #[test]
  fn plain_markdown_has_only_attributes_and_default() {
    let module = compile_markdown("Don't panic, it's *fine*\n").unwrap();
    assert!(module.starts_with("export const attributes = {};\n"));
    assert!(module.contains("<em>fine</em>"));
    let scan = scan_module(&module, ScanOptions { jsx: true, typescript: false }).unwrap();
    assert_eq!(scan.export_names(), vec!["attributes", "default"]);
  }

  #[test]
  fn unterminated_fence_is_body_text() {
    let module = compile_markdown("---\nnot front matter\n").unwrap();
    assert!(module.starts_with("export const attributes = {};\n"));
    assert!(module.contains("<hr />"));
  }

  #[test]
  fn invalid_front_matter_is_a_syntax_error() {
    let err = compile_markdown("---\ntitle: [unclosed\n---\nbody\n").unwrap_err();
    assert!(err.message.starts_with("Invalid front matter"));
    let err = compile_markdown("---\n- a\n- b\n---\n").unwrap_err();
    assert_eq!(err.message, "Front matter must be a mapping");
  }

  #[test]
  fn only_markdown_routes_are_compiled() {
    let (source, loader) = route_module_source(Path::new("app/routes/a.mdx"), "# A\n".into()).unwrap();
    assert_eq!(loader, LoaderKind::Jsx);
    assert!(source.contains("MarkdownRoute"));
    let (source, loader) = route_module_source(Path::new("app/routes/b.tsx"), "export {};".into()).unwrap();
    assert_eq!(loader, LoaderKind::Tsx);
    assert_eq!(source, "export {};");
  }
}
