/* src/cli/compiler/src/browser.rs */

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bundler::{
  BuildContext, BuildOptions, EMPTY_NAMESPACE, Format, LoadArgs, LoadResult, Plugin, ResolveArgs, ResolveResult,
  filter,
};
use crate::classify::{BROWSER_VIEW_SUFFIX, browser_view_source};
use crate::config::{AppConfig, BuildMode};
use crate::error::CompileError;
use crate::externals::{NODE_BUILTINS, is_node_builtin};
use crate::markdown::route_module_source;
use crate::package::{Platform, normalize, split_package_specifier};

/// Namespace of route modules reduced to their browser-safe exports.
pub const BROWSER_ROUTE_NAMESPACE: &str = "browser-route-module";

/// Module id the browser build assigns to a route's browser view; metafile
/// outputs carry it as their `entryPoint`.
pub fn browser_route_entry_id(config: &AppConfig, route_file: &Path) -> String {
  let rel = route_file.strip_prefix(&config.root_directory).unwrap_or(route_file);
  format!("{BROWSER_ROUTE_NAMESPACE}:{}{BROWSER_VIEW_SUFFIX}", rel.to_string_lossy().replace('\\', "/"))
}

pub fn node_env_define(mode: BuildMode) -> (String, String) {
  ("process.env.NODE_ENV".to_string(), format!("\"{}\"", mode.as_str()))
}

pub fn app_alias(config: &AppConfig) -> (String, PathBuf) {
  ("~/".to_string(), config.app_directory.clone())
}

/// Options for the browser build: the client entry plus one browser view per
/// route, code-split into content-hashed ES module chunks.
pub fn browser_build_options(config: &Arc<AppConfig>, mode: BuildMode) -> Result<BuildOptions, CompileError> {
  let mut options = BuildOptions::new(&config.root_directory, &config.assets_build_directory);
  options.outbase = config.app_directory.clone();
  options.public_path = config.public_path.clone();
  options.platform = Platform::Browser;
  options.format = Format::Esm;
  options.splitting = true;
  options.define = vec![node_env_define(mode)];
  options.aliases = vec![app_alias(config)];

  options.entry_points.push(config.entry_client_path().to_string_lossy().into_owned());
  for route in &config.routes {
    let file = config.route_file(route);
    options.entry_points.push(format!("{}{BROWSER_VIEW_SUFFIX}", file.to_string_lossy()));
  }

  options.plugins = vec![browser_route_modules()?, server_only_modules(config)?, browser_node_builtins(config)?];
  Ok(options)
}

pub fn create_browser_build(config: &Arc<AppConfig>, mode: BuildMode) -> Result<BuildContext, CompileError> {
  Ok(BuildContext::new(browser_build_options(config, mode)?))
}

fn browser_route_modules() -> Result<Plugin, CompileError> {
  let plugin = Plugin::new("browser-route-modules")
    .on_resolve(filter(r"\?browser$")?, |args: ResolveArgs| async move {
      let file = args.path.strip_suffix(BROWSER_VIEW_SUFFIX).unwrap_or(&args.path);
      let file = if Path::new(file).is_absolute() { PathBuf::from(file) } else { args.resolve_dir.join(file) };
      let path = format!("{}{BROWSER_VIEW_SUFFIX}", normalize(&file).to_string_lossy());
      Ok(Some(ResolveResult::in_namespace(path, BROWSER_ROUTE_NAMESPACE)))
    })
    .on_load(filter(".*")?, BROWSER_ROUTE_NAMESPACE, |args: LoadArgs| async move {
      let file = PathBuf::from(args.path.strip_suffix(BROWSER_VIEW_SUFFIX).unwrap_or(&args.path));
      let source = tokio::fs::read_to_string(&file)
        .await
        .map_err(|e| format!("Could not read \"{}\": {e}", file.display()))?;
      let (source, loader) = route_module_source(&file, source)
        .map_err(|e| format!("{}:{}:{}: {}", file.display(), e.line, e.column, e.message))?;
      // Unparseable sources pass through so the bundler reports the error
      // with its location.
      let contents = browser_view_source(&source, loader).unwrap_or(source);
      Ok(Some(LoadResult { contents, loader: Some(loader), resolve_dir: file.parent().map(Path::to_path_buf) }))
    });
  Ok(plugin)
}

/// `*.server.*` modules inside the app directory never reach the browser.
fn server_only_modules(config: &Arc<AppConfig>) -> Result<Plugin, CompileError> {
  let config = Arc::clone(config);
  let plugin = Plugin::new("server-only-modules").on_resolve(filter(r"\.server(\.[jt]sx?)?$")?, move |args: ResolveArgs| {
    let config = Arc::clone(&config);
    async move {
      let candidate = if let Some(rest) = args.path.strip_prefix("~/") {
        config.app_directory.join(rest)
      } else if args.path.starts_with('.') || Path::new(&args.path).is_absolute() {
        args.resolve_dir.join(&args.path)
      } else {
        return Ok(None);
      };
      let candidate = normalize(&candidate);
      if !candidate.starts_with(&config.app_directory) {
        return Ok(None);
      }
      Ok(Some(ResolveResult::in_namespace(candidate.to_string_lossy(), EMPTY_NAMESPACE)))
    }
  });
  Ok(plugin)
}

/// Node built-ins stay external in the browser unless the project installs a
/// package of the same name.
fn browser_node_builtins(config: &Arc<AppConfig>) -> Result<Plugin, CompileError> {
  let config = Arc::clone(config);
  let pattern = format!("^(node:)?({})(/.*)?$", NODE_BUILTINS.join("|"));
  let plugin = Plugin::new("browser-node-builtins").on_resolve(filter(&pattern)?, move |args: ResolveArgs| {
    let config = Arc::clone(&config);
    async move {
      let (name, _) = split_package_specifier(args.path.strip_prefix("node:").unwrap_or(&args.path));
      if is_node_builtin(&args.path) && !config.dependencies.contains(name) {
        Ok(Some(ResolveResult::external(args.path)))
      } else {
        Ok(None)
      }
    }
  });
  Ok(plugin)
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;
  use crate::bundler::build;
  use crate::config::read_config;

  fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
  }

  fn project() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(root, "package.json", r#"{"dependencies": {"browser-pkg": "1.0.0"}}"#);
    write(root, "app/entry.client.jsx", "import { hydrate } from \"./hydrate\";\nhydrate();\n");
    write(root, "app/hydrate.js", "export function hydrate() {}\n");
    write(root, "app/entry.server.jsx", "export default function handleRequest() {}\n");
    write(
      root,
      "app/root.jsx",
      "import { db } from \"~/db.server\";\nimport { label } from \"browser-pkg\";\n\
       export const loader = () => db.read();\nexport const meta = () => ({ title: label });\n\
       export default function Root() { return null; }\n",
    );
    write(root, "app/db.server.js", "export const db = { read: () => \"SECRET\" };\n");
    write(root, "app/routes/empty.jsx", "   \n");
    write(
      root,
      "node_modules/browser-pkg/package.json",
      r#"{"main": "./cjs.js", "module": "./esm.js", "browser": {"./esm.js": "./esm.browser.js"}}"#,
    );
    write(root, "node_modules/browser-pkg/esm.js", "export const label = \"node build\";\n");
    write(root, "node_modules/browser-pkg/esm.browser.js", "export const label = \"browser build\";\n");
    write(root, "node_modules/browser-pkg/cjs.js", "exports.label = \"cjs build\";\n");
    tmp
  }

  async fn browser_build(root: &Path) -> (Arc<AppConfig>, crate::bundler::BuildResult) {
    let config = Arc::new(read_config(root).unwrap());
    let mut options = browser_build_options(&config, BuildMode::Production).unwrap();
    options.write = false;
    let result = build(options).await.unwrap();
    (config, result)
  }

  #[tokio::test]
  async fn browser_field_overrides_are_inlined() {
    let tmp = project();
    let (config, result) = browser_build(tmp.path()).await;
    let root_entry = browser_route_entry_id(&config, &config.app_directory.join("root.jsx"));
    assert!(result.metafile.inputs.contains_key("node_modules/browser-pkg/esm.browser.js"));
    assert!(!result.metafile.inputs.contains_key("node_modules/browser-pkg/esm.js"));

    let text: String = result.outputs.iter().map(|o| o.text().into_owned()).collect();
    assert!(text.contains("\"browser build\""));
    assert!(!text.contains("\"node build\""));
    let (_, output) = result.metafile.output_for_entry(&root_entry).unwrap();
    assert_eq!(output.exports, vec!["meta".to_string(), "default".to_string()]);
  }

  #[tokio::test]
  async fn server_code_never_reaches_the_browser() {
    let tmp = project();
    let (_, result) = browser_build(tmp.path()).await;
    let text: String = result.outputs.iter().map(|o| o.text().into_owned()).collect();
    assert!(!text.contains("SECRET"));
    assert!(!text.contains("db.read"));
    assert!(!result.metafile.inputs.contains_key("app/db.server.js"));
  }

  #[tokio::test]
  async fn whitespace_route_exports_nothing() {
    let tmp = project();
    let (config, result) = browser_build(tmp.path()).await;
    let entry = browser_route_entry_id(&config, &config.app_directory.join("routes/empty.jsx"));
    let (key, output) = result.metafile.output_for_entry(&entry).unwrap();
    assert!(key.starts_with("public/build/routes/empty-"));
    assert!(output.exports.is_empty());
  }

  #[tokio::test]
  async fn server_only_imports_become_empty_modules() {
    let tmp = project();
    write(tmp.path(), "app/routes/uses-server.jsx", "import { db } from \"../db.server\";\nexport default function P() { return db; }\n");
    let (_, result) = browser_build(tmp.path()).await;
    let key = format!("{EMPTY_NAMESPACE}:app/db.server");
    assert!(result.metafile.inputs.contains_key(&key));
    let text: String = result.outputs.iter().map(|o| o.text().into_owned()).collect();
    assert!(!text.contains("SECRET"));
  }

  #[test]
  fn node_env_follows_build_mode() {
    assert_eq!(node_env_define(BuildMode::Development).1, "\"development\"");
    assert_eq!(node_env_define(BuildMode::Production).1, "\"production\"");
  }
}
