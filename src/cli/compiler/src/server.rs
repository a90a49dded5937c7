/* src/cli/compiler/src/server.rs */

use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::browser::{app_alias, node_env_define};
use crate::bundler::{
  BuildContext, BuildOptions, Format, LoadArgs, LoadResult, Plugin, ResolveArgs, ResolveResult, StdinEntry, filter,
};
use crate::classify::LoaderKind;
use crate::config::{AppConfig, BuildMode};
use crate::error::CompileError;
use crate::externals::{WarningSink, is_bare_specifier, resolve_external};
use crate::package::Platform;

/// Specifier the server entry imports the assets manifest through.
pub const ASSETS_MANIFEST_ID: &str = "@ridge/assets-manifest";
pub const ASSETS_MANIFEST_FILE: &str = "assets.json";
pub const SERVER_OUTPUT_FILE: &str = "index.js";
const ASSETS_NAMESPACE: &str = "assets-manifest";

/// Server copy of the assets manifest, handed to single-file server builds
/// that inline it instead of reading `assets.json` at boot.
pub type ManifestSlot = Arc<Mutex<Option<String>>>;

fn quote(s: &str) -> String {
  serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

/// Source of the synthetic server entry: the server entry module, every route
/// module and the assets manifest, exported as one route table.
pub fn server_entry_source(config: &AppConfig) -> String {
  let mut src = String::new();
  let _ = writeln!(src, "import * as entryServer from {};", quote(&config.entry_server_path().to_string_lossy()));
  for (i, route) in config.routes.iter().enumerate() {
    let _ = writeln!(src, "import * as route{i} from {};", quote(&config.route_file(route).to_string_lossy()));
  }
  let _ = writeln!(src, "export {{ default as assets }} from {};", quote(ASSETS_MANIFEST_ID));
  src.push_str("export const entry = { module: entryServer };\n");
  src.push_str("export const routes = {\n");
  for (i, route) in config.routes.iter().enumerate() {
    let optional = |value: Option<String>| value.unwrap_or_else(|| "undefined".to_string());
    let _ = writeln!(src, "  {}: {{", quote(&route.id));
    let _ = writeln!(src, "    id: {},", quote(&route.id));
    let _ = writeln!(src, "    parentId: {},", optional(route.parent_id.as_deref().map(quote)));
    let _ = writeln!(src, "    path: {},", optional(route.path.as_deref().map(quote)));
    let _ = writeln!(src, "    index: {},", optional(route.index.then(|| "true".to_string())));
    let _ = writeln!(src, "    caseSensitive: {},", optional(route.case_sensitive.then(|| "true".to_string())));
    let _ = writeln!(src, "    module: route{i}");
    src.push_str("  },\n");
  }
  src.push_str("};\n");
  src
}

/// Options for the server build: one synthetic entry written to
/// `<server_build_directory>/index.js`.
pub fn server_build_options(
  config: &Arc<AppConfig>,
  mode: BuildMode,
  sink: &Arc<WarningSink>,
  manifest: &ManifestSlot,
) -> Result<BuildOptions, CompileError> {
  let target = config.server_build_target;
  let mut options = BuildOptions::new(&config.root_directory, &config.server_build_directory);
  options.stdin = Some(StdinEntry {
    contents: server_entry_source(config),
    resolve_dir: config.root_directory.clone(),
    loader: LoaderKind::Js,
  });
  options.outbase = config.app_directory.clone();
  options.outfile = Some(SERVER_OUTPUT_FILE.to_string());
  options.public_path = config.public_path.clone();
  options.platform = if target.uses_worker_conditions() { Platform::Worker } else { Platform::Node };
  options.format = if target.is_single_file() { Format::Esm } else { Format::Cjs };
  options.define = vec![node_env_define(mode)];
  options.aliases = vec![app_alias(config)];
  options.plugins = vec![assets_manifest(config, manifest)?, server_bare_modules(config, sink)?];
  Ok(options)
}

pub fn create_server_build(
  config: &Arc<AppConfig>,
  mode: BuildMode,
  sink: &Arc<WarningSink>,
  manifest: &ManifestSlot,
) -> Result<BuildContext, CompileError> {
  Ok(BuildContext::new(server_build_options(config, mode, sink, manifest)?))
}

/// Multi-file targets read `assets.json` next to the bundle at boot;
/// single-file targets inline the manifest generated by the browser build.
fn assets_manifest(config: &Arc<AppConfig>, manifest: &ManifestSlot) -> Result<Plugin, CompileError> {
  let single_file = config.server_build_target.is_single_file();
  let slot = Arc::clone(manifest);
  let pattern = format!("^{}$", regex::escape(ASSETS_MANIFEST_ID));
  let plugin = Plugin::new("assets-manifest")
    .on_resolve(filter(&pattern)?, move |_args: ResolveArgs| async move {
      Ok(Some(if single_file {
        ResolveResult::in_namespace(ASSETS_MANIFEST_FILE, ASSETS_NAMESPACE)
      } else {
        ResolveResult::external(format!("./{ASSETS_MANIFEST_FILE}"))
      }))
    })
    .on_load(filter(".*")?, ASSETS_NAMESPACE, move |_args: LoadArgs| {
      let contents = slot.lock().unwrap_or_else(PoisonError::into_inner).clone();
      async move {
        let contents = contents.ok_or_else(|| "the assets manifest has not been generated yet".to_string())?;
        Ok(Some(LoadResult { contents, loader: Some(LoaderKind::Json), resolve_dir: None }))
      }
    });
  Ok(plugin)
}

/// Bare imports are bundled or left to the runtime's module loader per the
/// externalization rules.
fn server_bare_modules(config: &Arc<AppConfig>, sink: &Arc<WarningSink>) -> Result<Plugin, CompileError> {
  let config = Arc::clone(config);
  let sink = Arc::clone(sink);
  let plugin = Plugin::new("server-bare-modules").on_resolve(filter(".*")?, move |args: ResolveArgs| {
    let config = Arc::clone(&config);
    let sink = Arc::clone(&sink);
    async move {
      let Some(importer) = args.importer.as_deref().filter(|_| is_bare_specifier(&args.path)) else {
        return Ok(None);
      };
      let decision = resolve_external(&args.path, Path::new(importer), &config, &sink);
      Ok((!decision.bundle).then(|| ResolveResult::external(args.path)))
    }
  });
  Ok(plugin)
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;
  use crate::bundler::build;
  use crate::config::{ServerBuildTarget, read_config};

  fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
  }

  fn project(target: &str) -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(root, "ridge.toml", &format!("[app]\nserver_build_target = \"{target}\"\n"));
    write(root, "package.json", r#"{"dependencies": {"react": "18.0.0", "esm-only": "1.0.0", "cond": "1.0.0"}}"#);
    write(root, "app/entry.client.jsx", "export {};\n");
    write(root, "app/entry.server.jsx", "import React from \"react\";\nexport default function handleRequest() { return React; }\n");
    write(
      root,
      "app/root.jsx",
      "import { value } from \"cond\";\nexport const loader = () => value;\nexport default function Root() { return null; }\n",
    );
    write(root, "app/routes/empty.jsx", "\n\n");
    write(root, "app/routes/esm.jsx", "import thing from \"esm-only\";\nexport const loader = () => thing;\n");
    write(root, "node_modules/react/package.json", r#"{"main": "./index.js"}"#);
    write(root, "node_modules/react/index.js", "module.exports = { version: \"18\" };\n");
    write(
      root,
      "node_modules/cond/package.json",
      r#"{"exports": {".": {"worker": "./worker.js", "default": "./default.js"}}}"#,
    );
    write(root, "node_modules/cond/worker.js", "export const value = \"worker build\";\n");
    write(root, "node_modules/cond/default.js", "export const value = \"default build\";\n");
    write(root, "node_modules/esm-only/package.json", r#"{"type": "module", "exports": {".": {"import": "./index.js"}}}"#);
    write(root, "node_modules/esm-only/index.js", "export default 1;\n");
    tmp
  }

  fn options(config: &Arc<AppConfig>, sink: &Arc<WarningSink>, slot: &ManifestSlot) -> BuildOptions {
    let mut options = server_build_options(config, BuildMode::Production, sink, slot).unwrap();
    options.write = false;
    options
  }

  #[test]
  fn entry_source_lists_every_route() {
    let tmp = project("node-cjs");
    let config = read_config(tmp.path()).unwrap();
    let src = server_entry_source(&config);
    assert!(src.contains("import * as entryServer from"));
    assert_eq!(src.matches("import * as route").count(), config.routes.len());
    assert!(src.contains("export { default as assets } from \"@ridge/assets-manifest\";"));
    assert!(src.contains("\"routes/empty\": {\n    id: \"routes/empty\",\n    parentId: \"root\","));
    assert!(src.contains("    parentId: undefined,\n    path: \"\","));
  }

  #[tokio::test]
  async fn node_targets_externalize_dependencies_and_the_manifest() {
    let tmp = project("node-cjs");
    let config = Arc::new(read_config(tmp.path()).unwrap());
    let sink = Arc::new(WarningSink::new());
    let result = build(options(&config, &sink, &ManifestSlot::default())).await.unwrap();

    let text = result.outputs[0].text().into_owned();
    assert_eq!(result.outputs[0].path, config.server_build_directory.join("index.js"));
    assert!(text.contains("require(\"react\")"));
    assert!(text.contains("require(\"./assets.json\")"));
    assert!(text.ends_with("module.exports = __ridge.load(\"stdin:<stdin>\");\n"));
    assert!(!result.metafile.inputs.contains_key("node_modules/react/index.js"));

    let warnings = sink.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].key, "esm-only:esm-only");
  }

  #[tokio::test]
  async fn worker_targets_bundle_everything_with_worker_conditions() {
    let tmp = project("cloudflare-workers");
    let config = Arc::new(read_config(tmp.path()).unwrap());
    assert_eq!(config.server_build_target, ServerBuildTarget::CloudflareWorkers);
    let sink = Arc::new(WarningSink::new());
    let slot = ManifestSlot::default();
    *slot.lock().unwrap() = Some(r#"{"version": "abcd1234"}"#.to_string());

    let result = build(options(&config, &sink, &slot)).await.unwrap();
    let text = result.outputs[0].text().into_owned();
    assert!(text.contains("\"worker build\""));
    assert!(!text.contains("\"default build\""));
    assert!(text.contains("{\"version\": \"abcd1234\"}"));
    assert!(result.metafile.inputs.contains_key("node_modules/react/index.js"));
    assert!(text.contains("export var routes = __ridge_entry.routes;"));
    assert!(sink.warnings().is_empty());
  }

  #[tokio::test]
  async fn single_file_builds_need_the_manifest_first() {
    let tmp = project("deno");
    let config = Arc::new(read_config(tmp.path()).unwrap());
    let sink = Arc::new(WarningSink::new());
    let err = build(options(&config, &sink, &ManifestSlot::default())).await.unwrap_err();
    assert!(err.to_string().contains("[plugin assets-manifest] the assets manifest has not been generated yet"));
  }

  #[tokio::test]
  async fn whitespace_route_module_has_no_exports() {
    let tmp = project("node-cjs");
    let config = Arc::new(read_config(tmp.path()).unwrap());
    let sink = Arc::new(WarningSink::new());
    let result = build(options(&config, &sink, &ManifestSlot::default())).await.unwrap();
    let text = result.outputs[0].text().into_owned();
    assert!(text.contains("__ridge.define(\"app/routes/empty.jsx\", {  }, function (module, exports, require) {\n__ridge.esm(exports, {  });"));
  }
}
