/* src/cli/compiler/src/manifest.rs */

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ridge_server::{AssetsManifest, EntryAssets, ManifestRoute};
use serde::Serialize;
use tracing::debug;

use crate::browser::browser_route_entry_id;
use crate::bundler::{Metafile, MetafileOutput, content_hash, write_atomic};
use crate::config::AppConfig;
use crate::error::CompileError;
use crate::markdown::route_module_source;
use crate::scan::{SyntaxError, scan_module};

/// Global the browser manifest script assigns.
pub const BROWSER_MANIFEST_GLOBAL: &str = "window.__ridgeManifest";

/// Where `write_assets_manifest` put the two copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFiles {
  pub browser: PathBuf,
  pub server: PathBuf,
}

#[derive(Serialize)]
struct VersionedContent<'a> {
  entry: &'a EntryAssets,
  routes: &'a BTreeMap<String, ManifestRoute>,
}

fn root_relative_id(config: &AppConfig, file: &Path) -> String {
  file.strip_prefix(&config.root_directory).unwrap_or(file).to_string_lossy().replace('\\', "/")
}

fn public_url(config: &AppConfig, output_key: &str) -> Result<String, CompileError> {
  let file = config.root_directory.join(output_key);
  let rel = file.strip_prefix(&config.assets_build_directory).map_err(|_| {
    CompileError::Manifest(format!("{output_key} is outside {}", config.assets_build_directory.display()))
  })?;
  Ok(format!("{}{}", config.public_path, rel.to_string_lossy().replace('\\', "/")))
}

fn chunk_urls(config: &AppConfig, key: &str, output: &MetafileOutput) -> Result<(String, Vec<String>), CompileError> {
  let module = public_url(config, key)?;
  let imports = output
    .imports
    .iter()
    .filter(|import| !import.external)
    .map(|import| public_url(config, &import.path))
    .collect::<Result<Vec<_>, _>>()?;
  Ok((module, imports))
}

fn route_exports(file: &Path) -> Result<Vec<String>, CompileError> {
  let source = std::fs::read_to_string(file).map_err(|e| CompileError::read(file, e))?;
  let syntax = |e: SyntaxError| CompileError::Manifest(format!("{}:{}:{}: {}", file.display(), e.line, e.column, e.message));
  let (source, loader) = route_module_source(file, source).map_err(syntax)?;
  let scan = scan_module(&source, loader.scan_options()).map_err(syntax)?;
  Ok(scan.export_names())
}

/// Map the browser build onto routes: every route's chunk URL, the shared
/// chunks it imports and which data/boundary exports its module declares.
pub fn create_assets_manifest(config: &AppConfig, metafile: &Metafile) -> Result<AssetsManifest, CompileError> {
  let entry_id = root_relative_id(config, &config.entry_client_path());
  let (entry_key, entry_output) = metafile
    .output_for_entry(&entry_id)
    .ok_or_else(|| CompileError::Manifest(format!("no output for entry module {entry_id}")))?;
  let (module, imports) = chunk_urls(config, entry_key, entry_output)?;
  let entry = EntryAssets { module, imports };

  let mut routes = BTreeMap::new();
  for route in &config.routes {
    let file = config.route_file(route);
    let route_entry = browser_route_entry_id(config, &file);
    let (key, output) = metafile
      .output_for_entry(&route_entry)
      .ok_or_else(|| CompileError::Manifest(format!("no output for route \"{}\"", route.id)))?;
    let (module, imports) = chunk_urls(config, key, output)?;
    let exports = route_exports(&file)?;
    let has = |name: &str| exports.iter().any(|e| e == name);
    routes.insert(
      route.id.clone(),
      ManifestRoute {
        id: route.id.clone(),
        parent_id: route.parent_id.clone(),
        path: route.path.clone(),
        index: route.index.then_some(true),
        case_sensitive: route.case_sensitive.then_some(true),
        module,
        imports,
        has_loader: has("loader"),
        has_action: has("action"),
        has_catch_boundary: has("CatchBoundary"),
        has_error_boundary: has("ErrorBoundary"),
      },
    );
  }

  let content = serde_json::to_vec(&VersionedContent { entry: &entry, routes: &routes })
    .map_err(|e| CompileError::Manifest(e.to_string()))?;
  let hash = content_hash(&content);
  let manifest = AssetsManifest {
    version: hash.to_lowercase(),
    url: format!("{}manifest-{hash}.js", config.public_path),
    entry,
    routes,
  };
  debug!(version = %manifest.version, routes = manifest.routes.len(), "assets manifest created");
  Ok(manifest)
}

/// JSON the server bundle reads at boot (or inlines, for single-file targets).
pub fn server_manifest_json(manifest: &AssetsManifest) -> Result<String, CompileError> {
  serde_json::to_string_pretty(manifest).map_err(|e| CompileError::Manifest(e.to_string()))
}

pub fn browser_manifest_script(manifest: &AssetsManifest) -> Result<String, CompileError> {
  let json = serde_json::to_string(manifest).map_err(|e| CompileError::Manifest(e.to_string()))?;
  Ok(format!("{BROWSER_MANIFEST_GLOBAL}={json};"))
}

/// Write the browser script next to the browser chunks and `assets.json`
/// into the server build directory. Each file is replaced atomically.
pub fn write_assets_manifest(config: &AppConfig, manifest: &AssetsManifest) -> Result<ManifestFiles, CompileError> {
  let file_name = manifest
    .url
    .strip_prefix(&config.public_path)
    .ok_or_else(|| CompileError::Manifest(format!("{} is outside {}", manifest.url, config.public_path)))?;
  let files = ManifestFiles {
    browser: config.assets_build_directory.join(file_name),
    server: config.server_build_directory.join(crate::server::ASSETS_MANIFEST_FILE),
  };
  write_atomic(&files.browser, browser_manifest_script(manifest)?.as_bytes())?;
  write_atomic(&files.server, server_manifest_json(manifest)?.as_bytes())?;
  Ok(files)
}
