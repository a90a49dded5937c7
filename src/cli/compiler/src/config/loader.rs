/* src/cli/compiler/src/config/loader.rs */

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use ridge_server::{RouteDef, RouteGraph};
use serde::Deserialize;
use tracing::debug;

use super::routes::{discover_routes, find_module};
use super::{AppConfig, BundlePattern, RidgeToml};
use crate::error::CompileError;

pub const CONFIG_FILE: &str = "ridge.toml";

const ENTRY_EXTENSIONS: [&str; 4] = ["js", "jsx", "ts", "tsx"];

/// Walk upward from `start` to find the directory holding `ridge.toml`.
pub fn find_config(start: &Path) -> Result<PathBuf, CompileError> {
  let mut dir = start.canonicalize().map_err(|e| CompileError::read(start, e))?;
  loop {
    if dir.join(CONFIG_FILE).is_file() {
      return Ok(dir);
    }
    if !dir.pop() {
      return Err(CompileError::Config(format!(
        "{CONFIG_FILE} not found (searched upward from {})",
        start.display()
      )));
    }
  }
}

pub fn load_ridge_toml(root: &Path) -> Result<RidgeToml, CompileError> {
  let path = root.join(CONFIG_FILE);
  if !path.is_file() {
    return Ok(RidgeToml::default());
  }
  let content = std::fs::read_to_string(&path).map_err(|e| CompileError::read(&path, e))?;
  toml::from_str(&content)
    .map_err(|e| CompileError::Config(format!("failed to parse {}: {e}", path.display())))
}

/// Read the project rooted at `root_dir` into a fresh snapshot. A missing
/// `ridge.toml` means all defaults.
pub fn read_config(root_dir: &Path) -> Result<AppConfig, CompileError> {
  let root_directory = root_dir.canonicalize().map_err(|e| CompileError::read(root_dir, e))?;
  let toml = load_ridge_toml(&root_directory)?;
  let app = toml.app;

  let app_directory = root_directory.join(&app.app_directory);
  if !app_directory.is_dir() {
    return Err(CompileError::Config(format!(
      "app directory {} does not exist",
      app_directory.display()
    )));
  }

  let entry_client_file = entry_file(&app_directory, app.entry_client.as_deref(), "entry.client")?;
  let entry_server_file = entry_file(&app_directory, app.entry_server.as_deref(), "entry.server")?;

  let ignored = app
    .ignored_route_files
    .iter()
    .map(|g| glob_to_regex(g))
    .collect::<Result<Vec<_>, _>>()?;
  let mut routes = discover_routes(&app_directory, &ignored)?;
  for manual in toml.routes {
    routes.push(RouteDef {
      id: manual.id,
      parent_id: manual.parent_id,
      path: manual.path,
      index: manual.index,
      case_sensitive: manual.case_sensitive,
      file: manual.file,
    });
  }
  RouteGraph::new(routes.clone())?;

  let server_dependencies_to_bundle = app
    .server_dependencies_to_bundle
    .iter()
    .map(|p| bundle_pattern(p))
    .collect::<Result<Vec<_>, _>>()?;

  let config = AppConfig {
    cache_directory: root_directory.join(&app.cache_directory),
    assets_build_directory: root_directory.join(&app.assets_build_directory),
    server_build_directory: root_directory.join(&app.server_build_directory),
    public_path: app.public_path,
    entry_client_file,
    entry_server_file,
    routes,
    server_dependencies_to_bundle,
    server_build_target: app.server_build_target,
    dev_server_port: app.dev_server_port,
    dependencies: read_dependencies(&root_directory)?,
    app_directory,
    root_directory,
  };
  debug!(routes = config.routes.len(), target = %config.server_build_target, "config loaded");
  Ok(config)
}

fn entry_file(app_dir: &Path, configured: Option<&str>, basename: &str) -> Result<String, CompileError> {
  if let Some(file) = configured {
    if !app_dir.join(file).is_file() {
      return Err(CompileError::Config(format!("{file} not found in {}", app_dir.display())));
    }
    return Ok(file.to_string());
  }
  find_module(app_dir, basename, &ENTRY_EXTENSIONS).ok_or_else(|| {
    CompileError::Config(format!(
      "missing \"{basename}\" file in {} (one of .{})",
      app_dir.display(),
      ENTRY_EXTENSIONS.join(", .")
    ))
  })
}

/// `"/.../"` is a regex, anything else an exact import path.
fn bundle_pattern(raw: &str) -> Result<BundlePattern, CompileError> {
  if raw.len() > 1
    && let Some(inner) = raw.strip_prefix('/').and_then(|s| s.strip_suffix('/'))
  {
    let re = Regex::new(inner).map_err(|e| {
      CompileError::Config(format!("invalid server_dependencies_to_bundle pattern {raw}: {e}"))
    })?;
    return Ok(BundlePattern::Pattern(re));
  }
  Ok(BundlePattern::Exact(raw.to_string()))
}

/// Translate a route-file glob into an anchored regex over `/`-separated
/// paths relative to `app/routes`.
pub(crate) fn glob_to_regex(glob: &str) -> Result<Regex, CompileError> {
  let mut out = String::from("^");
  let chars: Vec<char> = glob.chars().collect();
  let mut i = 0;
  while i < chars.len() {
    match chars[i] {
      '*' if chars.get(i + 1) == Some(&'*') => {
        if chars.get(i + 2) == Some(&'/') {
          out.push_str("(?:.*/)?");
          i += 3;
        } else {
          out.push_str(".*");
          i += 2;
        }
        continue;
      }
      '*' => out.push_str("[^/]*"),
      '?' => out.push_str("[^/]"),
      c => out.push_str(&regex::escape(&c.to_string())),
    }
    i += 1;
  }
  out.push('$');
  Regex::new(&out).map_err(|e| CompileError::Config(format!("invalid ignored_route_files glob {glob}: {e}")))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ProjectPackageJson {
  #[serde(default)]
  dependencies: serde_json::Map<String, serde_json::Value>,
  #[serde(default)]
  dev_dependencies: serde_json::Map<String, serde_json::Value>,
}

fn read_dependencies(root: &Path) -> Result<BTreeSet<String>, CompileError> {
  let path = root.join("package.json");
  if !path.is_file() {
    return Ok(BTreeSet::new());
  }
  let content = std::fs::read_to_string(&path).map_err(|e| CompileError::read(&path, e))?;
  let pkg: ProjectPackageJson = serde_json::from_str(&content)
    .map_err(|e| CompileError::Config(format!("failed to parse {}: {e}", path.display())))?;
  Ok(pkg.dependencies.into_iter().chain(pkg.dev_dependencies).map(|(name, _)| name).collect())
}
