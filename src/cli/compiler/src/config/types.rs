/* src/cli/compiler/src/config/types.rs */

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;
use ridge_server::RouteDef;
use serde::Deserialize;

/// Raw `ridge.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RidgeToml {
  #[serde(default)]
  pub app: AppSection,
  #[serde(default)]
  pub routes: Vec<ManualRoute>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
  pub app_directory: String,
  pub assets_build_directory: String,
  pub server_build_directory: String,
  pub public_path: String,
  pub cache_directory: String,
  pub entry_client: Option<String>,
  pub entry_server: Option<String>,
  pub ignored_route_files: Vec<String>,
  pub server_dependencies_to_bundle: Vec<String>,
  pub server_build_target: ServerBuildTarget,
  pub dev_server_port: u16,
}

impl Default for AppSection {
  fn default() -> Self {
    Self {
      app_directory: "app".to_string(),
      assets_build_directory: "public/build".to_string(),
      server_build_directory: "build".to_string(),
      public_path: "/build/".to_string(),
      cache_directory: ".cache".to_string(),
      entry_client: None,
      entry_server: None,
      ignored_route_files: Vec::new(),
      server_dependencies_to_bundle: Vec::new(),
      server_build_target: ServerBuildTarget::default(),
      dev_server_port: 8002,
    }
  }
}

/// A `[[routes]]` entry declared by hand.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualRoute {
  pub id: String,
  pub parent_id: Option<String>,
  pub path: Option<String>,
  #[serde(default)]
  pub index: bool,
  #[serde(default)]
  pub case_sensitive: bool,
  pub file: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerBuildTarget {
  #[default]
  NodeCjs,
  Arc,
  Netlify,
  Vercel,
  CloudflarePages,
  CloudflareWorkers,
  Deno,
}

impl ServerBuildTarget {
  pub const ALL: [Self; 7] = [
    Self::NodeCjs,
    Self::Arc,
    Self::Netlify,
    Self::Vercel,
    Self::CloudflarePages,
    Self::CloudflareWorkers,
    Self::Deno,
  ];

  /// Targets whose runtime has no module loader: everything is bundled into
  /// one ESM file, `assets.json` included.
  pub fn is_single_file(self) -> bool {
    matches!(self, Self::CloudflarePages | Self::CloudflareWorkers | Self::Deno)
  }

  pub fn uses_worker_conditions(self) -> bool {
    matches!(self, Self::CloudflarePages | Self::CloudflareWorkers)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::NodeCjs => "node-cjs",
      Self::Arc => "arc",
      Self::Netlify => "netlify",
      Self::Vercel => "vercel",
      Self::CloudflarePages => "cloudflare-pages",
      Self::CloudflareWorkers => "cloudflare-workers",
      Self::Deno => "deno",
    }
  }
}

impl fmt::Display for ServerBuildTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ServerBuildTarget {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|t| t.as_str() == s)
      .ok_or_else(|| format!("unknown server build target \"{s}\""))
  }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildMode {
  Development,
  #[default]
  Production,
}

impl BuildMode {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Development => "development",
      Self::Production => "production",
    }
  }
}

impl FromStr for BuildMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "development" => Ok(Self::Development),
      "production" => Ok(Self::Production),
      other => Err(format!("unknown build mode \"{other}\"")),
    }
  }
}

/// Entry of `server_dependencies_to_bundle`: an exact import path, or a
/// `/regex/` pattern.
#[derive(Debug, Clone)]
pub enum BundlePattern {
  Exact(String),
  Pattern(Regex),
}

impl BundlePattern {
  pub fn matches(&self, import_path: &str) -> bool {
    match self {
      Self::Exact(s) => s == import_path,
      Self::Pattern(re) => re.is_match(import_path),
    }
  }
}

/// Fully resolved project configuration. Immutable; a config reload produces
/// a new snapshot.
#[derive(Debug, Clone)]
pub struct AppConfig {
  pub root_directory: PathBuf,
  pub app_directory: PathBuf,
  pub cache_directory: PathBuf,
  pub assets_build_directory: PathBuf,
  pub server_build_directory: PathBuf,
  pub public_path: String,
  /// Relative to `app_directory`.
  pub entry_client_file: String,
  /// Relative to `app_directory`.
  pub entry_server_file: String,
  /// Declaration order. Route `file`s are relative to `app_directory`.
  pub routes: Vec<RouteDef>,
  pub server_dependencies_to_bundle: Vec<BundlePattern>,
  pub server_build_target: ServerBuildTarget,
  pub dev_server_port: u16,
  /// `dependencies` and `devDependencies` of the project `package.json`.
  pub dependencies: BTreeSet<String>,
}

impl AppConfig {
  pub fn route(&self, id: &str) -> Option<&RouteDef> {
    self.routes.iter().find(|r| r.id == id)
  }

  pub fn route_file(&self, route: &RouteDef) -> PathBuf {
    self.app_directory.join(&route.file)
  }

  pub fn entry_client_path(&self) -> PathBuf {
    self.app_directory.join(&self.entry_client_file)
  }

  pub fn entry_server_path(&self) -> PathBuf {
    self.app_directory.join(&self.entry_server_file)
  }

  /// True when adding or removing `file` changes the set of build entry points.
  pub fn is_entry_point(&self, file: &Path) -> bool {
    let Ok(rel) = file.strip_prefix(&self.app_directory) else {
      return false;
    };
    let rel = rel.to_string_lossy().replace('\\', "/");
    rel == self.entry_client_file
      || rel == self.entry_server_file
      || self.routes.iter().any(|r| r.file == rel)
  }

  pub fn is_route_file(&self, file: &Path) -> bool {
    self.routes.iter().any(|r| self.route_file(r) == file)
  }

  pub fn should_bundle_server_dependency(&self, import_path: &str) -> bool {
    self.server_dependencies_to_bundle.iter().any(|p| p.matches(import_path))
  }
}
