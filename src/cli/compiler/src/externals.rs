/* src/cli/compiler/src/externals.rs */

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use crate::config::AppConfig;
use crate::package::{find_package_dir, read_package_json, split_package_specifier};

/// Modules provided by the runtime itself.
pub const NODE_BUILTINS: [&str; 41] = [
  "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants", "crypto",
  "dgram", "diagnostics_channel", "dns", "domain", "events", "fs", "http", "http2", "https",
  "inspector", "module", "net", "os", "path", "perf_hooks", "process", "punycode", "querystring",
  "readline", "repl", "stream", "string_decoder", "sys", "timers", "tls", "trace_events", "tty",
  "url", "util", "v8", "vm", "worker_threads", "zlib",
];

pub fn is_node_builtin(specifier: &str) -> bool {
  let name = specifier.strip_prefix("node:").unwrap_or(specifier);
  let name = name.split('/').next().unwrap_or(name);
  NODE_BUILTINS.contains(&name)
}

/// Bare ids name an installed package. Relative, absolute, `~/` alias and
/// `node:` ids are not bare.
pub fn is_bare_specifier(specifier: &str) -> bool {
  !specifier.starts_with("node:")
    && !specifier.starts_with('.')
    && !specifier.starts_with('~')
    && !Path::new(specifier).is_absolute()
}

fn in_node_modules(path: &Path) -> bool {
  path.components().any(|c| c.as_os_str() == "node_modules")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildWarning {
  /// Deduplication key, usually the package name.
  pub key: String,
  pub message: String,
}

/// Warnings collected over one build, each key reported once.
#[derive(Debug, Default)]
pub struct WarningSink {
  seen: Mutex<HashSet<String>>,
  emitted: Mutex<Vec<BuildWarning>>,
}

impl WarningSink {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record a warning; returns false when its key was already reported.
  pub fn warn(&self, warning: BuildWarning) -> bool {
    let fresh = self.seen.lock().unwrap_or_else(PoisonError::into_inner).insert(warning.key.clone());
    if fresh {
      warn!(key = %warning.key, "{}", warning.message);
      self.emitted.lock().unwrap_or_else(PoisonError::into_inner).push(warning);
    }
    fresh
  }

  pub fn warnings(&self) -> Vec<BuildWarning> {
    self.emitted.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalDecision {
  pub bundle: bool,
  /// Warnings first reported by this decision.
  pub warnings: Vec<BuildWarning>,
}

/// Decide whether the server build bundles `import_path` or leaves it to the
/// host runtime's module loader.
pub fn resolve_external(
  import_path: &str,
  importer: &Path,
  config: &AppConfig,
  sink: &WarningSink,
) -> ExternalDecision {
  let mut warnings = Vec::new();
  let mut report = |warning: BuildWarning| {
    if sink.warn(warning.clone()) {
      warnings.push(warning);
    }
  };

  if !is_bare_specifier(import_path) || import_path.ends_with(".css") {
    return ExternalDecision { bundle: true, warnings };
  }

  let (package_name, subpath) = split_package_specifier(import_path);
  let builtin = is_node_builtin(package_name);
  let from_dependency = in_node_modules(importer);

  if !builtin && !from_dependency && !config.dependencies.contains(package_name) {
    let importer = importer.strip_prefix(&config.root_directory).unwrap_or(importer);
    report(BuildWarning {
      key: package_name.to_string(),
      message: format!(
        "The path \"{import_path}\" is imported in {} but {package_name} is not listed in your \
         package.json dependencies. Did you forget to install it?",
        importer.display()
      ),
    });
  }

  if config.server_build_target.is_single_file() || config.should_bundle_server_dependency(import_path) {
    return ExternalDecision { bundle: true, warnings };
  }

  if !builtin && !from_dependency {
    let search_from = importer.parent().unwrap_or(&config.root_directory);
    let pkg = find_package_dir(search_from, package_name)
      .or_else(|| find_package_dir(&config.root_directory, package_name))
      .and_then(|dir| read_package_json(&dir).ok().flatten());
    if let Some(pkg) = pkg
      && pkg.is_esm()
      && !pkg.has_require_condition(&subpath)
    {
      report(BuildWarning {
        key: format!("{package_name}:esm-only"),
        message: format!(
          "{package_name} is possibly an ESM only package and should be bundled with \
           \"server_dependencies_to_bundle\" in ridge.toml."
        ),
      });
    }
  }

  ExternalDecision { bundle: false, warnings }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeSet;
  use std::fs;
  use std::path::PathBuf;

  use super::*;
  use crate::config::{BundlePattern, ServerBuildTarget};

  fn config(root: &Path, target: ServerBuildTarget) -> AppConfig {
    AppConfig {
      root_directory: root.to_path_buf(),
      app_directory: root.join("app"),
      cache_directory: root.join(".cache"),
      assets_build_directory: root.join("public/build"),
      server_build_directory: root.join("build"),
      public_path: "/build/".into(),
      entry_client_file: "entry.client.jsx".into(),
      entry_server_file: "entry.server.jsx".into(),
      routes: Vec::new(),
      server_dependencies_to_bundle: vec![BundlePattern::Exact("bundled-pkg".into())],
      server_build_target: target,
      dev_server_port: 8002,
      dependencies: ["esm-only", "dual", "bundled-pkg", "react"].into_iter().map(String::from).collect::<BTreeSet<_>>(),
    }
  }

  fn install(root: &Path, name: &str, package_json: &str) {
    let dir = root.join("node_modules").join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("package.json"), package_json).unwrap();
  }

  fn importer(root: &Path, file: &str) -> PathBuf {
    root.join("app").join(file)
  }

  #[test]
  fn relative_css_and_single_file_are_bundled() {
    let root = tempfile::tempdir().unwrap();
    let sink = WarningSink::new();
    let node = config(root.path(), ServerBuildTarget::NodeCjs);
    let from = importer(root.path(), "root.jsx");
    assert!(resolve_external("./local", &from, &node, &sink).bundle);
    assert!(resolve_external("~/utils", &from, &node, &sink).bundle);
    assert!(resolve_external("react/styles.css", &from, &node, &sink).bundle);
    assert!(resolve_external("bundled-pkg", &from, &node, &sink).bundle);
    assert!(!resolve_external("react", &from, &node, &sink).bundle);

    let worker = config(root.path(), ServerBuildTarget::CloudflareWorkers);
    assert!(resolve_external("react", &from, &worker, &sink).bundle);
  }

  #[test]
  fn esm_only_warning_fires_once_per_package() {
    let root = tempfile::tempdir().unwrap();
    install(root.path(), "esm-only", r#"{"type": "module", "exports": {".": {"import": "./index.js"}}}"#);
    let node = config(root.path(), ServerBuildTarget::NodeCjs);
    let sink = WarningSink::new();

    let first = resolve_external("esm-only", &importer(root.path(), "routes/a.jsx"), &node, &sink);
    assert!(!first.bundle);
    assert_eq!(first.warnings.len(), 1);
    assert_eq!(first.warnings[0].key, "esm-only:esm-only");
    assert!(first.warnings[0].message.contains("possibly an ESM only package"));

    let second = resolve_external("esm-only", &importer(root.path(), "routes/b.jsx"), &node, &sink);
    assert!(second.warnings.is_empty());
    assert_eq!(sink.warnings().len(), 1);
  }

  #[test]
  fn require_condition_suppresses_esm_warning() {
    let root = tempfile::tempdir().unwrap();
    install(
      root.path(),
      "dual",
      r#"{"type": "module", "exports": {".": {"require": "./index.cjs", "import": "./index.js"}, "./sub": {"require": "./sub.cjs"}}}"#,
    );
    let node = config(root.path(), ServerBuildTarget::NodeCjs);
    let sink = WarningSink::new();
    let from = importer(root.path(), "root.jsx");
    assert!(resolve_external("dual", &from, &node, &sink).warnings.is_empty());
    assert!(resolve_external("dual/sub", &from, &node, &sink).warnings.is_empty());
    assert!(sink.warnings().is_empty());
  }

  #[test]
  fn undeclared_dependency_is_reported_once() {
    let root = tempfile::tempdir().unwrap();
    let node = config(root.path(), ServerBuildTarget::NodeCjs);
    let sink = WarningSink::new();
    let from = importer(root.path(), "routes/a.jsx");
    let decision = resolve_external("left-pad/lib", &from, &node, &sink);
    assert_eq!(decision.warnings.len(), 1);
    assert_eq!(decision.warnings[0].key, "left-pad");
    assert!(decision.warnings[0].message.contains("imported in app/routes/a.jsx"));
    assert!(resolve_external("left-pad", &from, &node, &sink).warnings.is_empty());

    assert!(resolve_external("fs", &from, &node, &sink).warnings.is_empty());
    let nested = root.path().join("node_modules/react/index.js");
    assert!(resolve_external("scheduler", &nested, &node, &sink).warnings.is_empty());
  }
}
