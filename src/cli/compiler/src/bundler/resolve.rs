/* src/cli/compiler/src/bundler/resolve.rs */

use std::path::{Path, PathBuf};

use crate::externals::{is_bare_specifier, is_node_builtin};
use crate::package::{
  BrowserMapping, Platform, PackageJson, find_package_dir, normalize, read_package_json,
  split_package_specifier,
};

/// Extensions tried, in order, for extensionless imports and `index` files.
pub const RESOLVE_EXTENSIONS: [&str; 8] = ["tsx", "ts", "jsx", "js", "mjs", "cjs", "json", "css"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
  File(PathBuf),
  External(String),
  /// A file mapped away by a `browser` field.
  Empty(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Resolver {
  pub platform: Platform,
  /// Prefix aliases such as `~/` -> app directory.
  pub aliases: Vec<(String, PathBuf)>,
}

impl Resolver {
  pub fn resolve(&self, specifier: &str, resolve_dir: &Path) -> Result<Resolved, String> {
    let not_found = || format!("Could not resolve \"{specifier}\"");

    if is_node_builtin(specifier) && (specifier.starts_with("node:") || is_bare_specifier(specifier)) {
      if self.platform == Platform::Node {
        return Ok(Resolved::External(specifier.to_string()));
      }
      if specifier.starts_with("node:") {
        return Err(not_found());
      }
    }

    let file = if let Some((prefix, dir)) = self.aliases.iter().find(|(p, _)| specifier.starts_with(p.as_str())) {
      resolve_path(&dir.join(&specifier[prefix.len()..]), self.platform)
    } else if is_relative(specifier) {
      resolve_path(&resolve_dir.join(specifier), self.platform)
    } else if Path::new(specifier).is_absolute() {
      resolve_path(Path::new(specifier), self.platform)
    } else {
      self.resolve_package(specifier, resolve_dir)?
    };
    let file = file.ok_or_else(not_found)?;
    self.apply_browser_map(file).ok_or_else(not_found)
  }

  fn resolve_package(&self, specifier: &str, resolve_dir: &Path) -> Result<Option<PathBuf>, String> {
    let (name, subpath) = split_package_specifier(specifier);
    let Some(dir) = find_package_dir(resolve_dir, name) else {
      return Ok(None);
    };
    let pkg = read_package_json(&dir).map_err(|e| e.to_string())?.unwrap_or_default();

    if pkg.exports.is_some() {
      let Some(target) = pkg.resolve_exports(&subpath, self.platform.conditions()) else {
        return Err(format!(
          "Could not resolve \"{specifier}\": the path \"{subpath}\" is not exported by package \"{name}\""
        ));
      };
      let file = normalize(&dir.join(target));
      return Ok(file.is_file().then_some(file));
    }
    if subpath == "." {
      if let Some(entry) = pkg.main_entry(self.platform)
        && let Some(file) = resolve_path(&dir.join(entry), self.platform)
      {
        return Ok(Some(file));
      }
      return Ok(resolve_index(&dir));
    }
    Ok(resolve_path(&dir.join(&subpath), self.platform))
  }

  /// Browser builds swap files listed in their package's `browser` map.
  fn apply_browser_map(&self, file: PathBuf) -> Option<Resolved> {
    if !self.platform.uses_browser_map() {
      return Some(Resolved::File(file));
    }
    let Some(pkg) = owning_package(&file) else {
      return Some(Resolved::File(file));
    };
    match pkg.browser_mapping(&file) {
      Some(BrowserMapping::Replace(target)) => resolve_path(&target, self.platform).map(Resolved::File),
      Some(BrowserMapping::Empty) => Some(Resolved::Empty(file)),
      None => Some(Resolved::File(file)),
    }
  }
}

fn is_relative(specifier: &str) -> bool {
  specifier == "." || specifier == ".." || specifier.starts_with("./") || specifier.starts_with("../")
}

/// The exact file, then `<path>.<ext>`, then a directory's entry.
fn resolve_path(path: &Path, platform: Platform) -> Option<PathBuf> {
  let path = normalize(path);
  if path.is_file() {
    return Some(path);
  }
  if let Some(file) = with_extensions(&path) {
    return Some(file);
  }
  if path.is_dir() {
    if let Ok(Some(pkg)) = read_package_json(&path)
      && let Some(entry) = pkg.main_entry(platform)
      && let Some(file) = resolve_path(&path.join(entry), platform)
    {
      return Some(file);
    }
    return resolve_index(&path);
  }
  None
}

fn with_extensions(path: &Path) -> Option<PathBuf> {
  let base = path.as_os_str().to_string_lossy();
  RESOLVE_EXTENSIONS.iter().map(|ext| PathBuf::from(format!("{base}.{ext}"))).find(|p| p.is_file())
}

fn resolve_index(dir: &Path) -> Option<PathBuf> {
  with_extensions(&dir.join("index"))
}

/// The installed package containing `file`: the directory right after its
/// last `node_modules` component (two for scoped names).
fn owning_package(file: &Path) -> Option<PackageJson> {
  let components: Vec<_> = file.components().collect();
  let at = components.iter().rposition(|c| c.as_os_str() == "node_modules")?;
  let first = components.get(at + 1)?;
  let depth = if first.as_os_str().to_string_lossy().starts_with('@') { at + 3 } else { at + 2 };
  let dir: PathBuf = components.get(..depth)?.iter().collect();
  read_package_json(&dir).ok().flatten()
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;

  fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
  }

  fn resolver(platform: Platform, app: &Path) -> Resolver {
    Resolver { platform, aliases: vec![("~/".into(), app.to_path_buf())] }
  }

  #[test]
  fn relative_alias_and_index_files() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(root, "app/utils.ts", "");
    write(root, "app/components/index.jsx", "");
    let r = resolver(Platform::Browser, &root.join("app"));
    let from = root.join("app/routes");

    assert_eq!(r.resolve("../utils", &from), Ok(Resolved::File(root.join("app/utils.ts"))));
    assert_eq!(r.resolve("~/components", &from), Ok(Resolved::File(root.join("app/components/index.jsx"))));
    assert_eq!(r.resolve("./missing", &from), Err("Could not resolve \"./missing\"".to_string()));
  }

  #[test]
  fn builtins_are_external_only_on_node() {
    let tmp = tempfile::tempdir().unwrap();
    let node = resolver(Platform::Node, tmp.path());
    assert_eq!(node.resolve("fs", tmp.path()), Ok(Resolved::External("fs".into())));
    assert_eq!(node.resolve("node:path", tmp.path()), Ok(Resolved::External("node:path".into())));
    let browser = resolver(Platform::Browser, tmp.path());
    assert!(browser.resolve("node:path", tmp.path()).is_err());
  }

  #[test]
  fn packages_use_platform_conditions_and_main_fields() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(
      root,
      "node_modules/cond/package.json",
      r#"{"exports": {".": {"worker": "./worker.js", "node": "./node.js", "default": "./default.js"}}}"#,
    );
    for f in ["worker.js", "node.js", "default.js"] {
      write(root, &format!("node_modules/cond/{f}"), "");
    }
    write(root, "node_modules/legacy/package.json", r#"{"main": "./lib/main"}"#);
    write(root, "node_modules/legacy/lib/main.js", "");
    write(root, "node_modules/legacy/extra.js", "");

    let from = root.join("app");
    let file = |rel: &str| Ok(Resolved::File(root.join(rel)));
    assert_eq!(resolver(Platform::Worker, &from).resolve("cond", &from), file("node_modules/cond/worker.js"));
    assert_eq!(resolver(Platform::Node, &from).resolve("cond", &from), file("node_modules/cond/node.js"));
    assert_eq!(resolver(Platform::Browser, &from).resolve("cond", &from), file("node_modules/cond/default.js"));
    assert!(resolver(Platform::Browser, &from).resolve("cond/other", &from).unwrap_err().contains("not exported"));
    assert_eq!(resolver(Platform::Node, &from).resolve("legacy", &from), file("node_modules/legacy/lib/main.js"));
    assert_eq!(resolver(Platform::Node, &from).resolve("legacy/extra", &from), file("node_modules/legacy/extra.js"));
  }

  #[test]
  fn browser_map_applies_to_browser_builds_only() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(
      root,
      "node_modules/@acme/pkg/package.json",
      r#"{"module": "./esm.js", "browser": {"./esm.js": "./esm.browser.js", "./fs.js": false}}"#,
    );
    write(root, "node_modules/@acme/pkg/esm.js", "");
    write(root, "node_modules/@acme/pkg/esm.browser.js", "");
    write(root, "node_modules/@acme/pkg/fs.js", "");
    let from = root.join("app");

    let browser = resolver(Platform::Browser, &from);
    assert_eq!(browser.resolve("@acme/pkg", &from), Ok(Resolved::File(root.join("node_modules/@acme/pkg/esm.browser.js"))));
    assert_eq!(browser.resolve("@acme/pkg/fs", &from), Ok(Resolved::Empty(root.join("node_modules/@acme/pkg/fs.js"))));

    let node = resolver(Platform::Node, &from);
    assert_eq!(node.resolve("@acme/pkg", &from), Ok(Resolved::File(root.join("node_modules/@acme/pkg/esm.js"))));
  }
}
