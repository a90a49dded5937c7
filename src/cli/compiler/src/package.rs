/* src/cli/compiler/src/package.rs */

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::CompileError;

/// Which runtime a bundle targets. Decides `package.json` field and
/// `exports` condition preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
  Browser,
  /// Edge/worker runtimes (single-file server targets on Cloudflare).
  Worker,
  Node,
}

impl Platform {
  pub fn main_fields(self) -> &'static [&'static str] {
    match self {
      Self::Browser | Self::Worker => &["browser", "module", "main"],
      Self::Node => &["module", "main"],
    }
  }

  pub fn conditions(self) -> &'static [&'static str] {
    match self {
      Self::Browser => &["browser", "import", "default"],
      Self::Worker => &["worker", "browser", "import", "default"],
      Self::Node => &["node", "import", "require", "default"],
    }
  }

  /// Only browser builds honor the `browser` replacement map.
  pub fn uses_browser_map(self) -> bool {
    self == Self::Browser
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BrowserField {
  Entry(String),
  Map(Map<String, Value>),
  Other(Value),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default, rename = "type")]
  pub module_type: Option<String>,
  #[serde(default)]
  pub main: Option<String>,
  #[serde(default)]
  pub module: Option<String>,
  #[serde(default)]
  pub browser: Option<BrowserField>,
  #[serde(default)]
  pub exports: Option<Value>,
  #[serde(skip)]
  pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserMapping {
  /// Use this file instead (absolute).
  Replace(PathBuf),
  /// Mapped to `false`: resolve to an empty module.
  Empty,
}

pub fn read_package_json(dir: &Path) -> Result<Option<PackageJson>, CompileError> {
  let path = dir.join("package.json");
  if !path.is_file() {
    return Ok(None);
  }
  let content = std::fs::read_to_string(&path).map_err(|e| CompileError::read(&path, e))?;
  let mut pkg: PackageJson = serde_json::from_str(&content)
    .map_err(|e| CompileError::Config(format!("failed to parse {}: {e}", path.display())))?;
  pkg.dir = dir.to_path_buf();
  Ok(Some(pkg))
}

/// Split a bare specifier into package name and `exports` subpath:
/// `@scope/pkg/sub` -> (`@scope/pkg`, `./sub`), `pkg` -> (`pkg`, `.`).
pub fn split_package_specifier(specifier: &str) -> (&str, String) {
  let mut parts = specifier.splitn(3, '/');
  let first = parts.next().unwrap_or_default();
  let name_len = if first.starts_with('@') {
    first.len() + parts.next().map_or(0, |p| p.len() + 1)
  } else {
    first.len()
  };
  let name = &specifier[..name_len.min(specifier.len())];
  let rest = &specifier[name.len()..];
  let subpath = if rest.is_empty() { ".".to_string() } else { format!(".{rest}") };
  (name, subpath)
}

/// Find `node_modules/<name>` walking upward from `from`.
pub fn find_package_dir(from: &Path, name: &str) -> Option<PathBuf> {
  from.ancestors().map(|dir| dir.join("node_modules").join(name)).find(|dir| dir.is_dir())
}

impl PackageJson {
  pub fn is_esm(&self) -> bool {
    self.module_type.as_deref() == Some("module")
  }

  /// Resolve `subpath` through the `exports` map. `None` when the package has
  /// no `exports` field or no entry matches.
  pub fn resolve_exports(&self, subpath: &str, conditions: &[&str]) -> Option<String> {
    let exports = self.exports.as_ref()?;
    let target = match exports {
      Value::Object(map) if map.keys().any(|k| k.starts_with('.')) => subpath_target(map, subpath)?,
      _ if subpath == "." => (exports.clone(), None),
      _ => return None,
    };
    resolve_target(&target.0, conditions, target.1.as_deref())
  }

  /// Package entry through the platform's main fields, relative to `dir`.
  pub fn main_entry(&self, platform: Platform) -> Option<String> {
    platform.main_fields().iter().find_map(|field| match *field {
      "browser" => match &self.browser {
        Some(BrowserField::Entry(entry)) => Some(entry.clone()),
        _ => None,
      },
      "module" => self.module.clone(),
      "main" => self.main.clone(),
      _ => None,
    })
  }

  /// Look up a resolved file in the `browser` replacement map.
  pub fn browser_mapping(&self, file: &Path) -> Option<BrowserMapping> {
    let Some(BrowserField::Map(map)) = &self.browser else {
      return None;
    };
    let rel = file.strip_prefix(&self.dir).ok()?.to_string_lossy().replace('\\', "/");
    let candidates = [format!("./{rel}"), rel.clone(), strip_js_ext(&format!("./{rel}")), strip_js_ext(&rel)];
    let value = candidates.iter().find_map(|c| map.get(c))?;
    match value {
      Value::Bool(false) => Some(BrowserMapping::Empty),
      Value::String(target) => Some(BrowserMapping::Replace(normalize(&self.dir.join(target)))),
      _ => None,
    }
  }

  /// Whether importing `subpath` from CommonJS is possible through a
  /// `require` export condition.
  pub fn has_require_condition(&self, subpath: &str) -> bool {
    let Some(Value::Object(exports)) = &self.exports else {
      return false;
    };
    let has_require = |v: Option<&Value>| v.and_then(Value::as_object).is_some_and(|o| o.contains_key("require"));
    if subpath == "." {
      exports.contains_key("require") || has_require(exports.get("."))
    } else {
      has_require(exports.get(subpath))
    }
  }
}

fn strip_js_ext(path: &str) -> String {
  path.strip_suffix(".js").unwrap_or(path).to_string()
}

/// Lexically normalize `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      std::path::Component::CurDir => {}
      std::path::Component::ParentDir => {
        out.pop();
      }
      other => out.push(other.as_os_str()),
    }
  }
  out
}

/// Exact key first, then the longest `*` pattern. Returns the target and the
/// text matched by `*`.
fn subpath_target(map: &Map<String, Value>, subpath: &str) -> Option<(Value, Option<String>)> {
  if let Some(v) = map.get(subpath) {
    return Some((v.clone(), None));
  }
  map
    .iter()
    .filter_map(|(key, v)| {
      let (prefix, suffix) = key.split_once('*')?;
      let middle = subpath.strip_prefix(prefix)?.strip_suffix(suffix)?;
      Some((prefix.len(), v, middle))
    })
    .max_by_key(|(len, _, _)| *len)
    .map(|(_, v, middle)| (v.clone(), Some(middle.to_string())))
}

/// Walk a target: strings resolve, arrays take the first hit, condition
/// objects are tried in the platform's condition order with `default` last.
fn resolve_target(target: &Value, conditions: &[&str], star: Option<&str>) -> Option<String> {
  match target {
    Value::String(s) => Some(match star {
      Some(m) => s.replace('*', m),
      None => s.clone(),
    }),
    Value::Array(items) => items.iter().find_map(|item| resolve_target(item, conditions, star)),
    Value::Object(map) => conditions
      .iter()
      .copied()
      .chain(std::iter::once("default"))
      .filter_map(|condition| map.get(condition))
      .find_map(|v| resolve_target(v, conditions, star)),
    _ => None,
  }
}
