/* src/server/core/rust/src/assets.rs */

// Server-side model of the assets manifest the compiler writes as
// `assets.json` next to the server bundle.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::RidgeError;
use crate::route::RouteDef;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryAssets {
  pub module: String,
  #[serde(default)]
  pub imports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRoute {
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub index: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub case_sensitive: Option<bool>,
  pub module: String,
  #[serde(default)]
  pub imports: Vec<String>,
  pub has_loader: bool,
  pub has_action: bool,
  pub has_catch_boundary: bool,
  pub has_error_boundary: bool,
}

impl ManifestRoute {
  pub fn to_def(&self) -> RouteDef {
    RouteDef {
      id: self.id.clone(),
      parent_id: self.parent_id.clone(),
      path: self.path.clone(),
      index: self.index.unwrap_or(false),
      case_sensitive: self.case_sensitive.unwrap_or(false),
      file: self.module.clone(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetsManifest {
  pub version: String,
  pub url: String,
  pub entry: EntryAssets,
  pub routes: BTreeMap<String, ManifestRoute>,
}

/// Read the server copy of the assets manifest.
pub fn load_assets_manifest(path: &Path) -> Result<AssetsManifest, RidgeError> {
  let content = std::fs::read_to_string(path).map_err(|e| {
    RidgeError::invalid_manifest(format!("failed to read {}: {e}", path.display()))
  })?;
  serde_json::from_str(&content).map_err(|e| {
    RidgeError::invalid_manifest(format!("failed to parse {}: {e}", path.display()))
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE: &str = r#"{
    "version": "1a2b3c4d",
    "url": "/build/manifest-1A2B3C4D.js",
    "entry": { "module": "/build/entry.client-AAAA0000.js", "imports": ["/build/_shared/chunk-BBBB1111.js"] },
    "routes": {
      "root": {
        "id": "root", "path": "", "module": "/build/root-CCCC2222.js", "imports": [],
        "hasLoader": true, "hasAction": false, "hasCatchBoundary": true, "hasErrorBoundary": true
      },
      "routes/index": {
        "id": "routes/index", "parentId": "root", "index": true,
        "module": "/build/routes/index-DDDD3333.js",
        "hasLoader": false, "hasAction": false, "hasCatchBoundary": false, "hasErrorBoundary": false
      }
    }
  }"#;

  #[test]
  fn loads_manifest_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("assets.json");
    std::fs::write(&path, SAMPLE).unwrap();

    let manifest = load_assets_manifest(&path).unwrap();
    assert_eq!(manifest.version, "1a2b3c4d");
    assert_eq!(manifest.entry.imports.len(), 1);
    let index = manifest.routes["routes/index"].to_def();
    assert!(index.index);
    assert_eq!(index.parent_id.as_deref(), Some("root"));
    assert_eq!(index.path, None);
  }

  #[test]
  fn missing_file_is_invalid_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_assets_manifest(&dir.path().join("nope.json")).unwrap_err();
    assert_eq!(err.code(), "INVALID_MANIFEST");
  }

  #[test]
  fn malformed_json_is_invalid_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("assets.json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = load_assets_manifest(&path).unwrap_err();
    assert!(err.message().contains("failed to parse"));
  }
}
