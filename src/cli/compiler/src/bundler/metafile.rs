/* src/cli/compiler/src/bundler/metafile.rs */

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Build metadata in esbuild's metafile shape. Keys are `/`-separated paths
/// relative to the project root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metafile {
  pub inputs: BTreeMap<String, MetafileInput>,
  pub outputs: BTreeMap<String, MetafileOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetafileInput {
  pub bytes: usize,
  pub imports: Vec<MetafileImport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetafileImport {
  pub path: String,
  pub kind: String,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub external: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafileOutput {
  pub bytes: usize,
  pub imports: Vec<MetafileImport>,
  pub exports: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub entry_point: Option<String>,
  pub inputs: BTreeMap<String, MetafileOutputInput>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetafileOutputInput {
  pub bytes_in_output: usize,
}

impl Metafile {
  /// The output chunk built for the entry module `entry_point`.
  pub fn output_for_entry(&self, entry_point: &str) -> Option<(&str, &MetafileOutput)> {
    self
      .outputs
      .iter()
      .find(|(_, o)| o.entry_point.as_deref() == Some(entry_point))
      .map(|(k, o)| (k.as_str(), o))
  }
}
