/* src/cli/compiler/src/error.rs */

use std::fmt;
use std::path::{Path, PathBuf};

use ridge_server::RidgeError;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
  #[error("config error: {0}")]
  Config(String),
  #[error("invalid routes: {0}")]
  Routes(#[from] RidgeError),
  #[error("{context}: {source}")]
  Io {
    context: String,
    #[source]
    source: std::io::Error,
  },
  #[error(transparent)]
  Build(#[from] BuildFailure),
  #[error("assets manifest: {0}")]
  Manifest(String),
  #[error("build context has been disposed")]
  Disposed,
  #[error("watch error: {0}")]
  Watch(#[from] notify::Error),
}

impl CompileError {
  pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
    Self::Io { context: context.into(), source }
  }

  pub fn read(path: &Path, source: std::io::Error) -> Self {
    Self::io(format!("failed to read {}", path.display()), source)
  }

  pub fn write(path: &Path, source: std::io::Error) -> Self {
    Self::io(format!("failed to write {}", path.display()), source)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
  pub file: PathBuf,
  pub line: usize,
  pub column: usize,
}

/// One bundler error, kept exactly as the bundler phrased it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
  pub text: String,
  pub location: Option<Location>,
}

impl Diagnostic {
  pub fn new(text: impl Into<String>) -> Self {
    Self { text: text.into(), location: None }
  }

  pub fn at(text: impl Into<String>, file: &Path, line: usize, column: usize) -> Self {
    Self { text: text.into(), location: Some(Location { file: file.to_path_buf(), line, column }) }
  }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.location {
      Some(loc) => write!(f, "{}:{}:{}: error: {}", loc.file.display(), loc.line, loc.column, self.text),
      None => write!(f, "error: {}", self.text),
    }
  }
}

/// A failed build. Nothing was written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
  pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for BuildFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Build failed with {} error{}:", self.diagnostics.len(), plural(self.diagnostics.len()))?;
    for diagnostic in &self.diagnostics {
      writeln!(f, "{diagnostic}")?;
    }
    Ok(())
  }
}

impl std::error::Error for BuildFailure {}

fn plural(n: usize) -> &'static str {
  if n == 1 { "" } else { "s" }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn failure_lists_every_diagnostic_verbatim() {
    let failure = BuildFailure {
      diagnostics: vec![
        Diagnostic::at("Could not resolve \"left-pad\"", Path::new("app/root.jsx"), 3, 17),
        Diagnostic::new("Unexpected end of file"),
      ],
    };
    let text = failure.to_string();
    assert!(text.starts_with("Build failed with 2 errors:"));
    assert!(text.contains("app/root.jsx:3:17: error: Could not resolve \"left-pad\""));
    assert!(text.contains("error: Unexpected end of file"));
  }
}
