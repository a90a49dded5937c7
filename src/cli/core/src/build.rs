/* src/cli/core/src/build.rs */

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use ridge_compiler::{AppConfig, BuildMode, BuildOutcome, read_config};

use crate::ui::{self, Status};

fn relative<'a>(config: &AppConfig, path: &'a Path) -> std::borrow::Cow<'a, str> {
  path.strip_prefix(&config.root_directory).unwrap_or(path).to_string_lossy()
}

fn print_outcome(config: &AppConfig, outcome: &BuildOutcome) {
  let mut outputs: Vec<_> = outcome.browser.outputs.iter().chain(&outcome.server.outputs).collect();
  outputs.sort_by(|a, b| a.path.cmp(&b.path));
  for output in outputs {
    ui::output_file(&relative(config, &output.path), output.contents.len());
  }
  ui::status(
    Status::Done,
    &format!(
      "manifest {} ({} routes) at {}",
      outcome.manifest.version,
      outcome.manifest.routes.len(),
      relative(config, &outcome.manifest_files.browser)
    ),
  );
  for warning in &outcome.warnings {
    ui::status(Status::Warning, &warning.message);
  }
}

pub async fn run_build(root: &Path, mode: BuildMode) -> Result<()> {
  ui::heading("build");
  let started = Instant::now();
  let config = read_config(root).with_context(|| format!("failed to read project at {}", root.display()))?;
  let config = Arc::new(config);
  ui::status(
    Status::Working,
    &format!(
      "building {} routes, {} mode, target {}",
      config.routes.len(),
      mode.as_str(),
      config.server_build_target.as_str()
    ),
  );

  let outcome = ridge_compiler::build(Arc::clone(&config), mode).await.context("build failed")?;
  print_outcome(&config, &outcome);
  ui::summary(&format!("built in {:.1}s", started.elapsed().as_secs_f64()));
  Ok(())
}
