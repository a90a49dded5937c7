/* src/cli/core/src/watch.rs */

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use anyhow::{Context, Result};
use ridge_compiler::{BuildMode, BuildOutcome, CompileError, WatchObserver, WatchOptions, watch};
use tokio::signal;

use crate::ui::{self, Status};

/// Prints every watch event; the started-at slot times each cycle.
struct TerminalObserver {
  root: PathBuf,
  started: Mutex<Option<Instant>>,
}

impl TerminalObserver {
  fn file_event(&self, kind: char, path: &Path) {
    ui::file_event(kind, path.strip_prefix(&self.root).unwrap_or(path));
  }
}

impl WatchObserver for TerminalObserver {
  fn rebuild_start(&self) {
    *self.started.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    ui::status(Status::Working, "rebuilding...");
  }

  fn rebuild_finish(&self, result: &Result<BuildOutcome, CompileError>) {
    let elapsed = self
      .started
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take()
      .map_or(0.0, |at| at.elapsed().as_secs_f64());
    match result {
      Ok(outcome) => {
        ui::status(
          Status::Done,
          &format!("rebuild complete ({elapsed:.1}s), manifest {}", outcome.manifest.version),
        );
        for warning in &outcome.warnings {
          ui::status(Status::Warning, &warning.message);
        }
      }
      Err(e) => ui::status(Status::Failed, &format!("rebuild failed\n{e}")),
    }
  }

  fn file_created(&self, path: &Path) {
    self.file_event('+', path);
  }

  fn file_changed(&self, path: &Path) {
    self.file_event('~', path);
  }

  fn file_deleted(&self, path: &Path) {
    self.file_event('-', path);
  }
}

pub async fn run_watch(root: &Path, mode: BuildMode) -> Result<()> {
  ui::heading("watch");
  let root = root.canonicalize().with_context(|| format!("failed to resolve {}", root.display()))?;
  let observer = TerminalObserver { root: root.clone(), started: Mutex::new(None) };
  let options = WatchOptions { mode, ..WatchOptions::default() };
  let handle = watch(&root, options, Arc::new(observer)).context("failed to start watching")?;
  ui::note(&format!("watching {}, press Ctrl+C to stop", root.display()));

  signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;
  ui::note("shutting down...");
  handle.close().await;
  Ok(())
}
