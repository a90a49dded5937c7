/* src/cli/compiler/src/build.rs */

use std::sync::{Arc, PoisonError};

use ridge_server::AssetsManifest;
use tracing::debug;

use crate::browser::create_browser_build;
use crate::bundler::{BuildContext, BuildResult, write_atomic};
use crate::config::{AppConfig, BuildMode};
use crate::error::CompileError;
use crate::externals::{BuildWarning, WarningSink};
use crate::manifest::{ManifestFiles, create_assets_manifest, server_manifest_json, write_assets_manifest};
use crate::server::{ManifestSlot, create_server_build};

/// Everything one successful build produced. Files are already on disk.
#[derive(Debug)]
pub struct BuildOutcome {
  pub manifest: AssetsManifest,
  pub manifest_files: ManifestFiles,
  pub browser: BuildResult,
  pub server: BuildResult,
  /// Warnings first reported during this build.
  pub warnings: Vec<BuildWarning>,
}

/// The browser and server build handles for one config snapshot.
#[derive(Debug)]
pub struct Builders {
  config: Arc<AppConfig>,
  mode: BuildMode,
  browser: BuildContext,
  server: BuildContext,
  sink: Arc<WarningSink>,
  manifest_slot: ManifestSlot,
}

impl Builders {
  pub fn new(config: Arc<AppConfig>, mode: BuildMode) -> Result<Self, CompileError> {
    let sink = Arc::new(WarningSink::new());
    let manifest_slot = ManifestSlot::default();
    let browser = create_browser_build(&config, mode)?.writing(false);
    let server = create_server_build(&config, mode, &sink, &manifest_slot)?.writing(false);
    Ok(Self { config, mode, browser, server, sink, manifest_slot })
  }

  pub fn config(&self) -> &Arc<AppConfig> {
    &self.config
  }

  pub fn mode(&self) -> BuildMode {
    self.mode
  }

  /// Run both builds and the manifest. Nothing is written unless all three
  /// succeed; then the browser chunks land first, the manifest second and
  /// the server bundle last, so a server that sees the new bundle also finds
  /// every asset it references.
  pub async fn build(&self) -> Result<BuildOutcome, CompileError> {
    let seen = self.sink.warnings().len();
    let (browser, manifest, server) = if self.config.server_build_target.is_single_file() {
      let browser = self.browser.rebuild().await?;
      let manifest = create_assets_manifest(&self.config, &browser.metafile)?;
      *self.manifest_slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(server_manifest_json(&manifest)?);
      let server = self.server.rebuild().await?;
      (browser, manifest, server)
    } else {
      let (browser, server) = futures_util::try_join!(self.browser.rebuild(), self.server.rebuild())?;
      let manifest = create_assets_manifest(&self.config, &browser.metafile)?;
      (browser, manifest, server)
    };

    if self.browser.is_disposed() || self.server.is_disposed() {
      return Err(CompileError::Disposed);
    }
    for output in &browser.outputs {
      write_atomic(&output.path, &output.contents)?;
    }
    let manifest_files = write_assets_manifest(&self.config, &manifest)?;
    for output in &server.outputs {
      write_atomic(&output.path, &output.contents)?;
    }
    debug!(
      version = %manifest.version,
      browser_outputs = browser.outputs.len(),
      server_outputs = server.outputs.len(),
      "build complete"
    );

    let warnings = self.sink.warnings().split_off(seen);
    Ok(BuildOutcome { manifest, manifest_files, browser, server, warnings })
  }

  /// Make every later `build` fail. Safe to call while a build is running.
  pub fn dispose(&self) {
    self.browser.dispose();
    self.server.dispose();
  }

  pub fn is_disposed(&self) -> bool {
    self.browser.is_disposed()
  }
}

/// One-shot production or development build of the project `config` describes.
pub async fn build(config: Arc<AppConfig>, mode: BuildMode) -> Result<BuildOutcome, CompileError> {
  let builders = Builders::new(config, mode)?;
  let outcome = builders.build().await;
  builders.dispose();
  outcome
}
