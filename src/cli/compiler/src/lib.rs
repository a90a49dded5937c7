/* src/cli/compiler/src/lib.rs */

pub mod browser;
pub mod build;
pub mod bundler;
pub mod classify;
pub mod config;
pub mod error;
pub mod externals;
pub mod manifest;
pub mod markdown;
pub mod package;
pub mod scan;
mod scope;
pub mod server;
pub mod watch;

pub use build::{BuildOutcome, Builders, build};
pub use classify::{Classification, LoaderKind, VirtualKind, browser_view_source, classify};
pub use config::{AppConfig, BuildMode, ServerBuildTarget, find_config, read_config};
pub use error::{BuildFailure, CompileError, Diagnostic, Location};
pub use externals::{BuildWarning, ExternalDecision, WarningSink, resolve_external};
pub use manifest::{ManifestFiles, create_assets_manifest, write_assets_manifest};
pub use markdown::compile_markdown;
pub use watch::{CoalescingQueue, Trigger, WatchHandle, WatchObserver, WatchOptions, watch};
