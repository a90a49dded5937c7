/* src/cli/core/src/main.rs */

mod build;
mod logging;
mod routes;
mod ui;
mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ridge_compiler::{BuildMode, find_config};

#[derive(Parser)]
#[command(name = "ridge", about = "ridge web framework CLI", version)]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Build the browser bundle, the server bundle and the assets manifest
  Build {
    /// Project directory (auto-detected from ridge.toml if omitted)
    dir: Option<PathBuf>,
    /// production or development
    #[arg(short, long, default_value = "production")]
    mode: BuildMode,
  },
  /// Rebuild whenever files in the app directory change
  Watch {
    /// Project directory (auto-detected from ridge.toml if omitted)
    dir: Option<PathBuf>,
    /// production or development
    #[arg(short, long, default_value = "development")]
    mode: BuildMode,
  },
  /// Print the route tree
  Routes {
    /// Project directory (auto-detected from ridge.toml if omitted)
    dir: Option<PathBuf>,
    /// Print the route definitions as JSON
    #[arg(long)]
    json: bool,
  },
}

/// Explicit directory, else the nearest ancestor holding ridge.toml, else cwd.
fn resolve_root(explicit: Option<PathBuf>) -> Result<PathBuf> {
  if let Some(dir) = explicit {
    return Ok(dir);
  }
  let cwd = std::env::current_dir().context("failed to get cwd")?;
  Ok(find_config(&cwd).unwrap_or(cwd))
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  logging::init();

  match cli.command {
    Command::Build { dir, mode } => build::run_build(&resolve_root(dir)?, mode).await?,
    Command::Watch { dir, mode } => watch::run_watch(&resolve_root(dir)?, mode).await?,
    Command::Routes { dir, json } => routes::run_routes(&resolve_root(dir)?, json)?,
  }

  Ok(())
}
