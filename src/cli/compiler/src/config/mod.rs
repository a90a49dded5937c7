/* src/cli/compiler/src/config/mod.rs */

mod loader;
mod routes;
mod types;

#[cfg(test)]
mod tests;

pub use loader::{CONFIG_FILE, find_config, load_ridge_toml, read_config};
pub use routes::{ROUTE_MODULE_EXTENSIONS, create_route_path};
pub use types::{
  AppConfig, AppSection, BuildMode, BundlePattern, ManualRoute, RidgeToml, ServerBuildTarget,
};
