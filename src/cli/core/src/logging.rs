/* src/cli/core/src/logging.rs */

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `RIDGE_LOG=ridge_compiler=debug`.
pub const LOG_ENV: &str = "RIDGE_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber. Library events go to stderr so they never
/// mix with machine-readable stdout.
pub fn init() {
  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_writer(std::io::stderr)
    .try_init();
}
