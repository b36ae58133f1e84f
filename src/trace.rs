//! Console output for the simulation binaries.

use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Installs a global fmt subscriber. With `verbose` the cursor moves and
/// other debug events are printed too.
///
/// Fails if a global subscriber was already installed.
pub fn init_tracing(verbose: bool) -> Result<(), SetGlobalDefaultError> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}
