//! Process-wide cell holding the currently active servers configuration.
//!
//! The cell is written by the startup load and by the file watcher, and
//! read by every request handler. Handlers capture the `Arc` once at entry
//! and keep it for the whole exchange, so a reload never tears the routing
//! state out from under an in-flight request; superseded configurations are
//! dropped when their last request completes.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::routing::servers::ServersConfig;

static CURRENT: ArcSwapOption<ServersConfig> = ArcSwapOption::const_empty();

/// The active configuration, or `None` before the first successful load.
pub fn current() -> Option<Arc<ServersConfig>> {
    CURRENT.load_full()
}

/// Atomically replaces the active configuration.
pub fn publish(config: ServersConfig) {
    log::info!("activating servers configuration {}", config.version());
    CURRENT.store(Some(Arc::new(config)));
}
