//! Hub configuration.

use std::time::Duration;

/// Settings for the hub actor.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Upper bound on each roster lookup and each bulk write during
    /// finalize. Exceeding it aborts the finalize with no mutation.
    pub store_timeout: Duration,

    /// Capacity of the actor's command channel. Callers wait when full.
    pub command_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            command_buffer: 256,
        }
    }
}
