//! Configuration types.

use std::time::Duration;

/// Flow controller configuration.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Quiet period after the last field edit before the background
    /// auto-save fires.
    pub autosave_debounce: Duration,
    /// Quiet period after the last keystroke before the username
    /// availability probe fires.
    pub username_check_debounce: Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            autosave_debounce: Duration::from_millis(800),
            username_check_debounce: Duration::from_millis(400),
        }
    }
}
