//! Engine Configuration

use std::time::Duration;

/// Processing queue options
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Deadline for one worker round trip; `None` waits forever
    pub task_timeout: Option<Duration>,

    /// Spawn a fresh worker as soon as the current one terminates.
    /// When off, the next `initialize` spawns it.
    pub respawn_on_crash: bool,

    /// Thread name of the default style worker
    pub worker_thread_name: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            task_timeout: Some(Duration::from_secs(30)),
            respawn_on_crash: true,
            worker_thread_name: "weft-style-worker".to_string(),
        }
    }
}

/// Pipeline options
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub processor: ProcessorConfig,
}
