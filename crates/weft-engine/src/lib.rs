//! Weft Engine
//!
//! Ordered, single in-flight processing of style edits on a background
//! worker, and the pipeline that applies each result to the live
//! stylesheet through the rule index.

mod config;
mod pipeline;
mod processor;
pub mod protocol;
mod worker;

pub use config::{PipelineConfig, ProcessorConfig};
pub use pipeline::{ApplyReport, RuleFailure, StylePipeline};
pub use processor::{CssProcessor, Deferred, QueueSnapshot, QueueState};
pub use protocol::{WorkerEndpoint, WorkerLink, WorkerReply, WorkerRequest, WorkerSpawner};
pub use worker::StyleWorker;

pub use weft_css::{ChangeKind, ProcessingResult, RuleChange, StyleChange, StyleOverrides};

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identifier assigned to every task at enqueue time, carried by the
/// worker messages that belong to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a task was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("Task {id} failed in the style worker: {message}")]
    Worker { id: TaskId, message: String },

    #[error("Task {id} timed out after {after:?}")]
    Timeout { id: TaskId, after: Duration },

    #[error("Style worker terminated before task {id} completed")]
    WorkerTerminated { id: TaskId },

    #[error("Task {id} was cancelled by re-initialization")]
    Cancelled { id: TaskId },

    #[error("Task {id} was dropped because initialization failed")]
    NotInitialized { id: TaskId },

    #[error("Style processor is shut down")]
    Closed,

    #[error("Failed to start style worker: {0}")]
    Spawn(String),
}
