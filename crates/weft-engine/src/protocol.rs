//! Worker Protocol
//!
//! Messages exchanged with the style worker. Every message carries the
//! [`TaskId`] of the task it belongs to, so replies are matched by id
//! rather than by queue position.

use serde::{Deserialize, Serialize};
use smol::channel::{self, Receiver, Sender};

use weft_css::{ProcessingResult, StyleChange, StyleOverrides};

use crate::{PipelineError, TaskId};

/// Queue -> worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Load the baseline stylesheet and overrides
    Init {
        id: TaskId,
        css: String,
        overrides: StyleOverrides,
    },
    /// Apply one edit against an override snapshot
    Change {
        id: TaskId,
        change: StyleChange,
        overrides: StyleOverrides,
    },
}

impl WorkerRequest {
    pub fn id(&self) -> TaskId {
        match self {
            WorkerRequest::Init { id, .. } | WorkerRequest::Change { id, .. } => *id,
        }
    }
}

/// Worker -> queue, exactly one per request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerReply {
    /// Baseline loaded; `result` carries every rule block
    Initialized { id: TaskId, result: ProcessingResult },
    Processed { id: TaskId, result: ProcessingResult },
    Failed { id: TaskId, message: String },
}

impl WorkerReply {
    pub fn id(&self) -> TaskId {
        match self {
            WorkerReply::Initialized { id, .. }
            | WorkerReply::Processed { id, .. }
            | WorkerReply::Failed { id, .. } => *id,
        }
    }
}

/// Queue side of a worker connection
///
/// The worker counts as terminated once `replies` is closed.
#[derive(Debug)]
pub struct WorkerLink {
    pub requests: Sender<WorkerRequest>,
    pub replies: Receiver<WorkerReply>,
}

/// Worker side of a worker connection
#[derive(Debug)]
pub struct WorkerEndpoint {
    pub requests: Receiver<WorkerRequest>,
    pub replies: Sender<WorkerReply>,
}

impl WorkerLink {
    /// Connected link/endpoint pair
    pub fn channel() -> (WorkerLink, WorkerEndpoint) {
        let (request_tx, request_rx) = channel::unbounded();
        let (reply_tx, reply_rx) = channel::unbounded();
        (
            WorkerLink {
                requests: request_tx,
                replies: reply_rx,
            },
            WorkerEndpoint {
                requests: request_rx,
                replies: reply_tx,
            },
        )
    }
}

/// Starts workers for the processing queue
pub trait WorkerSpawner: Send + Sync + 'static {
    fn spawn(&self) -> Result<WorkerLink, PipelineError>;
}
