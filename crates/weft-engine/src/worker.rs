//! Style Worker
//!
//! Default worker: a dedicated OS thread that owns a [`StyleModel`] and
//! answers requests strictly in the order they arrive.

use std::thread;

use weft_css::StyleModel;

use crate::protocol::{WorkerEndpoint, WorkerLink, WorkerReply, WorkerRequest, WorkerSpawner};
use crate::PipelineError;

/// Spawns [`StyleModel`] workers on named threads
#[derive(Debug, Clone)]
pub struct StyleWorker {
    thread_name: String,
}

impl StyleWorker {
    pub fn new(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
        }
    }
}

impl Default for StyleWorker {
    fn default() -> Self {
        Self::new("weft-style-worker")
    }
}

impl WorkerSpawner for StyleWorker {
    fn spawn(&self) -> Result<WorkerLink, PipelineError> {
        let (link, endpoint) = WorkerLink::channel();
        thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || run(endpoint))
            .map_err(|e| PipelineError::Spawn(e.to_string()))?;
        tracing::info!("Spawned style worker thread `{}`", self.thread_name);
        Ok(link)
    }
}

fn run(endpoint: WorkerEndpoint) {
    let mut model = StyleModel::new();

    while let Ok(request) = endpoint.requests.recv_blocking() {
        let reply = handle(&mut model, request);
        if endpoint.replies.send_blocking(reply).is_err() {
            break;
        }
    }

    tracing::debug!("Style worker exiting");
}

fn handle(model: &mut StyleModel, request: WorkerRequest) -> WorkerReply {
    match request {
        WorkerRequest::Init { id, css, overrides } => match model.initialize(&css, overrides) {
            Ok(result) => WorkerReply::Initialized { id, result },
            Err(e) => WorkerReply::Failed {
                id,
                message: e.to_string(),
            },
        },
        WorkerRequest::Change {
            id,
            change,
            overrides,
        } => {
            tracing::debug!("Worker processing {} change for `{}`", change.kind, change.selector);
            match model.process(&change, overrides) {
                Ok(result) => WorkerReply::Processed { id, result },
                Err(e) => WorkerReply::Failed {
                    id,
                    message: e.to_string(),
                },
            }
        }
    }
}
