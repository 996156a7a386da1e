//! Processing Queue
//!
//! Serializes style requests to a single worker. The queue is an actor: the
//! public [`CssProcessor`] only sends commands, while a driver thread owns
//! the FIFO of pending tasks, the state machine and the worker link.
//!
//! - At most one request is in flight; the next task is dispatched only
//!   after the head settles.
//! - Changes wait until the worker has acknowledged `init`.
//! - Results resolve in submission order.
//! - A timed-out change keeps running on the worker. When its reply turns
//!   up late, its rule changes are carried into the next successful result
//!   so the live sheet catches up with the worker.

use std::collections::{HashSet, VecDeque};
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use smol::channel::{self, Receiver, Sender};
use smol::future::{self, FutureExt};
use smol::Timer;

use weft_css::{ProcessingResult, RuleChange, StyleChange, StyleOverrides};

use crate::config::ProcessorConfig;
use crate::protocol::{WorkerLink, WorkerReply, WorkerRequest, WorkerSpawner};
use crate::worker::StyleWorker;
use crate::{PipelineError, TaskId};

type TaskResult = Result<ProcessingResult, PipelineError>;

/// Queue state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Worker spawned, no `init` acknowledged
    Uninitialized,
    /// `init` queued or in flight
    Initializing,
    /// Worker acknowledged `init`; changes are dispatched
    Ready,
}

/// Point-in-time view of the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub state: QueueState,
    /// Tasks not yet settled, including the in-flight one
    pub pending: usize,
    /// Task whose request the worker currently holds
    pub in_flight: Option<TaskId>,
}

/// Handle to a task's eventual result
///
/// Settles exactly once. Await it, or block on it with [`Deferred::wait`].
#[must_use = "a Deferred does nothing unless awaited"]
#[derive(Debug)]
pub struct Deferred {
    id: TaskId,
    receiver: Receiver<TaskResult>,
}

impl Deferred {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Block the current thread until the task settles
    pub fn wait(self) -> TaskResult {
        smol::block_on(self.into_future())
    }
}

impl IntoFuture for Deferred {
    type Output = TaskResult;
    type IntoFuture = Pin<Box<dyn Future<Output = TaskResult> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        async move {
            self.receiver
                .recv()
                .await
                .unwrap_or(Err(PipelineError::Closed))
        }
        .boxed()
    }
}

enum Command {
    Init {
        id: TaskId,
        css: String,
        overrides: StyleOverrides,
        reply: Sender<TaskResult>,
    },
    Change {
        id: TaskId,
        change: StyleChange,
        overrides: StyleOverrides,
        reply: Sender<TaskResult>,
    },
    Snapshot(Sender<QueueSnapshot>),
    Shutdown,
}

/// Ordered style processing queue bound to one worker
pub struct CssProcessor {
    commands: Sender<Command>,
    next_id: AtomicU64,
    driver: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for CssProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CssProcessor")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("running", &self.driver.is_some())
            .finish()
    }
}

impl CssProcessor {
    /// Queue backed by the default [`StyleWorker`]
    pub fn new(config: ProcessorConfig) -> Result<Self, PipelineError> {
        let spawner = Arc::new(StyleWorker::new(config.worker_thread_name.clone()));
        Self::with_spawner(config, spawner)
    }

    /// Queue backed by a custom worker; the first worker is spawned now
    pub fn with_spawner(
        config: ProcessorConfig,
        spawner: Arc<dyn WorkerSpawner>,
    ) -> Result<Self, PipelineError> {
        let link = spawner.spawn()?;
        let (commands, command_rx) = channel::unbounded();

        let driver = Driver {
            config,
            spawner,
            state: QueueState::Uninitialized,
            pending: VecDeque::new(),
            in_flight: None,
            link: Some(link),
            timed_out: HashSet::new(),
            carried: Vec::new(),
        };

        let handle = thread::Builder::new()
            .name("weft-css-processor".to_string())
            .spawn(move || driver.run(command_rx))
            .map_err(|e| PipelineError::Spawn(e.to_string()))?;

        Ok(Self {
            commands,
            next_id: AtomicU64::new(1),
            driver: Some(handle),
        })
    }

    /// Load a baseline stylesheet and override snapshot
    ///
    /// Calling this again cancels every pending task and starts over.
    pub fn initialize(&self, css: impl Into<String>, overrides: StyleOverrides) -> Deferred {
        let id = self.next_task_id();
        let (reply, receiver) = channel::bounded(1);
        self.send(Command::Init {
            id,
            css: css.into(),
            overrides,
            reply,
        });
        Deferred { id, receiver }
    }

    /// Queue one edit; it is dispatched once every earlier task has settled
    pub fn process_change(&self, change: StyleChange, overrides: StyleOverrides) -> Deferred {
        let id = self.next_task_id();
        let (reply, receiver) = channel::bounded(1);
        self.send(Command::Change {
            id,
            change,
            overrides,
            reply,
        });
        Deferred { id, receiver }
    }

    /// Current queue state, after every command sent before this call
    pub async fn snapshot(&self) -> Result<QueueSnapshot, PipelineError> {
        let (reply, receiver) = channel::bounded(1);
        self.commands
            .try_send(Command::Snapshot(reply))
            .map_err(|_| PipelineError::Closed)?;
        receiver.recv().await.map_err(|_| PipelineError::Closed)
    }

    /// Reject remaining tasks with [`PipelineError::Closed`] and stop the
    /// driver
    pub fn shutdown(&mut self) {
        let _ = self.commands.try_send(Command::Shutdown);
        if let Some(handle) = self.driver.take()
            && handle.join().is_err()
        {
            tracing::warn!("Style processor driver panicked");
        }
    }

    fn next_task_id(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn send(&self, command: Command) {
        // A dropped command drops its reply sender, which settles the
        // deferred with `Closed`
        if self.commands.try_send(command).is_err() {
            tracing::debug!("Style processor is closed; task rejected");
        }
    }
}

impl Drop for CssProcessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskKind {
    Init,
    Change,
}

struct PendingTask {
    id: TaskId,
    kind: TaskKind,
    /// Taken when dispatched
    request: Option<WorkerRequest>,
    reply: Sender<TaskResult>,
}

impl PendingTask {
    fn settle(self, result: TaskResult) {
        if let Err(e) = &result {
            tracing::debug!("Task {} rejected: {}", self.id, e);
        }
        // The caller may have dropped its Deferred
        let _ = self.reply.try_send(result);
    }
}

struct InFlight {
    id: TaskId,
    deadline: Option<Instant>,
}

enum Event {
    Command(Option<Command>),
    Reply(Option<WorkerReply>),
    Timeout,
}

struct Driver {
    config: ProcessorConfig,
    spawner: Arc<dyn WorkerSpawner>,
    state: QueueState,
    pending: VecDeque<PendingTask>,
    in_flight: Option<InFlight>,
    link: Option<WorkerLink>,
    /// Changes rejected by timeout whose reply has not arrived yet
    timed_out: HashSet<TaskId>,
    /// Rule changes from late replies, not yet delivered
    carried: Vec<RuleChange>,
}

impl Driver {
    fn run(mut self, commands: Receiver<Command>) {
        smol::block_on(async {
            loop {
                match self.next_event(&commands).await {
                    Event::Command(None) | Event::Command(Some(Command::Shutdown)) => break,
                    Event::Command(Some(command)) => self.on_command(command),
                    Event::Reply(Some(reply)) => self.on_reply(reply),
                    Event::Reply(None) => self.on_terminated(),
                    Event::Timeout => self.on_timeout(),
                }
                self.dispatch();
            }
        });

        self.reject_all(|_| PipelineError::Closed);
        self.link = None;
        tracing::debug!("Style processor stopped");
    }

    /// Replies win over timers, timers over new commands
    async fn next_event(&self, commands: &Receiver<Command>) -> Event {
        let reply = async {
            match &self.link {
                Some(link) => Event::Reply(link.replies.recv().await.ok()),
                None => future::pending().await,
            }
        };
        let timeout = async {
            match self.in_flight.as_ref().and_then(|flight| flight.deadline) {
                Some(deadline) => {
                    Timer::at(deadline).await;
                    Event::Timeout
                }
                None => future::pending().await,
            }
        };
        let command = async { Event::Command(commands.recv().await.ok()) };

        reply.or(timeout).or(command).await
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Init {
                id,
                css,
                overrides,
                reply,
            } => {
                if self.state != QueueState::Uninitialized {
                    tracing::info!(
                        "Re-initializing style processor; cancelling {} pending tasks",
                        self.pending.len()
                    );
                    self.reject_all(|id| PipelineError::Cancelled { id });
                }
                self.forget_late_replies();
                if self.link.is_none() {
                    self.respawn();
                }

                self.state = QueueState::Initializing;
                self.pending.push_front(PendingTask {
                    id,
                    kind: TaskKind::Init,
                    request: Some(WorkerRequest::Init { id, css, overrides }),
                    reply,
                });
                tracing::debug!("Queued init task {}", id);
            }
            Command::Change {
                id,
                change,
                overrides,
                reply,
            } => {
                if self.state == QueueState::Uninitialized {
                    tracing::debug!("Parking task {} until the worker is initialized", id);
                }
                self.pending.push_back(PendingTask {
                    id,
                    kind: TaskKind::Change,
                    request: Some(WorkerRequest::Change {
                        id,
                        change,
                        overrides,
                    }),
                    reply,
                });
            }
            Command::Snapshot(reply) => {
                let _ = reply.try_send(QueueSnapshot {
                    state: self.state,
                    pending: self.pending.len(),
                    in_flight: self.in_flight.as_ref().map(|flight| flight.id),
                });
            }
            Command::Shutdown => {}
        }
    }

    /// Send the head request if nothing is in flight and the head may go
    fn dispatch(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        let Some(head) = self.pending.front_mut() else {
            return;
        };
        let sendable = match head.kind {
            TaskKind::Init => true,
            TaskKind::Change => self.state == QueueState::Ready,
        };
        if !sendable {
            return;
        }
        let Some(link) = &self.link else {
            tracing::warn!("No style worker available for task {}", head.id);
            self.reject_all(|id| PipelineError::WorkerTerminated { id });
            self.state = QueueState::Uninitialized;
            return;
        };
        let Some(request) = head.request.take() else {
            return;
        };

        let id = head.id;
        if link.requests.try_send(request).is_err() {
            self.on_terminated();
            return;
        }
        self.in_flight = Some(InFlight {
            id,
            deadline: self.config.task_timeout.map(|after| Instant::now() + after),
        });
        tracing::debug!("Dispatched task {}", id);
    }

    fn on_reply(&mut self, reply: WorkerReply) {
        let id = reply.id();
        if self.in_flight.as_ref().is_some_and(|flight| flight.id == id) {
            self.in_flight = None;
        }

        if !self.pending.front().is_some_and(|head| head.id == id) {
            self.on_late_reply(reply);
            return;
        }
        let Some(task) = self.pending.pop_front() else {
            return;
        };

        match (task.kind, reply) {
            (TaskKind::Init, WorkerReply::Initialized { result, .. }) => {
                self.state = QueueState::Ready;
                tracing::info!(
                    "Style worker initialized; {} tasks waiting",
                    self.pending.len()
                );
                task.settle(Ok(result));
            }
            (TaskKind::Change, WorkerReply::Processed { mut result, .. }) => {
                self.fold_carried(&mut result);
                task.settle(Ok(result));
            }
            (kind, WorkerReply::Failed { message, .. }) => {
                tracing::warn!("Task {} failed in the style worker: {}", id, message);
                task.settle(Err(PipelineError::Worker { id, message }));
                if kind == TaskKind::Init {
                    self.abandon_initialization();
                }
            }
            (kind, other) => {
                let answer = match other {
                    WorkerReply::Initialized { .. } => "initialized",
                    WorkerReply::Processed { .. } => "processed",
                    WorkerReply::Failed { .. } => "failed",
                };
                let message = format!("{:?} task answered with a `{}` reply", kind, answer);
                tracing::warn!("Task {}: {}", id, message);
                task.settle(Err(PipelineError::Worker { id, message }));
                if kind == TaskKind::Init {
                    self.abandon_initialization();
                }
            }
        }
    }

    /// Reply for a task that is no longer at the head
    fn on_late_reply(&mut self, reply: WorkerReply) {
        let id = reply.id();
        let timed_out = self.timed_out.remove(&id);
        match reply {
            WorkerReply::Processed { result, .. } if timed_out => {
                tracing::warn!(
                    "Late reply for timed out task {}; carrying {} rule changes forward",
                    id,
                    result.changes.len()
                );
                self.carried.extend(result.changes);
            }
            _ => tracing::warn!("Discarding reply for task {}: no longer pending", id),
        }
    }

    /// Put carried rule changes ahead of `result`'s own
    fn fold_carried(&mut self, result: &mut ProcessingResult) {
        if self.carried.is_empty() {
            return;
        }
        let mut changes: Vec<RuleChange> = self
            .carried
            .drain(..)
            .filter(|old| !result.changes.iter().any(|new| new.selector == old.selector))
            .collect();
        changes.append(&mut result.changes);
        result.changes = changes;
    }

    /// The live sheet is rebuilt from scratch after this, so late work is moot
    fn forget_late_replies(&mut self) {
        self.timed_out.clear();
        self.carried.clear();
    }

    fn on_timeout(&mut self) {
        let Some(flight) = self.in_flight.take() else {
            return;
        };
        let after = self.config.task_timeout.unwrap_or_default();

        if !self.pending.front().is_some_and(|head| head.id == flight.id) {
            tracing::debug!("In-flight task {} already settled; freeing the slot", flight.id);
            return;
        }
        let Some(task) = self.pending.pop_front() else {
            return;
        };

        tracing::warn!("Task {} timed out after {:?}", flight.id, after);
        let kind = task.kind;
        if kind == TaskKind::Change {
            self.timed_out.insert(flight.id);
        }
        task.settle(Err(PipelineError::Timeout {
            id: flight.id,
            after,
        }));
        if kind == TaskKind::Init {
            self.abandon_initialization();
        }
    }

    fn on_terminated(&mut self) {
        tracing::warn!(
            "Style worker terminated; rejecting {} pending tasks",
            self.pending.len()
        );
        self.link = None;
        self.in_flight = None;
        self.forget_late_replies();
        self.reject_all(|id| PipelineError::WorkerTerminated { id });
        self.state = QueueState::Uninitialized;

        if self.config.respawn_on_crash {
            self.respawn();
        }
    }

    /// Back to Uninitialized; changes queued behind the failed init go too
    fn abandon_initialization(&mut self) {
        self.state = QueueState::Uninitialized;
        self.reject_all(|id| PipelineError::NotInitialized { id });
    }

    fn respawn(&mut self) {
        match self.spawner.spawn() {
            Ok(link) => {
                tracing::info!("Started a new style worker");
                self.link = Some(link);
            }
            Err(e) => tracing::error!("{}", e),
        }
    }

    fn reject_all(&mut self, error: impl Fn(TaskId) -> PipelineError) {
        for task in self.pending.drain(..) {
            let e = error(task.id);
            task.settle(Err(e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_closed_when_sender_dropped() {
        let (reply, receiver) = channel::bounded::<TaskResult>(1);
        drop(reply);
        let deferred = Deferred {
            id: TaskId(1),
            receiver,
        };
        assert_eq!(deferred.wait(), Err(PipelineError::Closed));
    }

    #[test]
    fn test_task_ids_increase() {
        let processor = CssProcessor::new(ProcessorConfig::default()).unwrap();
        let first = processor.process_change(
            StyleChange::set_property(".a", "color", "red"),
            StyleOverrides::new(),
        );
        let second = processor.initialize("", StyleOverrides::new());
        assert!(first.id() < second.id());
    }

    #[test]
    fn test_shutdown_rejects_parked_tasks() {
        let mut processor = CssProcessor::new(ProcessorConfig::default()).unwrap();
        let parked = processor.process_change(
            StyleChange::set_property(".a", "color", "red"),
            StyleOverrides::new(),
        );
        processor.shutdown();
        assert_eq!(parked.wait(), Err(PipelineError::Closed));

        let late = processor.initialize("", StyleOverrides::new());
        assert_eq!(late.wait(), Err(PipelineError::Closed));
    }
}
