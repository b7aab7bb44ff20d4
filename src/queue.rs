//! Contract for the asynchronous worker queue, plus an in-process implementation.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::intent::BeeKind;

/// Queue-assigned task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TaskId(String);

impl TaskId {
    /// Wraps a queue-provided id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scheduling priority of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work.
    Low,
    /// Default for new tasks.
    #[default]
    Normal,
    /// Used for chat-routed tasks, where a user is waiting.
    High,
    /// Ahead of everything else.
    Critical,
}

/// A request for a specialized bee.
#[derive(Debug, Clone, Serialize)]
pub struct SwarmTask {
    /// Free-text description, usually the user's prompt.
    pub description: String,
    /// Specialization that should handle the task.
    pub kind: BeeKind,
    /// Scheduling priority.
    pub priority: Priority,
    /// Who asked, if known.
    pub submitter: Option<String>,
    /// Opaque key/value data passed through to the worker.
    pub metadata: BTreeMap<String, String>,
}

impl SwarmTask {
    /// A task with normal priority and no metadata.
    pub fn new(description: impl Into<String>, kind: BeeKind) -> Self {
        Self {
            description: description.into(),
            kind,
            priority: Priority::Normal,
            submitter: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the submitter identity.
    pub fn with_submitter(mut self, submitter: impl Into<String>) -> Self {
        self.submitter = Some(submitter.into());
        self
    }

    /// Adds one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Lifecycle status of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted, not yet picked up by a worker.
    Pending,
    /// A worker is on it.
    Running,
    /// Finished; the update carries the result.
    Done,
    /// The worker gave up; the update carries the reason.
    Failed,
    /// Withdrawn before completion.
    Cancelled,
}

impl TaskStatus {
    /// Whether no further updates will follow.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed | TaskStatus::Cancelled)
    }
}

/// A status notification, with the worker's output once available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUpdate {
    /// New status.
    pub status: TaskStatus,
    /// Result on `Done`, reason on `Failed`/`Cancelled`.
    pub result: Option<String>,
}

impl TaskUpdate {
    /// An update with no payload.
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status,
            result: None,
        }
    }

    /// A `Done` update carrying `result`.
    pub fn done(result: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Done,
            result: Some(result.into()),
        }
    }

    /// A `Failed` update carrying `reason`.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            result: Some(reason.into()),
        }
    }
}

/// A live subscription to one task's status updates.
///
/// Dropping the subscription unsubscribes.
pub struct TaskSubscription {
    task_id: TaskId,
    updates: mpsc::UnboundedReceiver<TaskUpdate>,
    on_unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl TaskSubscription {
    /// Wraps a stream of updates. `on_unsubscribe` runs exactly once, when
    /// the subscription is dropped.
    pub fn new(
        task_id: TaskId,
        updates: mpsc::UnboundedReceiver<TaskUpdate>,
        on_unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            task_id,
            updates,
            on_unsubscribe: Some(Box::new(on_unsubscribe)),
        }
    }

    /// The task this subscription follows.
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Waits for the next update. `None` once the queue closed the stream.
    pub async fn next(&mut self) -> Option<TaskUpdate> {
        self.updates.recv().await
    }

    /// Stops receiving updates.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for TaskSubscription {
    fn drop(&mut self) {
        if let Some(on_unsubscribe) = self.on_unsubscribe.take() {
            on_unsubscribe();
        }
    }
}

impl fmt::Debug for TaskSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSubscription")
            .field("task_id", &self.task_id)
            .finish_non_exhaustive()
    }
}

/// The worker queue as seen by the swarm adapter.
pub trait TaskQueue: Send + Sync + 'static {
    /// Enqueues a task. `None` means the queue did not accept it.
    fn submit(&self, task: SwarmTask) -> BoxFuture<'_, Option<TaskId>>;

    /// Subscribes to status updates for `task_id`.
    ///
    /// Implementations should deliver the task's current status first so a
    /// task that finished before the subscription is not missed.
    fn subscribe(&self, task_id: &TaskId) -> TaskSubscription;
}

type TaskHandler = Arc<dyn Fn(SwarmTask) -> BoxFuture<'static, Result<String, String>> + Send + Sync>;

struct TaskRecord {
    latest: TaskUpdate,
    subscribers: AHashMap<u64, mpsc::UnboundedSender<TaskUpdate>>,
}

#[derive(Default)]
struct QueueState {
    tasks: AHashMap<TaskId, TaskRecord>,
    next_subscriber: u64,
}

/// An in-process [`TaskQueue`] that runs each task on a Tokio task.
///
/// With a handler, tasks move pending → running → done (or failed).
/// Without one ([`InMemoryTaskQueue::manual`]) tasks stay pending until
/// driven with [`InMemoryTaskQueue::publish`].
#[derive(Clone)]
pub struct InMemoryTaskQueue {
    state: Arc<Mutex<QueueState>>,
    handler: Option<TaskHandler>,
    next_id: Arc<AtomicU64>,
    accepting: Arc<AtomicBool>,
}

impl InMemoryTaskQueue {
    /// A queue whose tasks are processed by `handler`.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(SwarmTask) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        let handler: TaskHandler = Arc::new(move |task| handler(task).boxed());
        Self {
            handler: Some(handler),
            ..Self::manual()
        }
    }

    /// A queue with no worker; tests drive tasks with [`Self::publish`].
    pub fn manual() -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            handler: None,
            next_id: Arc::new(AtomicU64::new(1)),
            accepting: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Makes `submit` accept or refuse new tasks.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::Release);
    }

    /// Latest status of a task, if it exists.
    pub fn status(&self, task_id: &TaskId) -> Option<TaskStatus> {
        self.state
            .lock()
            .tasks
            .get(task_id)
            .map(|record| record.latest.status)
    }

    /// Number of live subscriptions for a task.
    pub fn subscriber_count(&self, task_id: &TaskId) -> usize {
        self.state
            .lock()
            .tasks
            .get(task_id)
            .map_or(0, |record| record.subscribers.len())
    }

    /// Records `update` for a task and notifies its subscribers.
    /// Returns false for unknown tasks.
    pub fn publish(&self, task_id: &TaskId, update: TaskUpdate) -> bool {
        Self::publish_to(&self.state, task_id, update)
    }

    fn publish_to(state: &Mutex<QueueState>, task_id: &TaskId, update: TaskUpdate) -> bool {
        let mut state = state.lock();
        let Some(record) = state.tasks.get_mut(task_id) else {
            return false;
        };

        debug!(task = %task_id, status = ?update.status, "task update");
        record
            .subscribers
            .retain(|_, tx| tx.send(update.clone()).is_ok());
        record.latest = update;
        true
    }
}

impl TaskQueue for InMemoryTaskQueue {
    fn submit(&self, task: SwarmTask) -> BoxFuture<'_, Option<TaskId>> {
        async move {
            if !self.accepting.load(Ordering::Acquire) {
                warn!(kind = %task.kind, "queue refused task");
                return None;
            }

            let id = TaskId::new(format!(
                "task-{}",
                self.next_id.fetch_add(1, Ordering::Relaxed)
            ));
            self.state.lock().tasks.insert(
                id.clone(),
                TaskRecord {
                    latest: TaskUpdate::status(TaskStatus::Pending),
                    subscribers: AHashMap::new(),
                },
            );

            if let Some(handler) = self.handler.clone() {
                let state = Arc::clone(&self.state);
                let task_id = id.clone();
                tokio::spawn(async move {
                    Self::publish_to(&state, &task_id, TaskUpdate::status(TaskStatus::Running));
                    let update = match handler(task).await {
                        Ok(result) => TaskUpdate::done(result),
                        Err(reason) => TaskUpdate::failed(reason),
                    };
                    Self::publish_to(&state, &task_id, update);
                });
            }

            Some(id)
        }
        .boxed()
    }

    fn subscribe(&self, task_id: &TaskId) -> TaskSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        let subscriber = state.next_subscriber;
        state.next_subscriber += 1;

        if let Some(record) = state.tasks.get_mut(task_id) {
            // Replay the current status; the receiver is alive, so this cannot fail.
            let _ = tx.send(record.latest.clone());
            if !record.latest.status.is_terminal() {
                record.subscribers.insert(subscriber, tx);
            }
        }
        drop(state);

        let state = Arc::clone(&self.state);
        let id = task_id.clone();
        TaskSubscription::new(task_id.clone(), rx, move || {
            if let Some(record) = state.lock().tasks.get_mut(&id) {
                record.subscribers.remove(&subscriber);
            }
        })
    }
}
