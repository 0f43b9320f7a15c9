use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::models::{
    CoreError, CoreErrorKind, SearchTask, TaskId, TaskRuntimeSnapshot, TaskStatus,
};
use crate::orchestration::OrchestrationResult;

/// Blocking unit of work run on the runtime's blocking pool.
pub type TaskOperation =
    Box<dyn FnOnce(TaskId, TaskCancellationToken) -> OrchestrationResult<()> + Send>;

#[derive(Clone, Debug)]
pub struct TaskCancellationToken {
    flag: Arc<AtomicBool>,
}

impl TaskCancellationToken {
    fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Terminal snapshots kept for late `status`/`wait` callers before the
/// oldest are evicted.
pub const DEFAULT_RETAINED_TERMINAL_TASKS: usize = 256;

/// Tracks dispatched searches from creation to their terminal status.
#[derive(Clone)]
pub struct SearchTaskQueue {
    inner: Arc<Mutex<QueueState>>,
}

impl Default for SearchTaskQueue {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAINED_TERMINAL_TASKS)
    }
}

#[derive(Default)]
struct QueueState {
    next_task_id: u64,
    retained_terminal_tasks: usize,
    tasks: HashMap<TaskId, TaskRuntimeSnapshot>,
    cancellation_flags: HashMap<TaskId, Arc<AtomicBool>>,
    status_senders: HashMap<TaskId, watch::Sender<TaskStatus>>,
}

impl SearchTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `retained_terminal_tasks` finished searches around;
    /// older ones are forgotten as new searches are dispatched.
    pub fn with_retention(retained_terminal_tasks: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueState {
                retained_terminal_tasks,
                ..QueueState::default()
            })),
        }
    }

    /// Registers `task` and runs `operation` on `runtime`'s blocking pool.
    /// Returns as soon as the work is scheduled.
    pub fn spawn(
        &self,
        runtime: &Handle,
        task: &SearchTask,
        operation: TaskOperation,
    ) -> OrchestrationResult<SearchHandle> {
        let (task_id, cancel_flag) = {
            let mut state = lock_state(&self.inner)?;
            evict_terminal_tasks(&mut state);
            let task_id = TaskId(state.next_task_id);
            state.next_task_id = state.next_task_id.saturating_add(1);

            state.tasks.insert(
                task_id,
                TaskRuntimeSnapshot {
                    id: task_id,
                    depth: task.depth,
                    query: task.query.clone(),
                    status: TaskStatus::Created,
                    created_at: SystemTime::now(),
                    started_at: None,
                    finished_at: None,
                    error_message: None,
                },
            );

            let cancel_flag = Arc::new(AtomicBool::new(false));
            state
                .cancellation_flags
                .insert(task_id, cancel_flag.clone());
            let (status_sender, _) = watch::channel(TaskStatus::Created);
            state.status_senders.insert(task_id, status_sender);

            (task_id, cancel_flag)
        };

        let inner = self.inner.clone();
        let token = TaskCancellationToken::new(cancel_flag);
        runtime.spawn_blocking(move || {
            if !set_running_if_possible(&inner, task_id) {
                // Cancelled before it started. The operation still runs with
                // a tripped token so it can report to whoever is listening;
                // the recorded status stays as it is.
                token.cancel();
                let _ = catch_unwind(AssertUnwindSafe(|| operation(task_id, token)));
                finalize_cleanup(&inner, task_id);
                return;
            }

            let outcome = catch_unwind(AssertUnwindSafe(|| operation(task_id, token)))
                .unwrap_or_else(|_| {
                    Err(CoreError::new(
                        CoreErrorKind::Internal,
                        format!("search task '{}' panicked", task_id.0),
                    ))
                });

            match outcome {
                Ok(()) => set_terminal(&inner, task_id, TaskStatus::Completed, None),
                Err(error) if error.kind == CoreErrorKind::Cancelled => {
                    set_terminal(&inner, task_id, TaskStatus::Cancelled, Some(error.message));
                }
                Err(error) => {
                    set_terminal(&inner, task_id, TaskStatus::Failed, Some(error.message));
                }
            }

            finalize_cleanup(&inner, task_id);
        });

        Ok(SearchHandle {
            task_id,
            queue: self.clone(),
        })
    }

    pub fn snapshot(&self, task_id: TaskId) -> OrchestrationResult<TaskRuntimeSnapshot> {
        let state = lock_state(&self.inner)?;
        state
            .tasks
            .get(&task_id)
            .cloned()
            .ok_or_else(|| task_lookup_error(task_id))
    }

    pub fn status(&self, task_id: TaskId) -> OrchestrationResult<TaskStatus> {
        Ok(self.snapshot(task_id)?.status)
    }

    /// Number of searches that have not reached a terminal status.
    pub fn active_count(&self) -> OrchestrationResult<usize> {
        let state = lock_state(&self.inner)?;
        Ok(state
            .tasks
            .values()
            .filter(|task| !task.status.is_terminal())
            .count())
    }

    /// Requests cooperative cancellation. A search that has not started yet
    /// is cancelled immediately; a running one stops before its next row.
    pub fn cancel(&self, task_id: TaskId) -> OrchestrationResult<()> {
        let mut state = lock_state(&self.inner)?;
        let prior_status = state
            .tasks
            .get(&task_id)
            .map(|task| task.status)
            .ok_or_else(|| task_lookup_error(task_id))?;
        if prior_status.is_terminal() {
            return Ok(());
        }

        if let Some(flag) = state.cancellation_flags.get(&task_id) {
            flag.store(true, Ordering::SeqCst);
        }

        if prior_status == TaskStatus::Created {
            mark_terminal(&mut state, task_id, TaskStatus::Cancelled, None);
        }

        Ok(())
    }

    pub async fn wait_for_terminal(
        &self,
        task_id: TaskId,
        timeout_duration: Option<Duration>,
    ) -> OrchestrationResult<TaskRuntimeSnapshot> {
        let mut receiver = {
            let state = lock_state(&self.inner)?;
            state
                .status_senders
                .get(&task_id)
                .map(watch::Sender::subscribe)
                .ok_or_else(|| task_lookup_error(task_id))?
        };

        // The borrowed value holds the channel's read lock; drop it before
        // touching queue state again.
        let wait = receiver.wait_for(|status| status.is_terminal());
        let waited = match timeout_duration {
            Some(duration) => timeout(duration, wait)
                .await
                .map_err(|_| {
                    CoreError::new(
                        CoreErrorKind::Timeout,
                        format!("timed out waiting for search task '{}' to complete", task_id.0),
                    )
                    .for_task(task_id)
                })?
                .map(|_| ()),
            None => wait.await.map(|_| ()),
        };
        waited.map_err(|_| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("status channel for search task '{}' closed", task_id.0),
            )
            .for_task(task_id)
        })?;

        self.snapshot(task_id)
    }
}

/// Caller-side handle to one dispatched search.
#[derive(Clone)]
pub struct SearchHandle {
    task_id: TaskId,
    queue: SearchTaskQueue,
}

impl SearchHandle {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn status(&self) -> OrchestrationResult<TaskStatus> {
        self.queue.status(self.task_id)
    }

    pub fn snapshot(&self) -> OrchestrationResult<TaskRuntimeSnapshot> {
        self.queue.snapshot(self.task_id)
    }

    pub fn cancel(&self) -> OrchestrationResult<()> {
        self.queue.cancel(self.task_id)
    }

    pub async fn wait(
        &self,
        timeout_duration: Option<Duration>,
    ) -> OrchestrationResult<TaskRuntimeSnapshot> {
        self.queue
            .wait_for_terminal(self.task_id, timeout_duration)
            .await
    }
}

fn set_running_if_possible(inner: &Arc<Mutex<QueueState>>, task_id: TaskId) -> bool {
    let Ok(mut state) = lock_state(inner) else {
        return false;
    };
    let Some(task) = state.tasks.get_mut(&task_id) else {
        return false;
    };
    if task.status.is_terminal() {
        return false;
    }
    task.status = TaskStatus::Running;
    task.started_at = Some(SystemTime::now());
    if let Some(sender) = state.status_senders.get(&task_id) {
        sender.send_replace(TaskStatus::Running);
    }
    true
}

fn set_terminal(
    inner: &Arc<Mutex<QueueState>>,
    task_id: TaskId,
    status: TaskStatus,
    error_message: Option<String>,
) {
    if let Ok(mut state) = lock_state(inner) {
        mark_terminal(&mut state, task_id, status, error_message);
    }
}

fn mark_terminal(
    state: &mut QueueState,
    task_id: TaskId,
    status: TaskStatus,
    error_message: Option<String>,
) {
    if let Some(task) = state.tasks.get_mut(&task_id) {
        task.status = status;
        task.finished_at = Some(SystemTime::now());
        task.error_message = error_message;
    }
    if let Some(sender) = state.status_senders.get(&task_id) {
        sender.send_replace(status);
    }
}

fn evict_terminal_tasks(state: &mut QueueState) {
    let mut terminal: Vec<TaskId> = state
        .tasks
        .values()
        .filter(|task| task.status.is_terminal())
        .map(|task| task.id)
        .collect();
    if terminal.len() <= state.retained_terminal_tasks {
        return;
    }

    terminal.sort_unstable_by_key(|task_id| task_id.0);
    let excess = terminal.len() - state.retained_terminal_tasks;
    for task_id in terminal.into_iter().take(excess) {
        state.tasks.remove(&task_id);
        state.status_senders.remove(&task_id);
        state.cancellation_flags.remove(&task_id);
    }
}

fn finalize_cleanup(inner: &Arc<Mutex<QueueState>>, task_id: TaskId) {
    if let Ok(mut state) = lock_state(inner) {
        state.cancellation_flags.remove(&task_id);
    }
}

fn lock_state(inner: &Mutex<QueueState>) -> OrchestrationResult<MutexGuard<'_, QueueState>> {
    inner.lock().map_err(|_| {
        CoreError::new(
            CoreErrorKind::Internal,
            "search task queue mutex poisoned",
        )
    })
}

fn task_lookup_error(task_id: TaskId) -> CoreError {
    CoreError::new(
        CoreErrorKind::InvalidInput,
        format!("unknown search task id '{}'", task_id.0),
    )
}
