use std::ops::ControlFlow;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard, TryLockError};

use tokio::runtime::Handle;
use tracing::{debug, error, info_span};

use crate::models::{CoreError, CoreErrorKind, PackageHit, SearchDepth, SearchTask, TaskId};
use crate::orchestration::{
    OrchestrationResult, SearchHandle, SearchTaskQueue, TaskCancellationToken,
};
use crate::persistence::PackageSearchStore;
use crate::search::sink::{SearchOutcome, SearchSink, SearchStatus};

/// Runs substring searches against the package store off the caller's
/// thread and streams matches to a sink.
///
/// Running searches hold the store gate shared; maintenance such as a
/// rebuild takes it exclusively, so a search never observes a dropped or
/// half-populated table.
#[derive(Clone)]
pub struct SearchEngine {
    store: Arc<dyn PackageSearchStore>,
    queue: SearchTaskQueue,
    store_gate: Arc<RwLock<()>>,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn PackageSearchStore>, queue: SearchTaskQueue) -> Self {
        Self {
            store,
            queue,
            store_gate: Arc::new(RwLock::new(())),
        }
    }

    pub fn queue(&self) -> &SearchTaskQueue {
        &self.queue
    }

    /// Takes the store exclusively, or returns `None` while any search holds
    /// it. Searches dispatched while the guard is alive wait for it to drop.
    pub fn try_exclusive(&self) -> Option<RwLockWriteGuard<'_, ()>> {
        match self.store_gate.try_write() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    pub fn search_name(
        &self,
        filter: &str,
        query: &str,
        sink: Box<dyn SearchSink>,
    ) -> OrchestrationResult<SearchHandle> {
        self.search(SearchTask::new(query, filter, SearchDepth::NameOnly), sink)
    }

    pub fn search_details(
        &self,
        filter: &str,
        query: &str,
        sink: Box<dyn SearchSink>,
    ) -> OrchestrationResult<SearchHandle> {
        self.search(SearchTask::new(query, filter, SearchDepth::Details), sink)
    }

    /// Dispatches `task` and returns immediately.
    ///
    /// Must be called from within a tokio runtime. If the search cannot be
    /// scheduled the sink receives an error and a `Failure` terminal status
    /// before this returns.
    pub fn search(
        &self,
        task: SearchTask,
        mut sink: Box<dyn SearchSink>,
    ) -> OrchestrationResult<SearchHandle> {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(runtime_error) => {
                let error = CoreError::new(
                    CoreErrorKind::Dispatch,
                    format!("failed to dispatch search task: {runtime_error}"),
                );
                error!(message = %error.message, "search dispatch failed");
                sink.error(&error);
                sink.finished(SearchOutcome::Failure);
                return Err(error);
            }
        };

        let store = self.store.clone();
        let store_gate = self.store_gate.clone();
        let operation_task = task.clone();
        self.queue.spawn(
            &runtime,
            &task,
            Box::new(move |task_id: TaskId, token: TaskCancellationToken| {
                let _shared = store_gate.read().unwrap_or_else(PoisonError::into_inner);
                run_search(store.as_ref(), &operation_task, sink.as_mut(), task_id, &token)
            }),
        )
    }
}

fn run_search(
    store: &dyn PackageSearchStore,
    task: &SearchTask,
    sink: &mut dyn SearchSink,
    task_id: TaskId,
    token: &TaskCancellationToken,
) -> OrchestrationResult<()> {
    let span = info_span!("search", task_id = task_id.0, depth = task.depth.as_str());
    let _entered = span.enter();

    if token.is_cancelled() {
        debug!("search cancelled before it started");
        sink.finished(SearchOutcome::Cancelled);
        return Err(cancelled(task_id, 0));
    }

    sink.status(SearchStatus::Query);
    sink.no_percentage_updates();

    let pattern = task.like_pattern();
    debug!(query = %task.query, filter = %task.filter, pattern = %pattern, "finding packages");

    let mut rows = 0usize;
    let flow = store.for_each_match(task.depth.predicate(), &pattern, &mut |hit: PackageHit| {
        if token.is_cancelled() {
            return ControlFlow::Break(());
        }
        rows += 1;
        sink.package(hit);
        ControlFlow::Continue(())
    });

    match flow {
        Ok(ControlFlow::Continue(())) => {
            debug!(rows, "search finished");
            sink.finished(SearchOutcome::Success);
            Ok(())
        }
        Ok(ControlFlow::Break(())) => {
            debug!(rows, "search cancelled");
            sink.finished(SearchOutcome::Cancelled);
            Err(cancelled(task_id, rows))
        }
        Err(error) => {
            // Rows already emitted stand; the sink learns the stream is
            // incomplete through the failure status.
            error!(kind = ?error.kind, message = %error.message, rows, "search failed");
            let error = error.for_task(task_id);
            sink.error(&error);
            sink.finished(SearchOutcome::Failure);
            Err(error)
        }
    }
}

fn cancelled(task_id: TaskId, rows: usize) -> CoreError {
    CoreError::new(
        CoreErrorKind::Cancelled,
        format!("search task '{}' was cancelled after {rows} rows", task_id.0),
    )
    .for_task(task_id)
}
