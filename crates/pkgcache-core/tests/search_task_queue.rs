use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use pkgcache_core::models::{CoreError, CoreErrorKind, SearchTask, TaskId, TaskStatus};
use pkgcache_core::orchestration::{
    OrchestrationResult, SearchTaskQueue, TaskCancellationToken, TaskOperation,
};
use tokio::runtime::Handle;

fn operation<F>(f: F) -> TaskOperation
where
    F: FnOnce(TaskCancellationToken) -> OrchestrationResult<()> + Send + 'static,
{
    Box::new(move |_task_id: TaskId, token: TaskCancellationToken| f(token))
}

fn wait_until_cancelled(token: &TaskCancellationToken, limit: Duration) -> bool {
    let started = Instant::now();
    while started.elapsed() < limit {
        if token.is_cancelled() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[tokio::test]
async fn successful_operation_reaches_completed() {
    let queue = SearchTaskQueue::new();
    let handle = queue
        .spawn(
            &Handle::current(),
            &SearchTask::by_name("vim"),
            operation(|_| Ok(())),
        )
        .unwrap();

    let snapshot = handle.wait(Some(Duration::from_secs(2))).await.unwrap();

    assert_eq!(snapshot.status, TaskStatus::Completed);
    assert!(snapshot.started_at.is_some());
    assert!(snapshot.finished_at.is_some());
    assert_eq!(queue.active_count().unwrap(), 0);
}

#[tokio::test]
async fn failing_operation_records_error_message() {
    let queue = SearchTaskQueue::new();
    let handle = queue
        .spawn(
            &Handle::current(),
            &SearchTask::by_name("vim"),
            operation(|_| {
                Err(CoreError::new(
                    CoreErrorKind::QueryStep,
                    "disk I/O error",
                ))
            }),
        )
        .unwrap();

    let snapshot = handle.wait(Some(Duration::from_secs(2))).await.unwrap();

    assert_eq!(snapshot.status, TaskStatus::Failed);
    assert_eq!(snapshot.error_message.as_deref(), Some("disk I/O error"));
}

#[tokio::test]
async fn panicking_operation_is_marked_failed() {
    let queue = SearchTaskQueue::new();
    let handle = queue
        .spawn(
            &Handle::current(),
            &SearchTask::by_name("vim"),
            operation(|_| panic!("cursor exploded")),
        )
        .unwrap();

    let snapshot = handle.wait(Some(Duration::from_secs(2))).await.unwrap();

    assert_eq!(snapshot.status, TaskStatus::Failed);
    assert!(snapshot.error_message.unwrap().contains("panicked"));
}

#[tokio::test]
async fn running_operation_observes_cancellation() {
    let queue = SearchTaskQueue::new();
    let started = Arc::new(AtomicBool::new(false));
    let handle = queue
        .spawn(
            &Handle::current(),
            &SearchTask::by_name("vim"),
            operation({
                let started = started.clone();
                move |token| {
                    started.store(true, Ordering::SeqCst);
                    if wait_until_cancelled(&token, Duration::from_secs(2)) {
                        Err(CoreError::new(CoreErrorKind::Cancelled, "stopped early"))
                    } else {
                        Ok(())
                    }
                }
            }),
        )
        .unwrap();

    while !started.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(handle.status().unwrap(), TaskStatus::Running);
    assert_eq!(queue.active_count().unwrap(), 1);

    handle.cancel().unwrap();
    let snapshot = handle.wait(Some(Duration::from_secs(2))).await.unwrap();

    assert_eq!(snapshot.status, TaskStatus::Cancelled);
    assert_eq!(snapshot.error_message.as_deref(), Some("stopped early"));
}

#[tokio::test]
async fn cancelling_a_finished_task_is_a_no_op() {
    let queue = SearchTaskQueue::new();
    let handle = queue
        .spawn(
            &Handle::current(),
            &SearchTask::by_name("vim"),
            operation(|_| Ok(())),
        )
        .unwrap();
    handle.wait(Some(Duration::from_secs(2))).await.unwrap();

    handle.cancel().unwrap();

    assert_eq!(handle.status().unwrap(), TaskStatus::Completed);
}

#[tokio::test]
async fn waiting_past_the_timeout_reports_timeout() {
    let queue = SearchTaskQueue::new();
    let handle = queue
        .spawn(
            &Handle::current(),
            &SearchTask::by_name("vim"),
            operation(|token| {
                wait_until_cancelled(&token, Duration::from_secs(2));
                Ok(())
            }),
        )
        .unwrap();

    let error = handle
        .wait(Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::Timeout);
    assert_eq!(error.task, Some(handle.task_id()));

    handle.cancel().unwrap();
    handle.wait(Some(Duration::from_secs(2))).await.unwrap();
}

#[tokio::test]
async fn unknown_task_ids_are_invalid_input() {
    let queue = SearchTaskQueue::new();

    let error = queue.status(TaskId(42)).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InvalidInput);

    let error = queue.wait_for_terminal(TaskId(42), None).await.unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InvalidInput);
}

#[tokio::test]
async fn task_ids_are_assigned_sequentially() {
    let queue = SearchTaskQueue::new();
    let first = queue
        .spawn(
            &Handle::current(),
            &SearchTask::by_name("a"),
            operation(|_| Ok(())),
        )
        .unwrap();
    let second = queue
        .spawn(
            &Handle::current(),
            &SearchTask::by_details("b"),
            operation(|_| Ok(())),
        )
        .unwrap();

    assert_eq!(first.task_id(), TaskId(0));
    assert_eq!(second.task_id(), TaskId(1));

    first.wait(Some(Duration::from_secs(2))).await.unwrap();
    second.wait(Some(Duration::from_secs(2))).await.unwrap();
}

#[tokio::test]
async fn oldest_finished_tasks_are_evicted_beyond_retention() {
    let queue = SearchTaskQueue::with_retention(2);
    for query in ["a", "b", "c", "d"] {
        queue
            .spawn(
                &Handle::current(),
                &SearchTask::by_name(query),
                operation(|_| Ok(())),
            )
            .unwrap()
            .wait(Some(Duration::from_secs(2)))
            .await
            .unwrap();
    }

    let latest = queue
        .spawn(
            &Handle::current(),
            &SearchTask::by_name("e"),
            operation(|_| Ok(())),
        )
        .unwrap();

    assert_eq!(
        queue.status(TaskId(0)).unwrap_err().kind,
        CoreErrorKind::InvalidInput
    );
    assert_eq!(
        queue.status(TaskId(1)).unwrap_err().kind,
        CoreErrorKind::InvalidInput
    );
    assert_eq!(queue.status(TaskId(2)).unwrap(), TaskStatus::Completed);
    assert_eq!(queue.status(TaskId(3)).unwrap(), TaskStatus::Completed);

    let snapshot = latest.wait(Some(Duration::from_secs(2))).await.unwrap();
    assert_eq!(snapshot.id, TaskId(4));
}
