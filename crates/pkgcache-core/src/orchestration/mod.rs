pub mod runtime_queue;

pub use runtime_queue::{
    DEFAULT_RETAINED_TERMINAL_TASKS, SearchHandle, SearchTaskQueue, TaskCancellationToken,
    TaskOperation,
};

use crate::models::CoreError;

pub type OrchestrationResult<T> = Result<T, CoreError>;
