use std::time::SystemTime;

use crate::models::SearchDepth;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TaskId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TaskStatus {
    Created,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Failed
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskRuntimeSnapshot {
    pub id: TaskId,
    pub depth: SearchDepth,
    pub query: String,
    pub status: TaskStatus,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
    pub error_message: Option<String>,
}
