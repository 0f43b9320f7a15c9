pub mod error;
pub mod package;
pub mod search;
pub mod task;

pub use error::{CoreError, CoreErrorKind};
pub use package::{PackageHit, PackageId, PackageRecord};
pub use search::{MatchPredicate, SearchDepth, SearchTask};
pub use task::{TaskId, TaskRuntimeSnapshot, TaskStatus};
