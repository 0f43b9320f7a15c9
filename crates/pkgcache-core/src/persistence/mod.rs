use std::ops::ControlFlow;

use crate::models::{CoreError, MatchPredicate, PackageHit, PackageRecord};

pub type PersistenceResult<T> = Result<T, CoreError>;

/// Whether `ensure_schema` found the package table or had to create it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchemaState {
    Created,
    Existing,
}

pub trait SchemaStore: Send + Sync {
    fn ensure_schema(&self) -> PersistenceResult<SchemaState>;

    fn drop_schema(&self) -> PersistenceResult<()>;
}

pub trait PackageStore: Send + Sync {
    /// Inserts records, ignoring ones whose primary key is already present.
    /// Returns how many rows were actually written.
    fn insert_packages(&self, packages: &[PackageRecord]) -> PersistenceResult<usize>;

    fn clear_packages(&self) -> PersistenceResult<usize>;

    fn package_count(&self) -> PersistenceResult<u64>;
}

pub trait PackageSearchStore: Send + Sync {
    /// Streams every row matching `pattern` to `visitor`, one row at a time.
    /// Returns `Break` if the visitor stopped the iteration early.
    fn for_each_match(
        &self,
        predicate: MatchPredicate,
        pattern: &str,
        visitor: &mut dyn FnMut(PackageHit) -> ControlFlow<()>,
    ) -> PersistenceResult<ControlFlow<()>>;
}
