use std::path::PathBuf;
use std::sync::{Arc, RwLockWriteGuard};

use tracing::{debug, info, warn};

use crate::builder::CacheBuilder;
use crate::models::{CoreError, CoreErrorKind, SearchTask};
use crate::orchestration::{OrchestrationResult, SearchHandle, SearchTaskQueue};
use crate::persistence::{PackageStore, PersistenceResult, SchemaState, SchemaStore};
use crate::search::{SearchEngine, SearchSink};
use crate::sqlite::SqliteStore;

/// Owns the package cache for its whole lifetime: the store, the search
/// queue and the engine that reads from the store.
pub struct CacheManager {
    store: Arc<SqliteStore>,
    engine: SearchEngine,
    init_state: SchemaState,
}

impl CacheManager {
    /// Opens the cache at `database_path`, running `builder` if the package
    /// table did not exist yet.
    pub fn initialize(
        database_path: impl Into<PathBuf>,
        builder: &dyn CacheBuilder,
    ) -> PersistenceResult<Self> {
        Self::with_store(SqliteStore::open(database_path)?, builder)
    }

    pub fn initialize_in_memory(builder: &dyn CacheBuilder) -> PersistenceResult<Self> {
        Self::with_store(SqliteStore::open_in_memory()?, builder)
    }

    pub fn with_store(store: SqliteStore, builder: &dyn CacheBuilder) -> PersistenceResult<Self> {
        let init_state = store.ensure_schema()?;
        match init_state {
            SchemaState::Created => {
                info!("package cache is empty; populating from source");
                populate(&store, builder)?;
            }
            SchemaState::Existing => {
                debug!("package cache already populated; skipping builder");
            }
        }

        let store = Arc::new(store);
        let engine = SearchEngine::new(store.clone(), SearchTaskQueue::new());
        Ok(Self {
            store,
            engine,
            init_state,
        })
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    pub fn engine(&self) -> &SearchEngine {
        &self.engine
    }

    /// `Created` if this initialization ran the builder.
    pub fn init_state(&self) -> SchemaState {
        self.init_state
    }

    pub fn package_count(&self) -> PersistenceResult<u64> {
        self.store.package_count()
    }

    pub fn search(
        &self,
        task: SearchTask,
        sink: Box<dyn SearchSink>,
    ) -> OrchestrationResult<SearchHandle> {
        self.engine.search(task, sink)
    }

    pub fn search_name(
        &self,
        filter: &str,
        query: &str,
        sink: Box<dyn SearchSink>,
    ) -> OrchestrationResult<SearchHandle> {
        self.engine.search_name(filter, query, sink)
    }

    pub fn search_details(
        &self,
        filter: &str,
        query: &str,
        sink: Box<dyn SearchSink>,
    ) -> OrchestrationResult<SearchHandle> {
        self.engine.search_details(filter, query, sink)
    }

    /// Wipes the cache and repopulates it from `builder`.
    ///
    /// Refused while any search is still running; searches dispatched
    /// during the rebuild wait for it and then see the new rows. If
    /// population fails the package table is left dropped, so the next
    /// initialization retries.
    pub fn rebuild(&self, builder: &dyn CacheBuilder) -> PersistenceResult<u64> {
        let _exclusive = self.exclusive("rebuild")?;
        self.store.drop_schema()?;
        self.store.ensure_schema()?;
        populate(self.store.as_ref(), builder)?;
        let count = self.store.package_count()?;
        info!(packages = count, "rebuilt package cache");
        Ok(count)
    }

    /// Deletes every cached package without repopulating.
    pub fn clear(&self) -> PersistenceResult<usize> {
        let _exclusive = self.exclusive("clear")?;
        let removed = self.store.clear_packages()?;
        info!(removed, "cleared package cache");
        Ok(removed)
    }

    fn exclusive(&self, operation: &str) -> PersistenceResult<RwLockWriteGuard<'_, ()>> {
        self.engine.try_exclusive().ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("cannot {operation} the package cache while searches are running"),
            )
        })
    }
}

fn populate(store: &SqliteStore, builder: &dyn CacheBuilder) -> PersistenceResult<()> {
    let Err(error) = builder.populate(store) else {
        return Ok(());
    };

    warn!(kind = ?error.kind, message = %error.message, "package cache population failed");
    if let Err(drop_error) = store.drop_schema() {
        warn!(
            message = %drop_error.message,
            "failed to drop partially populated package cache"
        );
    }
    Err(CoreError::new(
        CoreErrorKind::Populate,
        format!("package cache population failed: {}", error.message),
    ))
}
