use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, Row, params};
use tracing::{debug, info, warn};

use crate::models::{
    CoreError, CoreErrorKind, MatchPredicate, PackageHit, PackageId, PackageRecord,
};
use crate::persistence::{
    PackageSearchStore, PackageStore, PersistenceResult, SchemaState, SchemaStore,
};
use crate::sqlite::schema;

/// The single connection to the package cache database.
///
/// Opened once and shared by every search; the mutex serializes access
/// because a rusqlite `Connection` is not `Sync`.
pub struct SqliteStore {
    database_path: Option<PathBuf>,
    connection: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if needed) the cache database at `database_path`.
    pub fn open(database_path: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let database_path = database_path.into();
        let connection = open_connection(&database_path)
            .map_err(|error| storage_error("open", CoreErrorKind::StoreOpen, error))?;
        info!(path = %database_path.display(), "opened package cache database");
        Ok(Self {
            database_path: Some(database_path),
            connection: Mutex::new(connection),
        })
    }

    pub fn open_in_memory() -> PersistenceResult<Self> {
        let connection = Connection::open_in_memory()
            .and_then(|connection| {
                apply_pragmas(&connection)?;
                Ok(connection)
            })
            .map_err(|error| storage_error("open_in_memory", CoreErrorKind::StoreOpen, error))?;
        Ok(Self {
            database_path: None,
            connection: Mutex::new(connection),
        })
    }

    pub fn database_path(&self) -> Option<&Path> {
        self.database_path.as_deref()
    }

    fn with_connection<T>(
        &self,
        operation_name: &str,
        kind: CoreErrorKind,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        let mut connection = self.lock_connection();
        operation(&mut connection).map_err(|error| storage_error(operation_name, kind, error))
    }

    // A search sink may panic while a cursor is open. The connection itself
    // holds no state that the panic could leave half-written, and any open
    // transaction rolls back when dropped, so the guard is recovered.
    fn lock_connection(&self) -> MutexGuard<'_, Connection> {
        self.connection.lock().unwrap_or_else(|poisoned| {
            warn!("recovering package cache connection after a panicked caller");
            poisoned.into_inner()
        })
    }
}

impl SchemaStore for SqliteStore {
    fn ensure_schema(&self) -> PersistenceResult<SchemaState> {
        self.with_connection("ensure_schema", CoreErrorKind::SchemaCreation, |connection| {
            if schema::schema_exists(connection)? {
                return Ok(SchemaState::Existing);
            }

            match schema::create_schema(connection) {
                Ok(()) => Ok(SchemaState::Created),
                // Another process may have created the table between the
                // existence check and the DDL.
                Err(error) => {
                    if schema::schema_exists(connection)? {
                        Ok(SchemaState::Existing)
                    } else {
                        Err(error)
                    }
                }
            }
        })
    }

    fn drop_schema(&self) -> PersistenceResult<()> {
        self.with_connection("drop_schema", CoreErrorKind::StorageFailure, |connection| {
            schema::drop_schema(connection)
        })
    }
}

impl PackageStore for SqliteStore {
    fn insert_packages(&self, packages: &[PackageRecord]) -> PersistenceResult<usize> {
        self.with_connection("insert_packages", CoreErrorKind::StorageFailure, |connection| {
            let transaction = connection.transaction()?;
            let mut inserted = 0;
            {
                let mut statement = transaction.prepare(
                    "
INSERT OR IGNORE INTO packages (
    name, version, deps, arch, short_desc, long_desc, repo
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
",
                )?;

                for package in packages {
                    inserted += statement.execute(params![
                        package.name.as_str(),
                        package.version.as_str(),
                        package.dependencies.as_str(),
                        package.architecture.as_str(),
                        package.short_description.as_str(),
                        package.long_description.as_str(),
                        package.repository.as_str(),
                    ])?;
                }
            }
            transaction.commit()?;

            if inserted < packages.len() {
                debug!(
                    offered = packages.len(),
                    inserted,
                    "ignored package records with duplicate keys"
                );
            }
            Ok(inserted)
        })
    }

    fn clear_packages(&self) -> PersistenceResult<usize> {
        self.with_connection("clear_packages", CoreErrorKind::StorageFailure, |connection| {
            connection.execute("DELETE FROM packages", [])
        })
    }

    fn package_count(&self) -> PersistenceResult<u64> {
        self.with_connection("package_count", CoreErrorKind::StorageFailure, |connection| {
            let count: i64 =
                connection.query_row("SELECT COUNT(*) FROM packages", [], |row| row.get(0))?;
            u64::try_from(count).map_err(|_| storage_error_sqlite("negative row count"))
        })
    }
}

impl PackageSearchStore for SqliteStore {
    fn for_each_match(
        &self,
        predicate: MatchPredicate,
        pattern: &str,
        visitor: &mut dyn FnMut(PackageHit) -> ControlFlow<()>,
    ) -> PersistenceResult<ControlFlow<()>> {
        let connection = self.lock_connection();
        let sql = select_statement(predicate);
        debug!(statement = sql, pattern, "preparing package search");

        let mut statement = connection.prepare(sql).map_err(|error| {
            storage_error("search prepare", CoreErrorKind::QueryPrepare, error)
        })?;
        let mut rows = statement
            .query([pattern])
            .map_err(|error| storage_error("search step", CoreErrorKind::QueryStep, error))?;

        loop {
            let row = match rows.next() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(error) => {
                    return Err(storage_error("search step", CoreErrorKind::QueryStep, error));
                }
            };
            let hit = read_hit(row)
                .map_err(|error| storage_error("search step", CoreErrorKind::QueryStep, error))?;
            if visitor(hit).is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }

        Ok(ControlFlow::Continue(()))
    }
}

fn open_connection(database_path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    let connection = Connection::open(database_path)?;
    apply_pragmas(&connection)?;
    Ok(connection)
}

// The cache can always be rebuilt from its source, so writes skip fsync.
fn apply_pragmas(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(
        "
PRAGMA synchronous = OFF;
PRAGMA case_sensitive_like = ON;
",
    )
}

fn select_statement(predicate: MatchPredicate) -> &'static str {
    match predicate {
        MatchPredicate::Name => {
            "SELECT name, version, arch, CAST(repo AS TEXT), short_desc \
             FROM packages WHERE name LIKE ?1"
        }
    }
}

fn read_hit(row: &Row<'_>) -> rusqlite::Result<PackageHit> {
    Ok(PackageHit {
        id: PackageId {
            name: column_text(row, 0)?,
            version: column_text(row, 1)?,
            architecture: column_text(row, 2)?,
            repository: column_text(row, 3)?,
        },
        installed: false,
        summary: column_text(row, 4)?,
    })
}

// Caches created with the legacy `repo string` column give it numeric
// affinity; the select casts it back, and untyped columns may still hold
// numbers written by other tools.
fn column_text(row: &Row<'_>, index: usize) -> rusqlite::Result<String> {
    Ok(match row.get_ref(index)? {
        ValueRef::Null => String::new(),
        ValueRef::Integer(value) => value.to_string(),
        ValueRef::Real(value) => value.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            String::from_utf8_lossy(bytes).into_owned()
        }
    })
}

fn storage_error(operation: &str, kind: CoreErrorKind, error: rusqlite::Error) -> CoreError {
    storage_error_text(operation, kind, error.to_string())
}

fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

fn storage_error_text(operation: &str, kind: CoreErrorKind, message: impl AsRef<str>) -> CoreError {
    CoreError::new(
        kind,
        format!("sqlite store '{operation}' failed: {}", message.as_ref()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_repository_values_read_back_as_text() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        store
            .insert_packages(&[PackageRecord {
                name: "vim".to_string(),
                version: "9.0".to_string(),
                architecture: "x86_64".to_string(),
                repository: "42".to_string(),
                ..PackageRecord::default()
            }])
            .unwrap();

        let mut hits = Vec::new();
        store
            .for_each_match(MatchPredicate::Name, "%vim%", &mut |hit: PackageHit| {
                hits.push(hit);
                ControlFlow::Continue(())
            })
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.repository, "42");
    }
}
