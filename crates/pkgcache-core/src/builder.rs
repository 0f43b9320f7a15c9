use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::models::{CoreError, CoreErrorKind, PackageRecord};
use crate::persistence::{PackageStore, PersistenceResult};

/// Fills an empty cache from the authoritative package source.
///
/// Called at most once per initialization, synchronously, and only when the
/// package table did not exist beforehand. It is expected to populate the
/// store completely before returning.
pub trait CacheBuilder: Send + Sync {
    fn populate(&self, store: &dyn PackageStore) -> PersistenceResult<()>;
}

impl<F> CacheBuilder for F
where
    F: Fn(&dyn PackageStore) -> PersistenceResult<()> + Send + Sync,
{
    fn populate(&self, store: &dyn PackageStore) -> PersistenceResult<()> {
        self(store)
    }
}

/// Builder that reads a JSON array of package records from disk.
#[derive(Clone, Debug)]
pub struct ManifestBuilder {
    manifest_path: PathBuf,
}

impl ManifestBuilder {
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn read_records(&self) -> PersistenceResult<Vec<PackageRecord>> {
        let raw = fs::read_to_string(&self.manifest_path).map_err(|error| {
            populate_error(format!(
                "failed to read package manifest '{}': {error}",
                self.manifest_path.display()
            ))
        })?;
        serde_json::from_str(&raw).map_err(|error| {
            populate_error(format!(
                "failed to parse package manifest '{}': {error}",
                self.manifest_path.display()
            ))
        })
    }
}

impl CacheBuilder for ManifestBuilder {
    fn populate(&self, store: &dyn PackageStore) -> PersistenceResult<()> {
        let records = self.read_records()?;
        let inserted = store.insert_packages(&records)?;
        info!(
            manifest = %self.manifest_path.display(),
            offered = records.len(),
            inserted,
            "populated package cache from manifest"
        );
        Ok(())
    }
}

/// Builder for callers that never expect a cold start.
pub struct NoopBuilder;

impl CacheBuilder for NoopBuilder {
    fn populate(&self, _store: &dyn PackageStore) -> PersistenceResult<()> {
        Ok(())
    }
}

fn populate_error(message: String) -> CoreError {
    CoreError::new(CoreErrorKind::Populate, message)
}
