//! Configuration collected by a [`SchemataBuilder`](crate::schemata_builder::SchemataBuilder).

use crate::common::{atomic, Atomic, Locked};
use crate::engine::StorageEngine;
use crate::errors::{ErrorKind, SchemataError, SchemataResult};
use crate::migration::MigrationStep;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Everything needed to open one store: its identifier, the engine that holds it and
/// the migration steps from the empty schema to the latest version.
///
/// The configuration can be changed until it is initialized by an open; after that
/// every setter fails with `InvalidOperation`.
#[derive(Clone)]
pub struct SchemataConfig {
    inner: Arc<SchemataConfigInner>,
}

impl Default for SchemataConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemataConfig {
    pub fn new() -> Self {
        SchemataConfig {
            inner: Arc::new(SchemataConfigInner::new()),
        }
    }

    pub fn identifier(&self) -> Option<String> {
        self.inner.identifier.read_with(|it| it.clone())
    }

    pub fn set_identifier(&self, identifier: &str) -> SchemataResult<()> {
        self.inner.set_identifier(identifier)
    }

    /// The engine to open against; an [`InMemoryEngine`](crate::engine::InMemoryEngine)
    /// unless one was set.
    pub fn engine(&self) -> StorageEngine {
        self.inner.engine.read_with(|it| it.clone())
    }

    pub fn set_engine(&self, engine: StorageEngine) -> SchemataResult<()> {
        self.inner.ensure_not_configured("Storage engine")?;
        self.inner.engine.write_with(|it| *it = engine);
        Ok(())
    }

    /// Migration steps in the order they were added.
    pub fn migrations(&self) -> Vec<MigrationStep> {
        self.inner.migrations.read_with(|it| it.clone())
    }

    pub fn add_migration(&self, step: MigrationStep) -> SchemataResult<()> {
        self.inner.ensure_not_configured("Migrations")?;
        self.inner.migrations.write_with(|it| it.push(step));
        Ok(())
    }

    pub fn close_on_version_change(&self) -> bool {
        self.inner.close_on_version_change.load(Ordering::Relaxed)
    }

    pub fn set_close_on_version_change(&self, enabled: bool) -> SchemataResult<()> {
        self.inner.ensure_not_configured("Version change behaviour")?;
        self.inner.close_on_version_change.store(enabled, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.inner.configured.load(Ordering::Relaxed)
    }

    /// Freezes the configuration. Fails when no identifier was set or when it was
    /// already initialized.
    pub(crate) fn initialize(&self) -> SchemataResult<()> {
        self.inner.initialize()
    }
}

struct SchemataConfigInner {
    configured: AtomicBool,
    identifier: Atomic<Option<String>>,
    engine: Atomic<StorageEngine>,
    migrations: Atomic<Vec<MigrationStep>>,
    close_on_version_change: AtomicBool,
}

impl SchemataConfigInner {
    fn new() -> Self {
        SchemataConfigInner {
            configured: AtomicBool::from(false),
            identifier: atomic(None),
            engine: atomic(StorageEngine::default()),
            migrations: atomic(Vec::new()),
            close_on_version_change: AtomicBool::from(false),
        }
    }

    fn ensure_not_configured(&self, what: &str) -> SchemataResult<()> {
        if self.configured.load(Ordering::Relaxed) {
            log::error!("{} cannot be changed after initialization", what);
            return Err(SchemataError::new(
                &format!("{} cannot be changed after initialization", what),
                ErrorKind::InvalidOperation,
            ));
        }
        Ok(())
    }

    fn set_identifier(&self, identifier: &str) -> SchemataResult<()> {
        self.ensure_not_configured("Identifier")?;
        if identifier.trim().is_empty() {
            log::error!("Store identifier cannot be empty");
            return Err(SchemataError::new(
                "Store identifier cannot be empty",
                ErrorKind::InvalidOperation,
            ));
        }
        self.identifier.write_with(|it| *it = Some(identifier.to_string()));
        Ok(())
    }

    fn initialize(&self) -> SchemataResult<()> {
        if self.identifier.read_with(|it| it.is_none()) {
            log::error!("No store identifier is configured");
            return Err(SchemataError::new(
                "No store identifier is configured",
                ErrorKind::InvalidOperation,
            ));
        }

        if self.configured.swap(true, Ordering::Relaxed) {
            log::error!("Configuration is already initialized");
            return Err(SchemataError::new(
                "Configuration is already initialized",
                ErrorKind::InvalidOperation,
            ));
        }
        Ok(())
    }
}
