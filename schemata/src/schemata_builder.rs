use crate::database::Database;
use crate::engine::StorageEngine;
use crate::errors::{SchemataError, SchemataResult};
use crate::migration::{MigrationChain, MigrationRunner, MigrationStep};
use crate::schemata_config::SchemataConfig;

/// Fluent configuration for opening a [`Database`].
///
/// Setter errors are kept and returned by [`SchemataBuilder::open`], so a chain of
/// calls never has to be interrupted.
///
/// ```rust,ignore
/// let db = Database::builder()
///     .identifier("todos")
///     .engine(StorageEngine::new(InMemoryEngine::with_config(config)?))
///     .add_migration(MigrationStep::create_tables(SchemaSnapshot::empty(), v1.clone()))
///     .add_migration(MigrationStep::new(v1, v2, move_done_flag))
///     .close_on_version_change()
///     .open()?;
/// ```
#[derive(Default)]
pub struct SchemataBuilder {
    error: Option<SchemataError>,
    config: SchemataConfig,
}

impl SchemataBuilder {
    pub fn new() -> Self {
        SchemataBuilder {
            error: None,
            config: SchemataConfig::new(),
        }
    }

    /// Names the store to open. Must not be empty.
    pub fn identifier(mut self, identifier: &str) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_identifier(identifier) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn engine(mut self, engine: StorageEngine) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_engine(engine) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Appends the step to the next version. Steps are chained in the order added;
    /// the first must start from the empty schema.
    pub fn add_migration(mut self, step: MigrationStep) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.add_migration(step) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Makes the opened database close itself when another opener requests a newer
    /// version or deletes the store.
    pub fn close_on_version_change(mut self) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_close_on_version_change(true) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Opens the store and migrates it to the latest version.
    ///
    /// # Errors
    /// * any error captured by a setter, first
    /// * `InvalidOperation` when no identifier was given
    /// * `SchemaError` when the migrations do not form a chain
    /// * every error of [`MigrationRunner::open_and_migrate`]
    pub fn open(self) -> SchemataResult<Database> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.config.initialize()?;

        let identifier = self.config.identifier().unwrap_or_default();
        let chain = MigrationChain::new(self.config.migrations())?;
        MigrationRunner::new(self.config.engine())
            .close_on_version_change(self.config.close_on_version_change())
            .open_and_migrate(&identifier, &chain)
    }
}
