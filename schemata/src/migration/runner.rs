use super::chain::MigrationChain;
use crate::common::{atomic, Atomic, Locked};
use crate::database::Database;
use crate::engine::{
    Connection, ConnectionProvider, OpenOutcome, StorageEngine, Transaction, TransactionProvider,
};
use crate::errors::{ErrorKind, SchemataError, SchemataResult};
use crate::query::QueryService;
use std::fmt::{Display, Formatter};

/// Where an open attempt currently is.
///
/// `Closed → Opening → (Open | Upgrading) → Open | Failed`. Step bodies only run
/// while `Upgrading`, and neither `Open` nor `Failed` can be left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerState {
    Closed,
    Opening,
    Upgrading,
    Open,
    Failed(ErrorKind),
}

impl RunnerState {
    fn can_become(&self, next: &RunnerState) -> bool {
        matches!(
            (self, next),
            (RunnerState::Closed, RunnerState::Opening)
                | (RunnerState::Opening, RunnerState::Open)
                | (RunnerState::Opening, RunnerState::Upgrading)
                | (RunnerState::Opening, RunnerState::Failed(_))
                | (RunnerState::Upgrading, RunnerState::Open)
                | (RunnerState::Upgrading, RunnerState::Failed(_))
        )
    }
}

impl Display for RunnerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RunnerState::Closed => write!(f, "closed"),
            RunnerState::Opening => write!(f, "opening"),
            RunnerState::Upgrading => write!(f, "upgrading"),
            RunnerState::Open => write!(f, "open"),
            RunnerState::Failed(kind) => write!(f, "failed ({})", kind),
        }
    }
}

/// Opens stores and brings them up to the latest version of a chain.
///
/// Each call to [`MigrationRunner::open_and_migrate`] is one open attempt. The
/// pending steps of an attempt run in order inside the single version-change
/// transaction the engine grants, so either all of them take effect or none do.
///
/// ```rust,ignore
/// let runner = MigrationRunner::new(StorageEngine::default());
/// let db = runner.open_and_migrate("todos", &chain)?;
/// ```
pub struct MigrationRunner {
    engine: StorageEngine,
    close_on_version_change: bool,
    state: Atomic<RunnerState>,
}

impl MigrationRunner {
    pub fn new(engine: StorageEngine) -> Self {
        MigrationRunner {
            engine,
            close_on_version_change: false,
            state: atomic(RunnerState::Closed),
        }
    }

    /// Makes every database this runner opens close itself when another opener asks
    /// for a newer version, so that upgrade is not blocked by it.
    pub fn close_on_version_change(mut self, enabled: bool) -> Self {
        self.close_on_version_change = enabled;
        self
    }

    /// State published by the most recent transition of any open attempt.
    pub fn state(&self) -> RunnerState {
        self.state.read_with(|it| it.clone())
    }

    pub fn open_and_migrate(&self, identifier: &str, chain: &MigrationChain) -> SchemataResult<Database> {
        let mut attempt = Attempt::begin(identifier, &self.state);
        attempt.advance(RunnerState::Opening)?;

        let target_version = chain.version();
        let outcome = match self.engine.open(identifier, target_version) {
            Ok(outcome) => outcome,
            Err(e) => return Err(attempt.fail(open_failure(identifier, e))),
        };

        match outcome {
            OpenOutcome::Opened(connection) => {
                let database = self
                    .database(identifier, target_version, connection, chain)
                    .map_err(|e| attempt.fail(e))?;
                attempt.advance(RunnerState::Open)?;
                log::info!("Opened {} at version {}", identifier, target_version);
                Ok(database)
            }
            OpenOutcome::UpgradeNeeded {
                connection,
                transaction,
                old_version,
            } => {
                if let Err(e) = attempt.advance(RunnerState::Upgrading) {
                    Self::release(identifier, &connection, &transaction);
                    return Err(e);
                }
                match self.upgrade(identifier, chain, old_version, &transaction) {
                    Ok(version) => {
                        let database = self
                            .database(identifier, version, connection, chain)
                            .map_err(|e| attempt.fail(e))?;
                        attempt.advance(RunnerState::Open)?;
                        log::info!(
                            "Opened {} after migrating from version {} to {}",
                            identifier,
                            old_version,
                            version
                        );
                        Ok(database)
                    }
                    Err(e) => {
                        Self::release(identifier, &connection, &transaction);
                        Err(attempt.fail(e))
                    }
                }
            }
        }
    }

    /// Runs the steps after `old_version` and commits. Returns the version reached.
    fn upgrade(
        &self,
        identifier: &str,
        chain: &MigrationChain,
        old_version: u32,
        transaction: &Transaction,
    ) -> SchemataResult<u32> {
        let pending = chain.pending(old_version)?;
        let mut version = old_version;

        for step in pending {
            let next = version + 1;
            log::debug!("Migrating {} from version {} to {}", identifier, version, next);

            let from_api = QueryService::for_transaction(step.from_snapshot().clone(), transaction.clone());
            let to_api = QueryService::for_transaction(step.to_snapshot().clone(), transaction.clone());
            if let Err(e) = step.execute(&from_api, &to_api) {
                log::error!("Migration of {} from version {} to {} failed: {}", identifier, version, next, e);
                return Err(SchemataError::new_with_cause(
                    &format!("Migration of {} from version {} to {} failed", identifier, version, next),
                    ErrorKind::UpgradeError,
                    e,
                ));
            }

            if !transaction.is_active() {
                log::error!("Upgrade transaction of {} aborted during step {}", identifier, version);
                return Err(SchemataError::new(
                    &format!(
                        "Upgrade transaction of {} was aborted while migrating to version {}",
                        identifier, next
                    ),
                    ErrorKind::TransactionError,
                ));
            }
            version = next;
        }

        transaction.commit().map_err(|e| {
            SchemataError::new_with_cause(
                &format!("Upgrade of {} to version {} could not commit", identifier, version),
                ErrorKind::TransactionError,
                e,
            )
        })?;
        Ok(version)
    }

    /// Wraps the connection in a handle. From here on dropping the handle closes it.
    fn database(
        &self,
        identifier: &str,
        version: u32,
        connection: Connection,
        chain: &MigrationChain,
    ) -> SchemataResult<Database> {
        let database = Database::new(identifier, version, connection, chain.latest_snapshot().clone());
        if self.close_on_version_change {
            database.close_on_version_change()?;
        }
        Ok(database)
    }

    fn release(identifier: &str, connection: &Connection, transaction: &Transaction) {
        if let Err(abort_error) = transaction.abort() {
            log::warn!("Failed to abort upgrade of {}: {}", identifier, abort_error);
        }
        if let Err(close_error) = connection.close() {
            log::warn!("Failed to close {} after a failed upgrade: {}", identifier, close_error);
        }
    }
}

/// State machine of a single open attempt. Transitions are checked against the
/// attempt's own state; the runner only sees the latest one.
struct Attempt<'a> {
    identifier: &'a str,
    current: RunnerState,
    published: &'a Atomic<RunnerState>,
}

impl<'a> Attempt<'a> {
    fn begin(identifier: &'a str, published: &'a Atomic<RunnerState>) -> Self {
        published.write_with(|it| *it = RunnerState::Closed);
        Attempt {
            identifier,
            current: RunnerState::Closed,
            published,
        }
    }

    fn advance(&mut self, next: RunnerState) -> SchemataResult<()> {
        if !self.current.can_become(&next) {
            log::error!(
                "Illegal state change of {} from {} to {}",
                self.identifier,
                self.current,
                next
            );
            return Err(SchemataError::new(
                &format!("Illegal state change from {} to {}", self.current, next),
                ErrorKind::InternalError,
            ));
        }
        log::debug!("{}: {} -> {}", self.identifier, self.current, next);
        self.published.write_with(|it| *it = next.clone());
        self.current = next;
        Ok(())
    }

    fn fail(&mut self, error: SchemataError) -> SchemataError {
        match self.advance(RunnerState::Failed(error.kind().clone())) {
            Ok(()) => error,
            Err(illegal) => illegal,
        }
    }
}

/// Engine refusals keep their kind when it is one an open may fail with; anything
/// else becomes an `OpenError` carrying the engine error.
fn open_failure(identifier: &str, error: SchemataError) -> SchemataError {
    match error.kind() {
        ErrorKind::OpenError | ErrorKind::Blocked | ErrorKind::PreconditionViolation => error,
        _ => {
            log::error!("Engine failed to open {}: {}", identifier, error);
            SchemataError::new_with_cause(
                &format!("Failed to open {}", identifier),
                ErrorKind::OpenError,
                error,
            )
        }
    }
}
