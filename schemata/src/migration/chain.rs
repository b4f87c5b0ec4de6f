use super::step::MigrationStep;
use crate::errors::{ErrorKind, SchemataError, SchemataResult};
use crate::schema::SchemaSnapshot;

/// An ordered, validated sequence of migration steps.
///
/// Step `i` migrates from version `i` to version `i + 1`, so the chain's length is
/// the latest version. Construction checks that the first step starts from the empty
/// snapshot and that each step starts where the previous one ended.
#[derive(Clone, Debug)]
pub struct MigrationChain {
    steps: Vec<MigrationStep>,
    latest: SchemaSnapshot,
}

impl MigrationChain {
    pub fn new(steps: Vec<MigrationStep>) -> SchemataResult<Self> {
        let mut expected = SchemaSnapshot::empty();
        for (index, step) in steps.iter().enumerate() {
            if step.from_snapshot() != &expected {
                let message = if index == 0 {
                    "Migration step 0 must start from the empty schema".to_string()
                } else {
                    format!(
                        "Migration step {} does not start from the schema step {} migrates to",
                        index,
                        index - 1
                    )
                };
                log::error!("{}", message);
                return Err(SchemataError::new(&message, ErrorKind::SchemaError));
            }
            expected = step.to_snapshot().clone();
        }

        Ok(MigrationChain {
            steps,
            latest: expected,
        })
    }

    /// The latest declared version, zero for an empty chain.
    pub fn version(&self) -> u32 {
        self.steps.len() as u32
    }

    /// The schema at [`MigrationChain::version`].
    pub fn latest_snapshot(&self) -> &SchemaSnapshot {
        &self.latest
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// Schema at `version`, if the chain declares it.
    pub fn snapshot_at(&self, version: u32) -> Option<&SchemaSnapshot> {
        match version {
            0 if self.steps.is_empty() => Some(&self.latest),
            0 => self.steps.first().map(MigrationStep::from_snapshot),
            _ => self
                .steps
                .get(version as usize - 1)
                .map(MigrationStep::to_snapshot),
        }
    }

    /// Steps still to run for a store at `stored_version`, in order.
    ///
    /// Fails with `PreconditionViolation` when the store is ahead of the chain, since
    /// no downgrade path exists.
    pub fn pending(&self, stored_version: u32) -> SchemataResult<&[MigrationStep]> {
        if stored_version > self.version() {
            log::error!(
                "Stored version {} is above the latest declared version {}",
                stored_version,
                self.version()
            );
            return Err(SchemataError::new(
                &format!(
                    "Stored version {} is above the latest declared version {}",
                    stored_version,
                    self.version()
                ),
                ErrorKind::PreconditionViolation,
            ));
        }
        Ok(&self.steps[stored_version as usize..])
    }
}
