use crate::errors::SchemataResult;
use crate::query::QueryService;
use crate::schema::SchemaSnapshot;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Body of a migration step.
///
/// The first service is scoped to the step's `from` snapshot (read or drop the old
/// shape), the second to its `to` snapshot (create and fill the new shape). Both are
/// bound to the same upgrade transaction.
pub trait MigrationBody:
    Send + Sync + Fn(&QueryService, &QueryService) -> SchemataResult<()>
{
}

impl<F> MigrationBody for F where F: Send + Sync + Fn(&QueryService, &QueryService) -> SchemataResult<()> {}

/// The edge between two adjacent schema versions.
///
/// ```rust,ignore
/// let v1 = SchemaSnapshot::builder().table(&todos).build()?;
/// let step = MigrationStep::new(SchemaSnapshot::empty(), v1, |_from, to| {
///     to.create_table("todo")
/// });
/// ```
#[derive(Clone)]
pub struct MigrationStep {
    inner: Arc<MigrationStepInner>,
}

struct MigrationStepInner {
    from: SchemaSnapshot,
    to: SchemaSnapshot,
    body: Arc<dyn MigrationBody>,
}

impl MigrationStep {
    pub fn new(from: SchemaSnapshot, to: SchemaSnapshot, body: impl MigrationBody + 'static) -> Self {
        MigrationStep {
            inner: Arc::new(MigrationStepInner {
                from,
                to,
                body: Arc::new(body),
            }),
        }
    }

    /// A step whose body creates every table of `to` that `from` does not declare
    /// identically, after dropping the tables of `from` that `to` no longer declares
    /// identically.
    ///
    /// Records of a re-declared table are lost; write a custom body to carry them over.
    pub fn create_tables(from: SchemaSnapshot, to: SchemaSnapshot) -> Self {
        MigrationStep::new(from, to, |from_api, to_api| {
            for table in from_api.snapshot().tables() {
                if to_api.snapshot().table(table.name()) != Some(table) {
                    from_api.delete_table(table.name())?;
                }
            }
            for table in to_api.snapshot().tables() {
                if from_api.snapshot().table(table.name()) != Some(table) {
                    to_api.create_table(table.name())?;
                }
            }
            Ok(())
        })
    }

    pub fn from_snapshot(&self) -> &SchemaSnapshot {
        &self.inner.from
    }

    pub fn to_snapshot(&self) -> &SchemaSnapshot {
        &self.inner.to
    }

    /// Runs the body once.
    pub fn execute(&self, from_api: &QueryService, to_api: &QueryService) -> SchemataResult<()> {
        (self.inner.body)(from_api, to_api)
    }
}

impl Debug for MigrationStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStep")
            .field("from", &self.inner.from.table_names())
            .field("to", &self.inner.to.table_names())
            .field("body", &"<body>")
            .finish()
    }
}
