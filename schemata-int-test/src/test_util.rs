use schemata::database::Database;
use schemata::engine::{InMemoryEngine, InMemoryEngineConfig, StorageEngine};
use schemata::errors::SchemataResult;
use schemata::migration::MigrationStep;
use schemata::schema::{SchemaSnapshot, SerdeCodec, Table};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

/// Runs `test` between `before` and `after`. `after` runs even when the test fails
/// or panics, so every store is cleaned up.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> SchemataResult<()>,
    B: Fn() -> SchemataResult<TestContext>,
    A: Fn(TestContext) -> SchemataResult<()>,
{
    let ctx = match before() {
        Ok(ctx) => ctx,
        Err(e) => panic!("Before run failed: {:?}", e),
    };

    let result = catch_unwind(AssertUnwindSafe(|| test(ctx.clone())));
    let after_result = after(ctx);

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => panic!("Test failed: {:?}", e),
        Err(panic) => resume_unwind(panic),
    }
    if let Err(e) = after_result {
        panic!("After run failed: {:?}", e);
    }
}

/// An engine plus the identifier of the store a test works on.
#[derive(Clone)]
pub struct TestContext {
    identifier: String,
    engine: StorageEngine,
}

impl TestContext {
    pub fn new(identifier: String, engine: StorageEngine) -> Self {
        Self { identifier, engine }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn engine(&self) -> StorageEngine {
        self.engine.clone()
    }

    /// Opens the test store with `steps` as its migration chain.
    pub fn open(&self, steps: &[MigrationStep]) -> SchemataResult<Database> {
        steps
            .iter()
            .fold(
                Database::builder()
                    .identifier(&self.identifier)
                    .engine(self.engine.clone()),
                |builder, step| builder.add_migration(step.clone()),
            )
            .open()
    }

    /// Committed version of the test store, zero when it does not exist.
    pub fn stored_version(&self) -> SchemataResult<u32> {
        Ok(self
            .engine
            .databases()?
            .into_iter()
            .find(|info| info.identifier == self.identifier)
            .map(|info| info.version)
            .unwrap_or(0))
    }
}

pub fn random_identifier() -> String {
    format!("store-{}", uuid::Uuid::new_v4())
}

pub fn create_test_context() -> SchemataResult<TestContext> {
    Ok(TestContext::new(
        random_identifier(),
        StorageEngine::new(InMemoryEngine::new()),
    ))
}

pub fn create_test_context_with(config: InMemoryEngineConfig) -> SchemataResult<TestContext> {
    Ok(TestContext::new(
        random_identifier(),
        StorageEngine::new(InMemoryEngine::with_config(config)?),
    ))
}

/// Deletes the test store. Every database opened on it must be closed or dropped.
pub fn cleanup(ctx: TestContext) -> SchemataResult<()> {
    ctx.engine.delete_store(&ctx.identifier)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub value: i64,
}

impl Entry {
    pub fn new(id: &str, value: i64) -> Self {
        Entry {
            id: id.to_string(),
            value,
        }
    }
}

/// `T1`, keyed by `id`. Negative values are rejected by the codec.
pub fn entries() -> Table<SerdeCodec<Entry>> {
    let codec = SerdeCodec::<Entry>::new().with_check(|entry| {
        if entry.value < 0 {
            Err(format!("value of {} must not be negative", entry.id))
        } else {
            Ok(())
        }
    });
    Table::new("T1", codec, "id")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub age: u32,
}

impl Person {
    pub fn new(name: &str, age: u32) -> Self {
        Person {
            name: name.to_string(),
            age,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedPerson {
    pub name_and_age: String,
    pub name: String,
    pub age: u32,
}

impl From<Person> for KeyedPerson {
    fn from(person: Person) -> Self {
        KeyedPerson {
            name_and_age: format!("{}:{}", person.name, person.age),
            name: person.name,
            age: person.age,
        }
    }
}

/// `T2` as first shipped, keyed by `name`.
pub fn people_by_name() -> Table<SerdeCodec<Person>> {
    Table::new("T2", SerdeCodec::new(), "name")
}

/// `T2` re-keyed by the derived `name_and_age`.
pub fn people_by_name_and_age() -> Table<SerdeCodec<KeyedPerson>> {
    Table::new("T2", SerdeCodec::new(), "name_and_age")
}

/// Records which step versions ran, in order.
#[derive(Clone, Default)]
pub struct StepRecorder {
    runs: Arc<Mutex<Vec<u32>>>,
}

impl StepRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A step to `version` that records itself, then creates every table `to`
    /// declares and `from` does not.
    pub fn step(&self, version: u32, from: SchemaSnapshot, to: SchemaSnapshot) -> MigrationStep {
        let runs = self.runs.clone();
        MigrationStep::new(from, to, move |from_api, to_api| {
            runs.lock().unwrap().push(version);
            for table in to_api.snapshot().tables() {
                if !from_api.snapshot().has_table(table.name()) {
                    to_api.create_table(table.name())?;
                }
            }
            Ok(())
        })
    }

    pub fn runs(&self) -> Vec<u32> {
        self.runs.lock().unwrap().clone()
    }
}
