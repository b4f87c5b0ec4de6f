use schemata::common::SubscriberRef;
use schemata::database::Database;
use schemata::engine::{
    EngineEventListener, InMemoryEngine, OpenOutcome, StorageEngine, StorageEngineProvider, StoreInfo,
};
use schemata::errors::{ErrorKind, SchemataError, SchemataResult};
use schemata::migration::MigrationStep;
use schemata::schema::SchemaSnapshot;
use schemata_int_test::test_util::{
    cleanup, create_test_context, entries, random_identifier, run_test, Entry, StepRecorder,
};

fn v1() -> SchemaSnapshot {
    SchemaSnapshot::builder().table(&entries()).build().unwrap()
}

/// An engine whose storage is unreachable.
struct UnreachableEngine;

impl StorageEngineProvider for UnreachableEngine {
    fn open(&self, identifier: &str, _target_version: u32) -> SchemataResult<OpenOutcome> {
        Err(SchemataError::new(
            &format!("storage for {} is unreachable", identifier),
            ErrorKind::InternalError,
        ))
    }

    fn delete_store(&self, _identifier: &str) -> SchemataResult<()> {
        Ok(())
    }

    fn databases(&self) -> SchemataResult<Vec<StoreInfo>> {
        Ok(vec![])
    }

    fn subscribe(&self, _listener: EngineEventListener) -> SchemataResult<Option<SubscriberRef>> {
        Ok(None)
    }

    fn unsubscribe(&self, _subscriber: SubscriberRef) -> SchemataResult<()> {
        Ok(())
    }
}

#[test]
fn engine_failure_is_open_error() {
    let err = Database::builder()
        .identifier(&random_identifier())
        .engine(StorageEngine::new(UnreachableEngine))
        .add_migration(MigrationStep::create_tables(SchemaSnapshot::empty(), v1()))
        .open()
        .unwrap_err();

    assert_eq!(err.kind(), &ErrorKind::OpenError);
    assert_eq!(err.cause().map(|c| c.kind()), Some(&ErrorKind::InternalError));
}

#[test]
fn databases_lists_committed_versions() {
    let engine = StorageEngine::new(InMemoryEngine::new());
    let step0 = MigrationStep::create_tables(SchemaSnapshot::empty(), v1());
    let open = |identifier: &str, steps: &[MigrationStep]| {
        steps
            .iter()
            .fold(
                Database::builder().identifier(identifier).engine(engine.clone()),
                |builder, step| builder.add_migration(step.clone()),
            )
            .open()
    };

    let beta = open("beta", &[step0.clone(), MigrationStep::create_tables(v1(), v1())]).unwrap();
    let alpha = open("alpha", &[step0]).unwrap();

    let stores = engine.databases().unwrap();
    assert_eq!(
        stores,
        vec![
            StoreInfo {
                identifier: "alpha".to_string(),
                version: 1
            },
            StoreInfo {
                identifier: "beta".to_string(),
                version: 2
            },
        ]
    );

    alpha.close().unwrap();
    beta.close().unwrap();
}

#[test]
fn deleted_store_migrates_again_from_scratch() {
    run_test(
        || create_test_context(),
        |ctx| {
            let recorder = StepRecorder::new();
            let steps = [recorder.step(1, SchemaSnapshot::empty(), v1())];

            let db = ctx.open(&steps)?;
            db.query().insert(&entries(), &Entry::new("gone", 1))?;
            db.close()?;

            ctx.engine().delete_store(ctx.identifier())?;
            assert_eq!(ctx.stored_version()?, 0);

            let db = ctx.open(&steps)?;
            assert_eq!(recorder.runs(), vec![1, 1]);
            assert_eq!(db.query().count(&entries())?, 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn open_database_blocks_store_deletion() {
    run_test(
        || create_test_context(),
        |ctx| {
            let db = ctx.open(&[MigrationStep::create_tables(SchemaSnapshot::empty(), v1())])?;
            let err = ctx.engine().delete_store(ctx.identifier()).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::Blocked);
            assert_eq!(ctx.stored_version()?, 1);
            db.close()?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn concurrent_readers_share_an_open_store() {
    run_test(
        || create_test_context(),
        |ctx| {
            let steps = [MigrationStep::create_tables(SchemaSnapshot::empty(), v1())];
            let first = ctx.open(&steps)?;
            let second = ctx.open(&steps)?;

            first.query().insert(&entries(), &Entry::new("a", 1))?;
            second.query().insert(&entries(), &Entry::new("b", 2))?;

            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let db = first.clone();
                    std::thread::spawn(move || db.query().count(&entries()))
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap()?, 2);
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
