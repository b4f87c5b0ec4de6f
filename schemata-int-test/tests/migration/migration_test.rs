use schemata::database::Database;
use schemata::errors::{ErrorKind, SchemataError};
use schemata::migration::{MigrationChain, MigrationRunner, MigrationStep, RunnerState};
use schemata::schema::{RawCodec, SchemaSnapshot, Table};
use schemata_int_test::test_util::{
    cleanup, create_test_context, entries, people_by_name, run_test, Entry, Person, StepRecorder,
};
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

fn v1() -> SchemaSnapshot {
    SchemaSnapshot::builder().table(&entries()).build().unwrap()
}

fn v2() -> SchemaSnapshot {
    SchemaSnapshot::builder()
        .table(&entries())
        .table(&people_by_name())
        .build()
        .unwrap()
}

fn summary() -> Table<RawCodec> {
    Table::new("summary", RawCodec, "table")
}

// ==================== Step Execution ====================

#[test]
fn fresh_store_runs_every_step_once_in_order() {
    run_test(
        || create_test_context(),
        |ctx| {
            let recorder = StepRecorder::new();
            let db = ctx.open(&[
                recorder.step(1, SchemaSnapshot::empty(), v1()),
                recorder.step(2, v1(), v2()),
                recorder.step(3, v2(), v2()),
            ])?;

            assert_eq!(db.version(), 3);
            assert_eq!(recorder.runs(), vec![1, 2, 3]);
            assert_eq!(db.table_names()?, vec!["T1", "T2"]);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn store_at_latest_version_runs_no_step() {
    run_test(
        || create_test_context(),
        |ctx| {
            let recorder = StepRecorder::new();
            let steps = [recorder.step(1, SchemaSnapshot::empty(), v1())];

            ctx.open(&steps)?.close()?;
            let db = ctx.open(&steps)?;
            assert_eq!(db.version(), 1);
            assert_eq!(recorder.runs(), vec![1]);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn only_steps_after_stored_version_run() {
    run_test(
        || create_test_context(),
        |ctx| {
            let recorder = StepRecorder::new();
            let step0 = recorder.step(1, SchemaSnapshot::empty(), v1());
            let step1 = recorder.step(2, v1(), v2());
            let step2 = recorder.step(3, v2(), v2());

            ctx.open(&[step0.clone()])?.close()?;
            let db = ctx.open(&[step0, step1, step2])?;
            assert_eq!(db.version(), 3);
            assert_eq!(recorder.runs(), vec![1, 2, 3]);
            assert_eq!(ctx.stored_version()?, 3);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn step_sees_writes_of_earlier_steps() {
    run_test(
        || create_test_context(),
        |ctx| {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let record = seen.clone();
            let db = ctx.open(&[
                MigrationStep::new(SchemaSnapshot::empty(), v1(), |_, to| {
                    to.create_table("T1")?;
                    to.insert(&entries(), &Entry::new("a", 1))?;
                    Ok(())
                }),
                MigrationStep::new(v1(), v1(), move |from, _| {
                    *record.lock().unwrap() = from.get_all(&entries())?;
                    Ok(())
                }),
            ])?;

            assert_eq!(db.version(), 2);
            assert_eq!(*seen.lock().unwrap(), vec![Entry::new("a", 1)]);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn step_may_read_other_tables() {
    run_test(
        || create_test_context(),
        |ctx| {
            let with_summary = SchemaSnapshot::builder()
                .table(&entries())
                .table(&summary())
                .build()?;
            let step0 = MigrationStep::create_tables(SchemaSnapshot::empty(), v1());
            let step1 = MigrationStep::new(v1(), with_summary, |from, to| {
                let count = from.count(&entries())?;
                to.create_table("summary")?;
                to.insert(&summary(), &json!({"table": "T1", "rows": count}))?;
                Ok(())
            });

            let db = ctx.open(&[step0.clone()])?;
            db.query()
                .insert_all(&entries(), &[Entry::new("a", 1), Entry::new("b", 2)])?;
            db.close()?;

            let db = ctx.open(&[step0, step1])?;
            let rows = db.query().get_all(&summary())?;
            assert_eq!(rows, vec![json!({"table": "T1", "rows": 2})]);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

// ==================== Atomicity ====================

#[test]
fn failing_step_leaves_store_as_before() {
    run_test(
        || create_test_context(),
        |ctx| {
            let step0 = MigrationStep::create_tables(SchemaSnapshot::empty(), v1());
            let db = ctx.open(&[step0.clone()])?;
            db.query().insert(&entries(), &Entry::new("kept", 1))?;
            db.close()?;

            let failing = MigrationStep::new(v1(), v2(), |_, to| {
                to.create_table("T2")?;
                to.insert(&entries(), &Entry::new("lost", 2))?;
                Err(SchemataError::new("cannot migrate", ErrorKind::InvalidOperation))
            });
            let err = ctx.open(&[step0.clone(), failing]).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::UpgradeError);
            assert_eq!(err.cause().map(|c| c.kind()), Some(&ErrorKind::InvalidOperation));
            assert_eq!(ctx.stored_version()?, 1);

            let db = ctx.open(&[step0])?;
            assert_eq!(db.query().get_all(&entries())?, vec![Entry::new("kept", 1)]);
            assert_eq!(db.table_names()?, vec!["T1"]);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn failure_on_fresh_store_keeps_version_zero() {
    run_test(
        || create_test_context(),
        |ctx| {
            let recorder = StepRecorder::new();
            let step0 = recorder.step(1, SchemaSnapshot::empty(), v1());
            let failing = MigrationStep::new(v1(), v2(), |_, _| {
                Err(SchemataError::new("second step refused", ErrorKind::InvalidOperation))
            });

            let err = ctx.open(&[step0.clone(), failing]).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::UpgradeError);
            assert_eq!(ctx.stored_version()?, 0);

            let db = ctx.open(&[step0])?;
            assert_eq!(db.version(), 1);
            assert_eq!(recorder.runs(), vec![1, 1]);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn creating_a_table_twice_fails_the_upgrade() {
    run_test(
        || create_test_context(),
        |ctx| {
            let second_kind = Arc::new(Mutex::new(None));
            let record = second_kind.clone();
            let step = MigrationStep::new(SchemaSnapshot::empty(), v1(), move |_, to| {
                to.create_table("T1")?;
                let second = to.create_table("T1");
                *record.lock().unwrap() = second.as_ref().err().map(|e| e.kind().clone());
                second
            });

            let err = ctx.open(&[step]).unwrap_err();
            assert_eq!(*second_kind.lock().unwrap(), Some(ErrorKind::TransactionError));
            assert_eq!(err.kind(), &ErrorKind::UpgradeError);
            assert_eq!(err.cause().map(|c| c.kind()), Some(&ErrorKind::TransactionError));
            assert_eq!(ctx.stored_version()?, 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn swallowed_write_failure_still_aborts_upgrade() {
    run_test(
        || create_test_context(),
        |ctx| {
            let step = MigrationStep::new(SchemaSnapshot::empty(), v1(), |_, to| {
                to.create_table("T1")?;
                to.insert(&entries(), &Entry::new("dup", 1))?;
                let _ = to.insert(&entries(), &Entry::new("dup", 2));
                Ok(())
            });

            let err = ctx.open(&[step]).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::TransactionError);
            assert_eq!(ctx.stored_version()?, 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn panicking_step_body_rolls_back_upgrade() {
    run_test(
        || create_test_context(),
        |ctx| {
            let step0 = MigrationStep::create_tables(SchemaSnapshot::empty(), v1());
            let panicking = MigrationStep::new(SchemaSnapshot::empty(), v1(), |_, to| {
                to.create_table("T1")?;
                panic!("step body bug");
            });

            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| ctx.open(&[panicking])));
            assert!(outcome.is_err());
            assert_eq!(ctx.stored_version()?, 0);

            let db = ctx.open(&[step0])?;
            assert_eq!(db.version(), 1);
            assert_eq!(db.table_names()?, vec!["T1"]);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

// ==================== Schema Scoping ====================

#[test]
fn undeclared_table_is_rejected_before_engine_call() {
    run_test(
        || create_test_context(),
        |ctx| {
            let rejected = Arc::new(Mutex::new(None));
            let record = rejected.clone();
            let step = MigrationStep::new(SchemaSnapshot::empty(), v1(), move |from, to| {
                let err = from.create_table("T1").unwrap_err();
                *record.lock().unwrap() = Some(err.kind().clone());
                to.create_table("T1")
            });

            let db = ctx.open(&[step])?;
            assert_eq!(*rejected.lock().unwrap(), Some(ErrorKind::SchemaError));
            assert_eq!(db.version(), 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn step_may_drop_tables_it_no_longer_declares() {
    run_test(
        || create_test_context(),
        |ctx| {
            let only_people = SchemaSnapshot::builder().table(&people_by_name()).build()?;
            let db = ctx.open(&[
                MigrationStep::create_tables(SchemaSnapshot::empty(), v2()),
                MigrationStep::create_tables(v2(), only_people),
            ])?;

            assert_eq!(db.table_names()?, vec!["T2"]);
            db.query().insert(&people_by_name(), &Person::new("carol", 41))?;
            let err = db.query().insert(&entries(), &Entry::new("x", 1)).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::SchemaError);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

// ==================== Version Checks ====================

#[test]
fn store_ahead_of_chain_is_precondition_violation() {
    run_test(
        || create_test_context(),
        |ctx| {
            let recorder = StepRecorder::new();
            let step0 = recorder.step(1, SchemaSnapshot::empty(), v1());
            ctx.open(&[step0.clone(), recorder.step(2, v1(), v2())])?.close()?;

            let err = ctx.open(&[step0]).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::PreconditionViolation);
            assert_eq!(recorder.runs(), vec![1, 2]);
            assert_eq!(ctx.stored_version()?, 2);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn broken_chain_is_schema_error() {
    run_test(
        || create_test_context(),
        |ctx| {
            let err = ctx
                .open(&[
                    MigrationStep::create_tables(SchemaSnapshot::empty(), v1()),
                    MigrationStep::create_tables(v2(), v2()),
                ])
                .unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::SchemaError);
            assert!(ctx.engine().databases()?.is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

// ==================== Runner ====================

#[test]
fn runner_reports_state_of_last_attempt() {
    run_test(
        || create_test_context(),
        |ctx| {
            let chain = MigrationChain::new(vec![MigrationStep::create_tables(SchemaSnapshot::empty(), v1())])?;
            let runner = MigrationRunner::new(ctx.engine());
            assert_eq!(runner.state(), RunnerState::Closed);

            let first = runner.open_and_migrate(ctx.identifier(), &chain)?;
            assert_eq!(runner.state(), RunnerState::Open);

            let longer = MigrationChain::new(vec![
                MigrationStep::create_tables(SchemaSnapshot::empty(), v1()),
                MigrationStep::create_tables(v1(), v2()),
            ])?;
            let err = runner.open_and_migrate(ctx.identifier(), &longer).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::Blocked);
            assert_eq!(runner.state(), RunnerState::Failed(ErrorKind::Blocked));

            first.close()?;
            let second = runner.open_and_migrate(ctx.identifier(), &longer)?;
            assert_eq!(second.version(), 2);
            assert_eq!(runner.state(), RunnerState::Open);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn close_on_version_change_lets_newer_opener_upgrade() {
    run_test(
        || create_test_context(),
        |ctx| {
            let step0 = MigrationStep::create_tables(SchemaSnapshot::empty(), v1());
            let old = Database::builder()
                .identifier(ctx.identifier())
                .engine(ctx.engine())
                .add_migration(step0.clone())
                .close_on_version_change()
                .open()?;

            let new = ctx.open(&[step0, MigrationStep::create_tables(v1(), v2())])?;
            assert_eq!(new.version(), 2);
            assert!(old.is_closed());

            let err = old.query().count(&entries()).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::StoreClosed);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
