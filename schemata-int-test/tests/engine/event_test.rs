use schemata::engine::{EngineEventInfo, EngineEventListener, EngineEvents, InMemoryEngineConfig};
use schemata::errors::{ErrorKind, SchemataError};
use schemata::migration::MigrationStep;
use schemata::schema::SchemaSnapshot;
use schemata_int_test::test_util::{cleanup, create_test_context_with, entries, run_test};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn wait_for_event<F: Fn() -> bool>(timeout_ms: u64, check: F) {
    awaitility::at_most(Duration::from_millis(timeout_ms)).until(check);
}

fn v1() -> SchemaSnapshot {
    SchemaSnapshot::builder().table(&entries()).build().unwrap()
}

fn recording_config() -> (InMemoryEngineConfig, Arc<Mutex<Vec<EngineEventInfo>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let config = InMemoryEngineConfig::new();
    config.add_engine_listener(EngineEventListener::new(move |info: EngineEventInfo| {
        sink.lock().unwrap().push(info);
        Ok(())
    }));
    (config, events)
}

fn kinds(events: &Arc<Mutex<Vec<EngineEventInfo>>>) -> Vec<EngineEvents> {
    events.lock().unwrap().iter().map(|info| info.event()).collect()
}

#[test]
fn successful_upgrade_publishes_started_and_committed() {
    let (config, events) = recording_config();
    run_test(
        || create_test_context_with(config.clone()),
        |ctx| {
            let db = ctx.open(&[MigrationStep::create_tables(SchemaSnapshot::empty(), v1())])?;
            wait_for_event(1000, || kinds(&events).contains(&EngineEvents::Committed));

            let started = events
                .lock()
                .unwrap()
                .iter()
                .find(|info| info.event() == EngineEvents::UpgradeStarted)
                .cloned();
            let started = started.expect("upgrade started event");
            assert_eq!(started.identifier(), ctx.identifier());
            assert_eq!(started.old_version(), 0);
            assert_eq!(started.new_version(), 1);

            db.close()?;
            wait_for_event(1000, || kinds(&events).contains(&EngineEvents::Closed));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn reopen_publishes_opened_with_old_version() {
    let (config, events) = recording_config();
    run_test(
        || create_test_context_with(config.clone()),
        |ctx| {
            let step0 = MigrationStep::create_tables(SchemaSnapshot::empty(), v1());
            ctx.open(&[step0.clone()])?.close()?;
            ctx.open(&[step0.clone()])?.close()?;
            wait_for_event(1000, || kinds(&events).contains(&EngineEvents::Opened));

            ctx.open(&[step0, MigrationStep::create_tables(v1(), v1())])?;
            wait_for_event(1000, || {
                events
                    .lock()
                    .unwrap()
                    .iter()
                    .any(|info| info.event() == EngineEvents::UpgradeStarted && info.old_version() == 1)
            });
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn failed_upgrade_publishes_aborted() {
    let (config, events) = recording_config();
    run_test(
        || create_test_context_with(config.clone()),
        |ctx| {
            let failing = MigrationStep::new(SchemaSnapshot::empty(), v1(), |_, _| {
                Err(SchemataError::new("nope", ErrorKind::InvalidOperation))
            });
            assert!(ctx.open(&[failing]).is_err());

            wait_for_event(1000, || kinds(&events).contains(&EngineEvents::Aborted));
            assert!(!kinds(&events).contains(&EngineEvents::Committed));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn blocked_upgrade_publishes_blocked() {
    let (config, events) = recording_config();
    run_test(
        || create_test_context_with(config.clone()),
        |ctx| {
            let step0 = MigrationStep::create_tables(SchemaSnapshot::empty(), v1());
            let db = ctx.open(&[step0.clone()])?;
            let err = ctx
                .open(&[step0, MigrationStep::create_tables(v1(), v1())])
                .unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::Blocked);

            wait_for_event(1000, || kinds(&events).contains(&EngineEvents::Blocked));
            db.close()?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn delete_publishes_deleted() {
    let (config, events) = recording_config();
    run_test(
        || create_test_context_with(config.clone()),
        |ctx| {
            ctx.open(&[MigrationStep::create_tables(SchemaSnapshot::empty(), v1())])?
                .close()?;
            ctx.engine().delete_store(ctx.identifier())?;
            wait_for_event(1000, || kinds(&events).contains(&EngineEvents::Deleted));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
