use schemata::common::{Key, KeyPath};
use schemata::errors::ErrorKind;
use schemata::migration::MigrationStep;
use schemata::schema::{RawCodec, SchemaSnapshot, SerdeCodec, Table};
use schemata_int_test::test_util::{
    cleanup, create_test_context, entries, people_by_name, run_test, Entry, Person, TestContext,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

fn notes() -> Table<RawCodec> {
    Table::auto_increment("notes", RawCodec, "id")
}

fn snapshot() -> SchemaSnapshot {
    SchemaSnapshot::builder()
        .table(&entries())
        .table(&people_by_name())
        .table(&notes())
        .build()
        .unwrap()
}

fn open(ctx: &TestContext) -> schemata::errors::SchemataResult<schemata::database::Database> {
    ctx.open(&[MigrationStep::create_tables(SchemaSnapshot::empty(), snapshot())])
}

#[test]
fn insert_then_get_returns_same_value() {
    run_test(
        || create_test_context(),
        |ctx| {
            let db = open(&ctx)?;
            let key = db.query().insert(&people_by_name(), &Person::new("dave", 52))?;
            assert_eq!(key, Key::from("dave"));
            assert_eq!(db.query().get(&people_by_name(), &key)?, Some(Person::new("dave", 52)));
            assert_eq!(db.query().get(&people_by_name(), &Key::from("erin"))?, None);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn duplicate_key_is_write_error() {
    run_test(
        || create_test_context(),
        |ctx| {
            let db = open(&ctx)?;
            db.query().insert(&entries(), &Entry::new("1", 1))?;
            let err = db.query().insert(&entries(), &Entry::new("1", 2)).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::WriteError);
            assert_eq!(db.query().get(&entries(), &Key::from("1"))?, Some(Entry::new("1", 1)));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn put_overwrites_and_delete_removes() {
    run_test(
        || create_test_context(),
        |ctx| {
            let db = open(&ctx)?;
            let query = db.query();
            query.insert(&entries(), &Entry::new("1", 1))?;
            query.put(&entries(), &Entry::new("1", 10))?;
            query.put(&entries(), &Entry::new("2", 20))?;
            assert_eq!(query.count(&entries())?, 2);
            assert_eq!(query.get(&entries(), &Key::from("1"))?, Some(Entry::new("1", 10)));

            query.delete(&entries(), &Key::from("1"))?;
            assert_eq!(query.get_all(&entries())?, vec![Entry::new("2", 20)]);

            query.clear(&entries())?;
            assert_eq!(query.count(&entries())?, 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn insert_all_returns_keys_in_order() {
    run_test(
        || create_test_context(),
        |ctx| {
            let db = open(&ctx)?;
            let keys = db.query().insert_all(
                &entries(),
                &[Entry::new("b", 2), Entry::new("a", 1), Entry::new("c", 3)],
            )?;
            assert_eq!(keys, vec![Key::from("b"), Key::from("a"), Key::from("c")]);

            let all = db.query().get_all(&entries())?;
            assert_eq!(all.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["a", "b", "c"]);
            assert!(db.query().insert_all(&entries(), &[])?.is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn insert_all_stops_at_first_failure() {
    run_test(
        || create_test_context(),
        |ctx| {
            let db = open(&ctx)?;
            let err = db
                .query()
                .insert_all(
                    &entries(),
                    &[Entry::new("a", 1), Entry::new("b", -2), Entry::new("c", 3)],
                )
                .unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::ValidationError);

            // each record is its own transaction on an open database
            assert_eq!(db.query().get_all(&entries())?, vec![Entry::new("a", 1)]);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn auto_increment_generates_and_injects_keys() {
    run_test(
        || create_test_context(),
        |ctx| {
            let db = open(&ctx)?;
            let first = db.query().insert(&notes(), &json!({"text": "first"}))?;
            let second = db.query().insert(&notes(), &json!({"text": "second"}))?;
            assert_eq!(first, Key::from(1));
            assert_eq!(second, Key::from(2));
            assert_eq!(
                db.query().get(&notes(), &second)?,
                Some(json!({"id": 2, "text": "second"}))
            );

            let explicit = db.query().insert(&notes(), &json!({"id": 10, "text": "tenth"}))?;
            assert_eq!(explicit, Key::from(10));
            let next = db.query().insert(&notes(), &json!({"text": "after"}))?;
            assert_eq!(next, Key::from(11));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn huge_explicit_key_is_accepted_and_ends_key_generation() {
    run_test(
        || create_test_context(),
        |ctx| {
            let db = open(&ctx)?;
            let key = db.query().insert(&notes(), &json!({"id": 1e20, "text": "far"}))?;
            assert_eq!(key, Key::from(1e20));
            assert_eq!(db.query().count(&notes())?, 1);

            let err = db.query().insert(&notes(), &json!({"text": "next"})).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::WriteError);
            assert_eq!(db.query().count(&notes())?, 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn raw_access_validates_through_codec() {
    run_test(
        || create_test_context(),
        |ctx| {
            let db = open(&ctx)?;
            let key = db.query().insert_raw("T1", &json!({"id": "r", "value": 5}))?;
            assert_eq!(db.query().get_raw("T1", &key)?, Some(json!({"id": "r", "value": 5})));
            assert_eq!(db.query().get(&entries(), &key)?, Some(Entry::new("r", 5)));

            let err = db.query().insert_raw("T1", &json!({"id": "r2", "value": -5})).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::ValidationError);

            let err = db.query().get_all_raw("missing").unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::SchemaError);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn tables_outside_snapshot_are_schema_errors() {
    run_test(
        || create_test_context(),
        |ctx| {
            let db = open(&ctx)?;
            let undeclared = Table::new("T9", RawCodec, "id");
            let err = db.query().insert(&undeclared, &json!({"id": 1})).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::SchemaError);
            assert!(err.message().contains("T9"));

            let redeclared = Table::new("T1", SerdeCodec::<Entry>::new(), KeyPath::single("value"));
            let err = db.query().get_all(&redeclared).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::SchemaError);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn table_changes_outside_upgrade_are_transaction_errors() {
    run_test(
        || create_test_context(),
        |ctx| {
            let db = open(&ctx)?;
            assert_eq!(db.query().create_table("T1").unwrap_err().kind(), &ErrorKind::TransactionError);
            assert_eq!(db.query().delete_table("T1").unwrap_err().kind(), &ErrorKind::TransactionError);
            assert_eq!(db.table_names()?, vec!["T1", "T2", "notes"]);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictNote {
    id: String,
    title: String,
}

#[test]
fn stored_record_that_no_longer_decodes_is_validation_error() {
    run_test(
        || create_test_context(),
        |ctx| {
            let loose = Table::new("notes", RawCodec, "id");
            let strict = Table::new("notes", SerdeCodec::<StrictNote>::new(), "id");
            let v1 = SchemaSnapshot::builder().table(&loose).build()?;
            let v2 = SchemaSnapshot::builder().table(&strict).build()?;
            let step0 = MigrationStep::create_tables(SchemaSnapshot::empty(), v1.clone());

            let db = ctx.open(&[step0.clone()])?;
            db.query().insert(&loose, &json!({"id": "n1", "body": "untitled"}))?;
            db.close()?;

            // the step keeps the collection and its records as they are
            let db = ctx.open(&[step0, MigrationStep::new(v1, v2, |_, _| Ok(()))])?;
            let err = db.query().get_all(&strict).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::ValidationError);
            assert!(err.cause().is_some());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
