//! Schema synchronization against a live database.

mod common;

use approvals::registry::{LiveSchema, SyncOptions};
use approvals::store::StoreError;
use common::{reset_database, test_store};
use diesel::RunQueryDsl;
use serial_test::serial;

async fn execute(store: &approvals::store::Store, sql: &'static str) {
    store
        .run("test.execute", move |store| {
            store.with_conn(|conn| {
                diesel::sql_query(sql).execute(conn)?;
                Ok::<_, StoreError>(())
            })
        })
        .await
        .expect("statement failed");
}

fn delete_rule(live: &LiveSchema, table: &str, column: &str) -> String {
    live.tables[table]
        .foreign_keys
        .values()
        .find(|fk| fk.column == column)
        .map(|fk| fk.delete_rule.clone())
        .unwrap_or_default()
}

#[tokio::test]
#[serial]
async fn synchronize_is_idempotent() {
    let store = test_store();
    reset_database(&store).await;

    let plan = store
        .run("test.sync", |store| store.synchronize(SyncOptions::default()))
        .await
        .unwrap();

    assert!(plan.is_empty());
}

#[tokio::test]
#[serial]
async fn live_schema_has_every_declared_table() {
    let store = test_store();
    reset_database(&store).await;

    let live = store
        .run("test.live_schema", |store| store.live_schema())
        .await
        .unwrap();

    for table in [
        "accounts",
        "refresh_tokens",
        "departments",
        "employees",
        "requests",
        "request_items",
        "workflows",
    ] {
        assert!(live.tables.contains_key(table), "missing table {table}");
    }
    assert_eq!(delete_rule(&live, "requests", "approver_id"), "SET NULL");
    assert_eq!(delete_rule(&live, "request_items", "request_id"), "CASCADE");
}

#[tokio::test]
#[serial]
async fn missing_column_is_restored() {
    let store = test_store();
    reset_database(&store).await;
    execute(&store, "ALTER TABLE departments DROP COLUMN description").await;

    let plan = store
        .run("test.sync", |store| store.synchronize(SyncOptions::default()))
        .await
        .unwrap();

    assert!(!plan.is_empty());
    let live = store
        .run("test.live_schema", |store| store.live_schema())
        .await
        .unwrap();
    assert!(live.tables["departments"].columns.contains_key("description"));
}

#[tokio::test]
#[serial]
async fn undeclared_column_survives_unless_destructive() {
    let store = test_store();
    reset_database(&store).await;
    execute(&store, "ALTER TABLE departments ADD COLUMN legacy_code TEXT").await;

    let safe = store
        .run("test.sync", |store| store.synchronize(SyncOptions::default()))
        .await
        .unwrap();
    assert_eq!(safe.retained, vec!["departments.legacy_code".to_string()]);

    store
        .run("test.sync", |store| {
            store.synchronize(SyncOptions { destructive: true })
        })
        .await
        .unwrap();

    let live = store
        .run("test.live_schema", |store| store.live_schema())
        .await
        .unwrap();
    assert!(!live.tables["departments"].columns.contains_key("legacy_code"));
}
