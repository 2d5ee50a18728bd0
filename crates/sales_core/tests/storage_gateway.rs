use rusqlite::types::Value;
use rusqlite::Connection;
use sales_core::{GatewayError, StorageGateway};
use std::time::Duration;

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn committed_scope_makes_writes_visible_and_returns_rows() {
    let mut gateway = StorageGateway::open_in_memory().unwrap();

    let mut scope = gateway.begin_transaction().unwrap();
    let inserted = scope
        .execute(
            "INSERT INTO customers (name) VALUES (?1) RETURNING id, name;",
            ["Mary"],
        )
        .unwrap();
    assert_eq!(inserted.len(), 1);
    assert_eq!(inserted.affected(), 1);
    assert_eq!(inserted.columns(), ["id".to_string(), "name".to_string()]);
    assert_eq!(inserted.rows()[0][1], Value::Text("Mary".to_string()));
    assert_eq!(scope.statement_count(), 1);
    scope.commit().unwrap();

    assert_eq!(count(gateway.connection(), "customers"), 1);
}

#[test]
fn statements_without_result_columns_report_affected_rows() {
    let mut gateway = StorageGateway::open_in_memory().unwrap();
    let mut scope = gateway.begin_transaction().unwrap();

    let result = scope
        .execute(
            "INSERT INTO customers (name) VALUES (?1), (?2);",
            ["Mary", "Joe"],
        )
        .unwrap();
    assert!(result.is_empty());
    assert_eq!(result.affected(), 2);
}

#[test]
fn dropped_scope_rolls_back() {
    let mut gateway = StorageGateway::open_in_memory().unwrap();
    {
        let mut scope = gateway.begin_transaction().unwrap();
        scope
            .execute("INSERT INTO customers (name) VALUES (?1);", ["Mary"])
            .unwrap();
    }

    assert_eq!(count(gateway.connection(), "customers"), 0);
    assert!(gateway.connection().is_autocommit());
}

#[test]
fn explicit_rollback_restores_previous_state() {
    let mut gateway = StorageGateway::open_in_memory().unwrap();
    gateway
        .connection()
        .execute("INSERT INTO customers (name) VALUES ('Mary');", [])
        .unwrap();

    let mut scope = gateway.begin_transaction().unwrap();
    scope
        .execute("DELETE FROM customers WHERE name = ?1;", ["Mary"])
        .unwrap();
    scope.rollback().unwrap();

    assert_eq!(count(gateway.connection(), "customers"), 1);
}

#[test]
fn with_transaction_rolls_back_when_body_fails() {
    let mut gateway = StorageGateway::open_in_memory().unwrap();

    let result = gateway.with_transaction(|scope| -> Result<(), GatewayError> {
        scope.execute("INSERT INTO customers (name) VALUES (?1);", ["Mary"])?;
        scope.execute("INSERT INTO customers (name) VALUES (?1);", ["Mary"])?;
        Ok(())
    });

    assert!(matches!(result, Err(GatewayError::Query(_))));
    assert_eq!(count(gateway.connection(), "customers"), 0);
}

#[test]
fn with_transaction_commits_when_body_succeeds() {
    let mut gateway = StorageGateway::open_in_memory().unwrap();

    let ids = gateway
        .with_transaction(|scope| -> Result<Vec<i64>, GatewayError> {
            scope
                .execute(
                    "INSERT INTO customers (name) VALUES (?1), (?2) RETURNING id;",
                    ["Mary", "Joe"],
                )?
                .i64_column("id")
        })
        .unwrap();

    assert_eq!(ids.len(), 2);
    assert_eq!(count(gateway.connection(), "customers"), 2);
}

#[test]
fn malformed_statement_is_a_query_error() {
    let mut gateway = StorageGateway::open_in_memory().unwrap();
    let mut scope = gateway.begin_transaction().unwrap();

    let err = scope.execute("INSERT INTO nowhere VALUES (1);", []).unwrap_err();
    assert!(matches!(err, GatewayError::Query(_)));
    assert_eq!(err.code(), "query_error");
}

#[test]
fn commit_failure_is_reported_distinctly_and_leaves_nothing_behind() {
    let mut gateway = StorageGateway::open_in_memory().unwrap();

    let mut scope = gateway.begin_transaction().unwrap();
    scope.execute("PRAGMA defer_foreign_keys = ON;", []).unwrap();
    scope
        .execute(
            "INSERT INTO items (name, invoice_id) VALUES (?1, ?2);",
            rusqlite::params!["orphan", 999],
        )
        .unwrap();

    let err = scope.commit().unwrap_err();
    assert!(matches!(err, GatewayError::Commit(_)));
    assert_eq!(count(gateway.connection(), "items"), 0);
    assert!(gateway.connection().is_autocommit());
}

#[test]
fn begin_fails_with_connection_error_while_another_writer_holds_the_lock() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sales.db");
    let mut holder = StorageGateway::open(&path, Duration::from_secs(5)).unwrap();
    let mut waiter = StorageGateway::open(&path, Duration::from_millis(50)).unwrap();

    let _held = holder.begin_transaction().unwrap();
    let err = waiter.begin_transaction().err().unwrap();

    assert!(matches!(err, GatewayError::Connection(_)));
}

#[test]
fn uncommitted_writes_are_invisible_to_other_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sales.db");
    let mut writer = StorageGateway::open(&path, Duration::from_secs(5)).unwrap();
    let reader = StorageGateway::open(&path, Duration::from_secs(5)).unwrap();

    let mut scope = writer.begin_transaction().unwrap();
    scope
        .execute("INSERT INTO customers (name) VALUES (?1);", ["Mary"])
        .unwrap();
    assert_eq!(count(reader.connection(), "customers"), 0);

    scope.commit().unwrap();
    assert_eq!(count(reader.connection(), "customers"), 1);
}

#[test]
fn close_releases_the_connection() {
    let gateway = StorageGateway::open_in_memory().unwrap();
    gateway.close().unwrap();
}
