//! The SQL surface end to end: DDL into the catalog, DML into the tree,
//! and SELECT reading rows back in primary-key order, across reopens.

use byodb::{Database, ExecuteResult};
use tempfile::tempdir;

#[test]
fn create_insert_select_roundtrip() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path().join("db")).unwrap();

    let result = db
        .execute("CREATE TABLE users (id int, name text, PRIMARY KEY (id))")
        .unwrap();
    assert_eq!(
        result,
        ExecuteResult::TableCreated {
            name: "users".into()
        }
    );

    let result = db
        .execute("INSERT INTO users (id, name) VALUES (1, 'alice'), (2, 'bob')")
        .unwrap();
    assert_eq!(result, ExecuteResult::Inserted { rows: 2 });

    let ExecuteResult::Rows(set) = db.execute("SELECT * FROM users").unwrap() else {
        panic!("expected rows");
    };
    assert_eq!(set.columns, vec!["id", "name"]);
    assert_eq!(
        set.rows,
        vec![
            vec!["1".to_string(), "alice".to_string()],
            vec!["2".to_string(), "bob".to_string()],
        ]
    );
}

#[test]
fn select_orders_rows_by_primary_key() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path().join("db")).unwrap();

    db.execute("CREATE TABLE nums (n int, label text, PRIMARY KEY (n))")
        .unwrap();
    db.execute("INSERT INTO nums (n, label) VALUES (30, 'c'), (-10, 'a'), (20, 'b')")
        .unwrap();

    let ExecuteResult::Rows(set) = db.execute("SELECT * FROM nums").unwrap() else {
        panic!("expected rows");
    };
    let order: Vec<&str> = set.rows.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(order, vec!["-10", "20", "30"]);
}

#[test]
fn last_insert_wins_per_primary_key() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path().join("db")).unwrap();

    db.execute("CREATE TABLE kv (k text, v text, PRIMARY KEY (k))")
        .unwrap();
    db.execute("INSERT INTO kv (k, v) VALUES ('a', 'first')")
        .unwrap();
    db.execute("INSERT INTO kv (k, v) VALUES ('a', 'second')")
        .unwrap();

    let ExecuteResult::Rows(set) = db.execute("SELECT * FROM kv").unwrap() else {
        panic!("expected rows");
    };
    assert_eq!(set.rows, vec![vec!["a".to_string(), "second".to_string()]]);
}

#[test]
fn tables_and_rows_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");

    {
        let db = Database::open(&path).unwrap();
        db.execute("CREATE TABLE logs (id int, line text, PRIMARY KEY (id))")
            .unwrap();
        db.execute("INSERT INTO logs (id, line) VALUES (1, 'boot'), (2, 'ready')")
            .unwrap();
        db.close().unwrap();
    }

    let db = Database::open(&path).unwrap();
    assert_eq!(db.tables().unwrap(), vec!["logs".to_string()]);

    let ExecuteResult::Rows(set) = db.execute("SELECT * FROM logs").unwrap() else {
        panic!("expected rows");
    };
    assert_eq!(set.rows.len(), 2);
    assert_eq!(set.rows[1], vec!["2".to_string(), "ready".to_string()]);
}

#[test]
fn select_from_unknown_table_fails() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path().join("db")).unwrap();

    let err = db.execute("SELECT * FROM ghosts").unwrap_err();
    assert!(err.to_string().contains("unknown table"));
}

#[test]
fn duplicate_create_table_fails() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path().join("db")).unwrap();

    db.execute("CREATE TABLE t (id int, PRIMARY KEY (id))")
        .unwrap();
    let err = db
        .execute("CREATE TABLE t (id int, PRIMARY KEY (id))")
        .unwrap_err();
    assert!(err.to_string().contains("already exists"));
}

#[test]
fn create_table_requires_primary_key() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path().join("db")).unwrap();

    let err = db.execute("CREATE TABLE t (id int)").unwrap_err();
    assert!(err.to_string().contains("PRIMARY KEY"));
}

#[test]
fn empty_statement_is_a_noop() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path().join("db")).unwrap();

    assert_eq!(db.execute("").unwrap(), ExecuteResult::NoOp);
    assert_eq!(db.execute(";").unwrap(), ExecuteResult::NoOp);
}
