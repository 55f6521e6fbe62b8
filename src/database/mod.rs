//! # Database Layer
//!
//! The relational surface over the key-value core. All tables share the
//! one B+tree, namespaced by a numeric key prefix; the catalog itself
//! lives in two reserved tables inside that same tree:
//!
//! - `@meta` (prefix 1): bookkeeping keys, currently just `next_prefix`,
//!   the next table prefix to hand out (starting at 100).
//! - `@table` (prefix 2): table name to JSON-serialized [`TableDef`].
//!
//! `Database` serializes access to the single-writer store behind a
//! mutex, making the handle shareable across threads; the storage core
//! itself stays strictly single-writer.

use std::path::Path;

use eyre::{bail, ensure, Result, WrapErr};
use log::debug;
use parking_lot::Mutex;

use crate::kv::Kv;
use crate::records::{Column, DataType, Record, TableDef, Value};
use crate::sql::{self, CreateTableStmt, InsertStmt, Literal, SelectStmt, Statement};

/// Key under `@meta` holding the next table prefix.
const NEXT_PREFIX_KEY: &[u8] = b"next_prefix";

/// First prefix handed to a user table; 1 and 2 belong to the catalog.
const FIRST_TABLE_PREFIX: u32 = 100;

fn meta_table() -> TableDef {
    let mut def = TableDef::new(
        "@meta",
        vec![Column {
            name: "key".into(),
            data_type: DataType::Bytes,
        }],
        vec![Column {
            name: "val".into(),
            data_type: DataType::Bytes,
        }],
    );
    def.prefix = 1;
    def
}

fn catalog_table() -> TableDef {
    let mut def = TableDef::new(
        "@table",
        vec![Column {
            name: "name".into(),
            data_type: DataType::Bytes,
        }],
        vec![Column {
            name: "def".into(),
            data_type: DataType::Bytes,
        }],
    );
    def.prefix = 2;
    def
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteResult {
    TableCreated { name: String },
    Inserted { rows: usize },
    Rows(ResultSet),
    NoOp,
}

pub struct Database {
    kv: Mutex<Kv>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            kv: Mutex::new(Kv::open(path)?),
        })
    }

    /// Parses and runs a single statement.
    pub fn execute(&self, statement: &str) -> Result<ExecuteResult> {
        match sql::parse_statement(statement)? {
            Statement::CreateTable(stmt) => self.run_create_table(stmt),
            Statement::Insert(stmt) => self.run_insert(stmt),
            Statement::Select(stmt) => self.run_select(stmt),
            Statement::NoOp => Ok(ExecuteResult::NoOp),
        }
    }

    /// Registers a table, assigning it the next free prefix.
    pub fn create_table(&self, mut def: TableDef) -> Result<()> {
        ensure!(!def.name.is_empty(), "table name must not be empty");
        ensure!(
            !def.name.starts_with('@'),
            "table names starting with '@' are reserved"
        );
        ensure!(
            def.pkeys > 0,
            "table '{}' needs at least one primary key column",
            def.name
        );

        let mut kv = self.kv.lock();
        ensure!(
            Self::load_table_def(&kv, &def.name)?.is_none(),
            "table '{}' already exists",
            def.name
        );

        def.prefix = Self::take_next_prefix(&mut kv)?;

        let json = serde_json::to_vec(&def).wrap_err("failed to serialize table definition")?;
        let mut row = Record::new();
        row.set_bytes("name", def.name.as_bytes().to_vec());
        row.set_bytes("def", json);
        Self::store_row(&mut kv, &catalog_table(), &row)?;

        debug!("created table '{}' with prefix {}", def.name, def.prefix);
        Ok(())
    }

    /// Fetches a row by primary key, filling the non-key columns of
    /// `record` in place. Returns `false` when no such row exists.
    pub fn get(&self, table: &str, record: &mut Record) -> Result<bool> {
        let kv = self.kv.lock();
        let def = Self::require_table_def(&kv, table)?;

        let key = def.encode_key(record)?;
        let Some(stored) = kv.get(&key)? else {
            return Ok(false);
        };

        let values = def.decode_values(&stored)?;
        for (column, value) in def.non_primary_keys().iter().zip(values) {
            record.set(&column.name, value);
        }
        Ok(true)
    }

    /// Inserts or replaces a row.
    pub fn insert(&self, table: &str, record: &Record) -> Result<()> {
        let mut kv = self.kv.lock();
        let def = Self::require_table_def(&kv, table)?;
        Self::store_row(&mut kv, &def, record)
    }

    /// Deletes a row by primary key; `false` when it was absent.
    pub fn delete(&self, table: &str, record: &Record) -> Result<bool> {
        let mut kv = self.kv.lock();
        let def = Self::require_table_def(&kv, table)?;
        let key = def.encode_key(record)?;
        kv.delete(&key)
    }

    /// Names of all user tables, in key order.
    pub fn tables(&self) -> Result<Vec<String>> {
        let kv = self.kv.lock();
        let catalog = catalog_table();
        let (start, end) = catalog.prefix_range();

        let mut names = Vec::new();
        for (key, _) in kv.scan(&start, &end)? {
            for value in catalog.decode_key(&key)? {
                names.push(render_value(&value));
            }
        }
        Ok(names)
    }

    pub fn close(self) -> Result<()> {
        self.kv.into_inner().close()
    }

    fn store_row(kv: &mut Kv, def: &TableDef, record: &Record) -> Result<()> {
        let key = def.encode_key(record)?;
        let value = def.encode_value(record)?;
        kv.insert(&key, &value)
    }

    fn require_table_def(kv: &Kv, name: &str) -> Result<TableDef> {
        match Self::load_table_def(kv, name)? {
            Some(def) => Ok(def),
            None => bail!("unknown table '{}'", name),
        }
    }

    fn load_table_def(kv: &Kv, name: &str) -> Result<Option<TableDef>> {
        if name == "@meta" {
            return Ok(Some(meta_table()));
        }
        if name == "@table" {
            return Ok(Some(catalog_table()));
        }

        let catalog = catalog_table();
        let mut probe = Record::new();
        probe.set_bytes("name", name.as_bytes().to_vec());
        let key = catalog.encode_key(&probe)?;

        let Some(stored) = kv.get(&key)? else {
            return Ok(None);
        };
        let values = catalog.decode_values(&stored)?;
        let Some(Value::Bytes(json)) = values.into_iter().next() else {
            bail!("catalog row for '{}' has no definition", name);
        };
        let def: TableDef = serde_json::from_slice(&json)
            .wrap_err_with(|| format!("corrupt table definition for '{}'", name))?;
        Ok(Some(def))
    }

    fn take_next_prefix(kv: &mut Kv) -> Result<u32> {
        let meta = meta_table();
        let mut probe = Record::new();
        probe.set_bytes("key", NEXT_PREFIX_KEY.to_vec());
        let key = meta.encode_key(&probe)?;

        let next = match kv.get(&key)? {
            Some(stored) => {
                let values = meta.decode_values(&stored)?;
                let Some(Value::Bytes(raw)) = values.into_iter().next() else {
                    bail!("corrupt next_prefix entry");
                };
                ensure!(raw.len() == 4, "corrupt next_prefix entry");
                u32::from_le_bytes(raw.try_into().expect("length checked"))
            }
            None => FIRST_TABLE_PREFIX,
        };

        let mut row = Record::new();
        row.set_bytes("key", NEXT_PREFIX_KEY.to_vec());
        row.set_bytes("val", (next + 1).to_le_bytes().to_vec());
        Self::store_row(kv, &meta, &row)?;

        Ok(next)
    }

    fn run_create_table(&self, stmt: CreateTableStmt) -> Result<ExecuteResult> {
        ensure!(
            !stmt.primary_keys.is_empty(),
            "table '{}' needs a PRIMARY KEY clause",
            stmt.table
        );

        let mut pks = Vec::new();
        let mut others = Vec::new();
        for spec in &stmt.columns {
            let column = Column {
                name: spec.name.clone(),
                data_type: parse_type(&spec.type_name)?,
            };
            if stmt.primary_keys.contains(&spec.name) {
                pks.push(column);
            } else {
                others.push(column);
            }
        }
        for pk in &stmt.primary_keys {
            ensure!(
                stmt.columns.iter().any(|c| &c.name == pk),
                "primary key column '{}' is not defined",
                pk
            );
        }

        let name = stmt.table.clone();
        self.create_table(TableDef::new(stmt.table, pks, others))?;
        Ok(ExecuteResult::TableCreated { name })
    }

    fn run_insert(&self, stmt: InsertStmt) -> Result<ExecuteResult> {
        let def = {
            let kv = self.kv.lock();
            Self::require_table_def(&kv, &stmt.table)?
        };

        let mut inserted = 0;
        for row in &stmt.rows {
            let mut record = Record::new();
            for (name, literal) in stmt.columns.iter().zip(row) {
                let Some(column) = def.columns.iter().find(|c| &c.name == name) else {
                    bail!("table '{}' has no column '{}'", stmt.table, name);
                };
                record.set(name, literal_to_value(literal, column)?);
            }
            self.insert(&stmt.table, &record)?;
            inserted += 1;
        }

        Ok(ExecuteResult::Inserted { rows: inserted })
    }

    fn run_select(&self, stmt: SelectStmt) -> Result<ExecuteResult> {
        let kv = self.kv.lock();
        let def = Self::require_table_def(&kv, &stmt.table)?;

        let (start, end) = def.prefix_range();
        let mut rows = Vec::new();
        for (key, value) in kv.scan(&start, &end)? {
            let mut cells = Vec::new();
            for v in def.decode_key(&key)? {
                cells.push(render_value(&v));
            }
            for v in def.decode_values(&value)? {
                cells.push(render_value(&v));
            }
            rows.push(cells);
        }

        Ok(ExecuteResult::Rows(ResultSet {
            columns: def.columns.iter().map(|c| c.name.clone()).collect(),
            rows,
        }))
    }
}

fn parse_type(type_name: &str) -> Result<DataType> {
    match type_name.to_ascii_lowercase().as_str() {
        "int" | "integer" | "int64" | "bigint" => Ok(DataType::Int64),
        "text" | "string" | "bytes" | "blob" | "varchar" => Ok(DataType::Bytes),
        other => bail!("unknown column type '{}'", other),
    }
}

fn literal_to_value(literal: &Literal, column: &Column) -> Result<Value> {
    match (literal, column.data_type) {
        (Literal::Int(v), DataType::Int64) => Ok(Value::Int64(*v)),
        (Literal::Str(s), DataType::Bytes) => Ok(Value::Bytes(s.as_bytes().to_vec())),
        (Literal::Str(s), DataType::Int64) => {
            bail!("column '{}' is an integer, got '{}'", column.name, s)
        }
        (Literal::Int(v), DataType::Bytes) => {
            bail!("column '{}' is text, got {}", column.name, v)
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Int64(v) => v.to_string(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("db")).unwrap();
        (dir, db)
    }

    fn users_def() -> TableDef {
        TableDef::new(
            "users",
            vec![Column {
                name: "id".into(),
                data_type: DataType::Int64,
            }],
            vec![Column {
                name: "name".into(),
                data_type: DataType::Bytes,
            }],
        )
    }

    #[test]
    fn create_table_assigns_increasing_prefixes() {
        let (_dir, db) = open_db();

        db.create_table(users_def()).unwrap();
        let mut second = users_def();
        second.name = "orders".into();
        db.create_table(second).unwrap();

        let kv = db.kv.lock();
        let users = Database::load_table_def(&kv, "users").unwrap().unwrap();
        let orders = Database::load_table_def(&kv, "orders").unwrap().unwrap();
        assert_eq!(users.prefix, 100);
        assert_eq!(orders.prefix, 101);
    }

    #[test]
    fn create_table_rejects_duplicates_and_reserved_names() {
        let (_dir, db) = open_db();

        db.create_table(users_def()).unwrap();
        assert!(db.create_table(users_def()).is_err());

        let mut reserved = users_def();
        reserved.name = "@meta".into();
        assert!(db.create_table(reserved).is_err());
    }

    #[test]
    fn row_roundtrip_through_typed_api() {
        let (_dir, db) = open_db();
        db.create_table(users_def()).unwrap();

        let mut row = Record::new();
        row.set_int64("id", 1);
        row.set_bytes("name", b"alice".to_vec());
        db.insert("users", &row).unwrap();

        let mut probe = Record::new();
        probe.set_int64("id", 1);
        assert!(db.get("users", &mut probe).unwrap());
        assert_eq!(probe.get_bytes("name"), Some(b"alice".as_slice()));

        let mut missing = Record::new();
        missing.set_int64("id", 2);
        assert!(!db.get("users", &mut missing).unwrap());
    }

    #[test]
    fn delete_removes_row() {
        let (_dir, db) = open_db();
        db.create_table(users_def()).unwrap();

        let mut row = Record::new();
        row.set_int64("id", 1);
        row.set_bytes("name", b"alice".to_vec());
        db.insert("users", &row).unwrap();

        let mut probe = Record::new();
        probe.set_int64("id", 1);
        assert!(db.delete("users", &probe).unwrap());
        assert!(!db.delete("users", &probe).unwrap());
        assert!(!db.get("users", &mut probe).unwrap());
    }

    #[test]
    fn table_defs_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");

        {
            let db = Database::open(&path).unwrap();
            db.create_table(users_def()).unwrap();
            let mut row = Record::new();
            row.set_int64("id", 7);
            row.set_bytes("name", b"grace".to_vec());
            db.insert("users", &row).unwrap();
            db.close().unwrap();
        }

        let db = Database::open(&path).unwrap();
        let mut probe = Record::new();
        probe.set_int64("id", 7);
        assert!(db.get("users", &mut probe).unwrap());
        assert_eq!(probe.get_bytes("name"), Some(b"grace".as_slice()));
    }

    #[test]
    fn unknown_table_is_an_error() {
        let (_dir, db) = open_db();
        let mut probe = Record::new();
        probe.set_int64("id", 1);

        assert!(db.get("nope", &mut probe).is_err());
    }

    #[test]
    fn execute_insert_rejects_type_mismatch() {
        let (_dir, db) = open_db();
        db.execute("CREATE TABLE t (id int, name text, PRIMARY KEY (id))")
            .unwrap();

        let err = db
            .execute("INSERT INTO t (id, name) VALUES ('one', 'alice')")
            .unwrap_err();
        assert!(err.to_string().contains("is an integer"));
    }
}
