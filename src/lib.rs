//! # byodb - Embedded Copy-on-Write Key-Value Store
//!
//! byodb is an embedded, single-writer, persistent ordered key-value
//! store with a minimal relational layer and a tiny SQL executor on top.
//! The core is a copy-on-write B+tree over a page-addressed,
//! memory-mapped file with a durable meta-page commit and a disk-backed
//! free list for page reclamation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │     SQL Layer (Lexer/Parser)        │
//! ├─────────────────────────────────────┤
//! │   Catalog & Records (Database)      │
//! ├─────────────────────────────────────┤
//! │       KV Facade (commit per op)     │
//! ├─────────────────────────────────────┤
//! │     Copy-on-Write B+Tree            │
//! ├─────────────────────────────────────┤
//! │  Page Store (staging / free list)   │
//! ├─────────────────────────────────────┤
//! │  Memory-Mapped File + Meta Page     │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Durability model
//!
//! Writes stage new pages in memory; nothing on disk changes until
//! commit, which writes the staged pages, fsyncs, then publishes the new
//! tree root with a single meta-page write and a second fsync. A crash at
//! any instant leaves either the old or the new root authoritative —
//! never a mix. Old pages are reclaimed through an on-disk free list, so
//! the file does not grow without bound.
//!
//! ## Quick start
//!
//! ```ignore
//! use byodb::Kv;
//!
//! let mut kv = Kv::open("./data.db")?;
//! kv.insert(b"hello", b"world")?;
//! assert_eq!(kv.get(b"hello")?, Some(b"world".to_vec()));
//! ```
//!
//! Or through the SQL surface:
//!
//! ```ignore
//! use byodb::Database;
//!
//! let db = Database::open("./data.db")?;
//! db.execute("CREATE TABLE users (id int, name text, PRIMARY KEY (id))")?;
//! db.execute("INSERT INTO users (id, name) VALUES (1, 'alice')")?;
//! let rows = db.execute("SELECT * FROM users")?;
//! ```
//!
//! ## Module overview
//!
//! - [`storage`]: mapping windows, meta page, disk store, free list
//! - [`btree`]: node codec and the copy-on-write tree
//! - [`kv`]: durable key-value facade (one commit per mutation)
//! - [`records`]: typed rows, table definitions, key/value codecs
//! - [`sql`]: lexer, parser, statement AST
//! - [`database`]: catalog and statement execution
//!
//! ## Limits
//!
//! Keys up to 1000 bytes, values up to 3000 bytes, 4096-byte pages.
//! Single writer; no transactions spanning multiple operations; deletes
//! do not rebalance the tree.

pub mod btree;
pub mod config;
pub mod database;
pub mod error;
pub mod kv;
pub mod records;
pub mod sql;
pub mod storage;

pub use database::{Database, ExecuteResult, ResultSet};
pub use error::StoreError;
pub use kv::Kv;
pub use records::{Column, DataType, Record, TableDef, Value};
