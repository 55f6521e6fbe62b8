//! # Records and Table Definitions
//!
//! The relational layer's value model and its byte codecs. The storage
//! core below sees only opaque byte strings; this module is where rows
//! gain column names and types, and where keys are encoded so that their
//! byte-lexicographic order matches their semantic order.
//!
//! ## Key encoding (order-preserving)
//!
//! ```text
//! | table prefix : u32 BE | pk column 0 | pk column 1 | ...
//! ```
//!
//! - `Int64`: the value biased by flipping the sign bit, then big-endian —
//!   negative values sort below positive ones under memcmp.
//! - `Bytes`: u16 big-endian length, then the bytes. Length-prefixed
//!   strings are good enough for single-column keys; an escape-terminated
//!   encoding would be needed for perfect multi-column text ordering.
//!
//! ## Value encoding (tagged, not ordered)
//!
//! Non-key columns never participate in comparisons, so they use a plain
//! tagged format: u32 LE type tag, then for `Int64` eight LE bytes, for
//! `Bytes` a u16 LE length and the bytes.
//!
//! ## Table definitions
//!
//! [`TableDef`] lists the columns, how many of them form the primary key
//! (they come first), and the numeric prefix that namespaces the table
//! inside the single shared tree. Definitions serialize to JSON for
//! storage in the catalog.

use eyre::{bail, ensure, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Bytes = 1,
    Int64 = 2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bytes(Vec<u8>),
    Int64(i64),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Bytes(_) => DataType::Bytes,
            Value::Int64(_) => DataType::Int64,
        }
    }

    /// Order-preserving encoding for key columns.
    fn encode_key_into(&self, out: &mut Vec<u8>) {
        match self {
            Value::Int64(v) => {
                let biased = (*v as u64) ^ (1 << 63);
                out.extend_from_slice(&biased.to_be_bytes());
            }
            Value::Bytes(b) => {
                out.extend_from_slice(&(b.len() as u16).to_be_bytes());
                out.extend_from_slice(b);
            }
        }
    }

    /// Tagged encoding for non-key columns.
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.data_type() as u32).to_le_bytes());
        match self {
            Value::Int64(v) => out.extend_from_slice(&(*v as u64).to_le_bytes()),
            Value::Bytes(b) => {
                out.extend_from_slice(&(b.len() as u16).to_le_bytes());
                out.extend_from_slice(b);
            }
        }
    }

    fn decode_key_from(bytes: &[u8], data_type: DataType) -> Result<(Value, usize)> {
        match data_type {
            DataType::Int64 => {
                ensure!(bytes.len() >= 8, "truncated int64 key column");
                let biased = u64::from_be_bytes(bytes[..8].try_into().expect("length checked"));
                Ok((Value::Int64((biased ^ (1 << 63)) as i64), 8))
            }
            DataType::Bytes => {
                ensure!(bytes.len() >= 2, "truncated bytes key column: no length");
                let len = u16::from_be_bytes(bytes[..2].try_into().expect("length checked")) as usize;
                ensure!(bytes.len() >= 2 + len, "truncated bytes key column");
                Ok((Value::Bytes(bytes[2..2 + len].to_vec()), 2 + len))
            }
        }
    }

    fn decode_from(bytes: &[u8]) -> Result<(Value, usize)> {
        ensure!(bytes.len() >= 4, "truncated value: no type tag");
        let tag = u32::from_le_bytes(bytes[..4].try_into().expect("length checked"));
        let rest = &bytes[4..];
        match tag {
            t if t == DataType::Int64 as u32 => {
                ensure!(rest.len() >= 8, "truncated int64 value");
                let raw = u64::from_le_bytes(rest[..8].try_into().expect("length checked"));
                Ok((Value::Int64(raw as i64), 12))
            }
            t if t == DataType::Bytes as u32 => {
                ensure!(rest.len() >= 2, "truncated bytes value: no length");
                let len = u16::from_le_bytes(rest[..2].try_into().expect("length checked")) as usize;
                ensure!(rest.len() >= 2 + len, "truncated bytes value");
                Ok((Value::Bytes(rest[2..2 + len].to_vec()), 6 + len))
            }
            other => bail!("unknown value tag {}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
}

/// A row under construction or decoding: named column values, in insertion
/// order, last write per name winning.
#[derive(Debug, Clone, Default)]
pub struct Record {
    values: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: &str, value: Value) -> &mut Self {
        if let Some(slot) = self.values.iter_mut().find(|(name, _)| name == column) {
            slot.1 = value;
        } else {
            self.values.push((column.to_string(), value));
        }
        self
    }

    pub fn set_bytes(&mut self, column: &str, value: impl Into<Vec<u8>>) -> &mut Self {
        self.set(column, Value::Bytes(value.into()))
    }

    pub fn set_int64(&mut self, column: &str, value: i64) -> &mut Self {
        self.set(column, Value::Int64(value))
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn get_bytes(&self, column: &str) -> Option<&[u8]> {
        match self.get(column) {
            Some(Value::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    pub fn get_int64(&self, column: &str) -> Option<i64> {
        match self.get(column) {
            Some(Value::Int64(v)) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<Column>,
    /// The first `pkeys` columns form the primary key.
    pub pkeys: usize,
    /// Namespacing prefix inside the shared tree; assigned by the catalog.
    pub prefix: u32,
}

impl TableDef {
    pub fn new(name: impl Into<String>, pkeys: Vec<Column>, others: Vec<Column>) -> Self {
        let nkeys = pkeys.len();
        let mut columns = pkeys;
        columns.extend(others);
        Self {
            name: name.into(),
            columns,
            pkeys: nkeys,
            prefix: 0,
        }
    }

    pub fn primary_keys(&self) -> &[Column] {
        &self.columns[..self.pkeys]
    }

    pub fn non_primary_keys(&self) -> &[Column] {
        &self.columns[self.pkeys..]
    }

    /// Encodes the primary-key columns of `record` into an
    /// order-preserving tree key.
    pub fn encode_key(&self, record: &Record) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.prefix.to_be_bytes());
        for column in self.primary_keys() {
            let Some(value) = record.get(&column.name) else {
                bail!("missing primary key column '{}'", column.name);
            };
            ensure!(
                value.data_type() == column.data_type,
                "column '{}' expects {:?}",
                column.name,
                column.data_type
            );
            value.encode_key_into(&mut out);
        }
        Ok(out)
    }

    /// Encodes the non-key columns of `record` into the stored value.
    pub fn encode_value(&self, record: &Record) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for column in self.non_primary_keys() {
            let Some(value) = record.get(&column.name) else {
                bail!("missing column '{}'", column.name);
            };
            ensure!(
                value.data_type() == column.data_type,
                "column '{}' expects {:?}",
                column.name,
                column.data_type
            );
            value.encode_into(&mut out);
        }
        Ok(out)
    }

    /// Decodes a stored value back into the non-key column values, in
    /// definition order.
    pub fn decode_values(&self, mut bytes: &[u8]) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        for _ in self.non_primary_keys() {
            let (value, used) = Value::decode_from(bytes)?;
            bytes = &bytes[used..];
            out.push(value);
        }
        ensure!(bytes.is_empty(), "trailing bytes after decoding row");
        Ok(out)
    }

    /// Decodes a tree key back into the primary-key column values, in
    /// definition order.
    pub fn decode_key(&self, key: &[u8]) -> Result<Vec<Value>> {
        ensure!(key.len() >= 4, "key shorter than its table prefix");
        let prefix = u32::from_be_bytes(key[..4].try_into().expect("length checked"));
        ensure!(
            prefix == self.prefix,
            "key prefix {} does not belong to table '{}'",
            prefix,
            self.name
        );

        let mut rest = &key[4..];
        let mut out = Vec::new();
        for column in self.primary_keys() {
            let (value, used) = Value::decode_key_from(rest, column.data_type)?;
            rest = &rest[used..];
            out.push(value);
        }
        ensure!(rest.is_empty(), "trailing bytes after decoding key");
        Ok(out)
    }

    /// Smallest and one-past-largest keys of this table's prefix range,
    /// for whole-table scans.
    pub fn prefix_range(&self) -> (Vec<u8>, Vec<u8>) {
        (
            self.prefix.to_be_bytes().to_vec(),
            (self.prefix + 1).to_be_bytes().to_vec(),
        )
    }
}
