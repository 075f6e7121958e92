//! Purpose: Row-oriented in-memory table shared by every stage of the query pipeline.
//! Exports: `Record`, `Table`, `Resolved`, `Partition`, `RowSource`, `stringify`.
//! Role: Normalised shape that every dataset source is loaded into.
//! Invariants: Row order is fixed at load time and never reordered afterwards.
//! Invariants: Missing keys stay missing; nothing is defaulted to zero or null.

use std::borrow::Cow;
use std::fmt;

use serde_json::{Map, Value};

use super::error::Error;

pub type Record = Map<String, Value>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    schema: Option<Vec<String>>,
    rows: Vec<Record>,
}

impl Table {
    pub fn new(rows: Vec<Record>) -> Self {
        Self { schema: None, rows }
    }

    pub fn with_schema(mut self, columns: Vec<String>) -> Self {
        self.schema = Some(columns);
        self
    }

    pub fn schema(&self) -> Option<&[String]> {
        self.schema.as_deref()
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names from schema metadata, else the keys of the first record.
    pub fn columns(&self) -> Vec<String> {
        if let Some(schema) = &self.schema {
            return schema.clone();
        }
        self.rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn retain_rows(self, keep: impl FnMut(&Record) -> bool) -> Self {
        let Table { schema, rows } = self;
        Self {
            schema,
            rows: rows.into_iter().filter(keep).collect(),
        }
    }
}

/// Deferred loader for one partition; only the selected partition is ever loaded.
pub trait RowSource: Send {
    fn load(&self) -> Result<Table, Error>;
}

impl RowSource for Table {
    fn load(&self) -> Result<Table, Error> {
        Ok(self.clone())
    }
}

pub struct Partition {
    name: String,
    source: Box<dyn RowSource>,
}

impl Partition {
    pub fn new(name: impl Into<String>, source: impl RowSource + 'static) -> Self {
        Self {
            name: name.into(),
            source: Box::new(source),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn load(&self) -> Result<Table, Error> {
        self.source.load()
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("name", &self.name)
            .finish()
    }
}

/// Output of the source resolver: either one table or named partitions in declared order.
#[derive(Debug)]
pub enum Resolved {
    Flat(Table),
    Partitioned(Vec<Partition>),
}

/// Text form of a value used by filtering and unique-value aggregation.
pub fn stringify(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(text) => Cow::Borrowed(text.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}
