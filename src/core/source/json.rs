//! Purpose: Load local `.json` / `.jsonl` files as a single `train` partition.
//! Exports: `is_json_path`, `load`, `parse_json_lines`, `parse_json_document`.
//! Invariants: JSONL skips blank lines; every other line must be a JSON object.
//! Invariants: A `.json` document is an array of records, an object of equal-length columns,
//! or a single record (an object with any non-array value).
//! Invariants: A `.json` file that is not one document is read as JSON lines instead.

use std::path::Path;

use serde_json::{Map, Value};

use crate::core::error::{Error, ErrorKind};
use crate::core::table::{Partition, Record, Resolved, Table};

/// Split name given to rows loaded from plain data files.
pub const DATA_FILE_SPLIT: &str = "train";

pub fn is_json_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json") || ext.eq_ignore_ascii_case("jsonl"))
}

fn is_jsonl_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jsonl"))
}

pub fn load(path: &Path) -> Result<Resolved, Error> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        Error::new(ErrorKind::LoadFailure)
            .with_message("failed to read dataset file")
            .with_path(path)
            .with_source(err)
    })?;

    let table = if is_jsonl_path(path) {
        parse_json_lines(&text)
    } else {
        match serde_json::from_str::<Value>(&text) {
            Ok(document) => parse_json_document(document),
            Err(_) => parse_json_lines(&text),
        }
    }
    .map_err(|err| err.with_path(path))?;

    Ok(Resolved::Partitioned(vec![Partition::new(
        DATA_FILE_SPLIT,
        table,
    )]))
}

pub fn parse_json_lines(text: &str) -> Result<Table, Error> {
    let mut rows = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|err| {
            Error::new(ErrorKind::LoadFailure)
                .with_message(format!("invalid JSON on line {}", index + 1))
                .with_source(err)
        })?;
        rows.push(into_record(value, index + 1)?);
    }
    Ok(Table::new(rows))
}

pub fn parse_json_document(document: Value) -> Result<Table, Error> {
    match document {
        Value::Array(items) => {
            let rows = items
                .into_iter()
                .enumerate()
                .map(|(index, item)| into_record(item, index + 1))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Table::new(rows))
        }
        Value::Object(columns) if is_columnar(&columns) => columns_to_table(columns),
        Value::Object(record) => Ok(Table::new(vec![record])),
        _ => Err(not_tabular()),
    }
}

fn is_columnar(object: &Map<String, Value>) -> bool {
    !object.is_empty() && object.values().all(Value::is_array)
}

fn columns_to_table(columns: Map<String, Value>) -> Result<Table, Error> {
    let names: Vec<String> = columns.keys().cloned().collect();
    let mut lists = Vec::with_capacity(columns.len());
    for (name, values) in columns {
        let Value::Array(values) = values else {
            return Err(not_tabular().with_hint(format!("column `{name}` is not an array")));
        };
        lists.push((name, values));
    }

    let row_count = lists.first().map(|(_, values)| values.len()).unwrap_or(0);
    if let Some((name, values)) = lists.iter().find(|(_, values)| values.len() != row_count) {
        return Err(Error::new(ErrorKind::LoadFailure)
            .with_message("columns have different lengths")
            .with_hint(format!(
                "column `{name}` has {} values, expected {row_count}",
                values.len()
            )));
    }

    let mut rows: Vec<Record> = (0..row_count).map(|_| Map::new()).collect();
    for (name, values) in lists {
        for (row, value) in rows.iter_mut().zip(values) {
            row.insert(name.clone(), value);
        }
    }
    Ok(Table::new(rows).with_schema(names))
}

fn into_record(value: Value, position: usize) -> Result<Record, Error> {
    match value {
        Value::Object(record) => Ok(record),
        _ => Err(Error::new(ErrorKind::LoadFailure)
            .with_message(format!("record {position} is not a JSON object"))),
    }
}

fn not_tabular() -> Error {
    Error::new(ErrorKind::LoadFailure)
        .with_message("JSON document is not tabular")
        .with_hint("Expected an array of objects, an object of equal-length column arrays, or one object.")
}
