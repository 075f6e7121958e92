//! Purpose: Distinct display values of one column.
//! Exports: `unique_values`, `MAX_VALUE_CHARS`.
//! Invariants: Null and absent values are skipped; each value is cut to 100 characters.
//! Invariants: Result size is bounded only by the table; high-cardinality columns stay large.

use std::collections::BTreeSet;

use serde_json::Value;

use super::table::{Table, stringify};

pub const MAX_VALUE_CHARS: usize = 100;

pub fn unique_values(table: &Table, column: &str) -> BTreeSet<String> {
    let mut values = BTreeSet::new();
    for record in table.rows() {
        let Some(value) = record.get(column) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        values.insert(truncate_chars(value));
    }
    values
}

fn truncate_chars(value: &Value) -> String {
    let text = stringify(value);
    match text.char_indices().nth(MAX_VALUE_CHARS) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.into_owned(),
    }
}
