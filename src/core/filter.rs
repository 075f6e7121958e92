//! Purpose: Parse column filters once and evaluate them against table rows.
//! Exports: `Predicate`, `FilterSet`, `REGEX_SUFFIX`, `filter`.
//! Role: Row filter stage between split selection and pagination.
//! Invariants: A row is kept only if every predicate matches (AND, short-circuit).
//! Invariants: Exact predicates are case-insensitive substring matches.
//! Invariants: Regex predicates search unanchored and case-insensitively; `(?-i)` opts out.
//! Invariants: An invalid regex never errors; that predicate matches nothing.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use tracing::warn;

use super::error::{Error, ErrorKind};
use super::table::{Record, Table, stringify};

/// Filter keys ending in this suffix are regex predicates on the column before it.
pub const REGEX_SUFFIX: &str = "_regex";

#[derive(Clone)]
pub enum Predicate {
    Exact {
        column: String,
        value: String,
        needle: String,
    },
    Regex {
        column: String,
        pattern: String,
        compiled: Option<Regex>,
    },
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Exact { column, value, .. } => f
                .debug_struct("Exact")
                .field("column", column)
                .field("value", value)
                .finish(),
            Predicate::Regex {
                column,
                pattern,
                compiled,
            } => f
                .debug_struct("Regex")
                .field("column", column)
                .field("pattern", pattern)
                .field("valid", &compiled.is_some())
                .finish(),
        }
    }
}

impl Predicate {
    pub fn exact(column: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        Predicate::Exact {
            column: column.into(),
            needle: value.to_lowercase(),
            value,
        }
    }

    pub fn regex(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        let column = column.into();
        let pattern = pattern.into();
        let compiled = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
            Ok(regex) => Some(regex),
            Err(err) => {
                warn!(%column, %pattern, error = %err, "invalid regex filter matches nothing");
                None
            }
        };
        Predicate::Regex {
            column,
            pattern,
            compiled,
        }
    }

    /// Build from a raw filter key; keys ending in `_regex` become regex predicates.
    pub fn from_key(key: &str, value: impl Into<String>) -> Self {
        match key.strip_suffix(REGEX_SUFFIX) {
            Some(column) => Predicate::regex(column, value),
            None => Predicate::exact(key, value),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Predicate::Exact { column, .. } | Predicate::Regex { column, .. } => column,
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        let field = record
            .get(self.column())
            .map(stringify)
            .unwrap_or_default();
        match self {
            Predicate::Exact { needle, .. } => field.to_lowercase().contains(needle.as_str()),
            Predicate::Regex { compiled, .. } => compiled
                .as_ref()
                .is_some_and(|regex| regex.is_match(&field)),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FilterSet {
    predicates: Vec<Predicate>,
}

impl FilterSet {
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Parse a request's `filters` object. Values must be strings, numbers, or booleans.
    pub fn from_json(filters: &Map<String, Value>) -> Result<Self, Error> {
        let mut predicates = Vec::with_capacity(filters.len());
        for (key, value) in filters {
            let text = match value {
                Value::String(text) => text.clone(),
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => {
                    return Err(Error::new(ErrorKind::BadRequest)
                        .with_message(format!("filter `{key}` must be a string, number, or boolean"))
                        .with_hint("Use {\"column\": \"text\"} or {\"column_regex\": \"pattern\"}."));
                }
            };
            predicates.push(Predicate::from_key(key, text));
        }
        Ok(Self { predicates })
    }

    /// Parse `column=value` pairs as given on the command line.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = &'a str>) -> Result<Self, Error> {
        let mut predicates = Vec::new();
        for pair in pairs {
            let Some((key, value)) = pair.split_once('=') else {
                return Err(Error::new(ErrorKind::BadRequest)
                    .with_message(format!("invalid filter `{pair}`"))
                    .with_hint("Use COLUMN=VALUE, or COLUMN_regex=PATTERN for a regex filter."));
            };
            predicates.push(Predicate::from_key(key, value));
        }
        Ok(Self { predicates })
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.predicates.iter().all(|predicate| predicate.matches(record))
    }
}

/// Keep the rows matching every predicate, in their original order.
pub fn filter(table: Table, filters: &FilterSet) -> Table {
    if filters.is_empty() {
        return table;
    }
    table.retain_rows(|record| filters.matches(record))
}
