//! Purpose: Slice a (possibly filtered) table into one page.
//! Exports: `PageResult`, `INDEX_FIELD`, `check_bounds`, `paginate`.
//! Invariants: `total_pages == ceil(total_rows / page_size)`; zero rows means zero pages.
//! Invariants: `_index` is the row's 0-based position in the sequence being paginated.
//! Invariants: Pages past the end are empty, not errors.

use serde::Serialize;
use serde_json::Value;

use super::error::{Error, ErrorKind};
use super::table::{Record, Table};

pub const INDEX_FIELD: &str = "_index";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PageResult {
    pub data: Vec<Record>,
    pub total_rows: u64,
    pub total_pages: u64,
    pub current_page: u64,
}

/// Reject page numbers and sizes below 1 before any rows are loaded.
pub fn check_bounds(page: u64, page_size: u64) -> Result<(), Error> {
    if page == 0 {
        return Err(Error::new(ErrorKind::BadRequest)
            .with_message("page must be at least 1")
            .with_hint("Pages are numbered from 1."));
    }
    if page_size == 0 {
        return Err(Error::new(ErrorKind::BadRequest)
            .with_message("page_size must be at least 1"));
    }
    Ok(())
}

pub fn paginate(table: Table, page: u64, page_size: u64) -> Result<PageResult, Error> {
    check_bounds(page, page_size)?;

    let total_rows = table.len() as u64;
    let total_pages = total_rows.div_ceil(page_size);
    let start = (page - 1).saturating_mul(page_size);

    let data = if start >= total_rows {
        Vec::new()
    } else {
        // start < total_rows <= usize::MAX, and take() bounds the rest.
        let take = usize::try_from(page_size).unwrap_or(usize::MAX);
        table
            .into_rows()
            .into_iter()
            .enumerate()
            .skip(start as usize)
            .take(take)
            .map(|(index, mut record)| {
                record.insert(INDEX_FIELD.to_string(), Value::from(index as u64));
                record
            })
            .collect()
    };

    Ok(PageResult {
        data,
        total_rows,
        total_pages,
        current_page: page,
    })
}
