//! Purpose: Reduce a resolved dataset to exactly one table.
//! Exports: `select`.
//! Invariants: Picks the first partition in declared order; names carry no preference.
//! Invariants: Only the chosen partition is loaded.

use tracing::debug;

use super::error::{Error, ErrorKind};
use super::table::{Resolved, Table};

pub fn select(resolved: Resolved) -> Result<Table, Error> {
    match resolved {
        Resolved::Flat(table) => Ok(table),
        Resolved::Partitioned(partitions) => {
            let Some(first) = partitions.first() else {
                return Err(Error::new(ErrorKind::EmptyDataset)
                    .with_message("dataset has no splits to select"));
            };
            debug!(
                split = first.name(),
                available = partitions.len(),
                "selected split"
            );
            first.load()
        }
    }
}
