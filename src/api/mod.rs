//! Purpose: Define the stable public Rust API boundary for dataset browsing.
//! Exports: Reference, filter, page, and error types plus the `DatasetClient` facade.
//! Role: Surface shared by the CLI, the HTTP server, and integration tests.
//! Invariants: Each call runs resolve -> select -> (filter -> paginate | aggregate) afresh.

mod client;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::filter::{FilterSet, Predicate, REGEX_SUFFIX};
pub use crate::core::page::{INDEX_FIELD, PageResult};
pub use crate::core::source::hub::{DEFAULT_HUB_URL, HubClient};
pub use crate::core::source::{DatasetRef, Source, normalize_dataset_id};
pub use crate::core::table::{Record, Table};
pub use crate::core::unique::MAX_VALUE_CHARS;
pub use client::{ApiResult, DEFAULT_PAGE_SIZE, DatasetClient, PageQuery};
