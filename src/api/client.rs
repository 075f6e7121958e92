//! Purpose: Compose the core pipeline into the three dataset operations.
//! Exports: `DatasetClient`, `PageQuery`, `ApiResult`.
//! Role: One place where resolution, split selection, filtering, and pagination meet.
//! Invariants: Calls are blocking (disk/network I/O); async callers run them off-runtime.
//! Invariants: Bad page bounds are rejected before any dataset is loaded.

use tracing::debug;

use crate::core::error::Error;
use crate::core::filter::{FilterSet, filter};
use crate::core::page::{PageResult, check_bounds, paginate};
use crate::core::source::hub::{DEFAULT_HUB_URL, HubClient};
use crate::core::source::{DatasetRef, resolve};
use crate::core::split::select;
use crate::core::table::Table;
use crate::core::unique::unique_values;

pub type ApiResult<T> = Result<T, Error>;

pub const DEFAULT_PAGE_SIZE: u64 = 10;

#[derive(Clone, Debug)]
pub struct PageQuery {
    pub page: u64,
    pub page_size: u64,
    pub filters: FilterSet,
}

impl PageQuery {
    pub fn new(page: u64, page_size: u64) -> Self {
        Self {
            page,
            page_size,
            filters: FilterSet::default(),
        }
    }

    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }
}

impl Default for PageQuery {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Clone, Debug)]
pub struct DatasetClient {
    hub: HubClient,
}

impl DatasetClient {
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            hub: HubClient::new(DEFAULT_HUB_URL)?,
        })
    }

    pub fn with_hub(mut self, hub: HubClient) -> Self {
        self.hub = hub;
        self
    }

    pub fn hub(&self) -> &HubClient {
        &self.hub
    }

    /// Resolve the reference and pick its single exposed split.
    pub fn load_table(&self, reference: &DatasetRef) -> ApiResult<Table> {
        select(resolve(reference, &self.hub)?)
    }

    pub fn page(&self, reference: &DatasetRef, query: &PageQuery) -> ApiResult<PageResult> {
        check_bounds(query.page, query.page_size)?;
        let table = self.load_table(reference)?;
        let loaded = table.len();
        let filtered = filter(table, &query.filters);
        debug!(
            dataset = reference.path_or_id(),
            loaded,
            matched = filtered.len(),
            predicates = query.filters.predicates().len(),
            "filtered dataset"
        );
        paginate(filtered, query.page, query.page_size)
    }

    pub fn columns(&self, reference: &DatasetRef) -> ApiResult<Vec<String>> {
        Ok(self.load_table(reference)?.columns())
    }

    pub fn unique_values(&self, reference: &DatasetRef, column: &str) -> ApiResult<Vec<String>> {
        let table = self.load_table(reference)?;
        Ok(unique_values(&table, column).into_iter().collect())
    }
}
