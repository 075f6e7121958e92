//! Purpose: Blocking client for the dataset hub's viewer REST API.
//! Exports: `HubClient`, `DEFAULT_HUB_URL`, `ROWS_PAGE_LENGTH`.
//! Role: Remote source; lists `(config, split)` pairs and pages rows of one split.
//! Invariants: Splits keep registry order; without a config the first listed config is used.
//! Invariants: Rows are fetched lazily, only for the split that gets selected.
//! Invariants: Transport, status, and decode failures are all `LoadFailure`.

use std::collections::HashSet;
use std::fmt;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::core::error::{Error, ErrorKind};
use crate::core::table::{Partition, Record, Resolved, RowSource, Table};

pub const DEFAULT_HUB_URL: &str = "https://datasets-server.huggingface.co";

/// Largest page the rows endpoint serves.
pub const ROWS_PAGE_LENGTH: u64 = 100;

type HubResult<T> = Result<T, Error>;

#[derive(Clone)]
pub struct HubClient {
    base_url: Url,
    token: Option<String>,
    max_rows: Option<u64>,
    agent: ureq::Agent,
}

impl fmt::Debug for HubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("max_rows", &self.max_rows)
            .finish()
    }
}

#[derive(Deserialize)]
struct SplitsEnvelope {
    splits: Vec<SplitEntry>,
}

#[derive(Clone, Debug, Deserialize)]
struct SplitEntry {
    config: String,
    split: String,
}

#[derive(Deserialize)]
struct RowsEnvelope {
    #[serde(default)]
    features: Vec<FeatureEntry>,
    rows: Vec<RowEntry>,
    num_rows_total: u64,
}

#[derive(Deserialize)]
struct FeatureEntry {
    name: String,
}

#[derive(Deserialize)]
struct RowEntry {
    row: Record,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: String,
}

impl HubClient {
    pub fn new(base_url: &str) -> HubResult<Self> {
        let base_url = Url::parse(base_url).map_err(|err| {
            Error::new(ErrorKind::BadRequest)
                .with_message("invalid hub url")
                .with_source(err)
        })?;
        if base_url.cannot_be_a_base() {
            return Err(Error::new(ErrorKind::BadRequest).with_message("hub url cannot be a base"));
        }
        Ok(Self {
            base_url,
            token: None,
            max_rows: None,
            agent: ureq::AgentBuilder::new().build(),
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|token| !token.is_empty());
        self
    }

    /// Stop paging a split after this many rows.
    pub fn with_max_rows(mut self, max_rows: Option<u64>) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn resolve(&self, dataset: &str, config: Option<&str>) -> HubResult<Resolved> {
        if dataset.is_empty() {
            return Err(Error::new(ErrorKind::BadRequest).with_message("dataset id is empty"));
        }
        let splits = self.list_splits(dataset)?;
        let chosen = match config {
            Some(config) => config.to_string(),
            None => match splits.first() {
                Some(entry) => entry.config.clone(),
                None => return Ok(Resolved::Partitioned(Vec::new())),
            },
        };

        let partitions: Vec<Partition> = splits
            .iter()
            .filter(|entry| entry.config == chosen)
            .map(|entry| {
                Partition::new(
                    entry.split.clone(),
                    HubSplit {
                        client: self.clone(),
                        dataset: dataset.to_string(),
                        config: entry.config.clone(),
                        split: entry.split.clone(),
                    },
                )
            })
            .collect();

        if partitions.is_empty() && config.is_some() {
            let available = available_configs(&splits);
            return Err(Error::new(ErrorKind::LoadFailure)
                .with_message(format!("config `{chosen}` not found for dataset `{dataset}`"))
                .with_hint(format!("Available configs: {}", available.join(", "))));
        }
        debug!(dataset, config = %chosen, splits = partitions.len(), "hub dataset resolved");
        Ok(Resolved::Partitioned(partitions))
    }

    fn list_splits(&self, dataset: &str) -> HubResult<Vec<SplitEntry>> {
        let mut url = self.endpoint("splits")?;
        url.query_pairs_mut().append_pair("dataset", dataset);
        let envelope: SplitsEnvelope = self.get_json(&url)?;
        Ok(envelope.splits)
    }

    fn fetch_split(&self, dataset: &str, config: &str, split: &str) -> HubResult<Table> {
        let mut rows: Vec<Record> = Vec::new();
        let mut schema: Option<Vec<String>> = None;
        let mut offset: u64 = 0;

        loop {
            let remaining = self.max_rows.map(|max| max.saturating_sub(offset));
            let length = remaining.map_or(ROWS_PAGE_LENGTH, |left| left.min(ROWS_PAGE_LENGTH));
            if length == 0 {
                break;
            }

            let mut url = self.endpoint("rows")?;
            url.query_pairs_mut()
                .append_pair("dataset", dataset)
                .append_pair("config", config)
                .append_pair("split", split)
                .append_pair("offset", &offset.to_string())
                .append_pair("length", &length.to_string());
            let page: RowsEnvelope = self.get_json(&url)?;

            if schema.is_none() && !page.features.is_empty() {
                schema = Some(page.features.into_iter().map(|f| f.name).collect());
            }
            if page.rows.is_empty() {
                break;
            }
            offset += page.rows.len() as u64;
            rows.extend(page.rows.into_iter().map(|entry| entry.row));
            if offset >= page.num_rows_total {
                break;
            }
        }

        debug!(dataset, config, split, rows = rows.len(), "hub split fetched");
        let table = Table::new(rows);
        Ok(match schema {
            Some(columns) => table.with_schema(columns),
            None => table,
        })
    }

    fn endpoint(&self, name: &str) -> HubResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                Error::new(ErrorKind::BadRequest).with_message("hub url cannot be a base")
            })?
            .pop_if_empty()
            .push(name);
        Ok(url)
    }

    fn get_json<R: DeserializeOwned>(&self, url: &Url) -> HubResult<R> {
        let mut request = self
            .agent
            .get(url.as_str())
            .set("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        match request.call() {
            Ok(response) => read_json_response(response),
            Err(ureq::Error::Status(code, response)) => Err(parse_error_response(code, response)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::LoadFailure)
                .with_message("hub request failed")
                .with_source(err)),
        }
    }
}

struct HubSplit {
    client: HubClient,
    dataset: String,
    config: String,
    split: String,
}

impl RowSource for HubSplit {
    fn load(&self) -> Result<Table, Error> {
        self.client
            .fetch_split(&self.dataset, &self.config, &self.split)
    }
}

/// Distinct config names in first-seen order.
fn available_configs(splits: &[SplitEntry]) -> Vec<&str> {
    let mut seen = HashSet::new();
    splits
        .iter()
        .map(|entry| entry.config.as_str())
        .filter(|config| seen.insert(*config))
        .collect()
}

fn read_json_response<R: DeserializeOwned>(response: ureq::Response) -> HubResult<R> {
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::LoadFailure)
            .with_message("failed to read hub response")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::LoadFailure)
            .with_message("invalid hub response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => envelope.error,
        Err(_) => match serde_json::from_str::<Value>(&body) {
            Ok(Value::String(text)) => text,
            _ => format!("hub returned status {status}"),
        },
    };
    Error::new(ErrorKind::LoadFailure).with_message(message)
}
