//! Purpose: Resolve a dataset reference into a table or a set of named partitions.
//! Exports: `DatasetRef`, `Source`, `resolve`, `hub::HubClient`.
//! Role: First pipeline stage; everything downstream sees only `Resolved`.
//! Invariants: Local refs must exist (`NotFound`) and be JSON/JSONL or a saved dataset dir.
//! Invariants: Remote failures surface as `LoadFailure` with the registry message.
//! Invariants: Nothing is cached; every call reads from the source again.

pub mod archive;
pub mod hub;
pub mod json;

use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::{Error, ErrorKind};
use super::table::Resolved;
use hub::HubClient;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DatasetRef {
    path_or_id: String,
    is_local: bool,
    config: Option<String>,
}

impl DatasetRef {
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            path_or_id: path.into(),
            is_local: true,
            config: None,
        }
    }

    pub fn remote(id: impl Into<String>) -> Self {
        Self {
            path_or_id: id.into(),
            is_local: false,
            config: None,
        }
    }

    pub fn new(path_or_id: impl Into<String>, is_local: bool) -> Self {
        if is_local {
            Self::local(path_or_id)
        } else {
            Self::remote(path_or_id)
        }
    }

    /// An empty sub-configuration name is the same as none.
    pub fn with_config(mut self, config: Option<String>) -> Self {
        self.config = config.filter(|name| !name.is_empty());
        self
    }

    pub fn path_or_id(&self) -> &str {
        &self.path_or_id
    }

    pub fn is_local(&self) -> bool {
        self.is_local
    }

    pub fn config(&self) -> Option<&str> {
        self.config.as_deref()
    }
}

/// Where a dataset reference points, decided before any rows are read.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Source {
    LocalJson(PathBuf),
    LocalArchive(PathBuf),
    Remote { id: String, config: Option<String> },
}

impl Source {
    pub fn classify(reference: &DatasetRef) -> Result<Self, Error> {
        if !reference.is_local() {
            return Ok(Source::Remote {
                id: normalize_dataset_id(reference.path_or_id()),
                config: reference.config().map(str::to_string),
            });
        }

        let path = Path::new(reference.path_or_id());
        if !path.exists() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message("local dataset not found")
                .with_path(path));
        }
        if path.is_file() && json::is_json_path(path) {
            return Ok(Source::LocalJson(path.to_path_buf()));
        }
        if path.is_dir() && archive::has_manifest(path) {
            return Ok(Source::LocalArchive(path.to_path_buf()));
        }
        Err(Error::new(ErrorKind::InvalidFormat)
            .with_message("unsupported local dataset")
            .with_hint("Use a .json/.jsonl file or a directory written by save_to_disk (dataset_dict.json or state.json).")
            .with_path(path))
    }

    pub fn resolve(&self, hub: &HubClient) -> Result<Resolved, Error> {
        debug!(source = ?self, "resolving dataset");
        match self {
            Source::LocalJson(path) => json::load(path),
            Source::LocalArchive(path) => archive::load(path),
            Source::Remote { id, config } => hub.resolve(id, config.as_deref()),
        }
    }
}

pub fn resolve(reference: &DatasetRef, hub: &HubClient) -> Result<Resolved, Error> {
    Source::classify(reference)?.resolve(hub)
}

/// Reduce hub URLs such as `@https://huggingface.co/datasets/owner/name/tree/main`
/// to `owner/name`; plain ids pass through trimmed.
pub fn normalize_dataset_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('@').unwrap_or(trimmed);
    let Some((_, rest)) = trimmed.split_once("huggingface.co/datasets/") else {
        return trimmed.trim_end_matches('/').to_string();
    };
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = rest.split('/').filter(|seg| !seg.is_empty()).collect();
    let end = segments
        .iter()
        .position(|seg| matches!(*seg, "tree" | "blob" | "viewer" | "resolve"))
        .unwrap_or(segments.len());
    segments[..end].join("/")
}
