//! Purpose: Load dataset directories written by the hub client's `save_to_disk`.
//! Exports: `has_manifest`, `load`, manifest file names.
//! Role: Local on-disk source; Arrow IPC stream shards converted to JSON records.
//! Invariants: `dataset_dict.json` lists splits in declared order, one sub-directory each.
//! Invariants: `state.json` lists the shard files of one table, read in listed order.
//! Invariants: Column order comes from `dataset_info.json` features, else the Arrow schema.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use arrow::ipc::reader::StreamReader;
use arrow::json::WriterBuilder;
use arrow::json::writer::JsonArray;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::table::{Partition, Record, Resolved, RowSource, Table};

pub const DATASET_DICT_FILE: &str = "dataset_dict.json";
pub const STATE_FILE: &str = "state.json";
pub const INFO_FILE: &str = "dataset_info.json";

#[derive(Deserialize)]
struct DatasetDictManifest {
    splits: Vec<String>,
}

#[derive(Deserialize)]
struct StateManifest {
    #[serde(rename = "_data_files")]
    data_files: Vec<DataFile>,
}

#[derive(Deserialize)]
struct DataFile {
    filename: String,
}

#[derive(Deserialize)]
struct InfoManifest {
    #[serde(default)]
    features: Option<Map<String, Value>>,
}

pub fn has_manifest(dir: &Path) -> bool {
    dir.join(DATASET_DICT_FILE).is_file() || dir.join(STATE_FILE).is_file()
}

pub fn load(dir: &Path) -> Result<Resolved, Error> {
    let dict_path = dir.join(DATASET_DICT_FILE);
    if !dict_path.is_file() {
        return Ok(Resolved::Flat(load_table_dir(dir)?));
    }

    let manifest: DatasetDictManifest = read_manifest(&dict_path)?;
    debug!(dir = %dir.display(), splits = ?manifest.splits, "saved dataset dict");
    let partitions = manifest
        .splits
        .into_iter()
        .map(|split| {
            let split_dir = dir.join(&split);
            Partition::new(split, SavedSplit { dir: split_dir })
        })
        .collect();
    Ok(Resolved::Partitioned(partitions))
}

struct SavedSplit {
    dir: PathBuf,
}

impl RowSource for SavedSplit {
    fn load(&self) -> Result<Table, Error> {
        load_table_dir(&self.dir)
    }
}

fn load_table_dir(dir: &Path) -> Result<Table, Error> {
    let state: StateManifest = read_manifest(&dir.join(STATE_FILE))?;

    let mut writer = WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(Vec::new());
    let mut arrow_columns: Option<Vec<String>> = None;

    for data_file in &state.data_files {
        let shard = dir.join(&data_file.filename);
        let file = File::open(&shard).map_err(|err| {
            Error::new(ErrorKind::LoadFailure)
                .with_message("failed to open data shard")
                .with_path(&shard)
                .with_source(err)
        })?;
        let reader = StreamReader::try_new(BufReader::new(file), None)
            .map_err(|err| arrow_error("invalid arrow stream", &shard, err))?;
        if arrow_columns.is_none() {
            arrow_columns = Some(
                reader
                    .schema()
                    .fields()
                    .iter()
                    .map(|field| field.name().clone())
                    .collect(),
            );
        }
        for batch in reader {
            let batch = batch.map_err(|err| arrow_error("failed to read record batch", &shard, err))?;
            writer
                .write(&batch)
                .map_err(|err| arrow_error("failed to convert record batch", &shard, err))?;
        }
    }
    writer
        .finish()
        .map_err(|err| arrow_error("failed to convert record batch", dir, err))?;

    let rows = decode_rows(&writer.into_inner()).map_err(|err| err.with_path(dir))?;
    let schema = info_columns(dir)?.or(arrow_columns);
    let table = Table::new(rows);
    Ok(match schema {
        Some(columns) => table.with_schema(columns),
        None => table,
    })
}

fn decode_rows(bytes: &[u8]) -> Result<Vec<Record>, Error> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(bytes).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("arrow rows did not convert to JSON objects")
            .with_source(err)
    })
}

fn info_columns(dir: &Path) -> Result<Option<Vec<String>>, Error> {
    let path = dir.join(INFO_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let info: InfoManifest = read_manifest(&path)?;
    Ok(info
        .features
        .map(|features| features.keys().cloned().collect()))
}

fn read_manifest<T: DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        Error::new(ErrorKind::LoadFailure)
            .with_message("failed to read dataset manifest")
            .with_path(path)
            .with_source(err)
    })?;
    serde_json::from_str(&text).map_err(|err| {
        Error::new(ErrorKind::LoadFailure)
            .with_message("invalid dataset manifest")
            .with_path(path)
            .with_source(err)
    })
}

fn arrow_error(message: &str, path: &Path, err: arrow::error::ArrowError) -> Error {
    Error::new(ErrorKind::LoadFailure)
        .with_message(message)
        .with_path(path)
        .with_source(err)
}
