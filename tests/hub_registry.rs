//! Purpose: End-to-end tests for remote dataset resolution against a mock hub.
//! Exports: None (integration test module).
//! Role: Validate split listing, config choice, lazy row paging, and error mapping.
//! Invariants: The mock hub is an axum router on a loopback ephemeral port.
//! Invariants: Every request the mock sees is recorded for assertions.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use dsview::api::{DatasetClient, DatasetRef, ErrorKind, FilterSet, HubClient, PageQuery};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

type Seen = Arc<Mutex<Vec<SeenRequest>>>;

const PEOPLE_ROWS: u64 = 250;

#[derive(Clone, Debug)]
struct SeenRequest {
    path: String,
    query: HashMap<String, String>,
    authorization: Option<String>,
}

impl SeenRequest {
    fn param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

struct MockHub {
    base_url: String,
    seen: Seen,
}

impl MockHub {
    fn start() -> TestResult<Self> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let base_url = format!("http://{}/", listener.local_addr()?);
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));

        let app = Router::new()
            .route("/splits", get(splits))
            .route("/rows", get(rows))
            .with_state(Arc::clone(&seen));
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        thread::spawn(move || {
            runtime.block_on(async move {
                let Ok(listener) = tokio::net::TcpListener::from_std(listener) else {
                    return;
                };
                let _ = axum::serve(listener, app).await;
            });
        });
        Ok(Self { base_url, seen })
    }

    fn client(&self) -> TestResult<DatasetClient> {
        Ok(DatasetClient::new()?.with_hub(HubClient::new(&self.base_url)?))
    }

    fn seen(&self) -> Vec<SeenRequest> {
        self.seen
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    fn rows_requests(&self) -> Vec<SeenRequest> {
        self.seen()
            .into_iter()
            .filter(|request| request.path == "/rows")
            .collect()
    }
}

async fn splits(
    State(seen): State<Seen>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let request = record(&seen, "/splits", query, &headers);
    let (status, body) = respond_splits(&request);
    (status, Json(body)).into_response()
}

async fn rows(
    State(seen): State<Seen>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let request = record(&seen, "/rows", query, &headers);
    let (status, body) = respond_rows(&request);
    (status, Json(body)).into_response()
}

fn record(
    seen: &Mutex<Vec<SeenRequest>>,
    path: &str,
    query: HashMap<String, String>,
    headers: &HeaderMap,
) -> SeenRequest {
    let request = SeenRequest {
        path: path.to_string(),
        query,
        authorization: headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    };
    seen.lock()
        .unwrap_or_else(|poison| poison.into_inner())
        .push(request.clone());
    request
}

fn not_found() -> (StatusCode, Value) {
    (
        StatusCode::NOT_FOUND,
        json!({ "error": "The dataset does not exist on the Hub." }),
    )
}

fn respond_splits(request: &SeenRequest) -> (StatusCode, Value) {
    match request.param("dataset").unwrap_or_default() {
        "org/people" => (
            StatusCode::OK,
            json!({
                "splits": [
                    {"dataset": "org/people", "config": "default", "split": "train"},
                    {"dataset": "org/people", "config": "default", "split": "test"},
                    {"dataset": "org/people", "config": "extra", "split": "train"},
                ],
                "pending": [],
                "failed": []
            }),
        ),
        "org/empty" => (StatusCode::OK, json!({ "splits": [] })),
        "org/gated" => match request.authorization.as_deref() {
            Some("Bearer hf_test") => (
                StatusCode::OK,
                json!({ "splits": [{"config": "default", "split": "train"}] }),
            ),
            _ => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "The dataset requires authentication" }),
            ),
        },
        "org/broken" => (StatusCode::OK, json!("not the expected shape")),
        _ => not_found(),
    }
}

fn respond_rows(request: &SeenRequest) -> (StatusCode, Value) {
    match request.param("dataset").unwrap_or_default() {
        "org/people" => people_rows(request),
        "org/gated" => (
            StatusCode::OK,
            json!({
                "features": [{"feature_idx": 0, "name": "secret", "type": {"dtype": "string"}}],
                "rows": [{"row_idx": 0, "row": {"secret": "ok"}, "truncated_cells": []}],
                "num_rows_total": 1
            }),
        ),
        _ => not_found(),
    }
}

fn people_rows(request: &SeenRequest) -> (StatusCode, Value) {
    let offset: u64 = request
        .param("offset")
        .and_then(|value| value.parse().ok())
        .unwrap_or(0);
    let length: u64 = request
        .param("length")
        .and_then(|value| value.parse().ok())
        .unwrap_or(100);
    let config = request.param("config").unwrap_or_default();
    let split = request.param("split").unwrap_or_default();

    if config == "extra" {
        let rows: Vec<Value> = ["x", "y", "x"]
            .iter()
            .enumerate()
            .map(|(idx, label)| json!({"row_idx": idx, "row": {"label": label}, "truncated_cells": []}))
            .collect();
        return (
            StatusCode::OK,
            json!({
                "features": [{"feature_idx": 0, "name": "label", "type": {"dtype": "string"}}],
                "rows": rows,
                "num_rows_total": 3
            }),
        );
    }
    if split != "train" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "unexpected split" }),
        );
    }

    let end = (offset + length).min(PEOPLE_ROWS);
    let rows: Vec<Value> = (offset..end)
        .map(|n| {
            json!({
                "row_idx": n,
                "row": {"id": n, "name": format!("person-{n}")},
                "truncated_cells": []
            })
        })
        .collect();
    (
        StatusCode::OK,
        json!({
            "features": [
                {"feature_idx": 0, "name": "name", "type": {"dtype": "string"}},
                {"feature_idx": 1, "name": "id", "type": {"dtype": "int64"}}
            ],
            "rows": rows,
            "num_rows_total": PEOPLE_ROWS,
            "partial": false
        }),
    )
}

#[test]
fn remote_page_reads_first_split_of_first_config() -> TestResult<()> {
    let hub = MockHub::start()?;
    let client = hub.client()?;

    let page = client.page(&DatasetRef::remote("org/people"), &PageQuery::new(3, 100))?;
    assert_eq!(page.total_rows, PEOPLE_ROWS);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.data.len(), 50);
    assert_eq!(page.data[0]["_index"], 200);
    assert_eq!(page.data[0]["name"], "person-200");

    let rows = hub.rows_requests();
    let offsets: Vec<&str> = rows
        .iter()
        .map(|request| request.param("offset").unwrap_or_default())
        .collect();
    assert_eq!(offsets, vec!["0", "100", "200"]);
    assert!(rows.iter().all(|request| request.param("split") == Some("train")));
    assert!(rows.iter().all(|request| request.param("config") == Some("default")));
    Ok(())
}

#[test]
fn remote_columns_follow_feature_order() -> TestResult<()> {
    let hub = MockHub::start()?;
    let columns = hub.client()?.columns(&DatasetRef::remote("org/people"))?;
    assert_eq!(columns, vec!["name", "id"]);
    Ok(())
}

#[test]
fn remote_filters_apply_before_paging() -> TestResult<()> {
    let hub = MockHub::start()?;
    let filters = FilterSet::from_pairs(["name_regex=^person-1\\d$"])?;
    let page = hub.client()?.page(
        &DatasetRef::remote("org/people"),
        &PageQuery::new(1, 5).with_filters(filters),
    )?;
    assert_eq!(page.total_rows, 10);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.data[0]["_index"], 0);
    assert_eq!(page.data[0]["id"], 10);
    Ok(())
}

#[test]
fn remote_max_rows_caps_fetching() -> TestResult<()> {
    let hub = MockHub::start()?;
    let client = DatasetClient::new()?
        .with_hub(HubClient::new(&hub.base_url)?.with_max_rows(Some(150)));

    let page = client.page(&DatasetRef::remote("org/people"), &PageQuery::default())?;
    assert_eq!(page.total_rows, 150);

    let lengths: Vec<String> = hub
        .rows_requests()
        .iter()
        .map(|request| request.param("length").unwrap_or_default().to_string())
        .collect();
    assert_eq!(lengths, vec!["100", "50"]);
    Ok(())
}

#[test]
fn remote_explicit_config_is_used() -> TestResult<()> {
    let hub = MockHub::start()?;
    let reference = DatasetRef::remote("org/people").with_config(Some("extra".to_string()));
    let values = hub.client()?.unique_values(&reference, "label")?;
    assert_eq!(values, vec!["x", "y"]);
    Ok(())
}

#[test]
fn remote_unknown_config_lists_available() -> TestResult<()> {
    let hub = MockHub::start()?;
    let reference = DatasetRef::remote("org/people").with_config(Some("nope".to_string()));
    let err = hub
        .client()?
        .columns(&reference)
        .expect_err("unknown config");
    assert_eq!(err.kind(), ErrorKind::LoadFailure);
    let hint = err.hint().unwrap_or_default();
    assert!(hint.contains("default"), "{hint}");
    assert!(hint.contains("extra"), "{hint}");
    Ok(())
}

#[test]
fn remote_dataset_without_splits_is_empty() -> TestResult<()> {
    let hub = MockHub::start()?;
    let err = hub
        .client()?
        .page(&DatasetRef::remote("org/empty"), &PageQuery::default())
        .expect_err("no splits");
    assert_eq!(err.kind(), ErrorKind::EmptyDataset);
    Ok(())
}

#[test]
fn remote_http_errors_are_load_failures() -> TestResult<()> {
    let hub = MockHub::start()?;
    let client = hub.client()?;

    let err = client
        .columns(&DatasetRef::remote("org/missing"))
        .expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::LoadFailure);
    assert_eq!(err.message(), Some("The dataset does not exist on the Hub."));

    let err = client
        .columns(&DatasetRef::remote("org/broken"))
        .expect_err("broken");
    assert_eq!(err.kind(), ErrorKind::LoadFailure);
    Ok(())
}

#[test]
fn remote_token_is_sent_as_bearer() -> TestResult<()> {
    let hub = MockHub::start()?;

    let err = hub
        .client()?
        .columns(&DatasetRef::remote("org/gated"))
        .expect_err("no token");
    assert_eq!(err.kind(), ErrorKind::LoadFailure);

    let client = DatasetClient::new()?.with_hub(
        HubClient::new(&hub.base_url)?.with_token(Some("hf_test".to_string())),
    );
    let columns = client.columns(&DatasetRef::remote("org/gated"))?;
    assert_eq!(columns, vec!["secret"]);
    assert!(
        hub.seen()
            .iter()
            .any(|request| request.authorization.as_deref() == Some("Bearer hf_test"))
    );
    Ok(())
}

#[test]
fn remote_hub_urls_are_normalized_to_ids() -> TestResult<()> {
    let hub = MockHub::start()?;
    let reference = DatasetRef::remote("https://huggingface.co/datasets/org/people/tree/main");
    let columns = hub.client()?.columns(&reference)?;
    assert_eq!(columns, vec!["name", "id"]);

    let splits: Vec<SeenRequest> = hub
        .seen()
        .into_iter()
        .filter(|request| request.path == "/splits")
        .collect();
    assert_eq!(splits[0].param("dataset"), Some("org/people"));
    Ok(())
}
