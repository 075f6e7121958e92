//! Purpose: Provide the HTTP/JSON dataset browsing server.
//! Exports: `ServeConfig`, `serve`, `preflight_config`.
//! Role: Axum server exposing paging, column listing, and unique values over `DatasetClient`.
//! Invariants: Error envelopes carry `detail` plus a structured `error` object.
//! Invariants: Dataset loads run on the blocking pool; requests share no mutable state.
//! Invariants: Loopback-only unless explicitly allowed.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dsview::api::{
    DEFAULT_PAGE_SIZE, DatasetClient, DatasetRef, Error, ErrorKind, FilterSet, HubClient,
    PageQuery,
};

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub allow_non_loopback: bool,
    pub hub_url: String,
    pub hub_token: Option<String>,
    pub max_remote_rows: Option<u64>,
    pub static_dir: Option<PathBuf>,
    pub cors_allowed_origins: Vec<String>,
    pub max_body_bytes: u64,
}

#[derive(Clone)]
struct AppState {
    client: DatasetClient,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    let cors_origins = preflight_config(&config)?;

    init_tracing();

    let max_body_bytes: usize = config.max_body_bytes.try_into().map_err(|_| {
        Error::new(ErrorKind::BadRequest).with_message("--max-body-bytes is too large")
    })?;

    let state = Arc::new(AppState {
        client: build_client(&config)?,
    });

    let mut app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/dataset", post(list_dataset))
        .route("/api/dataset/columns", get(dataset_columns))
        .route("/api/dataset/unique-values", get(dataset_unique_values));
    if let Some(dir) = &config.static_dir {
        app = app
            .route_service("/", ServeFile::new(dir.join("index.html")))
            .nest_service("/static", ServeDir::new(dir));
    }
    let app = app
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    info!(bind = %config.bind, hub = %config.hub_url, "dsview listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

/// Validate the config and return the parsed CORS origins, without binding anything.
pub fn preflight_config(config: &ServeConfig) -> Result<Vec<HeaderValue>, Error> {
    validate_config(config)?;
    build_client(config)?;
    parse_cors_origins(&config.cors_allowed_origins)
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::BadRequest)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::BadRequest)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 1048576."));
    }

    if config.max_body_bytes > usize::MAX as u64 {
        return Err(Error::new(ErrorKind::BadRequest)
            .with_message("--max-body-bytes exceeds platform limits")
            .with_hint("Use a smaller value that fits in memory."));
    }

    if config.max_remote_rows == Some(0) {
        return Err(Error::new(ErrorKind::BadRequest)
            .with_message("--max-remote-rows must be greater than zero")
            .with_hint("Omit the flag to fetch every row."));
    }

    if let Some(dir) = &config.static_dir {
        if !dir.is_dir() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message("static directory not found")
                .with_path(dir));
        }
    }

    Ok(())
}

fn build_client(config: &ServeConfig) -> Result<DatasetClient, Error> {
    let hub = HubClient::new(&config.hub_url)?
        .with_token(config.hub_token.clone())
        .with_max_rows(config.max_remote_rows);
    Ok(DatasetClient::new()?.with_hub(hub))
}

fn parse_cors_origins(origins: &[String]) -> Result<Vec<HeaderValue>, Error> {
    origins
        .iter()
        .map(|origin| {
            let trimmed = origin.trim().trim_end_matches('/');
            let valid = (trimmed.starts_with("http://") || trimmed.starts_with("https://"))
                && !trimmed.contains(char::is_whitespace);
            if !valid {
                return Err(Error::new(ErrorKind::BadRequest)
                    .with_message(format!("invalid --cors-origin `{origin}`"))
                    .with_hint("Use a full origin like http://localhost:3000."));
            }
            HeaderValue::from_str(trimmed).map_err(|err| {
                Error::new(ErrorKind::BadRequest)
                    .with_message(format!("invalid --cors-origin `{origin}`"))
                    .with_source(err)
            })
        })
        .collect()
}

fn cors_layer(origins: Vec<HeaderValue>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE as i64
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// Accept `true`/`false`, `1`/`0`, `yes`/`no`, `on`/`off` (any case) for boolean flags.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let text = match FlagValue::deserialize(deserializer)? {
        FlagValue::Bool(flag) => return Ok(flag),
        FlagValue::Int(number) => number.to_string(),
        FlagValue::Text(text) => text,
    };
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "t" | "y" => Ok(true),
        "false" | "0" | "no" | "off" | "f" | "n" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "invalid boolean `{other}`; use true or false"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct DatasetRequest {
    dataset_path: String,
    #[serde(default, deserialize_with = "deserialize_flag")]
    is_local: bool,
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
    #[serde(default)]
    filters: Option<Map<String, Value>>,
    #[serde(default)]
    config: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ColumnsQuery {
    dataset_path: String,
    #[serde(default, deserialize_with = "deserialize_flag")]
    is_local: bool,
    #[serde(default)]
    config: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UniqueValuesQuery {
    dataset_path: String,
    column: String,
    #[serde(default, deserialize_with = "deserialize_flag")]
    is_local: bool,
    #[serde(default)]
    config: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    detail: String,
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

async fn healthz() -> Response {
    Json(json!({ "ok": true })).into_response()
}

async fn list_dataset(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DatasetRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return error_response(bad_body(rejection.body_text())),
    };
    let query = match page_query_from_request(&request) {
        Ok(query) => query,
        Err(err) => return error_response(err),
    };
    let reference = DatasetRef::new(request.dataset_path, request.is_local).with_config(request.config);

    let client = state.client.clone();
    match run_blocking(move || client.page(&reference, &query)).await {
        Ok(page) => Json(page).into_response(),
        Err(err) => error_response(err),
    }
}

async fn dataset_columns(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ColumnsQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return error_response(bad_body(rejection.body_text())),
    };
    let reference = DatasetRef::new(query.dataset_path, query.is_local).with_config(query.config);

    let client = state.client.clone();
    match run_blocking(move || client.columns(&reference)).await {
        Ok(columns) => Json(json!({ "columns": columns })).into_response(),
        Err(err) => error_response(err),
    }
}

async fn dataset_unique_values(
    State(state): State<Arc<AppState>>,
    query: Result<Query<UniqueValuesQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return error_response(bad_body(rejection.body_text())),
    };
    let reference = DatasetRef::new(query.dataset_path, query.is_local).with_config(query.config);
    let column = query.column;

    let client = state.client.clone();
    match run_blocking(move || client.unique_values(&reference, &column)).await {
        Ok(values) => Json(json!({ "values": values })).into_response(),
        Err(err) => error_response(err),
    }
}

fn page_query_from_request(request: &DatasetRequest) -> Result<PageQuery, Error> {
    let page = positive("page", request.page)?;
    let page_size = positive("page_size", request.page_size)?;
    let filters = match &request.filters {
        Some(filters) => FilterSet::from_json(filters)?,
        None => FilterSet::default(),
    };
    Ok(PageQuery::new(page, page_size).with_filters(filters))
}

fn positive(name: &str, value: i64) -> Result<u64, Error> {
    u64::try_from(value)
        .ok()
        .filter(|value| *value >= 1)
        .ok_or_else(|| {
            Error::new(ErrorKind::BadRequest).with_message(format!("{name} must be at least 1"))
        })
}

async fn run_blocking<T, F>(work: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("dataset task failed")
            .with_source(err)
    })?
}

fn bad_body(text: String) -> Error {
    Error::new(ErrorKind::BadRequest).with_message(text)
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidFormat | ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::LoadFailure | ErrorKind::EmptyDataset | ErrorKind::Io | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: Error) -> Response {
    let status = status_for(err.kind());
    if status.is_server_error() {
        warn!(kind = ?err.kind(), error = %err.detail(), "request failed");
    }
    let body = ErrorEnvelope {
        detail: err.detail(),
        error: ErrorBody {
            kind: format!("{:?}", err.kind()),
            message: err.message().unwrap_or("error").to_string(),
            hint: err.hint().map(str::to_string),
            path: err.path().map(|path| path.to_string_lossy().to_string()),
        },
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::{
        ColumnsQuery, DatasetRequest, ErrorKind, ServeConfig, page_query_from_request,
        parse_cors_origins, preflight_config, serve, status_for, validate_config,
    };
    use axum::extract::Query;
    use axum::http::{StatusCode, Uri};

    fn config() -> ServeConfig {
        ServeConfig {
            bind: "127.0.0.1:0".parse().expect("bind"),
            allow_non_loopback: false,
            hub_url: dsview::api::DEFAULT_HUB_URL.to_string(),
            hub_token: None,
            max_remote_rows: None,
            static_dir: None,
            cors_allowed_origins: Vec::new(),
            max_body_bytes: 1024 * 1024,
        }
    }

    fn request(body: serde_json::Value) -> DatasetRequest {
        serde_json::from_value(body).expect("request")
    }

    #[tokio::test]
    async fn serve_rejects_non_loopback_bind() {
        let mut config = config();
        config.bind = "0.0.0.0:0".parse().expect("bind");
        let err = serve(config).await.expect_err("expected usage error");
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn non_loopback_allowed_with_flag() {
        let mut config = config();
        config.bind = "0.0.0.0:0".parse().expect("bind");
        config.allow_non_loopback = true;
        validate_config(&config).expect("config ok");
    }

    #[test]
    fn limits_require_positive_values() {
        let mut config = config();
        config.max_body_bytes = 0;
        let err = validate_config(&config).expect_err("zero body");
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let mut config = self::config();
        config.max_remote_rows = Some(0);
        let err = validate_config(&config).expect_err("zero rows");
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn static_dir_must_exist() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = config();
        config.static_dir = Some(temp.path().join("missing"));
        let err = validate_config(&config).expect_err("missing dir");
        assert_eq!(err.kind(), ErrorKind::NotFound);

        config.static_dir = Some(temp.path().to_path_buf());
        validate_config(&config).expect("dir ok");
    }

    #[test]
    fn cors_origins_must_be_http_origins() {
        let origins = parse_cors_origins(&["http://localhost:3000/".to_string()]).expect("ok");
        assert_eq!(origins[0], "http://localhost:3000");
        let err = parse_cors_origins(&["localhost".to_string()]).expect_err("bad");
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn preflight_rejects_bad_hub_url() {
        let mut config = config();
        config.hub_url = "::nope::".to_string();
        let err = preflight_config(&config).expect_err("bad hub");
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn request_defaults_and_bounds() {
        let query = page_query_from_request(&request(serde_json::json!({
            "dataset_path": "squad"
        })))
        .expect("defaults");
        assert_eq!((query.page, query.page_size), (1, 10));
        assert!(query.filters.is_empty());

        for body in [
            serde_json::json!({"dataset_path": "x", "page": 0}),
            serde_json::json!({"dataset_path": "x", "page_size": -5}),
            serde_json::json!({"dataset_path": "x", "filters": {"a": [1]}}),
        ] {
            let err = page_query_from_request(&request(body)).expect_err("bad request");
            assert_eq!(err.kind(), ErrorKind::BadRequest);
        }
    }

    fn columns_query(uri: &str) -> Option<ColumnsQuery> {
        let uri: Uri = uri.parse().expect("uri");
        Query::<ColumnsQuery>::try_from_uri(&uri)
            .ok()
            .map(|Query(query)| query)
    }

    #[test]
    fn is_local_accepts_common_boolean_spellings() {
        for (raw, expected) in [
            ("true", true),
            ("True", true),
            ("1", true),
            ("yes", true),
            ("on", true),
            ("false", false),
            ("FALSE", false),
            ("0", false),
            ("no", false),
            ("off", false),
        ] {
            let query = columns_query(&format!("/c?dataset_path=x&is_local={raw}"))
                .unwrap_or_else(|| panic!("is_local={raw} rejected"));
            assert_eq!(query.is_local, expected, "is_local={raw}");
        }
        let query = columns_query("/c?dataset_path=x").expect("default");
        assert!(!query.is_local);
        assert!(columns_query("/c?dataset_path=x&is_local=maybe").is_none());

        for (body, expected) in [
            (serde_json::json!({"dataset_path": "x", "is_local": true}), true),
            (serde_json::json!({"dataset_path": "x", "is_local": 1}), true),
            (serde_json::json!({"dataset_path": "x", "is_local": "Yes"}), true),
            (serde_json::json!({"dataset_path": "x", "is_local": 0}), false),
            (serde_json::json!({"dataset_path": "x"}), false),
        ] {
            assert_eq!(request(body.clone()).is_local, expected, "{body}");
        }
        let bad = serde_json::from_value::<DatasetRequest>(
            serde_json::json!({"dataset_path": "x", "is_local": 2}),
        );
        assert!(bad.is_err());
    }

    #[test]
    fn status_mapping_follows_error_class() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::InvalidFormat), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::BadRequest), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::LoadFailure), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for(ErrorKind::EmptyDataset), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
