//! Purpose: `dsview` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands print one JSON document on stdout when they succeed.
//! Invariants: Errors are emitted as JSON on stderr (plain text on a terminal).
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};

mod command_dispatch;
mod serve;

use dsview::api::{
    DEFAULT_HUB_URL, DEFAULT_PAGE_SIZE, DatasetRef, Error, ErrorKind, FilterSet, PageQuery,
    to_exit_code,
};

fn main() {
    let exit_code = match run() {
        Ok(()) => 0,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<(), Error> {
    let cli = match Cli::try_parse_from(std::env::args_os().collect::<Vec<OsString>>()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                return Ok(());
            }
            _ => {
                return Err(Error::new(ErrorKind::BadRequest)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `dsview --help`."));
            }
        },
    };

    command_dispatch::dispatch_command(cli.command, cli.hub)
}

#[derive(Parser)]
#[command(
    name = "dsview",
    version,
    about = "Browse local and hub-hosted datasets page by page",
    long_about = None,
    after_help = r#"EXAMPLES
  $ dsview serve --static-dir ./static
  $ dsview page openai/openai_humaneval --page 2 --page-size 5
  $ dsview page ./rows.jsonl --local --filter status=active --filter name_regex='^A'
  $ dsview columns glue --config mrpc
  $ dsview unique ./saved_dataset --local label

NOTES
  - Filters ending in `_regex` are regular expressions on the column before the suffix
  - Other filters are case-insensitive substring matches
  - Datasets with several splits expose the first split in declared order"#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(flatten)]
    hub: HubArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone, Debug)]
struct HubArgs {
    #[arg(
        long,
        global = true,
        env = "DSVIEW_HUB_URL",
        default_value = DEFAULT_HUB_URL,
        help = "Dataset viewer API used for remote datasets"
    )]
    hub_url: String,
    #[arg(
        long,
        global = true,
        env = "HF_TOKEN",
        hide_env_values = true,
        help = "Bearer token for gated or private remote datasets"
    )]
    hub_token: Option<String>,
    #[arg(
        long,
        global = true,
        env = "DSVIEW_MAX_REMOTE_ROWS",
        help = "Stop fetching a remote split after this many rows (default: all rows)"
    )]
    max_remote_rows: Option<u64>,
}

#[derive(Args, Clone, Debug)]
struct DatasetArgs {
    #[arg(help = "Hub dataset id or URL, or a local path with --local")]
    dataset: String,
    #[arg(long, help = "Treat DATASET as a local .json/.jsonl file or saved dataset directory")]
    local: bool,
    #[arg(long, help = "Sub-configuration of a remote dataset")]
    config: Option<String>,
}

impl DatasetArgs {
    fn reference(&self) -> DatasetRef {
        DatasetRef::new(self.dataset.clone(), self.local).with_config(self.config.clone())
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Serve the HTTP API",
        after_help = r#"EXAMPLES
  $ dsview serve
  $ dsview serve --bind 127.0.0.1:8080 --static-dir ./static
  $ dsview serve --cors-origin http://localhost:3000
  $ dsview serve check

NOTES
  - Routes: POST /api/dataset, GET /api/dataset/columns, GET /api/dataset/unique-values
  - is_local accepts true/false, 1/0, yes/no, or on/off (any case)
  - Loopback is the default; non-loopback binds require --allow-non-loopback
  - Without --cors-origin any origin may call the API
  - Set RUST_LOG (e.g. RUST_LOG=debug) to change log verbosity"#
    )]
    Serve {
        #[command(subcommand)]
        subcommand: Option<ServeSubcommand>,
        #[command(flatten)]
        run: ServeRunArgs,
    },
    #[command(about = "Print one page of a dataset as JSON")]
    Page {
        #[command(flatten)]
        dataset: DatasetArgs,
        #[arg(long, default_value_t = 1, help = "1-based page number")]
        page: u64,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, help = "Rows per page")]
        page_size: u64,
        #[arg(
            long = "filter",
            value_name = "COLUMN=VALUE",
            help = "Keep rows whose COLUMN contains VALUE; COLUMN_regex=PATTERN for regex (repeatable)"
        )]
        filters: Vec<String>,
    },
    #[command(about = "List a dataset's column names")]
    Columns {
        #[command(flatten)]
        dataset: DatasetArgs,
    },
    #[command(about = "List distinct values of one column (truncated to 100 characters)")]
    Unique {
        #[command(flatten)]
        dataset: DatasetArgs,
        #[arg(help = "Column name")]
        column: String,
    },
}

#[derive(Subcommand)]
enum ServeSubcommand {
    #[command(about = "Validate serve flags and print the resolved config without binding")]
    Check,
}

#[derive(Args, Clone, Debug)]
struct ServeRunArgs {
    #[arg(
        long,
        env = "DSVIEW_BIND",
        default_value = "127.0.0.1:8000",
        help = "Address to listen on"
    )]
    bind: String,
    #[arg(long, help = "Allow binding to a non-loopback address")]
    allow_non_loopback: bool,
    #[arg(
        long,
        env = "DSVIEW_STATIC_DIR",
        value_hint = ValueHint::DirPath,
        help = "Serve index.html at / and files under /static from this directory"
    )]
    static_dir: Option<PathBuf>,
    #[arg(long, value_name = "ORIGIN", help = "Allowed browser origin (repeatable)")]
    cors_origin: Vec<String>,
    #[arg(long, default_value_t = 1024 * 1024, help = "Maximum request body size")]
    max_body_bytes: u64,
}

fn serve_config_from_args(run: ServeRunArgs, hub: HubArgs) -> Result<serve::ServeConfig, Error> {
    let bind: SocketAddr = run.bind.parse().map_err(|_| {
        Error::new(ErrorKind::BadRequest)
            .with_message("invalid bind address")
            .with_hint("Use a host:port value like 127.0.0.1:8000.")
    })?;
    Ok(serve::ServeConfig {
        bind,
        allow_non_loopback: run.allow_non_loopback,
        hub_url: hub.hub_url,
        hub_token: hub.hub_token,
        max_remote_rows: hub.max_remote_rows,
        static_dir: run.static_dir,
        cors_allowed_origins: run.cors_origin,
        max_body_bytes: run.max_body_bytes,
    })
}

fn page_query(page: u64, page_size: u64, filters: &[String]) -> Result<PageQuery, Error> {
    let filters = FilterSet::from_pairs(filters.iter().map(String::as_str))?;
    Ok(PageQuery::new(page, page_size).with_filters(filters))
}

fn emit_json(value: &impl serde::Serialize) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(err.detail()));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", err.detail())];
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
