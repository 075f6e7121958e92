//! Purpose: Hold top-level CLI command dispatch for `dsview`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every successful command emits exactly one JSON document on stdout.
//! Invariants: Dataset commands share the hub settings passed as global flags.

use super::*;

use dsview::api::{DatasetClient, HubClient};

pub(super) fn dispatch_command(command: Command, hub: HubArgs) -> Result<(), Error> {
    match command {
        Command::Serve { subcommand, run } => match subcommand {
            Some(ServeSubcommand::Check) => {
                let config = serve_config_from_args(run, hub)?;
                let origins = serve::preflight_config(&config)?;
                emit_json(&serve_check_json(&config, origins.len()));
                Ok(())
            }
            None => {
                let config = serve_config_from_args(run, hub)?;
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                    .map_err(|err| {
                        Error::new(ErrorKind::Internal)
                            .with_message("failed to start runtime")
                            .with_source(err)
                    })?;
                runtime.block_on(serve::serve(config))
            }
        },
        Command::Page {
            dataset,
            page,
            page_size,
            filters,
        } => {
            let query = page_query(page, page_size, &filters)?;
            let result = dataset_client(&hub)?.page(&dataset.reference(), &query)?;
            emit_json(&result);
            Ok(())
        }
        Command::Columns { dataset } => {
            let columns = dataset_client(&hub)?.columns(&dataset.reference())?;
            emit_json(&json!({ "columns": columns }));
            Ok(())
        }
        Command::Unique { dataset, column } => {
            let values = dataset_client(&hub)?.unique_values(&dataset.reference(), &column)?;
            emit_json(&json!({ "values": values }));
            Ok(())
        }
    }
}

fn dataset_client(hub: &HubArgs) -> Result<DatasetClient, Error> {
    if hub.max_remote_rows == Some(0) {
        return Err(Error::new(ErrorKind::BadRequest)
            .with_message("--max-remote-rows must be greater than zero")
            .with_hint("Omit the flag to fetch every row."));
    }
    let client = HubClient::new(&hub.hub_url)?
        .with_token(hub.hub_token.clone())
        .with_max_rows(hub.max_remote_rows);
    Ok(DatasetClient::new()?.with_hub(client))
}

fn serve_check_json(config: &serve::ServeConfig, cors_origin_count: usize) -> Value {
    json!({
        "check": {
            "bind": config.bind.to_string(),
            "allow_non_loopback": config.allow_non_loopback,
            "hub_url": config.hub_url,
            "hub_token": config.hub_token.is_some(),
            "max_remote_rows": config.max_remote_rows,
            "static_dir": config.static_dir.as_ref().map(|dir| dir.display().to_string()),
            "cors_allowed_origins": config.cors_allowed_origins,
            "cors_any_origin": cors_origin_count == 0,
            "max_body_bytes": config.max_body_bytes,
        }
    })
}
