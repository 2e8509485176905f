//! CLI probe for `watermap_core`.
//!
//! # Responsibility
//! - Verify core linkage (`watermap_cli` with no arguments).
//! - Validate a GeoJSON geometry file against an object type.
//! - List the review queue of the configured database.
//!
//! Configuration is read from `WATERMAP_*` environment variables.

use log::info;
use std::process::ExitCode;
use watermap_core::{
    init_logging, validate_geometry, CoreConfig, LifecycleService, ObjectTypeKind,
};

const USAGE: &str = "usage: watermap_cli [validate <object_type> <geometry.json> | pending]";

fn main() -> ExitCode {
    let config = match CoreConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config error: {err}");
            return ExitCode::from(2);
        }
    };
    if let Some(log_dir) = &config.log_dir {
        if let Err(err) = init_logging(&config.log_level, log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let outcome = match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] => {
            println!("watermap_core ping={}", watermap_core::ping());
            println!("watermap_core version={}", watermap_core::core_version());
            Ok(())
        }
        ["validate", object_type, path] => validate_file(object_type, path),
        ["pending"] => print_pending(&config),
        _ => Err(USAGE.to_string()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn validate_file(object_type: &str, path: &str) -> Result<(), String> {
    let kind = ObjectTypeKind::parse(object_type).map_err(|err| err.to_string())?;
    let raw = std::fs::read_to_string(path).map_err(|err| format!("cannot read `{path}`: {err}"))?;

    info!("event=cli_validate module=cli status=start object_type={kind}");
    match validate_geometry(&raw, kind) {
        Ok(()) => {
            println!("ok: geometry is valid for {kind}");
            Ok(())
        }
        Err(err) => Err(format!("invalid ({}): {err}", err.code())),
    }
}

fn print_pending(config: &CoreConfig) -> Result<(), String> {
    let conn = config.open_db().map_err(|err| format!("cannot open database: {err}"))?;
    let service = LifecycleService::for_connection(&conn).map_err(|err| err.to_string())?;
    let pending = service.get_pending().map_err(|err| err.to_string())?;

    for record in &pending {
        println!(
            "{}\t{}\tv{}\t{}\t{}",
            record.id,
            record.canonical_id,
            record.version,
            record.attributes.object_type,
            record.attributes.name_kz
        );
    }
    println!("pending={}", pending.len());
    Ok(())
}
