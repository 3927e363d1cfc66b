//! Writes the JSON API's OpenAPI document.
//!
//! Usage:
//!   cargo run --bin generate_openapi > openapi.json
//!   cargo run --bin generate_openapi -- --output openapi.json

use std::{
    env, fs,
    io::{self, Write},
    path::PathBuf,
    process,
};

use plant_monitor_dashboard::api::handlers::ApiDoc;
use utoipa::OpenApi;

fn main() {
    let json = match ApiDoc::openapi().to_pretty_json() {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Failed to serialise OpenAPI document: {e}");
            process::exit(1);
        }
    };

    let output_path: Option<PathBuf> = env::args()
        .collect::<Vec<_>>()
        .windows(2)
        .find(|w| w[0] == "--output")
        .map(|w| PathBuf::from(&w[1]));

    let written = match &output_path {
        Some(path) => fs::write(path, &json),
        None => io::stdout().write_all(json.as_bytes()),
    };
    if let Err(e) = written {
        let target = output_path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".to_owned());
        eprintln!("Error writing to {target}: {e}");
        process::exit(1);
    }
    if let Some(path) = output_path {
        eprintln!("OpenAPI document written to {}", path.display());
    }
}
