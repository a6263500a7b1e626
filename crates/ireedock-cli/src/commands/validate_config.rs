use super::{colorize_state, json_pretty, EXIT_CONFIG_ERROR, EXIT_SUCCESS};
use ireedock_schema::{normalize, validate_document, CompilationConfig, Violation};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct Outcome<'a> {
    valid: bool,
    violations: &'a [Violation],
    #[serde(skip_serializing_if = "Option::is_none")]
    normalized: Option<&'a CompilationConfig>,
}

pub fn run(
    config: &Path,
    normalize_out: bool,
    output: Option<&Path>,
    json: bool,
) -> Result<u8, String> {
    let content = std::fs::read_to_string(config)
        .map_err(|e| format!("config error: failed to read {}: {e}", config.display()))?;
    let doc: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| format!("config error: failed to parse {}: {e}", config.display()))?;

    let report = validate_document(&doc);
    let normalized = if report.is_valid() && normalize_out {
        let typed: CompilationConfig =
            serde_json::from_value(doc).map_err(|e| format!("config error: {e}"))?;
        Some(normalize(&typed))
    } else {
        None
    };

    let written = match (&normalized, output) {
        (Some(n), Some(path)) => {
            let text = n.to_json_pretty().map_err(|e| e.to_string())?;
            std::fs::write(path, text + "\n")
                .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
            Some(path)
        }
        _ => None,
    };

    if json {
        let outcome = Outcome {
            valid: report.is_valid(),
            violations: report.violations(),
            normalized: normalized.as_ref(),
        };
        println!("{}", json_pretty(&outcome)?);
    } else if report.is_valid() {
        println!("✓ configuration is {}", colorize_state("valid"));
        match (normalized, written) {
            (Some(_), Some(path)) => {
                println!("normalized configuration written to {}", path.display());
            }
            (Some(n), None) => {
                println!("{}", n.to_json_pretty().map_err(|e| e.to_string())?);
            }
            _ => {}
        }
    } else {
        println!("✗ configuration is {}:", colorize_state("invalid"));
        for v in report.violations() {
            println!("  • {v} [{}]", v.kind);
        }
    }

    Ok(if report.is_valid() {
        EXIT_SUCCESS
    } else {
        EXIT_CONFIG_ERROR
    })
}
