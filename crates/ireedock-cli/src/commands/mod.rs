pub mod compile;
pub mod generate_config;
pub mod status;
pub mod validate_config;

use indicatif::{ProgressBar, ProgressStyle};
use ireedock_runtime::format_missing;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_STAGING_ERROR: u8 = 3;

/// Set to `1` to skip the container prerequisite check.
pub const SKIP_PREREQS_ENV: &str = "IREEDOCK_SKIP_PREREQS";

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish(pb: &ProgressBar, msg: String) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(msg);
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✗ {msg}"));
}

pub fn colorize_state(state: &str) -> String {
    use console::Style;
    match state {
        "available" | "valid" | "succeeded" => Style::new().green().apply_to(state).to_string(),
        "missing" => Style::new().yellow().apply_to(state).to_string(),
        "invalid" | "failed" => Style::new().red().bold().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}

/// Fail early when the configured container engine cannot be used.
pub fn require_prereqs(backend: &str) -> Result<(), String> {
    if std::env::var(SKIP_PREREQS_ENV).as_deref() == Ok("1") {
        return Ok(());
    }
    let missing = ireedock_runtime::check_container_prereqs(backend);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format_missing(&missing))
    }
}

/// Exit code for an error message, by the layer prefix it carries.
pub fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("config error:") {
        EXIT_CONFIG_ERROR
    } else if msg.starts_with("staging error:") || msg.starts_with("staging lock:") {
        EXIT_STAGING_ERROR
    } else {
        EXIT_FAILURE
    }
}
