use super::EXIT_SUCCESS;
use ireedock_schema::{generate_example, Target};
use std::path::Path;

pub fn run(target: Target, output: Option<&Path>) -> Result<u8, String> {
    let text = generate_example(target)
        .to_json_pretty()
        .map_err(|e| format!("JSON serialization failed: {e}"))?;
    match output {
        Some(path) => {
            std::fs::write(path, text + "\n")
                .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
            eprintln!("example {target} configuration written to {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(EXIT_SUCCESS)
}
