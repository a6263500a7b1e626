use super::{colorize_state, json_pretty, require_prereqs, EXIT_SUCCESS};
use ireedock_core::Engine;
use ireedock_schema::Target;
use ireedock_store::format_size;

pub fn run(engine: &Engine, target: Option<Target>, json: bool) -> Result<u8, String> {
    require_prereqs(engine.client().backend_name())?;
    let targets = target.map_or_else(|| Target::ALL.to_vec(), |t| vec![t]);
    let report = engine.status(&targets).map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&report)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("✓ {} backend is available\n", report.backend);
    println!("{:<8} {:<36} {:<10} {:<10} ID", "TARGET", "IMAGE", "STATUS", "SIZE");
    for t in &report.images {
        let state = if t.image.available { "available" } else { "missing" };
        println!(
            "{:<8} {:<36} {:<10} {:<10} {}",
            t.target,
            t.image.image,
            colorize_state(state),
            t.image.size.map(format_size).unwrap_or_default(),
            t.image.id.as_deref().unwrap_or("")
        );
    }

    let sys = &report.system;
    println!("\nsystem information:");
    println!("  server version: {}", sys.server_version);
    if let Some(mem) = sys.total_memory {
        println!("  total memory:   {}", format_size(mem));
    }
    if let Some(cpus) = sys.cpus {
        println!("  cpus:           {cpus}");
    }
    println!("  os:             {}", sys.operating_system);
    println!("  architecture:   {}", sys.architecture);
    let staging = &report.staging;
    if staging.exists {
        println!(
            "  staging root:   {} (mode {}{})",
            report.staging_root.display(),
            staging.permissions.as_deref().unwrap_or("?"),
            staging
                .modified
                .map(|m| format!(", modified {}", m.format("%Y-%m-%d %H:%M:%S UTC")))
                .unwrap_or_default()
        );
    } else {
        println!(
            "  staging root:   {} (not created yet)",
            report.staging_root.display()
        );
    }
    Ok(EXIT_SUCCESS)
}
