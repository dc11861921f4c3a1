use anyhow::Result;

use crate::config::Config;
use crate::sandbox::detect;

pub async fn run(config: &Config) -> Result<()> {
    let detection = detect();

    println!("Isolation:");
    for line in detection.status_lines() {
        println!("{}", line);
    }
    println!();

    let backend = config.sandbox.backend.resolve(&detection);
    println!("Configuration:");
    println!(
        "  Backend:     {} (config: {})",
        backend, config.sandbox.backend
    );
    println!("  Workspace:   {}", config.workspace_path().display());
    println!(
        "  Network:     {}",
        if config.sandbox.allow_network {
            "allow"
        } else {
            "deny"
        }
    );
    println!("  Timeout:     {}ms", config.sandbox.timeout_ms);
    println!("  Max output:  {} bytes", config.sandbox.max_output_bytes);

    if !config.sandbox.allow_paths.read.is_empty() {
        println!("  Extra read:  {:?}", config.sandbox.allow_paths.read);
    }
    if !config.sandbox.allow_paths.write.is_empty() {
        println!("  Extra write: {:?}", config.sandbox.allow_paths.write);
    }

    if !config.mounts.is_empty() {
        println!();
        println!("Mounts:");
        for mount in &config.mounts {
            println!("  {:<24} {}", mount.path, mount.config.type_name());
        }
    }

    Ok(())
}
