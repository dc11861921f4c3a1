//! macOS Seatbelt profile generation.
//!
//! Seatbelt consumes a declarative SBPL profile; the executor materializes it
//! as a file inside the working directory and the wrapped command becomes
//! `sandbox-exec -f <profile> <command> <args...>`.
//!
//! Profile strategy: default-deny, then re-allow the process/IPC machinery
//! that any macOS binary needs, broad file reads (dyld cache, system
//! frameworks and friends are impractical to enumerate), writes restricted to
//! the workspace root plus the policy's writable paths, explicit read allows
//! for the policy's read-only paths, and network per the policy. SBPL
//! evaluates rules in order — last match wins for deny/allow conflicts.

use std::path::Path;

use super::policy::IsolationPolicy;

pub const SANDBOX_EXEC: &str = "/usr/bin/sandbox-exec";

/// Generate the SBPL profile for a policy.
///
/// Deterministic: identical inputs always produce identical text.
pub fn generate_profile(policy: &IsolationPolicy, workspace_root: &Path) -> String {
    let mut rules = vec![
        "(version 1)".to_string(),
        "(deny default)".to_string(),
        // Process operations, signals, Mach IPC, sysctl, ptys — the baseline
        // any command needs to even start under macOS.
        "(allow process*)".to_string(),
        "(allow signal)".to_string(),
        "(allow mach*)".to_string(),
        "(allow ipc*)".to_string(),
        "(allow sysctl*)".to_string(),
        "(allow pseudo-tty)".to_string(),
        // Broad reads: system libraries, the dyld cache, /etc.
        "(allow file-read*)".to_string(),
        // /dev devices: /dev/null, /dev/urandom, ttys.
        "(allow file-write* (subpath \"/dev\"))".to_string(),
    ];

    let workspace = escape_path(&workspace_root.to_string_lossy());
    rules.push(format!(
        "(allow file-read* file-write* (subpath \"{workspace}\"))"
    ));

    for path in &policy.read_write_paths {
        let escaped = escape_path(&path.to_string_lossy());
        rules.push(format!(
            "(allow file-read* file-write* (subpath \"{escaped}\"))"
        ));
    }

    for path in &policy.read_only_paths {
        let escaped = escape_path(&path.to_string_lossy());
        rules.push(format!("(allow file-read* (subpath \"{escaped}\"))"));
    }

    if policy.allow_network {
        rules.push("(allow network*)".to_string());
    } else {
        rules.push("(deny network*)".to_string());
    }

    rules.join("\n")
}

/// Wrap `(command, args)` into a `sandbox-exec` invocation referencing the
/// materialized profile file.
pub fn wrap(command: &str, args: &[String], profile_path: &Path) -> (String, Vec<String>) {
    let mut wrapped = vec![
        "-f".to_string(),
        profile_path.to_string_lossy().into_owned(),
        command.to_string(),
    ];
    wrapped.extend(args.iter().cloned());
    (SANDBOX_EXEC.to_string(), wrapped)
}

/// Escape a path for embedding in SBPL string literals.
fn escape_path(path: &str) -> String {
    path.replace('\\', "\\\\").replace('"', "\\\"")
}
