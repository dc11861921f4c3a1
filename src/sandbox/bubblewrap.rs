//! Linux bubblewrap argument construction.
//!
//! bubblewrap has no profile language; the policy is expressed entirely as
//! command-line flags: the whole tree bind-mounted read-only, the workspace
//! and any policy-writable paths bound writable over it, fresh /dev and
//! /proc, and every namespace unshared (the network namespace is shared back
//! only when the policy allows network).

use std::path::Path;

use super::policy::IsolationPolicy;

pub const BWRAP: &str = "bwrap";

/// Build the full bwrap argument vector for a command.
///
/// Deterministic: identical inputs always produce identical argument lists.
pub fn build_args(
    command: &str,
    args: &[String],
    policy: &IsolationPolicy,
    workspace_root: &Path,
) -> Vec<String> {
    let mut out = policy_flags(policy, workspace_root);
    out.push(command.to_string());
    out.extend(args.iter().cloned());
    out
}

/// The policy-derived flags alone, without a command.
///
/// This is what the executor materializes as the on-disk profile artifact.
pub fn policy_flags(policy: &IsolationPolicy, workspace_root: &Path) -> Vec<String> {
    let workspace = workspace_root.to_string_lossy().into_owned();

    let mut out = vec![
        "--die-with-parent".to_string(),
        "--new-session".to_string(),
        "--unshare-all".to_string(),
    ];
    if policy.allow_network {
        out.push("--share-net".to_string());
    }

    out.push("--ro-bind".to_string());
    out.push("/".to_string());
    out.push("/".to_string());

    out.push("--dev".to_string());
    out.push("/dev".to_string());
    out.push("--proc".to_string());
    out.push("/proc".to_string());

    out.push("--bind".to_string());
    out.push(workspace.clone());
    out.push(workspace.clone());

    for path in &policy.read_only_paths {
        let p = path.to_string_lossy().into_owned();
        out.push("--ro-bind".to_string());
        out.push(p.clone());
        out.push(p);
    }

    for path in &policy.read_write_paths {
        let p = path.to_string_lossy().into_owned();
        out.push("--bind".to_string());
        out.push(p.clone());
        out.push(p);
    }

    out.push("--chdir".to_string());
    out.push(workspace);

    out
}

/// Wrap `(command, args)` into a `bwrap` invocation.
pub fn wrap(
    command: &str,
    args: &[String],
    policy: &IsolationPolicy,
    workspace_root: &Path,
) -> (String, Vec<String>) {
    (BWRAP.to_string(), build_args(command, args, policy, workspace_root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_policy() -> IsolationPolicy {
        IsolationPolicy {
            allow_network: false,
            read_only_paths: vec![PathBuf::from("/opt/datasets")],
            read_write_paths: vec![PathBuf::from("/tmp/scratch")],
            profile_override: None,
        }
    }

    #[test]
    fn root_is_read_only_and_workspace_writable() {
        let args = build_args("echo", &["hi".to_string()], &test_policy(), Path::new("/work"));

        let ro_root = args
            .windows(3)
            .any(|w| w == ["--ro-bind", "/", "/"]);
        assert!(ro_root, "whole tree must be bound read-only: {args:?}");

        let ws_bind = args
            .windows(3)
            .any(|w| w == ["--bind", "/work", "/work"]);
        assert!(ws_bind, "workspace must be bound writable: {args:?}");
    }

    #[test]
    fn network_namespace_unshared_unless_allowed() {
        let denied = build_args("true", &[], &test_policy(), Path::new("/w"));
        assert!(denied.contains(&"--unshare-all".to_string()));
        assert!(!denied.contains(&"--share-net".to_string()));

        let mut policy = test_policy();
        policy.allow_network = true;
        let allowed = build_args("true", &[], &policy, Path::new("/w"));
        assert!(allowed.contains(&"--share-net".to_string()));
    }

    #[test]
    fn policy_paths_are_bound() {
        let args = build_args("true", &[], &test_policy(), Path::new("/w"));
        assert!(args
            .windows(3)
            .any(|w| w == ["--ro-bind", "/opt/datasets", "/opt/datasets"]));
        assert!(args
            .windows(3)
            .any(|w| w == ["--bind", "/tmp/scratch", "/tmp/scratch"]));
    }

    #[test]
    fn command_and_args_come_last() {
        let args = build_args(
            "python3",
            &["-c".to_string(), "print(1)".to_string()],
            &test_policy(),
            Path::new("/w"),
        );
        assert_eq!(&args[args.len() - 3..], ["python3", "-c", "print(1)"]);
    }

    #[test]
    fn chdir_targets_workspace() {
        let args = build_args("true", &[], &test_policy(), Path::new("/work"));
        let idx = args.iter().position(|a| a == "--chdir").unwrap();
        assert_eq!(args[idx + 1], "/work");
    }

    #[test]
    fn args_are_deterministic() {
        let a = build_args("true", &[], &test_policy(), Path::new("/w"));
        let b = build_args("true", &[], &test_policy(), Path::new("/w"));
        assert_eq!(a, b);
    }
}
