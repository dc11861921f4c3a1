//! Sandboxed command execution — kernel-enforced isolation for agent-run
//! commands.
//!
//! Commands are wrapped, not re-implemented: `wrap_command` rewrites
//! `(command, args)` into an isolated invocation for the selected backend
//! (Seatbelt on macOS, bubblewrap on Linux, or none), and the
//! [`executor::SandboxExecutor`] owns the working directory, policy and
//! process plumbing around it.

pub mod bubblewrap;
pub mod detect;
pub mod executor;
pub mod policy;
pub mod seatbelt;

pub use detect::{
    Detection, HostProbe, IsolationBackend, PlatformProbe, backend_available, detect, detect_with,
};
pub use executor::{
    ExecOptions, ExecutionResult, ExecutorConfig, ExecutorInfo, PROFILE_FILE_NAME,
    SandboxExecutor, TIMEOUT_EXIT_CODE,
};
pub use policy::IsolationPolicy;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::lifecycle::{ProviderState, TransitionError};

/// Precondition-class sandbox failures.
///
/// These indicate programmer or configuration error and are always raised,
/// never folded into an [`ExecutionResult`].
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("isolation backend {backend} is unavailable: {reason}")]
    BackendUnavailable {
        backend: IsolationBackend,
        reason: String,
    },

    #[error("executor is not running (state: {0})")]
    NotRunning(ProviderState),

    #[error("cannot mount filesystem into sandbox: {0}")]
    Unmountable(String),

    #[error("cwd {0:?} escapes the working directory")]
    CwdOutsideWorkspace(PathBuf),

    #[error("seatbelt wrapping requires a materialized profile file")]
    ProfileMissing,

    #[error(transparent)]
    Lifecycle(#[from] TransitionError),
}

/// Inputs to a single command wrap.
#[derive(Debug, Clone, Copy)]
pub struct WrapOptions<'a> {
    pub backend: IsolationBackend,
    pub workspace_root: &'a Path,
    pub policy: &'a IsolationPolicy,
    /// Where the Seatbelt profile was materialized; required for that
    /// backend, ignored by the others.
    pub profile_path: Option<&'a Path>,
}

/// Rewrite `(command, args)` into an isolated invocation.
///
/// Backend `none` is the identity. Exactly one policy-to-command mapping
/// exists per backend; see [`seatbelt`] and [`bubblewrap`].
pub fn wrap_command(
    command: &str,
    args: &[String],
    opts: &WrapOptions<'_>,
) -> Result<(String, Vec<String>), SandboxError> {
    match opts.backend {
        IsolationBackend::None => Ok((command.to_string(), args.to_vec())),
        IsolationBackend::Seatbelt => {
            let profile = opts.profile_path.ok_or(SandboxError::ProfileMissing)?;
            Ok(seatbelt::wrap(command, args, profile))
        }
        IsolationBackend::Bubblewrap => Ok(bubblewrap::wrap(
            command,
            args,
            opts.policy,
            opts.workspace_root,
        )),
    }
}
