//! Isolation backend detection.
//!
//! Which backend applies is purely a function of the platform: macOS maps to
//! Seatbelt (`sandbox-exec`, shipped with the OS), Linux maps to bubblewrap
//! (present only when the `bwrap` helper is discoverable on `PATH`), and
//! everything else maps to no isolation. All probing goes through the
//! [`PlatformProbe`] trait so tests can simulate any platform/backend
//! combination without touching the real OS.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The OS-level mechanism used to confine a spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationBackend {
    /// No confinement — commands run as ordinary child processes.
    None,
    /// macOS Seatbelt via `sandbox-exec` with a generated SBPL profile file.
    Seatbelt,
    /// Linux bubblewrap (`bwrap`) with bind-mount and namespace flags.
    Bubblewrap,
}

impl std::fmt::Display for IsolationBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IsolationBackend::None => "none",
            IsolationBackend::Seatbelt => "seatbelt",
            IsolationBackend::Bubblewrap => "bubblewrap",
        };
        f.write_str(s)
    }
}

/// Injectable view of the current platform.
#[cfg_attr(test, mockall::automock)]
pub trait PlatformProbe: Send + Sync {
    /// Operating system name as `std::env::consts::OS` reports it.
    fn os(&self) -> &'static str;

    /// Whether an executable with this name is discoverable on `PATH`.
    fn binary_on_path(&self, name: &str) -> bool;
}

/// Probe backed by the real host.
pub struct HostProbe;

impl PlatformProbe for HostProbe {
    fn os(&self) -> &'static str {
        std::env::consts::OS
    }

    fn binary_on_path(&self, name: &str) -> bool {
        // /usr/bin is where distro packages land even when PATH is stripped.
        if PathBuf::from("/usr/bin").join(name).is_file() {
            return true;
        }
        let Some(path) = std::env::var_os("PATH") else {
            return false;
        };
        std::env::split_paths(&path).any(|dir| dir.join(name).is_file())
    }
}

/// Outcome of platform detection.
///
/// `message` is human-readable operator diagnostics and is always populated,
/// even on success.
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub backend: IsolationBackend,
    pub available: bool,
    pub message: String,
}

/// Detect the natural isolation backend of the real host.
pub fn detect() -> Detection {
    detect_with(&HostProbe)
}

/// Detect the natural isolation backend reported by `probe`.
pub fn detect_with(probe: &dyn PlatformProbe) -> Detection {
    match probe.os() {
        "macos" => Detection {
            backend: IsolationBackend::Seatbelt,
            available: true,
            message: "Seatbelt (sandbox-exec) is available on macOS".to_string(),
        },
        "linux" => {
            if probe.binary_on_path("bwrap") {
                Detection {
                    backend: IsolationBackend::Bubblewrap,
                    available: true,
                    message: "bubblewrap (bwrap) found on PATH".to_string(),
                }
            } else {
                Detection {
                    backend: IsolationBackend::Bubblewrap,
                    available: false,
                    message: "bubblewrap (bwrap) not found on PATH".to_string(),
                }
            }
        }
        other => Detection {
            backend: IsolationBackend::None,
            available: false,
            message: format!("no isolation backend for platform {other}"),
        },
    }
}

/// Whether a specific backend can be used on the probed platform.
///
/// `None` is usable everywhere; real backends are usable only on their
/// platform, and bubblewrap additionally requires the helper binary.
pub fn backend_available(backend: IsolationBackend, probe: &dyn PlatformProbe) -> bool {
    availability(backend, probe).is_ok()
}

/// Like [`backend_available`], but explains an unavailable backend.
pub fn availability(backend: IsolationBackend, probe: &dyn PlatformProbe) -> Result<(), String> {
    match backend {
        IsolationBackend::None => Ok(()),
        IsolationBackend::Seatbelt => {
            if probe.os() == "macos" {
                Ok(())
            } else {
                Err(format!(
                    "Seatbelt requires macOS (running on {})",
                    probe.os()
                ))
            }
        }
        IsolationBackend::Bubblewrap => {
            if probe.os() != "linux" {
                Err(format!(
                    "bubblewrap requires Linux (running on {})",
                    probe.os()
                ))
            } else if !probe.binary_on_path("bwrap") {
                Err("bubblewrap (bwrap) not found on PATH".to_string())
            } else {
                Ok(())
            }
        }
    }
}

impl Detection {
    /// Human-readable status lines for the `status` command.
    pub fn status_lines(&self) -> Vec<String> {
        let state = if self.available { "ok" } else { "--" };
        vec![
            format!("  Backend:   {:<22} {}", self.backend.to_string(), state),
            format!("  Detail:    {}", self.message),
        ]
    }
}
