//! Platform identity captured once at process start. Not part of the core
//! event path; passed in at construction so the core never calls
//! `hostname()`/`getpid()` itself.

use std::fmt;

/// Hostname and pid, captured once, threaded into log lines and audit
/// records that need to identify the running process.
#[derive(Clone, Debug)]
pub struct HostInfo {
    pub hostname: String,
    pub pid: u32,
}

impl HostInfo {
    /// Captures the current process's hostname and pid. Falls back to
    /// `"unknown-host"` if the hostname cannot be determined, rather than
    /// failing construction over a logging nicety.
    pub fn capture() -> Self {
        let hostname = hostname_impl().unwrap_or_else(|| "unknown-host".to_string());
        Self {
            hostname,
            pid: std::process::id(),
        }
    }
}

impl fmt::Display for HostInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.hostname, self.pid)
    }
}

#[cfg(unix)]
fn hostname_impl() -> Option<String> {
    std::env::var("HOSTNAME").ok()
}

#[cfg(not(unix))]
fn hostname_impl() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}
