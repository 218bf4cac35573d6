//! Foreground-process probe
//!
//! After a command is submitted the relay asks the target whether a
//! process started by that command is still attached to the session's
//! pseudo-terminal. A positive answer means a full-screen program owns
//! the terminal.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::target::RemoteExec;

/// Column of `ps -ef` output that holds the TTY
const PS_TTY_COLUMN: usize = 5;

/// Strategy for detecting a foreground program on the session tty
#[async_trait]
pub trait ForegroundProbe: Send + Sync {
    /// Whether a process for `command` is attached to `tty`
    ///
    /// Failures and ambiguous answers are reported as `false`.
    async fn is_attached(&self, exec: &dyn RemoteExec, command: &str, tty: &str) -> bool;
}

/// Probe built on `ps -ef | grep` over the target's exec facility
#[derive(Debug, Clone, Copy, Default)]
pub struct PsProbe;

impl PsProbe {
    /// Shell command run on the target
    pub fn probe_command(command: &str, tty: &str) -> String {
        format!(
            "ps -ef | grep -F -e {} | grep -F -e {} | grep -v grep",
            shell_quote(&normalize_whitespace(command)),
            shell_quote(tty)
        )
    }

    /// Whether any `ps -ef` line in `stdout` is on `tty`
    pub fn matches_tty(stdout: &str, tty: &str) -> bool {
        stdout.lines().any(|line| {
            line.split_whitespace()
                .nth(PS_TTY_COLUMN)
                .map(|column| column == tty)
                .unwrap_or(false)
        })
    }
}

#[async_trait]
impl ForegroundProbe for PsProbe {
    async fn is_attached(&self, exec: &dyn RemoteExec, command: &str, tty: &str) -> bool {
        let probe = Self::probe_command(command, tty);
        let output = match exec.exec(&probe).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Foreground probe failed: {}", e);
                return false;
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        match output.exit_status {
            // grep exits 1 when nothing matched
            Some(1) if stdout.trim().is_empty() => {
                debug!("No foreground process for '{}' on {}", command, tty);
                false
            }
            Some(0) | None | Some(1) => {
                let attached = Self::matches_tty(&stdout, tty);
                debug!(attached, "Foreground probe for '{}' on {}", command, tty);
                attached
            }
            Some(status) => {
                warn!(
                    "Foreground probe exited with {}: {}",
                    status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                false
            }
        }
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}
