//! Full-screen program state machines
//!
//! While a full-screen program owns the remote terminal every key is
//! forwarded verbatim. The machine for the program's family watches the
//! keys to decide when the program has ended and line editing resumes.

mod editor;
mod follower;
mod monitor;
mod pager;

pub use editor::{EditorMachine, EditorPhase};
pub use follower::FollowerMachine;
pub use monitor::MonitorMachine;
pub use pager::PagerMachine;

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::client::ClientSink;
use crate::error::RelayError;
use crate::keys::KeyEvent;
use crate::pump::PumpGate;
use crate::target::TargetLink;

/// Families of full-screen programs the relay can follow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramFamily {
    /// vi and friends
    Editor,
    /// less, more, man
    Pager,
    /// tail -f, watch, ping
    Follower,
    /// top and friends
    Monitor,
}

/// The command's leading program has no known family
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no full-screen program family for '{0}'")]
pub struct UnknownProgram(pub String);

impl ProgramFamily {
    /// Pick the family from a submitted command line
    ///
    /// A leading `sudo` (with its options), environment assignments and
    /// any directory prefix on the program are skipped.
    pub fn detect(command: &str) -> Result<Self, UnknownProgram> {
        let mut tokens = command.split_whitespace().peekable();

        if tokens.peek() == Some(&"sudo") {
            tokens.next();
            while let Some(token) = tokens.peek() {
                if !token.starts_with('-') {
                    break;
                }
                let takes_value = matches!(*token, "-u" | "-g" | "-C" | "-h" | "-p");
                tokens.next();
                if takes_value {
                    tokens.next();
                }
            }
        }
        while tokens.peek().map(|t| t.contains('=')).unwrap_or(false) {
            tokens.next();
        }

        let program = tokens
            .next()
            .map(|token| token.rsplit('/').next().unwrap_or(token))
            .ok_or_else(|| UnknownProgram(command.to_string()))?;

        match program {
            "vi" | "vim" | "nvim" | "view" | "vimdiff" => Ok(ProgramFamily::Editor),
            "less" | "more" | "most" | "man" => Ok(ProgramFamily::Pager),
            "tailf" | "watch" | "ping" => Ok(ProgramFamily::Follower),
            "tail" if tokens.any(is_follow_option) => Ok(ProgramFamily::Follower),
            "top" | "htop" | "atop" | "iotop" => Ok(ProgramFamily::Monitor),
            _ => Err(UnknownProgram(program.to_string())),
        }
    }
}

impl fmt::Display for ProgramFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramFamily::Editor => write!(f, "editor"),
            ProgramFamily::Pager => write!(f, "pager"),
            ProgramFamily::Follower => write!(f, "follower"),
            ProgramFamily::Monitor => write!(f, "monitor"),
        }
    }
}

fn is_follow_option(arg: &str) -> bool {
    if arg == "--follow" || arg.starts_with("--follow=") {
        return true;
    }
    match arg.strip_prefix('-') {
        Some(flags) if !flags.starts_with('-') && !flags.is_empty() => {
            flags.chars().all(|c| c.is_ascii_alphanumeric()) && flags.contains(['f', 'F'])
        }
        _ => false,
    }
}

/// What a key means for the running program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramSignal {
    /// Still running
    Stay,
    /// The program has ended
    Exit,
    /// The program may have ended; ask the target
    Uncertain,
}

/// What to do with one key while a program runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Forward the key and report the signal
    Forward(ProgramSignal),
    /// Forward the key, read the target's reply and let the machine judge it
    Confirm,
}

/// Target-side handles a machine needs for a confirmation read
pub struct ProgramIo<'a> {
    pub link: &'a TargetLink,
    pub client: &'a dyn ClientSink,
    pub gate: &'a PumpGate,
    pub read_timeout: Duration,
}

/// The machine following the current full-screen program
#[derive(Debug, Clone)]
pub enum FullScreenProgram {
    Editor(EditorMachine),
    Pager(PagerMachine),
    Follower(FollowerMachine),
    Monitor(MonitorMachine),
}

impl FullScreenProgram {
    pub fn new(family: ProgramFamily) -> Self {
        match family {
            ProgramFamily::Editor => FullScreenProgram::Editor(EditorMachine::default()),
            ProgramFamily::Pager => FullScreenProgram::Pager(PagerMachine::default()),
            ProgramFamily::Follower => FullScreenProgram::Follower(FollowerMachine),
            ProgramFamily::Monitor => FullScreenProgram::Monitor(MonitorMachine::default()),
        }
    }

    pub fn family(&self) -> ProgramFamily {
        match self {
            FullScreenProgram::Editor(_) => ProgramFamily::Editor,
            FullScreenProgram::Pager(_) => ProgramFamily::Pager,
            FullScreenProgram::Follower(_) => ProgramFamily::Follower,
            FullScreenProgram::Monitor(_) => ProgramFamily::Monitor,
        }
    }

    /// Decide what to do with `key`, without any I/O
    pub fn feed(&mut self, key: &KeyEvent) -> Step {
        match self {
            FullScreenProgram::Editor(m) => m.feed(key),
            FullScreenProgram::Pager(m) => Step::Forward(m.feed(key)),
            FullScreenProgram::Follower(m) => Step::Forward(m.feed(key)),
            FullScreenProgram::Monitor(m) => Step::Forward(m.feed(key)),
        }
    }

    /// Judge the target's reply to a key that asked for confirmation
    pub fn confirm(&mut self, reply: &[u8]) -> ProgramSignal {
        match self {
            FullScreenProgram::Editor(m) => m.confirm(reply),
            _ => ProgramSignal::Exit,
        }
    }

    /// Forward `raw` to the target as `step` says and report what it did
    /// to the program
    pub async fn apply(
        &mut self,
        step: Step,
        raw: &[u8],
        io: &ProgramIo<'_>,
    ) -> Result<ProgramSignal, RelayError> {
        match step {
            Step::Forward(signal) => {
                io.link.send(raw).await?;
                Ok(signal)
            }
            Step::Confirm => {
                let _pause = io.gate.pause();
                io.link.send(raw).await?;
                let reply = io.link.output().read_with_timeout(io.read_timeout).await;
                io.client.write(&reply).await?;
                let signal = self.confirm(&reply);
                debug!(family = %self.family(), ?signal, "Confirmation read judged");
                Ok(signal)
            }
        }
    }
}
