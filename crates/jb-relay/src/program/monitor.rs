//! top-family live monitors
//!
//! top stacks two help screens: `h` or `?` opens the interactive help,
//! pressing it again opens the window help. `q` quits only from the main
//! screen and closes the first help level; Escape steps back one level;
//! Enter leaves the window help entirely.

use tracing::{debug, info};

use super::ProgramSignal;
use crate::keys::KeyEvent;

const MAX_HELP_LEVEL: u8 = 2;

#[derive(Debug, Clone, Default)]
pub struct MonitorMachine {
    help_level: u8,
}

impl MonitorMachine {
    pub fn help_level(&self) -> u8 {
        self.help_level
    }

    pub(super) fn feed(&mut self, key: &KeyEvent) -> ProgramSignal {
        match key {
            KeyEvent::CtrlC => {
                info!("Ctrl-C ended monitor");
                return ProgramSignal::Exit;
            }
            KeyEvent::Escape => self.help_level = self.help_level.saturating_sub(1),
            KeyEvent::Enter if self.help_level == MAX_HELP_LEVEL => self.help_level = 0,
            KeyEvent::Plain { text, .. } => match text.as_str() {
                "h" | "?" => self.help_level = (self.help_level + 1).min(MAX_HELP_LEVEL),
                "q" if self.help_level == 0 => {
                    info!("Monitor quit");
                    return ProgramSignal::Exit;
                }
                "q" if self.help_level == 1 => self.help_level = 0,
                _ => {}
            },
            _ => {}
        }
        debug!(help_level = self.help_level, "Monitor key");
        ProgramSignal::Stay
    }
}
