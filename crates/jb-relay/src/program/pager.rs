//! less-family pager

use tracing::info;

use super::ProgramSignal;
use crate::keys::KeyEvent;

/// Exits on `q`, except while a search or command prompt is open
#[derive(Debug, Clone, Default)]
pub struct PagerMachine {
    prompt_open: bool,
}

impl PagerMachine {
    pub(super) fn feed(&mut self, key: &KeyEvent) -> ProgramSignal {
        match key {
            KeyEvent::Enter | KeyEvent::Escape | KeyEvent::CtrlC => {
                self.prompt_open = false;
                ProgramSignal::Stay
            }
            KeyEvent::Plain { .. } if self.prompt_open => ProgramSignal::Stay,
            KeyEvent::Plain { text, .. } => match text.chars().next() {
                Some('q') | Some('Q') => {
                    info!("Pager quit");
                    ProgramSignal::Exit
                }
                Some('/') | Some('?') | Some(':') => {
                    self.prompt_open = true;
                    ProgramSignal::Stay
                }
                _ => ProgramSignal::Stay,
            },
            _ => ProgramSignal::Stay,
        }
    }
}
