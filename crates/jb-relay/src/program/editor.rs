//! vi-family editor

use tracing::{debug, info};

use super::{ProgramSignal, Step};
use crate::keys::KeyEvent;
use crate::line_edit::LineEditContext;

/// Replies to a weak quit that mean the editor is still open
const STILL_OPEN_WARNINGS: &[&str] = &["No write since last change", "已修改但尚未保存", "read only"];

const STRONG_QUITS: &[&str] = &["q!", "wq!", "qa!", "wqa!", "x!", "xa!"];
const WEAK_QUITS: &[&str] = &["q", "wq", "qa", "wqa", "x", "xa"];

/// Normal-phase keys that leave for the insert phase
const INSERT_KEYS: &[char] = &['i', 'a', 'o', 'I', 'A', 'O', 'c', 's', 'C', 'S', 'R'];
/// Normal-phase keys whose next character is an argument, not a command
const ARGUMENT_KEYS: &[char] = &['r', 'f', 'F', 't', 'T', 'm', '\'', '`', '"', '@'];

/// Sub-phase of the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditorPhase {
    #[default]
    Normal,
    Insert,
    /// Composing a `:` command line
    Ex,
}

#[derive(Debug, Clone, Default)]
pub struct EditorMachine {
    phase: EditorPhase,
    ex_line: LineEditContext,
    pending_z: bool,
    pending_argument: bool,
}

impl EditorMachine {
    pub fn phase(&self) -> EditorPhase {
        self.phase
    }

    pub(super) fn feed(&mut self, key: &KeyEvent) -> Step {
        match (self.phase, key) {
            (EditorPhase::Ex, KeyEvent::Enter) => return self.submit_ex(),
            (EditorPhase::Ex, KeyEvent::Delete) => {
                if !self.ex_line.delete_before_cursor() {
                    debug!("Empty ex line deleted, back to normal");
                    self.to_normal();
                }
            }
            (EditorPhase::Ex, KeyEvent::Left) => {
                self.ex_line.move_cursor(-1);
            }
            (EditorPhase::Ex, KeyEvent::Right) => {
                self.ex_line.move_cursor(1);
            }
            (EditorPhase::Ex, KeyEvent::Insert) => {
                self.ex_line.toggle_insert_mode();
            }
            (_, KeyEvent::Escape) | (EditorPhase::Ex, KeyEvent::CtrlC) => self.to_normal(),
            (_, KeyEvent::Plain { text, .. }) => {
                if self.feed_text(text) {
                    return Step::Forward(ProgramSignal::Uncertain);
                }
            }
            _ => self.pending_z = false,
        }
        Step::Forward(ProgramSignal::Stay)
    }

    /// Judge the reply to a weak quit
    pub(super) fn confirm(&mut self, reply: &[u8]) -> ProgramSignal {
        let reply = String::from_utf8_lossy(reply);
        if STILL_OPEN_WARNINGS.iter().any(|w| reply.contains(w)) {
            info!("Editor refused to quit, staying in program mode");
            self.to_normal();
            ProgramSignal::Stay
        } else if reply.is_empty() {
            ProgramSignal::Uncertain
        } else {
            ProgramSignal::Exit
        }
    }

    /// Returns true when the text contained `ZZ` or `ZQ`
    fn feed_text(&mut self, text: &str) -> bool {
        let mut maybe_quit = false;
        for ch in text.chars() {
            match self.phase {
                EditorPhase::Normal => maybe_quit |= self.normal_char(ch),
                EditorPhase::Insert => {
                    if ch == '\u{1b}' {
                        self.to_normal();
                    }
                }
                EditorPhase::Ex => {
                    if ch == '\u{1b}' {
                        self.to_normal();
                    } else {
                        self.ex_line.insert_or_overwrite(ch);
                    }
                }
            }
        }
        maybe_quit
    }

    fn normal_char(&mut self, ch: char) -> bool {
        if self.pending_argument {
            self.pending_argument = false;
            return false;
        }
        if self.pending_z && (ch == 'Z' || ch == 'Q') {
            self.pending_z = false;
            return true;
        }
        self.pending_z = ch == 'Z';
        match ch {
            ':' => {
                self.phase = EditorPhase::Ex;
                self.ex_line.clear();
            }
            _ if INSERT_KEYS.contains(&ch) => {
                debug!("Editor entered insert phase");
                self.phase = EditorPhase::Insert;
            }
            _ if ARGUMENT_KEYS.contains(&ch) => self.pending_argument = true,
            _ => {}
        }
        false
    }

    fn submit_ex(&mut self) -> Step {
        let line = self.ex_line.submit();
        let command = line.trim().trim_start_matches(':');
        self.phase = EditorPhase::Normal;

        if STRONG_QUITS.contains(&command) {
            info!("Editor strong quit ':{}'", command);
            Step::Forward(ProgramSignal::Exit)
        } else if WEAK_QUITS.contains(&command) {
            debug!("Editor weak quit ':{}', confirming", command);
            Step::Confirm
        } else {
            Step::Forward(ProgramSignal::Stay)
        }
    }

    fn to_normal(&mut self) {
        self.phase = EditorPhase::Normal;
        self.ex_line.clear();
        self.pending_z = false;
        self.pending_argument = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::classify;

    fn feed_all(machine: &mut EditorMachine, keys: &[&[u8]]) -> Vec<Step> {
        keys.iter().map(|raw| machine.feed(&classify(raw))).collect()
    }

    #[test]
    fn test_strong_quit_exits_without_confirmation() {
        let mut m = EditorMachine::default();
        let steps = feed_all(&mut m, &[b"\x1b", b":", b"w", b"q", b"!", b"\r"]);
        assert_eq!(steps.last(), Some(&Step::Forward(ProgramSignal::Exit)));
        assert_eq!(m.phase(), EditorPhase::Normal);
    }

    #[test]
    fn test_weak_quit_asks_for_confirmation() {
        let mut m = EditorMachine::default();
        let steps = feed_all(&mut m, &[b":wq", b"\r"]);
        assert_eq!(steps[1], Step::Confirm);

        assert_eq!(
            m.confirm(b"E37: No write since last change (add ! to override)"),
            ProgramSignal::Stay
        );
        assert_eq!(m.phase(), EditorPhase::Normal);
        assert_eq!(m.confirm(b""), ProgramSignal::Uncertain);
        assert_eq!(m.confirm(b"\r\n[root@centos7 ~]# "), ProgramSignal::Exit);
    }

    #[test]
    fn test_read_only_warning_stays() {
        let mut m = EditorMachine::default();
        feed_all(&mut m, &[b":", b"w", b"q", b"\r"]);
        assert_eq!(
            m.confirm("E45: 'readonly' option is set (add ! to override) read only".as_bytes()),
            ProgramSignal::Stay
        );
        assert_eq!(m.confirm("E37: 已修改但尚未保存".as_bytes()), ProgramSignal::Stay);
    }

    #[test]
    fn test_colon_in_insert_phase_is_text() {
        let mut m = EditorMachine::default();
        let steps = feed_all(&mut m, &[b"i", b":q!", b"\r"]);
        assert!(steps.iter().all(|s| *s == Step::Forward(ProgramSignal::Stay)));
        assert_eq!(m.phase(), EditorPhase::Insert);

        feed_all(&mut m, &[b"\x1b"]);
        assert_eq!(m.phase(), EditorPhase::Normal);
    }

    #[test]
    fn test_deleting_empty_ex_line_returns_to_normal() {
        let mut m = EditorMachine::default();
        feed_all(&mut m, &[b":", b"q", b"\x7f"]);
        assert_eq!(m.phase(), EditorPhase::Ex);
        feed_all(&mut m, &[b"\x7f"]);
        assert_eq!(m.phase(), EditorPhase::Normal);
    }

    #[test]
    fn test_other_ex_commands_stay() {
        let mut m = EditorMachine::default();
        let steps = feed_all(&mut m, &[b":", b"w", b"\r"]);
        assert_eq!(steps[2], Step::Forward(ProgramSignal::Stay));
        assert_eq!(m.phase(), EditorPhase::Normal);
    }

    #[test]
    fn test_zz_is_uncertain() {
        let mut m = EditorMachine::default();
        let steps = feed_all(&mut m, &[b"Z", b"Z"]);
        assert_eq!(steps[1], Step::Forward(ProgramSignal::Uncertain));

        let steps = feed_all(&mut m, &[b"ZQ"]);
        assert_eq!(steps[0], Step::Forward(ProgramSignal::Uncertain));

        let steps = feed_all(&mut m, &[b"Z", b"x", b"Z"]);
        assert!(steps.iter().all(|s| *s == Step::Forward(ProgramSignal::Stay)));
    }

    #[test]
    fn test_change_keys_enter_insert_phase() {
        for key in [&b"c"[..], b"s", b"C", b"S", b"R"] {
            let mut m = EditorMachine::default();
            let steps = feed_all(&mut m, &[key, b"w", b":q!", b"\r"]);
            assert!(
                steps.iter().all(|s| *s == Step::Forward(ProgramSignal::Stay)),
                "{:?}",
                key
            );
            assert_eq!(m.phase(), EditorPhase::Insert);
        }
    }

    #[test]
    fn test_argument_is_not_a_command() {
        let mut m = EditorMachine::default();
        feed_all(&mut m, &[b"r", b":"]);
        assert_eq!(m.phase(), EditorPhase::Normal);
        feed_all(&mut m, &[b"f", b"i"]);
        assert_eq!(m.phase(), EditorPhase::Normal);

        let steps = feed_all(&mut m, &[b":", b"q", b"!", b"\r"]);
        assert_eq!(steps[3], Step::Forward(ProgramSignal::Exit));
    }
}
