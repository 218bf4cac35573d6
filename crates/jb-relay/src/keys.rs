//! Key classification
//!
//! Maps one raw chunk read from the client channel to a semantic key.
//! Recognition is by exact match only; anything not in the table is
//! [`KeyEvent::Plain`].

pub const ESC: u8 = 0x1b;
pub const CTRL_C: u8 = 0x03;
pub const BACKSPACE: u8 = 0x08;
pub const TAB: u8 = 0x09;
pub const ENTER: u8 = 0x0d;
pub const DEL: u8 = 0x7f;

pub const UP: &[u8] = b"\x1b[A";
pub const DOWN: &[u8] = b"\x1b[B";
pub const RIGHT: &[u8] = b"\x1b[C";
pub const LEFT: &[u8] = b"\x1b[D";
pub const INSERT: &[u8] = b"\x1b[2~";

const HOME_KEYS: &[&[u8]] = &[b"\x1b[H", b"\x1bOH", b"\x1b[1~", b"\x1b[7~"];
const END_KEYS: &[&[u8]] = &[b"\x1b[F", b"\x1bOF", b"\x1b[4~", b"\x1b[8~"];
const FORWARD_DELETE: &[u8] = b"\x1b[3~";

/// Cursor edits carried by escape sequences outside the key table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineMotion {
    Home,
    End,
    ForwardDelete,
}

/// A classified client key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvent {
    Up,
    Down,
    Left,
    Right,
    Delete,
    Insert,
    Tab,
    Enter,
    Escape,
    CtrlC,
    /// Anything else: printable text, pasted chunks, unknown sequences
    Plain { raw: Vec<u8>, text: String },
}

impl KeyEvent {
    /// Whether this is plain input
    pub fn is_plain(&self) -> bool {
        matches!(self, KeyEvent::Plain { .. })
    }
}

/// Classify a raw input chunk
pub fn classify(raw: &[u8]) -> KeyEvent {
    match raw {
        UP => KeyEvent::Up,
        DOWN => KeyEvent::Down,
        RIGHT => KeyEvent::Right,
        LEFT => KeyEvent::Left,
        INSERT => KeyEvent::Insert,
        [DEL] | [BACKSPACE] => KeyEvent::Delete,
        [TAB] => KeyEvent::Tab,
        [ENTER] => KeyEvent::Enter,
        [ESC] => KeyEvent::Escape,
        [CTRL_C] => KeyEvent::CtrlC,
        _ => KeyEvent::Plain {
            raw: raw.to_vec(),
            text: String::from_utf8_lossy(raw).into_owned(),
        },
    }
}

/// Whether a chunk is an escape sequence rather than typed text
pub fn is_escape_sequence(raw: &[u8]) -> bool {
    raw.len() > 1 && raw[0] == ESC
}

/// The line edit an unclassified escape sequence performs, if any
pub fn line_motion(raw: &[u8]) -> Option<LineMotion> {
    if HOME_KEYS.contains(&raw) {
        Some(LineMotion::Home)
    } else if END_KEYS.contains(&raw) {
        Some(LineMotion::End)
    } else if raw == FORWARD_DELETE {
        Some(LineMotion::ForwardDelete)
    } else {
        None
    }
}

/// Split a chunk so that every carriage return stands alone
///
/// Pasted input arrives as one chunk; `ls\rpwd\r` becomes
/// `["ls", "\r", "pwd", "\r"]` so each line is submitted on its own.
/// Chunks without a CR, and a bare CR, are returned unchanged.
pub fn split_at_enter(raw: &[u8]) -> Vec<&[u8]> {
    if raw.len() <= 1 || !raw.contains(&ENTER) {
        return vec![raw];
    }
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, b) in raw.iter().enumerate() {
        if *b == ENTER {
            if start < i {
                parts.push(&raw[start..i]);
            }
            parts.push(&raw[i..i + 1]);
            start = i + 1;
        }
    }
    if start < raw.len() {
        parts.push(&raw[start..]);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Vec<(&'static [u8], KeyEvent)> {
        vec![
            (UP, KeyEvent::Up),
            (DOWN, KeyEvent::Down),
            (LEFT, KeyEvent::Left),
            (RIGHT, KeyEvent::Right),
            (INSERT, KeyEvent::Insert),
            (b"\x7f".as_slice(), KeyEvent::Delete),
            (b"\x08".as_slice(), KeyEvent::Delete),
            (b"\t".as_slice(), KeyEvent::Tab),
            (b"\r".as_slice(), KeyEvent::Enter),
            (b"\x1b".as_slice(), KeyEvent::Escape),
            (b"\x03".as_slice(), KeyEvent::CtrlC),
        ]
    }

    #[test]
    fn test_table_entries_classify_exactly() {
        for (raw, expected) in table() {
            assert_eq!(classify(raw), expected, "raw {:?}", raw);
        }
    }

    #[test]
    fn test_mutated_escape_sequences_are_plain() {
        let known: Vec<&[u8]> = table().into_iter().map(|(raw, _)| raw).collect();
        for seq in [UP, DOWN, LEFT, RIGHT] {
            for pos in 0..seq.len() {
                for b in 0..=255u8 {
                    if b == seq[pos] {
                        continue;
                    }
                    let mut mutated = seq.to_vec();
                    mutated[pos] = b;
                    if known.contains(&mutated.as_slice()) {
                        continue;
                    }
                    assert!(classify(&mutated).is_plain(), "{:?} should be plain", mutated);
                }
            }
        }
    }

    #[test]
    fn test_plain_carries_text() {
        match classify("ls -l 中".as_bytes()) {
            KeyEvent::Plain { raw, text } => {
                assert_eq!(text, "ls -l 中");
                assert_eq!(raw, "ls -l 中".as_bytes());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(classify(b"").is_plain());
        assert!(classify(b"\x1b[A\x1b[A").is_plain());
    }

    #[test]
    fn test_split_at_enter() {
        assert_eq!(split_at_enter(b"ls"), vec![&b"ls"[..]]);
        assert_eq!(split_at_enter(b"\r"), vec![&b"\r"[..]]);
        assert_eq!(
            split_at_enter(b"ls\rpwd\r"),
            vec![&b"ls"[..], &b"\r"[..], &b"pwd"[..], &b"\r"[..]]
        );
        assert_eq!(split_at_enter(b"\rx"), vec![&b"\r"[..], &b"x"[..]]);
    }

    #[test]
    fn test_line_motions() {
        assert_eq!(line_motion(b"\x1b[H"), Some(LineMotion::Home));
        assert_eq!(line_motion(b"\x1bOF"), Some(LineMotion::End));
        assert_eq!(line_motion(b"\x1b[3~"), Some(LineMotion::ForwardDelete));
        assert_eq!(line_motion(b"\x1b[15~"), None);

        assert!(is_escape_sequence(b"\x1b[15~"));
        assert!(is_escape_sequence(b"\x1bb"));
        assert!(!is_escape_sequence(b"\x1b"));
        assert!(!is_escape_sequence(b"ls"));
    }
}
