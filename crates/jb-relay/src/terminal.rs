//! Control sequences written to the client terminal

pub const BEL: u8 = 0x07;
pub const CRLF: &[u8] = b"\r\n";
pub const CARRIAGE_RETURN: &[u8] = b"\r";

/// Home the cursor and clear the screen
pub const CLEAR_SCREEN: &[u8] = b"\x1b[H\x1b[2J";
/// Erase from the cursor to the end of the line
pub const CLEAR_TO_EOL: &[u8] = b"\x1b[K";
/// Move left one column and delete the character there
pub const DELETE_BACK: &[u8] = b"\x1b[D\x1b[P";
/// Enable insert/replace mode (IRM) on the client terminal
pub const INSERT_MODE_ON: &[u8] = b"\x1b[2h\x1b[4h";
/// Disable insert/replace mode on the client terminal
pub const INSERT_MODE_OFF: &[u8] = b"\x1b[2l\x1b[4l";
/// Echo for an interrupted local line
pub const INTERRUPT_ECHO: &[u8] = b"^C";

/// Drop every leading `byte` from `data`
pub fn trim_leading(data: &[u8], byte: u8) -> &[u8] {
    let start = data.iter().position(|b| *b != byte).unwrap_or(data.len());
    &data[start..]
}

/// Visible text of a terminal reply
///
/// Drops CSI sequences (`ESC [ ... final`), other two-byte escapes and
/// control characters, keeping what the user would see typed on the line.
pub fn visible_text(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(data);
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            if chars.peek() == Some(&'[') {
                chars.next();
                // parameters and intermediates up to the final byte
                for c in chars.by_ref() {
                    if ('@'..='~').contains(&c) {
                        break;
                    }
                }
            } else {
                chars.next();
            }
        } else if !ch.is_control() {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_text() {
        assert_eq!(visible_text(b"\x08\x08ls -la\x1b[K"), "ls -la");
        assert_eq!(visible_text(b"\x07name "), "name ");
        assert_eq!(visible_text(b"\x1b[1;32mok\x1b[0m\r\n"), "ok");
        assert_eq!(visible_text("文件".as_bytes()), "文件");
    }

    #[test]
    fn test_trim_leading() {
        assert_eq!(trim_leading(b"\x08\x08ls", 0x08), b"ls");
        assert_eq!(trim_leading(b"\x08\x08", 0x08), b"");
        assert_eq!(trim_leading(b"ls", 0x08), b"ls");
    }
}
