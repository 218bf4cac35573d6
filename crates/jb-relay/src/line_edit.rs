//! Shell line-edit context
//!
//! One instance models the command line a user is composing, either at
//! the bastion's own menu prompt or mirrored from the remote shell. The
//! buffer is cursor-addressable; history follows bash conventions with a
//! stash that preserves the in-progress line while browsing.

/// Direction of a history step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryDirection {
    /// Towards the oldest entry (Up)
    Older,
    /// Towards the in-progress line (Down)
    Newer,
}

/// Editable command line with history
#[derive(Debug, Clone)]
pub struct LineEditContext {
    buffer: Vec<char>,
    cursor: usize,
    history: Vec<String>,
    history_cursor: usize,
    /// `None` means nothing stashed; `Some(empty)` means an empty line was stashed
    stash: Option<Vec<char>>,
    insert_mode: bool,
}

impl Default for LineEditContext {
    fn default() -> Self {
        Self::new()
    }
}

impl LineEditContext {
    /// Create an empty context in insert mode
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            cursor: 0,
            history: Vec::new(),
            history_cursor: 0,
            stash: None,
            insert_mode: true,
        }
    }

    /// Insert (or overwrite) one character at the cursor and advance it
    pub fn insert_or_overwrite(&mut self, ch: char) {
        if self.insert_mode || self.cursor >= self.buffer.len() {
            self.buffer.insert(self.cursor, ch);
        } else {
            self.buffer[self.cursor] = ch;
        }
        self.cursor += 1;
    }

    /// Insert every character of `text`
    pub fn insert_str(&mut self, text: &str) {
        for ch in text.chars() {
            self.insert_or_overwrite(ch);
        }
    }

    /// Remove the character before the cursor
    ///
    /// Returns whether a character was removed.
    pub fn delete_before_cursor(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.buffer.remove(self.cursor);
        true
    }

    /// Move the cursor by `delta` columns
    ///
    /// Returns `true` when the move stayed within the line and should be
    /// echoed; a move past either edge is clamped and returns `false`.
    pub fn move_cursor(&mut self, delta: isize) -> bool {
        let target = self.cursor as isize + delta;
        if target < 0 {
            self.cursor = 0;
            false
        } else if target as usize > self.buffer.len() {
            self.cursor = self.buffer.len();
            false
        } else {
            self.cursor = target as usize;
            true
        }
    }

    /// Put the cursor after the last character
    pub fn move_to_end(&mut self) {
        self.cursor = self.buffer.len();
    }

    pub fn move_to_start(&mut self) {
        self.cursor = 0;
    }

    /// Remove the character under the cursor
    pub fn delete_at_cursor(&mut self) -> bool {
        if self.cursor >= self.buffer.len() {
            return false;
        }
        self.buffer.remove(self.cursor);
        true
    }

    /// Take the current line, clear it and record it in history
    ///
    /// Callers check [`is_empty`](Self::is_empty) first; an empty line is
    /// returned as-is and never recorded.
    pub fn submit(&mut self) -> String {
        let line: String = self.buffer.drain(..).collect();
        self.cursor = 0;
        if !line.is_empty() {
            self.history.retain(|entry| entry != &line);
            self.history.push(line.clone());
        }
        self.history_cursor = self.history.len();
        self.stash = None;
        line
    }

    /// Step through history and return the line now displayed
    pub fn browse_history(&mut self, direction: HistoryDirection) -> String {
        if self.stash.is_none() && !self.buffer.is_empty() {
            self.stash = Some(self.buffer.clone());
        }

        self.history_cursor = match direction {
            HistoryDirection::Older => self.history_cursor.saturating_sub(1),
            HistoryDirection::Newer => self.history_cursor + 1,
        };

        if self.history_cursor >= self.history.len() {
            self.history_cursor = self.history.len();
            self.buffer = self.stash.take().unwrap_or_default();
        } else {
            if self.stash.is_none() {
                self.stash = Some(Vec::new());
            }
            self.buffer = self.history[self.history_cursor].chars().collect();
        }

        self.cursor = self.buffer.len();
        self.text()
    }

    /// Replace the whole line, leaving the cursor at the end
    pub fn replace(&mut self, text: &str) {
        self.buffer = text.chars().collect();
        self.cursor = self.buffer.len();
    }

    /// Discard the current line without recording it
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.history_cursor = self.history.len();
        self.stash = None;
    }

    /// Flip between insert and overwrite; returns the new insert flag
    pub fn toggle_insert_mode(&mut self) -> bool {
        self.insert_mode = !self.insert_mode;
        self.insert_mode
    }

    /// Current line as a string
    pub fn text(&self) -> String {
        self.buffer.iter().collect()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn insert_mode(&self) -> bool {
        self.insert_mode
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn history_cursor(&self) -> usize {
        self.history_cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_history(entries: &[&str]) -> LineEditContext {
        let mut ctx = LineEditContext::new();
        for entry in entries {
            ctx.insert_str(entry);
            ctx.submit();
        }
        ctx
    }

    #[test]
    fn test_insert_and_overwrite() {
        let mut ctx = LineEditContext::new();
        ctx.insert_str("lss");
        assert!(ctx.move_cursor(-2));
        ctx.insert_or_overwrite('x');
        assert_eq!(ctx.text(), "lxss");

        ctx.toggle_insert_mode();
        ctx.insert_or_overwrite('y');
        assert_eq!(ctx.text(), "lxys");
        ctx.insert_str("zw");
        assert_eq!(ctx.text(), "lxyzw");
        assert_eq!(ctx.cursor(), 5);
    }

    #[test]
    fn test_cursor_stays_clamped() {
        // Deterministic LCG drives a mixed sequence of edits.
        let mut seed: u32 = 0x2545_f491;
        let mut ctx = LineEditContext::new();
        for _ in 0..2000 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            match (seed >> 16) % 6 {
                0 | 1 => ctx.insert_or_overwrite('a'),
                2 => {
                    ctx.delete_before_cursor();
                }
                3 => {
                    ctx.move_cursor(-3);
                }
                4 => {
                    ctx.move_cursor(2);
                }
                _ => {
                    ctx.toggle_insert_mode();
                }
            }
            assert!(ctx.cursor() <= ctx.len());
        }
    }

    #[test]
    fn test_move_cursor_edges() {
        let mut ctx = LineEditContext::new();
        assert!(!ctx.move_cursor(-1));
        assert!(!ctx.move_cursor(1));
        ctx.insert_str("ab");
        assert!(!ctx.move_cursor(1));
        assert!(ctx.move_cursor(-1));
        assert!(ctx.move_cursor(-1));
        assert!(!ctx.move_cursor(-1));
        assert_eq!(ctx.cursor(), 0);
    }

    #[test]
    fn test_delete_before_cursor() {
        let mut ctx = LineEditContext::new();
        assert!(!ctx.delete_before_cursor());
        ctx.insert_str("abc");
        ctx.move_cursor(-1);
        assert!(ctx.delete_before_cursor());
        assert_eq!(ctx.text(), "ac");
        assert_eq!(ctx.cursor(), 1);
        ctx.move_cursor(-1);
        assert!(!ctx.delete_before_cursor());
        assert_eq!(ctx.text(), "ac");
    }

    #[test]
    fn test_duplicate_submit_moves_to_tail() {
        let mut ctx = with_history(&["ls", "pwd", "ls", "ls"]);
        assert_eq!(ctx.history(), &["pwd".to_string(), "ls".to_string()]);
        assert_eq!(ctx.history_cursor(), 2);
        assert_eq!(ctx.submit(), "");
        assert_eq!(ctx.history().len(), 2);
    }

    #[test]
    fn test_browse_stops_at_oldest() {
        let mut ctx = with_history(&["one", "two"]);
        assert_eq!(ctx.browse_history(HistoryDirection::Older), "two");
        assert_eq!(ctx.browse_history(HistoryDirection::Older), "one");
        assert_eq!(ctx.browse_history(HistoryDirection::Older), "one");
        assert_eq!(ctx.history_cursor(), 0);
    }

    #[test]
    fn test_stash_restores_in_progress_line() {
        let mut ctx = with_history(&["one", "two", "three"]);
        ctx.insert_str("draft");

        assert_eq!(ctx.browse_history(HistoryDirection::Older), "three");
        assert_eq!(ctx.browse_history(HistoryDirection::Older), "two");
        assert_eq!(ctx.browse_history(HistoryDirection::Newer), "three");
        assert_eq!(ctx.browse_history(HistoryDirection::Newer), "draft");
        assert_eq!(ctx.text(), "draft");
        assert_eq!(ctx.cursor(), 5);

        // Browsing again picks the same draft up a second time.
        assert_eq!(ctx.browse_history(HistoryDirection::Older), "three");
        assert_eq!(ctx.browse_history(HistoryDirection::Newer), "draft");
    }

    #[test]
    fn test_stashed_empty_line_is_not_replaced_by_history() {
        let mut ctx = with_history(&["one", "two"]);
        assert_eq!(ctx.browse_history(HistoryDirection::Older), "two");
        assert_eq!(ctx.browse_history(HistoryDirection::Older), "one");
        assert_eq!(ctx.browse_history(HistoryDirection::Newer), "two");
        assert_eq!(ctx.browse_history(HistoryDirection::Newer), "");
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_down_without_browsing_keeps_line() {
        let mut ctx = with_history(&["one"]);
        ctx.insert_str("wip");
        assert_eq!(ctx.browse_history(HistoryDirection::Newer), "wip");
        assert_eq!(ctx.history_cursor(), 1);
    }

    #[test]
    fn test_replace_and_clear() {
        let mut ctx = with_history(&["one"]);
        ctx.replace("ls -la");
        assert_eq!(ctx.cursor(), 6);
        ctx.clear();
        assert!(ctx.is_empty());
        assert_eq!(ctx.history().len(), 1);
    }

    #[test]
    fn test_home_then_insert_and_forward_delete() {
        let mut ctx = LineEditContext::new();
        ctx.insert_str("ls");
        ctx.move_to_start();
        ctx.insert_str("sudo ");
        assert_eq!(ctx.text(), "sudo ls");

        ctx.move_to_start();
        assert!(ctx.delete_at_cursor());
        assert_eq!(ctx.text(), "udo ls");
        ctx.move_to_end();
        assert!(!ctx.delete_at_cursor());
    }
}
