//! Bounded backing store for the display surface.

use std::collections::VecDeque;

pub const DEFAULT_SCROLLBACK_LINES: usize = 8000;

/// FIFO-bounded sequence of display lines.
///
/// When the capacity is reached the oldest line is evicted first. The last
/// line stays open until a newline closes it, so a chunk ending mid-line
/// and its continuation land on a single display line.
#[derive(Debug)]
pub struct DisplayBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    last_line_open: bool,
}

impl Default for DisplayBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SCROLLBACK_LINES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            capacity,
            last_line_open: false,
        }
    }

    /// Appends filtered text, splitting on newlines and continuing any
    /// unterminated line from the previous append.
    pub fn append_text(&mut self, text: &str) {
        for piece in text.split_inclusive('\n') {
            let (content, terminated) = match piece.strip_suffix('\n') {
                Some(stripped) => (stripped, true),
                None => (piece, false),
            };

            if self.last_line_open {
                match self.lines.back_mut() {
                    Some(last) => last.push_str(content),
                    None => self.lines.push_back(content.to_string()),
                }
            } else {
                self.lines.push_back(content.to_string());
            }
            self.last_line_open = !terminated;
            self.evict();
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.last_line_open = false;
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    fn evict(&mut self) {
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_keeps_most_recent_lines() {
        let mut buffer = DisplayBuffer::with_capacity(5);
        for i in 0..12 {
            buffer.append_text(&format!("line {i}\n"));
        }
        assert_eq!(buffer.len(), 5);
        let lines = buffer.snapshot();
        assert_eq!(lines[0], "line 7");
        assert_eq!(lines[4], "line 11");
    }

    #[test]
    fn test_burst_larger_than_capacity() {
        let mut buffer = DisplayBuffer::with_capacity(3);
        let burst: String = (0..50).map(|i| format!("{i}\n")).collect();
        buffer.append_text(&burst);
        assert_eq!(buffer.snapshot(), vec!["47", "48", "49"]);
    }

    #[test]
    fn test_partial_line_is_continued() {
        let mut buffer = DisplayBuffer::new();
        buffer.append_text("$ ec");
        buffer.append_text("ho hi\nnext");
        assert_eq!(buffer.snapshot(), vec!["$ echo hi", "next"]);
    }

    #[test]
    fn test_clear_resets_open_line_state() {
        let mut buffer = DisplayBuffer::new();
        buffer.append_text("dangling");
        buffer.clear();
        assert!(buffer.is_empty());
        buffer.append_text("fresh\n");
        assert_eq!(buffer.snapshot(), vec!["fresh"]);
    }
}
