//! Output-stream filtering.
//!
//! Raw pty bytes are decoded, scrubbed of ANSI escape sequences, and
//! scanned for the out-of-band working-directory marker the shell prompt
//! hook prints. The UTF-8 decoder and the escape parser are incremental:
//! both carry partial state across chunk boundaries, so a multibyte
//! character or an escape sequence split between two reads is never
//! half-rendered. The marker scan is per-call on purpose: an opener with
//! no closer in the same chunk stays literal text instead of buffering
//! arbitrary output while waiting for a closer that may never come.

/// Opening sentinel printed by the shell prompt hook.
pub const CWD_MARKER_OPEN: &str = "__MARK_OPEN__";
/// Closing sentinel printed by the shell prompt hook.
pub const CWD_MARKER_CLOSE: &str = "__MARK_CLOSE__";

/// Result of filtering one raw chunk.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FilteredChunk {
    /// Display text with escapes, carriage returns and the marker elided.
    pub text: String,
    /// Working directory extracted from the first complete marker, if any.
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EscapeState {
    Ground,
    /// Saw ESC, waiting for the introducer byte.
    Escape,
    /// Inside `ESC [`; ends at a final byte in `0x40..=0x7e`.
    Csi,
    /// Inside `ESC ]`; ends at BEL or the two-byte ST.
    Osc,
    /// Saw ESC inside an OSC payload, possibly the start of ST.
    OscEscape,
}

#[derive(Debug)]
pub struct OutputFilter {
    state: EscapeState,
    utf8_tail: Vec<u8>,
}

impl Default for OutputFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFilter {
    pub fn new() -> Self {
        Self {
            state: EscapeState::Ground,
            utf8_tail: Vec::new(),
        }
    }

    /// Filters one raw chunk into display text plus an optional extracted
    /// working directory.
    pub fn process(&mut self, chunk: &[u8]) -> FilteredChunk {
        let decoded = self.decode(chunk);
        let stripped = self.strip_escapes(&decoded);
        let (text, cwd) = extract_marker(stripped);
        FilteredChunk { text, cwd }
    }

    /// Lossy UTF-8 decode that holds an incomplete trailing multibyte
    /// sequence for the next chunk instead of replacing it.
    fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.utf8_tail);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or(""));
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            self.utf8_tail = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    fn strip_escapes(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for ch in text.chars() {
            match self.state {
                EscapeState::Ground => match ch {
                    '\x1b' => self.state = EscapeState::Escape,
                    '\r' => {}
                    _ => out.push(ch),
                },
                EscapeState::Escape => match ch {
                    '[' => self.state = EscapeState::Csi,
                    ']' => self.state = EscapeState::Osc,
                    '\x1b' => {}
                    // two-byte sequence: ESC plus one dispatch byte
                    _ => self.state = EscapeState::Ground,
                },
                EscapeState::Csi => {
                    if ('\x40'..='\x7e').contains(&ch) {
                        self.state = EscapeState::Ground;
                    }
                }
                EscapeState::Osc => match ch {
                    '\x07' => self.state = EscapeState::Ground,
                    '\x1b' => self.state = EscapeState::OscEscape,
                    _ => {}
                },
                EscapeState::OscEscape => match ch {
                    '\\' => self.state = EscapeState::Ground,
                    '\x1b' => {}
                    _ => self.state = EscapeState::Osc,
                },
            }
        }
        out
    }
}

/// Captures the payload of the first complete marker and elides the whole
/// sentinel from the text. Later markers and unmatched openers pass
/// through untouched.
fn extract_marker(text: String) -> (String, Option<String>) {
    let Some(open) = text.find(CWD_MARKER_OPEN) else {
        return (text, None);
    };
    let payload_start = open + CWD_MARKER_OPEN.len();
    let Some(close) = text[payload_start..].find(CWD_MARKER_CLOSE) else {
        return (text, None);
    };
    let payload_end = payload_start + close;
    let cwd = text[payload_start..payload_end].to_string();

    let mut cleaned = String::with_capacity(text.len());
    cleaned.push_str(&text[..open]);
    cleaned.push_str(&text[payload_end + CWD_MARKER_CLOSE.len()..]);
    (cleaned, Some(cwd))
}
