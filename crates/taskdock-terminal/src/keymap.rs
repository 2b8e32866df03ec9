//! Key-name to wire-byte translation.
//!
//! Navigation and control keys map to the byte sequences a real terminal
//! would put on the wire. Names with no entry return `None`; the controller
//! forwards those as literal text.

/// Returns the terminal byte sequence for a named key event.
pub fn key_to_bytes(key: &str) -> Option<Vec<u8>> {
    if let Some((modifier, base)) = key.split_once('+') {
        return chord_to_bytes(modifier, base);
    }

    let bytes: &[u8] = match key {
        "Enter" | "Return" => b"\r",
        "Tab" => b"\t",
        "Backspace" => b"\x7f",
        "Escape" | "Esc" => b"\x1b",
        "Space" => b" ",

        "ArrowUp" | "Up" => b"\x1b[A",
        "ArrowDown" | "Down" => b"\x1b[B",
        "ArrowRight" | "Right" => b"\x1b[C",
        "ArrowLeft" | "Left" => b"\x1b[D",

        "Home" => b"\x1b[H",
        "End" => b"\x1b[F",
        "PageUp" => b"\x1b[5~",
        "PageDown" => b"\x1b[6~",
        "Insert" => b"\x1b[2~",
        "Delete" => b"\x1b[3~",

        "F1" => b"\x1bOP",
        "F2" => b"\x1bOQ",
        "F3" => b"\x1bOR",
        "F4" => b"\x1bOS",
        "F5" => b"\x1b[15~",
        "F6" => b"\x1b[17~",
        "F7" => b"\x1b[18~",
        "F8" => b"\x1b[19~",
        "F9" => b"\x1b[20~",
        "F10" => b"\x1b[21~",
        "F11" => b"\x1b[23~",
        "F12" => b"\x1b[24~",

        _ => return None,
    };
    Some(bytes.to_vec())
}

fn chord_to_bytes(modifier: &str, base: &str) -> Option<Vec<u8>> {
    match modifier.to_ascii_lowercase().as_str() {
        "ctrl" | "control" => {
            let c = base.chars().next()?;
            if base.chars().count() == 1 && c.is_ascii_alphabetic() {
                return Some(vec![(c.to_ascii_uppercase() as u8) - b'A' + 1]);
            }
            match base {
                "[" => Some(vec![0x1b]),
                "\\" => Some(vec![0x1c]),
                "]" => Some(vec![0x1d]),
                _ => None,
            }
        }
        "alt" | "meta" => {
            let inner = key_to_bytes(base)
                .or_else(|| (base.chars().count() == 1).then(|| base.as_bytes().to_vec()))?;
            let mut bytes = vec![0x1b];
            bytes.extend(inner);
            Some(bytes)
        }
        "shift" => match base {
            "Tab" => Some(b"\x1b[Z".to_vec()),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_keys_produce_exact_sequences() {
        assert_eq!(key_to_bytes("ArrowUp"), Some(b"\x1b[A".to_vec()));
        assert_eq!(key_to_bytes("ArrowDown"), Some(b"\x1b[B".to_vec()));
        assert_eq!(key_to_bytes("ArrowRight"), Some(b"\x1b[C".to_vec()));
        assert_eq!(key_to_bytes("ArrowLeft"), Some(b"\x1b[D".to_vec()));
        assert_eq!(key_to_bytes("Home"), Some(b"\x1b[H".to_vec()));
        assert_eq!(key_to_bytes("End"), Some(b"\x1b[F".to_vec()));
        assert_eq!(key_to_bytes("PageUp"), Some(b"\x1b[5~".to_vec()));
        assert_eq!(key_to_bytes("PageDown"), Some(b"\x1b[6~".to_vec()));
    }

    #[test]
    fn test_control_keys_produce_exact_sequences() {
        assert_eq!(key_to_bytes("Enter"), Some(b"\r".to_vec()));
        assert_eq!(key_to_bytes("Tab"), Some(b"\t".to_vec()));
        assert_eq!(key_to_bytes("Shift+Tab"), Some(b"\x1b[Z".to_vec()));
        assert_eq!(key_to_bytes("Backspace"), Some(b"\x7f".to_vec()));
        assert_eq!(key_to_bytes("Escape"), Some(b"\x1b".to_vec()));
    }

    #[test]
    fn test_ctrl_chords() {
        assert_eq!(key_to_bytes("Ctrl+c"), Some(vec![3]));
        assert_eq!(key_to_bytes("Ctrl+D"), Some(vec![4]));
        assert_eq!(key_to_bytes("Ctrl+z"), Some(vec![26]));
        assert_eq!(key_to_bytes("Ctrl+["), Some(vec![0x1b]));
    }

    #[test]
    fn test_alt_prefixes_escape() {
        assert_eq!(key_to_bytes("Alt+b"), Some(vec![0x1b, b'b']));
        assert_eq!(key_to_bytes("Alt+ArrowLeft"), Some(b"\x1b\x1b[D".to_vec()));
    }

    #[test]
    fn test_unmapped_keys_return_none() {
        assert_eq!(key_to_bytes("a"), None);
        assert_eq!(key_to_bytes("CapsLock"), None);
        assert_eq!(key_to_bytes("Hyper+x"), None);
    }
}
