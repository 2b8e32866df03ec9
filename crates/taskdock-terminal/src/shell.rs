//! Shell resolution and environment augmentation.
//!
//! The hosting application hands this subsystem a pre-sanitized environment
//! map; this module only adds what a terminal needs on top of it. Nothing
//! here mutates process-wide environment state.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use crate::filter::CWD_MARKER_CLOSE;
use crate::filter::CWD_MARKER_OPEN;

pub const DEFAULT_SHELL: &str = "/bin/bash";
const TERM_VALUE: &str = "xterm-256color";

/// Resolves the shell to spawn: explicit override, then the user's shell
/// record, then [`DEFAULT_SHELL`].
pub fn resolve_shell(override_path: Option<&Path>) -> PathBuf {
    if let Some(path) = override_path {
        return path.to_path_buf();
    }
    std::env::var_os("SHELL")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SHELL))
}

/// Shells that honor `PROMPT_COMMAND`. Anything else gets no hook and
/// therefore no working-directory tracking; that is a documented
/// limitation, not an error.
fn honors_prompt_command(shell: &Path) -> bool {
    matches!(
        shell.file_name().and_then(|name| name.to_str()),
        Some("bash") | Some("sh")
    )
}

/// Prompt hook that prints the cwd marker after every prompt redraw.
fn cwd_prompt_hook() -> String {
    format!("printf '{CWD_MARKER_OPEN}%s{CWD_MARKER_CLOSE}' \"$PWD\"")
}

/// Augments the collaborator-provided environment with the terminal type
/// and, for bash/sh-family shells, the marker prompt hook. Caller-supplied
/// values win; an existing `PROMPT_COMMAND` gets the hook chained onto it.
pub fn session_env(shell: &Path, mut env: HashMap<String, String>) -> HashMap<String, String> {
    env.entry("TERM".to_string())
        .or_insert_with(|| TERM_VALUE.to_string());
    env.entry("COLORTERM".to_string())
        .or_insert_with(|| "truecolor".to_string());

    if honors_prompt_command(shell) {
        let hook = cwd_prompt_hook();
        env.entry("PROMPT_COMMAND".to_string())
            .and_modify(|existing| {
                existing.push(';');
                existing.push_str(&hook);
            })
            .or_insert(hook);
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_override_wins() {
        let shell = resolve_shell(Some(Path::new("/usr/local/bin/fish")));
        assert_eq!(shell, PathBuf::from("/usr/local/bin/fish"));
    }

    #[test]
    fn test_bash_family_gets_prompt_hook() {
        let env = session_env(Path::new("/bin/bash"), HashMap::new());
        let hook = env.get("PROMPT_COMMAND").expect("hook installed");
        assert!(hook.contains(CWD_MARKER_OPEN));
        assert!(hook.contains("$PWD"));
        assert_eq!(env.get("TERM").map(String::as_str), Some("xterm-256color"));
    }

    #[test]
    fn test_other_shells_get_no_hook() {
        let env = session_env(Path::new("/usr/bin/fish"), HashMap::new());
        assert!(!env.contains_key("PROMPT_COMMAND"));
        assert!(env.contains_key("TERM"));
    }

    #[test]
    fn test_caller_values_are_preserved() {
        let mut input = HashMap::new();
        input.insert("TERM".to_string(), "dumb".to_string());
        input.insert("PROMPT_COMMAND".to_string(), "history -a".to_string());

        let env = session_env(Path::new("/bin/bash"), input);
        assert_eq!(env.get("TERM").map(String::as_str), Some("dumb"));
        let hook = env.get("PROMPT_COMMAND").expect("hook chained");
        assert!(hook.starts_with("history -a;"));
        assert!(hook.contains(CWD_MARKER_OPEN));
    }
}
