//! System prompts and outbound prompt assembly

use std::path::{Path, PathBuf};

/// Built-in instructions for the tool-enabled backend
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("../prompts/system.md");

/// Built-in instructions for the quick backend
pub const DEFAULT_QUICK_PROMPT: &str = include_str!("../prompts/system_quick.md");

/// Read a system prompt from `path`, falling back to `default`
///
/// A missing or unreadable file is logged, never fatal.
#[must_use]
pub fn load_system_prompt(path: Option<&Path>, default: &str) -> String {
    let Some(path) = path else {
        return default.trim().to_string();
    };

    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => {
            tracing::debug!(path = %path.display(), "loaded system prompt");
            text.trim().to_string()
        }
        Ok(_) => {
            tracing::warn!(path = %path.display(), "system prompt file is empty, using default");
            default.trim().to_string()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read system prompt, using default");
            default.trim().to_string()
        }
    }
}

/// Trailer telling the backend where it is running
#[must_use]
pub fn context_suffix(cwd: &Path) -> String {
    format!("\n\n[Context: working directory is {}]", cwd.display())
}

/// Assemble the prompt sent for one turn
///
/// `history` is the rendered session history block, empty outside a session.
#[must_use]
pub fn compose(history: &str, command: &str, cwd: &Path) -> String {
    let mut prompt = String::with_capacity(history.len() + command.len() + 64);
    if !history.is_empty() {
        prompt.push_str(history);
        prompt.push_str("\n\n");
    }
    prompt.push_str(command);
    prompt.push_str(&context_suffix(cwd));
    prompt
}

/// Expand a leading `~` to the home directory
#[must_use]
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    directories::BaseDirs::new().map_or_else(|| path.to_path_buf(), |dirs| dirs.home_dir().join(rest))
}

/// Compact a path by replacing the home directory prefix with ~
#[must_use]
pub fn compact_path(path: &Path) -> String {
    let text = path.to_string_lossy();
    if let Some(home) = directories::BaseDirs::new() {
        let home_str = home.home_dir().to_string_lossy();
        if let Some(rest) = text.strip_prefix(home_str.as_ref()) {
            return format!("~{rest}");
        }
    }
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_ask_for_tags() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("<SPEAK>"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("<STATUS>"));
        assert!(!DEFAULT_QUICK_PROMPT.trim().is_empty());
    }

    #[test]
    fn missing_file_uses_default() {
        let prompt = load_system_prompt(Some(Path::new("/nonexistent/system.md")), "fallback ");
        assert_eq!(prompt, "fallback");
    }

    #[test]
    fn file_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.md");
        std::fs::write(&path, "  be terse\n").unwrap();
        assert_eq!(load_system_prompt(Some(&path), "fallback"), "be terse");
    }

    #[test]
    fn compose_without_history() {
        let prompt = compose("", "what time is it", Path::new("/work"));
        assert_eq!(prompt, "what time is it\n\n[Context: working directory is /work]");
    }

    #[test]
    fn compose_with_history() {
        let history = "[Conversation history from this session]\nUser: a\nAssistant: b\n[End of history]";
        let prompt = compose(history, "and then?", Path::new("/work"));
        assert!(prompt.starts_with(history));
        assert!(prompt.contains("[End of history]\n\nand then?\n\n[Context:"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let expanded = expand_home(Path::new("~/projects"));
        assert!(!expanded.starts_with("~"));
        assert!(expanded.ends_with("projects"));
        assert_eq!(expand_home(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
