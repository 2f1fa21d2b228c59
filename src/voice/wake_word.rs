//! Wake phrase and exit phrase matching on transcripts
//!
//! Whisper mishears "hey claude" in a handful of predictable ways, so each
//! mode carries a list of phonetic variants rather than a single phrase.

/// Which backend and voice a turn runs with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TurnMode {
    /// Full tool-enabled backend
    #[default]
    Standard,
    /// Fast, tool-free backend with its own voice
    Quick,
}

impl std::fmt::Display for TurnMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Quick => write!(f, "quick"),
        }
    }
}

/// A wake phrase found in a transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeMatch {
    /// Mode selected by the phrase
    pub mode: TurnMode,
    /// The variant that matched
    pub phrase: String,
    /// Text after the phrase, possibly empty
    pub command: String,
}

/// Default standard-mode variants
pub const DEFAULT_PHRASES: &[&str] = &[
    "hey claude",
    "hey cloud",
    "hey clod",
    "hey claud",
    "a claude",
    "hey claw",
    "hay claude",
    "hey klod",
    "hey clawed",
];

/// Default quick-mode variants
pub const DEFAULT_QUICK_PHRASES: &[&str] = &["hey baby claude"];

/// Default phrases that end a session
pub const DEFAULT_EXIT_PHRASES: &[&str] = &["goodbye", "stop listening", "exit", "quit"];

/// Matches wake and exit phrases in transcripts
#[derive(Debug, Clone)]
pub struct WakePhrases {
    standard: Vec<String>,
    quick: Vec<String>,
    exit: Vec<String>,
}

impl WakePhrases {
    /// Create a matcher from phrase lists
    #[must_use]
    pub fn new(standard: Vec<String>, quick: Vec<String>, exit: Vec<String>) -> Self {
        let normalize = |list: Vec<String>| -> Vec<String> {
            list.into_iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect()
        };

        let phrases = Self {
            standard: normalize(standard),
            quick: normalize(quick),
            exit: normalize(exit),
        };

        tracing::debug!(
            standard = ?phrases.standard,
            quick = ?phrases.quick,
            exit = ?phrases.exit,
            "wake phrases configured"
        );

        phrases
    }

    /// Find a wake phrase in `transcript`
    ///
    /// Quick variants are checked first so they win when a transcript
    /// matches both lists.
    #[must_use]
    pub fn detect(&self, transcript: &str) -> Option<WakeMatch> {
        let lower = transcript.to_lowercase();
        if lower.trim().is_empty() {
            return None;
        }

        [(TurnMode::Quick, &self.quick), (TurnMode::Standard, &self.standard)]
            .into_iter()
            .find_map(|(mode, phrases)| {
                phrases
                    .iter()
                    .filter_map(|p| lower.find(p.as_str()).map(|pos| (pos, p)))
                    .min_by_key(|(pos, p)| (*pos, usize::MAX - p.len()))
                    .map(|(pos, phrase)| WakeMatch {
                        mode,
                        phrase: phrase.clone(),
                        command: extract_command(transcript, &lower, pos + phrase.len()),
                    })
            })
    }

    /// Whether the command asks to end the session
    #[must_use]
    pub fn is_exit(&self, command: &str) -> bool {
        let heard = words(command);
        self.exit.iter().any(|phrase| {
            let target = words(phrase);
            !target.is_empty() && heard.windows(target.len()).any(|w| w == target.as_slice())
        })
    }
}

impl Default for WakePhrases {
    fn default() -> Self {
        let owned = |list: &[&str]| list.iter().map(ToString::to_string).collect();
        Self::new(
            owned(DEFAULT_PHRASES),
            owned(DEFAULT_QUICK_PHRASES),
            owned(DEFAULT_EXIT_PHRASES),
        )
    }
}

/// Text after the wake phrase, with leading punctuation removed
///
/// `end` is a byte offset into `lower`. Lowercasing can change byte lengths
/// for some scripts, so fall back to the lowercase text when the offset does
/// not land on a boundary of the original.
fn extract_command(transcript: &str, lower: &str, end: usize) -> String {
    let rest = if transcript.len() == lower.len() && transcript.is_char_boundary(end) {
        &transcript[end..]
    } else {
        &lower[end..]
    };

    rest.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '!' | '?'))
        .trim_end()
        .to_string()
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_wake_phrase() {
        let phrases = WakePhrases::default();
        let hit = phrases.detect("Hey Claude, what time is it?").unwrap();
        assert_eq!(hit.mode, TurnMode::Standard);
        assert_eq!(hit.phrase, "hey claude");
        assert_eq!(hit.command, "what time is it?");
    }

    #[test]
    fn phrase_alone_has_empty_command() {
        let hit = WakePhrases::default().detect("Hey cloud.").unwrap();
        assert_eq!(hit.command, "");
    }

    #[test]
    fn misheard_variants_match() {
        let phrases = WakePhrases::default();
        for heard in ["hay claude open it", "hey klod open it", "A Claude open it"] {
            assert_eq!(phrases.detect(heard).unwrap().command, "open it", "{heard}");
        }
    }

    #[test]
    fn longer_variant_wins_at_same_position() {
        let hit = WakePhrases::default().detect("hey clawed run tests").unwrap();
        assert_eq!(hit.phrase, "hey clawed");
        assert_eq!(hit.command, "run tests");
    }

    #[test]
    fn quick_phrase_checked_first() {
        let hit = WakePhrases::default()
            .detect("hey baby claude tell me a joke")
            .unwrap();
        assert_eq!(hit.mode, TurnMode::Quick);
        assert_eq!(hit.command, "tell me a joke");
    }

    #[test]
    fn no_wake_phrase() {
        let phrases = WakePhrases::default();
        assert!(phrases.detect("hello world").is_none());
        assert!(phrases.detect("   ").is_none());
    }

    #[test]
    fn exit_phrases_match_whole_words() {
        let phrases = WakePhrases::default();
        assert!(phrases.is_exit("Goodbye!"));
        assert!(phrases.is_exit("ok, stop listening now"));
        assert!(phrases.is_exit("quit"));
        assert!(!phrases.is_exit("what does the exitcode mean"));
        assert!(!phrases.is_exit("stop the listening server"));
    }
}
