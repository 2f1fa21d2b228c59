//! Bracket tag extraction
//!
//! Responses mark spoken text with `<SPEAK>..</SPEAK>` and progress updates
//! with `<STATUS>..</STATUS>`. Matching is ASCII case-insensitive and spans
//! end at the first matching close. An open tag without its close is never
//! treated as a span.

/// Spoken when a response carries nothing usable
pub const FALLBACK_TEXT: &str = "Done.";

/// Longest untagged response spoken verbatim, in characters
pub const MAX_UNTAGGED_CHARS: usize = 400;

/// Incremental scanner for one tag over a growing buffer
///
/// Remembers how far it got so appended text is scanned once.
#[derive(Debug, Clone)]
pub struct TagScanner {
    open: String,
    close: String,
    scan_pos: usize,
}

impl TagScanner {
    /// Scanner for `<tag>..</tag>`
    #[must_use]
    pub fn new(tag: &str) -> Self {
        Self {
            open: format!("<{tag}>"),
            close: format!("</{tag}>"),
            scan_pos: 0,
        }
    }

    /// Spans closed since the last call, in order
    ///
    /// `buffer` must be the same buffer as before with text appended.
    pub fn scan<'a>(&mut self, buffer: &'a str) -> Vec<&'a str> {
        let bytes = buffer.as_bytes();
        let mut spans = Vec::new();

        while let Some(open_at) = find_ci(bytes, self.open.as_bytes(), self.scan_pos) {
            let body = open_at + self.open.len();
            let Some(close_at) = find_ci(bytes, self.close.as_bytes(), body) else {
                // wait for the close to arrive
                self.scan_pos = open_at;
                return spans;
            };
            spans.push(&buffer[body..close_at]);
            self.scan_pos = close_at + self.close.len();
        }

        // keep a partial open tag at the tail in range for the next scan
        let keep = self.open.len().saturating_sub(1);
        self.scan_pos = self.scan_pos.max(bytes.len().saturating_sub(keep));
        spans
    }

    /// Forget scan progress
    pub const fn reset(&mut self) {
        self.scan_pos = 0;
    }
}

/// All closed spans of `tag` in `text`
#[must_use]
pub fn extract_spans<'a>(text: &'a str, tag: &str) -> Vec<&'a str> {
    TagScanner::new(tag).scan(text)
}

/// Remove every closed `<NAME>..</NAME>` span, keeping everything else
///
/// Tag names are ASCII letters and underscores. Markers left without a
/// partner are dropped so they are never read out.
#[must_use]
pub fn strip_tags(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut i = 0;

    while let Some(rel) = bytes[i..].iter().position(|&b| b == b'<') {
        let lt = i + rel;
        let closing = bytes.get(lt + 1) == Some(&b'/');
        let name_at = lt + 1 + usize::from(closing);
        i = lt + 1;

        let name_len = bytes[name_at..]
            .iter()
            .take_while(|b| b.is_ascii_alphabetic() || **b == b'_')
            .count();
        if name_len == 0 || bytes.get(name_at + name_len) != Some(&b'>') {
            continue;
        }

        let marker_end = name_at + name_len + 1;
        let close = format!("</{}>", &text[name_at..name_at + name_len]);
        let resume = if closing {
            marker_end
        } else {
            find_ci(bytes, close.as_bytes(), marker_end).map_or(marker_end, |at| at + close.len())
        };

        out.push_str(&text[copied..lt]);
        copied = resume;
        i = resume;
    }

    out.push_str(&text[copied..]);
    out
}

/// Text to speak for a finished response
///
/// Closed SPEAK spans joined with a space; otherwise the untagged remainder,
/// truncated; otherwise [`FALLBACK_TEXT`].
#[must_use]
pub fn extract_speak(text: Option<&str>) -> String {
    let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
        return FALLBACK_TEXT.to_string();
    };

    let speaks: Vec<&str> = extract_spans(text, "SPEAK")
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if !speaks.is_empty() {
        return speaks.join(" ");
    }

    let stripped = strip_tags(text);
    let cleaned = stripped.trim();
    if cleaned.is_empty() {
        return FALLBACK_TEXT.to_string();
    }

    if cleaned.chars().count() > MAX_UNTAGGED_CHARS {
        let head: String = cleaned.chars().take(MAX_UNTAGGED_CHARS - 3).collect();
        return format!("{head}...");
    }
    cleaned.to_string()
}

fn find_ci(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
        .map(|p| p + from)
}
