use std::sync::LazyLock;

use regex::Regex;

use crate::timestamp::LogLine;
use podwatch_types::ErrorWindow;

/// Signatures that mark a log line as an error
pub const ERROR_KEYWORDS: [&str; 6] = ["error", "exception", "fail", "fatal", "panic", "critical"];

/// Line appended after every window
pub const WINDOW_SEPARATOR: &str = "---";

/// Lines of context kept on each side of a match
const CONTEXT_LINES: usize = 2;

static KEYWORD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    // (?i) for case insensitive matching
    Regex::new(&format!("(?i){}", ERROR_KEYWORDS.join("|")))
        .expect("keyword pattern is a valid regex")
});

/// Finds error signatures in a pod's log lines
#[derive(Clone, Debug, Default)]
pub struct ErrorExtractor;

impl ErrorExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Check if a log line carries an error signature.
    ///
    /// The Kubernetes timestamp prefix is ignored.
    pub fn is_match(&self, line: &str) -> bool {
        KEYWORD_REGEX.is_match(LogLine::parse(line).content)
    }

    /// Build one window per matching line.
    ///
    /// Each window holds up to two lines before and after the match, then
    /// [`WINDOW_SEPARATOR`]. Nearby matches produce overlapping windows; they
    /// are never merged.
    pub fn extract(&self, pod_name: &str, lines: &[String]) -> Vec<ErrorWindow> {
        lines
            .iter()
            .enumerate()
            .filter(|(_, line)| self.is_match(line))
            .map(|(i, line)| {
                let start = i.saturating_sub(CONTEXT_LINES);
                let end = (i + CONTEXT_LINES + 1).min(lines.len());

                let mut window: Vec<String> = lines[start..end].to_vec();
                window.push(WINDOW_SEPARATOR.to_string());

                ErrorWindow {
                    pod_name: pod_name.to_string(),
                    matched_at: LogLine::parse(line).timestamp,
                    lines: window,
                }
            })
            .collect()
    }
}
