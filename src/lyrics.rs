//! Timed lyric lines
//!
//! Lyrics are line-synchronised only: each line carries the second it starts
//! at. Sequences are kept sorted ascending by timestamp.

use serde::{Deserialize, Serialize};

use crate::utils::format_time;

/// Lines are shown slightly ahead of their timestamp
const LOOKAHEAD_SECS: f64 = 0.5;

/// Line prefixes for composer/lyricist/arranger credits
const CREDIT_PREFIXES: &[&str] = &["作词", "作曲", "编曲"];

/// A single line of lyrics
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricLine {
    /// Start time in seconds
    pub timestamp_seconds: f64,
    pub text: String,
}

impl LyricLine {
    pub fn new(timestamp_seconds: f64, text: impl Into<String>) -> Self {
        Self {
            timestamp_seconds,
            text: text.into(),
        }
    }

    /// Whether the line is a credit line rather than sung text
    pub fn is_credit(&self) -> bool {
        CREDIT_PREFIXES.iter().any(|p| self.text.starts_with(p))
    }

    /// `[MM:SS] text`
    pub fn display(&self) -> String {
        format!("[{}] {}", format_time(self.timestamp_seconds), self.text)
    }
}

/// Sort lines ascending by timestamp
pub fn sort_lines(lines: &mut [LyricLine]) {
    lines.sort_by(|a, b| a.timestamp_seconds.total_cmp(&b.timestamp_seconds));
}

/// Index of the line that should be showing at `position_secs`
///
/// Returns `-1` for an empty sequence. Before the first line has started the
/// first line is reported, past the last one the last line is reported.
pub fn current_index(lines: &[LyricLine], position_secs: f64) -> i32 {
    if lines.is_empty() {
        return -1;
    }

    let next = lines
        .iter()
        .position(|l| l.timestamp_seconds > position_secs - LOOKAHEAD_SECS);

    match next {
        Some(0) => 0,
        Some(i) => (i - 1) as i32,
        None => (lines.len() - 1) as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<LyricLine> {
        vec![
            LyricLine::new(0.0, "intro"),
            LyricLine::new(5.0, "first"),
            LyricLine::new(10.0, "second"),
        ]
    }

    #[test]
    fn test_current_index_empty() {
        assert_eq!(current_index(&[], 12.0), -1);
    }

    #[test]
    fn test_current_index_progression() {
        let lines = sample();
        assert_eq!(current_index(&lines, 0.0), 0);
        assert_eq!(current_index(&lines, 4.0), 0);
        assert_eq!(current_index(&lines, 6.0), 1);
        assert_eq!(current_index(&lines, 11.0), 2);
        assert_eq!(current_index(&lines, 500.0), 2);
    }

    #[test]
    fn test_sort_lines() {
        let mut lines = vec![
            LyricLine::new(10.0, "b"),
            LyricLine::new(1.5, "a"),
            LyricLine::new(30.0, "c"),
        ];
        sort_lines(&mut lines);
        let texts: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["a", "b", "c"]);
    }

    #[test]
    fn test_display_and_credit() {
        let line = LyricLine::new(65.2, "hello");
        assert_eq!(line.display(), "[01:05] hello");
        assert!(!line.is_credit());
        assert!(LyricLine::new(0.0, "作词：方文山").is_credit());
    }
}
