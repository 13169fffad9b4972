//! ``src/model/name_filter.rs``
//!
//! Simple glob-like name patterns: `*` matches any run of characters, `?`
//! exactly one, everything else literally. Matching is case-insensitive and
//! unanchored, so `a*` matches any name containing an `a`.

use regex::{Regex, RegexBuilder};
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    pattern: String,
    /// `None` matches every name.
    regex: Option<Regex>,
}

impl NameFilter {
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        if pattern.is_empty() {
            return Self::default();
        }

        let regex = match RegexBuilder::new(&glob_to_regex(pattern))
            .case_insensitive(true)
            .build()
        {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(pattern, error = %e, "Name filter rejected, matching everything");
                None
            }
        };

        Self {
            pattern: pattern.to_string(),
            regex,
        }
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.regex.as_ref().is_none_or(|re| re.is_match(name))
    }
}

/// Convert a glob pattern to an unanchored regex string.
fn glob_to_regex(pattern: &str) -> String {
    let mut regex_pattern = String::with_capacity(pattern.len() * 2);
    let mut buf = [0u8; 4];

    for c in pattern.chars() {
        match c {
            '*' => regex_pattern.push_str(".*?"),
            '?' => regex_pattern.push('.'),
            _ => regex_pattern.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }

    regex_pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pattern_matches_everything() {
        let filter = NameFilter::new("");
        assert!(filter.is_empty());
        assert!(filter.matches("anything"));
        assert!(filter.matches(""));
    }

    #[test]
    fn star_prefix_is_unanchored_and_case_insensitive() {
        let filter = NameFilter::new("a*");
        assert!(filter.matches("apple"));
        assert!(filter.matches("Banana"));
        assert!(filter.matches("APRICOT"));
        assert!(!filter.matches("cherry"));
    }

    #[test]
    fn dot_is_literal() {
        let filter = NameFilter::new(".txt");
        assert!(filter.matches("notes.txt"));
        assert!(!filter.matches("notes_txt"));
    }

    #[test]
    fn question_mark_is_one_char() {
        let filter = NameFilter::new("b?d");
        assert!(filter.matches("bad.rs"));
        assert!(filter.matches("abed"));
        assert!(!filter.matches("bd"));
    }

    #[test]
    fn regex_metacharacters_are_escaped() {
        let filter = NameFilter::new("(draft)");
        assert!(filter.matches("report (draft).odt"));
        assert!(!filter.matches("report draft.odt"));
    }
}
