//! Recent log output of a monitored service and the line-level helpers the
//! parsers are built on.
//!
//! Log windows are chronological with the newest line last, so "current
//! truth" for any pattern is its last matching line. [`LogText::latest`]
//! implements that rule as a single fold over the lines.

use std::{collections::HashMap, hash::Hash};

use once_cell::sync::Lazy;
use regex::Regex;

static KV_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)=(\S+)").expect("static regex"));

/// An immutable, ordered window of log lines (oldest first).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogText {
    lines: Vec<String>,
}

impl LogText {
    /// Splits a retrieved text blob into lines, preserving order.
    pub fn new(text: &str) -> Self {
        LogText {
            lines: text.lines().map(str::to_owned).collect(),
        }
    }

    pub fn empty() -> Self {
        LogText::default()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Folds over all lines and keeps, per category, the most recent line
    /// matching that category's pattern.
    ///
    /// A line may satisfy several patterns and is then recorded for each of
    /// them. Categories with no match are absent from the result.
    pub fn latest<'a, C>(&'a self, patterns: &[(C, &Regex)]) -> HashMap<C, &'a str>
    where
        C: Copy + Eq + Hash,
    {
        self.lines().fold(HashMap::new(), |mut acc, line| {
            for (category, pattern) in patterns {
                if pattern.is_match(line) {
                    acc.insert(*category, line);
                }
            }
            acc
        })
    }

    /// The most recent line matching `pattern`.
    pub fn last_matching(&self, pattern: &Regex) -> Option<&str> {
        self.latest(&[((), pattern)]).remove(&())
    }

    /// Up to `limit` most recent lines matching `pattern`, oldest first.
    pub fn recent_matching(&self, pattern: &Regex, limit: usize) -> Vec<&str> {
        let mut recent: Vec<&str> = self
            .lines()
            .rev()
            .filter(|line| pattern.is_match(line))
            .take(limit)
            .collect();
        recent.reverse();
        recent
    }
}

impl From<String> for LogText {
    fn from(text: String) -> Self {
        LogText::new(&text)
    }
}

/// Extracts every `identifier=value` token of a single line.
///
/// The value is the run of non-whitespace characters after `=`, with one
/// trailing `,` or `;` removed. When a key repeats within the line the later
/// token wins. Lines without tokens yield an empty map.
pub fn extract_kv(line: &str) -> HashMap<&str, &str> {
    KV_TOKEN
        .captures_iter(line)
        .filter_map(|caps| {
            let key = caps.get(1)?.as_str();
            let raw = caps.get(2)?.as_str();
            let value = raw.strip_suffix(|c| c == ',' || c == ';').unwrap_or(raw);
            Some((key, value))
        })
        .collect()
}
