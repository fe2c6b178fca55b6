//! Content filter seam.
//!
//! The gateway asks the filter about every chat message before relaying
//! it. A flagged message is dropped and its sender banned.

use std::collections::HashSet;

/// Decides whether a chat message breaks the rules.
///
/// ```rust
/// use duochat_moderation::ContentFilter;
///
/// /// Flags anything shouted in all caps.
/// struct NoShouting;
///
/// impl ContentFilter for NoShouting {
///     fn is_flagged(&self, text: &str) -> bool {
///         text.len() > 8 && !text.chars().any(char::is_lowercase)
///     }
/// }
///
/// assert!(NoShouting.is_flagged("STOP RIGHT NOW"));
/// assert!(!NoShouting.is_flagged("hello there"));
/// ```
pub trait ContentFilter: Send + Sync + 'static {
    fn is_flagged(&self, text: &str) -> bool;
}

/// Never flags anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ContentFilter for AllowAll {
    fn is_flagged(&self, _text: &str) -> bool {
        false
    }
}

/// Flags messages containing any listed word, case-insensitively.
///
/// Matching is on whole words: text is split on anything that is not
/// alphanumeric, so "class" does not trip a filter for "ass".
#[derive(Debug, Clone, Default)]
pub struct WordListFilter {
    words: HashSet<String>,
}

impl WordListFilter {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self { words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl ContentFilter for WordListFilter {
    fn is_flagged(&self, text: &str) -> bool {
        if self.words.is_empty() {
            return false;
        }
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .any(|w| self.words.contains(&w.to_lowercase()))
    }
}
