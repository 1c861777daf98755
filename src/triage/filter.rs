//! Keyword matching for blocklists and affiliation allowlists.
//!
//! Matching is a case-insensitive substring test. Each set is compiled once
//! into a single escaped alternation so a lookup is one regex scan.

use regex::{Regex, RegexBuilder};

/// A compiled, case-insensitive keyword set.
#[derive(Debug, Clone)]
pub struct KeywordSet {
    keywords: Vec<String>,
    regex: Option<Regex>,
}

impl KeywordSet {
    /// Compile a keyword set. Empty keywords are dropped; an empty set
    /// matches nothing.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(Into::into)
            .filter(|k| !k.trim().is_empty())
            .collect();

        let regex = if keywords.is_empty() {
            None
        } else {
            let pattern = keywords
                .iter()
                .map(|k| regex::escape(k))
                .collect::<Vec<_>>()
                .join("|");
            // Escaped literals always form a valid pattern.
            RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .ok()
        };

        Self { keywords, regex }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// True if any keyword occurs in `text`.
    pub fn matches(&self, text: &str) -> bool {
        matches_any(text, self)
    }

    /// The first keyword occurrence in `text`, as written in the text.
    pub fn first_match<'t>(&self, text: &'t str) -> Option<&'t str> {
        if text.is_empty() {
            return None;
        }
        self.regex.as_ref()?.find(text).map(|m| m.as_str())
    }
}

/// Case-insensitive substring match of `text` against `keywords`.
///
/// Empty text matches nothing.
pub fn matches_any(text: &str, keywords: &KeywordSet) -> bool {
    !text.is_empty()
        && keywords
            .regex
            .as_ref()
            .is_some_and(|regex| regex.is_match(text))
}
