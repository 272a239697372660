//! Controlled tag vocabulary seam.
//!
//! The category list itself is owned outside this crate. Core code only asks
//! a membership question through [`TagVocabulary`].

use std::collections::BTreeSet;

/// Membership check against the external controlled vocabulary.
pub trait TagVocabulary {
    fn contains(&self, tag: &str) -> bool;
}

impl TagVocabulary for BTreeSet<String> {
    fn contains(&self, tag: &str) -> bool {
        BTreeSet::contains(self, tag)
    }
}

/// Set-backed vocabulary built from a caller-supplied list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticTagVocabulary {
    tags: BTreeSet<String>,
}

impl StaticTagVocabulary {
    /// Builds a vocabulary; entries are trimmed and blanks dropped.
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags = tags
            .into_iter()
            .map(|tag| tag.as_ref().trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        Self { tags }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }
}

impl TagVocabulary for StaticTagVocabulary {
    fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Accepts every tag. Used by tooling when no vocabulary is configured, so
/// rogue-tag checks are effectively disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveVocabulary;

impl TagVocabulary for PermissiveVocabulary {
    fn contains(&self, _tag: &str) -> bool {
        true
    }
}
