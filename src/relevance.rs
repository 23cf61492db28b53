// src/relevance.rs
//! Keyword relevance gate: a document passes when its text contains at
//! least one curated keyword, case-insensitively. Pure and cheap; cycles
//! call it once per fetched document.

#[derive(Debug, Clone)]
pub struct KeywordGate {
    keywords: Vec<String>,
}

impl KeywordGate {
    /// Keywords are lowercased once at construction; empty entries are
    /// dropped. An empty gate rejects everything.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn is_relevant(&self, text: &str) -> bool {
        if self.keywords.is_empty() {
            return false;
        }
        let haystack = text.to_lowercase();
        self.keywords.iter().any(|k| haystack.contains(k))
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}
