// src/dedup.rs
//! In-memory set of already-emitted keys (URLs), seeded from the durable
//! store a cycle writes to. One instance belongs to one cycle run; it only
//! grows, and it is rebuilt from durable state on the next run. A missing
//! or corrupt source yields an empty set, never an error: worst case the
//! durable store's own dedup catches the repeat.

use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Default)]
pub struct DedupSet {
    keys: HashSet<String>,
}

impl DedupSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Seed from a line-oriented store. The key is the part of each line
    /// before an optional ` | ` suffix.
    pub fn preload_lines(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::empty(),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "dedup preload unreadable, starting empty");
                return Self::empty();
            }
        };
        let keys = content
            .lines()
            .filter_map(|l| {
                let key = l.split('|').next().unwrap_or("").trim();
                (!key.is_empty()).then(|| key.to_string())
            })
            .collect();
        Self { keys }
    }

    /// Seed from a JSON-array store, collecting the `url` field of every
    /// element that has one. A malformed file starts the set empty.
    pub fn preload_json_array(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::empty(),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "dedup preload unreadable, starting empty");
                return Self::empty();
            }
        };
        let parsed: Result<Vec<serde_json::Value>, _> = serde_json::from_str(&content);
        match parsed {
            Ok(items) => {
                let keys = items
                    .iter()
                    .filter_map(|v| v.get("url").and_then(|u| u.as_str()))
                    .map(|s| s.to_string())
                    .collect();
                Self { keys }
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "dedup source is corrupt, starting empty");
                Self::empty()
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Returns true when the key was not present before.
    pub fn insert(&mut self, key: &str) -> bool {
        self.keys.insert(key.to_string())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
