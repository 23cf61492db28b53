// src/store/line.rs
//! One record per line. Appends ride on POSIX append-mode atomicity for
//! single short lines; the only writer of a given file is a single cycle
//! instance, so no further exclusion is needed.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LineStore {
    path: PathBuf,
}

impl LineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a single line in append mode, creating the file (and parent
    /// directory) on first use.
    pub fn append_line(&self, line: &str) -> Result<()> {
        self.ensure_parent()?;
        let mut f = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .with_context(|| format!("opening {} for append", self.path.display()))?;
        writeln!(f, "{line}").with_context(|| format!("appending to {}", self.path.display()))?;
        Ok(())
    }

    /// Replace the whole file with the given lines (alert-feed refresh
    /// rewrites its output wholesale).
    pub fn rewrite(&self, lines: &[String]) -> Result<()> {
        self.ensure_parent()?;
        let mut content = lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        std::fs::write(&self.path, content)
            .with_context(|| format!("rewriting {}", self.path.display()))
    }

    /// Current non-empty lines, trimmed. Missing file reads as empty.
    pub fn lines(&self) -> Result<Vec<String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()))
            }
        };
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        Ok(())
    }
}
