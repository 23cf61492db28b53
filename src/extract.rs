// src/extract.rs
//! Structured extraction of fetched pages: page title, heading levels
//! h1-h6, and paragraph text, each entity-decoded and whitespace-collapsed.
//! The resulting `Document` is the record shape persisted by the news
//! cycles and consumed by the sinks.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub h1: Vec<String>,
    #[serde(default)]
    pub h2: Vec<String>,
    #[serde(default)]
    pub h3: Vec<String>,
    #[serde(default)]
    pub h4: Vec<String>,
    #[serde(default)]
    pub h5: Vec<String>,
    #[serde(default)]
    pub h6: Vec<String>,
    #[serde(default)]
    pub p: Vec<String>,
}

impl Document {
    /// Title, headings, and paragraphs joined into one string for the
    /// relevance gate.
    pub fn full_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(1 + self.p.len());
        parts.push(&self.title);
        for section in [
            &self.h1, &self.h2, &self.h3, &self.h4, &self.h5, &self.h6, &self.p,
        ] {
            parts.extend(section.iter().map(String::as_str));
        }
        parts.join(" ")
    }
}

/// Normalize extracted text: decode HTML entities, strip any leftover
/// tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    re_ws.replace_all(&out, " ").trim().to_string()
}

fn tag_regex(tag: &'static str) -> &'static Regex {
    static RES: OnceCell<std::collections::HashMap<&'static str, Regex>> = OnceCell::new();
    let map = RES.get_or_init(|| {
        ["title", "h1", "h2", "h3", "h4", "h5", "h6", "p"]
            .into_iter()
            .map(|t| {
                let re = Regex::new(&format!(r"(?is)<{t}\b[^>]*>(.*?)</{t}\s*>"))
                    .expect("tag extraction regex");
                (t, re)
            })
            .collect()
    });
    &map[tag]
}

fn tag_texts(html: &str, tag: &'static str) -> Vec<String> {
    tag_regex(tag)
        .captures_iter(html)
        .filter_map(|c| {
            let text = normalize_text(c.get(1).map(|m| m.as_str()).unwrap_or(""));
            (!text.is_empty()).then_some(text)
        })
        .collect()
}

/// Build a `Document` from raw page HTML. Never fails: a page without the
/// expected structure just yields empty sections.
pub fn extract_document(url: &str, html: &str) -> Document {
    let title = tag_texts(html, "title").into_iter().next().unwrap_or_default();
    Document {
        url: url.to_string(),
        title,
        h1: tag_texts(html, "h1"),
        h2: tag_texts(html, "h2"),
        h3: tag_texts(html, "h3"),
        h4: tag_texts(html, "h4"),
        h5: tag_texts(html, "h5"),
        h6: tag_texts(html, "h6"),
        p: tag_texts(html, "p"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><head><title> SCADA flaw &amp; patch notes </title></head>
<body>
  <h1 class="headline">Critical SCADA vulnerability</h1>
  <h2>Impact</h2><h2></h2>
  <p>Attackers can reach <b>unpatched</b> controllers.</p>
  <p>   </p>
  <p>Vendors shipped fixes on Tuesday.</p>
</body></html>"#;

    #[test]
    fn normalize_decodes_strips_and_collapses() {
        assert_eq!(
            normalize_text("  Hello,&nbsp;&nbsp; <b>world</b>  "),
            "Hello, world"
        );
    }

    #[test]
    fn extract_pulls_title_headings_and_paragraphs() {
        let doc = extract_document("http://a.example", PAGE);
        assert_eq!(doc.title, "SCADA flaw & patch notes");
        assert_eq!(doc.h1, vec!["Critical SCADA vulnerability"]);
        assert_eq!(doc.h2, vec!["Impact"]);
        assert_eq!(
            doc.p,
            vec![
                "Attackers can reach unpatched controllers.",
                "Vendors shipped fixes on Tuesday."
            ]
        );
        assert!(doc.h3.is_empty());
    }

    #[test]
    fn full_text_feeds_the_gate() {
        let doc = extract_document("http://a.example", PAGE);
        let text = doc.full_text();
        assert!(text.contains("SCADA flaw"));
        assert!(text.contains("unpatched controllers"));
    }

    #[test]
    fn unstructured_page_yields_empty_sections() {
        let doc = extract_document("http://a.example", "plain text, no markup");
        assert!(doc.title.is_empty());
        assert!(doc.p.is_empty());
    }
}
