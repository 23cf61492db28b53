// src/feedxml.rs
//! RSS 2.0 / Atom parsing on top of quick-xml's serde support. Feeds are
//! reduced to the metadata the harvester needs: feed title, site link, and
//! entry (title, link, published) tuples.

use anyhow::{bail, Context, Result};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::{OffsetDateTime, UtcOffset};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub site_url: Option<String>,
    pub entries: Vec<FeedEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    /// Unix seconds; 0 when the feed carries no parseable date.
    pub published_unix: u64,
}

impl ParsedFeed {
    pub fn entry_links(&self) -> Vec<String> {
        self.entries.iter().filter_map(|e| e.link.clone()).collect()
    }
}

/* ---------------- RSS 2.0 ---------------- */

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

/* ---------------- Atom ---------------- */

#[derive(Debug, Deserialize)]
struct AtomFeed {
    title: Option<String>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<String>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    updated: Option<String>,
    published: Option<String>,
}

fn parse_rfc2822_to_unix(ts: &str) -> u64 {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
        .unwrap_or(0)
}

fn parse_rfc3339_to_unix(ts: &str) -> u64 {
    OffsetDateTime::parse(ts, &Rfc3339)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
        .unwrap_or(0)
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

fn pick_atom_link(links: &[AtomLink]) -> Option<String> {
    // prefer rel="alternate", fall back to the first href
    links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .and_then(|l| l.href.clone())
        .or_else(|| links.iter().find_map(|l| l.href.clone()))
}

/// Parse a feed document, trying RSS 2.0 first, then Atom.
pub fn parse_feed(xml: &str) -> Result<ParsedFeed> {
    let xml_clean = scrub_html_entities_for_xml(xml);

    if let Ok(rss) = from_str::<Rss>(&xml_clean) {
        let entries = rss
            .channel
            .items
            .into_iter()
            .map(|it| FeedEntry {
                title: it.title,
                link: it.link,
                published_unix: it
                    .pub_date
                    .as_deref()
                    .map(parse_rfc2822_to_unix)
                    .unwrap_or(0),
            })
            .collect();
        return Ok(ParsedFeed {
            title: rss.channel.title,
            site_url: rss.channel.link,
            entries,
        });
    }

    match from_str::<AtomFeed>(&xml_clean).context("parsing feed as rss and atom both failed") {
        // quick-xml happily ignores unknown elements, so an arbitrary XML
        // document "parses" as an all-empty Atom feed; reject that shape.
        Ok(feed) if feed.title.is_none() && feed.links.is_empty() && feed.entries.is_empty() => {
            bail!("document is neither an rss channel nor an atom feed")
        }
        Ok(feed) => {
            let site_url = pick_atom_link(&feed.links);
            let entries = feed
                .entries
                .into_iter()
                .map(|e| {
                    let link = pick_atom_link(&e.links);
                    let ts = e
                        .published
                        .as_deref()
                        .or(e.updated.as_deref())
                        .map(parse_rfc3339_to_unix)
                        .unwrap_or(0);
                    FeedEntry {
                        title: e.title,
                        link,
                        published_unix: ts,
                    }
                })
                .collect();
            Ok(ParsedFeed {
                title: feed.title,
                site_url,
                entries,
            })
        }
        Err(e) => bail!(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>OT Security Watch</title>
  <link>https://otsec.example</link>
  <item>
    <title>PLC advisory &ndash; patch now</title>
    <link>https://otsec.example/advisory-1</link>
    <pubDate>Tue, 06 May 2025 10:00:00 GMT</pubDate>
  </item>
  <item>
    <title>Second item</title>
    <link>https://otsec.example/advisory-2</link>
  </item>
</channel></rss>"#;

    const ATOM: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Alerts - SCADA</title>
  <link rel="self" href="https://alerts.example/feed"/>
  <link rel="alternate" href="https://alerts.example"/>
  <entry>
    <title>Alert one</title>
    <link href="https://alerts.example/url?url=https://real.example/story"/>
    <updated>2025-05-06T10:00:00Z</updated>
  </entry>
</feed>"#;

    #[test]
    fn rss_feed_parses_with_dates() {
        let feed = parse_feed(RSS).unwrap();
        assert_eq!(feed.title.as_deref(), Some("OT Security Watch"));
        assert_eq!(feed.site_url.as_deref(), Some("https://otsec.example"));
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(
            feed.entries[0].link.as_deref(),
            Some("https://otsec.example/advisory-1")
        );
        assert!(feed.entries[0].published_unix > 0);
        assert_eq!(feed.entries[1].published_unix, 0);
    }

    #[test]
    fn atom_feed_prefers_alternate_links() {
        let feed = parse_feed(ATOM).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Alerts - SCADA"));
        assert_eq!(feed.site_url.as_deref(), Some("https://alerts.example"));
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(
            feed.entries[0].link.as_deref(),
            Some("https://alerts.example/url?url=https://real.example/story")
        );
        assert!(feed.entries[0].published_unix > 0);
    }

    #[test]
    fn empty_channel_yields_no_entries() {
        let feed = parse_feed(
            r#"<rss version="2.0"><channel><title>Empty</title></channel></rss>"#,
        )
        .unwrap();
        assert!(feed.entries.is_empty());
    }

    #[test]
    fn non_feed_input_is_an_error() {
        assert!(parse_feed("<html><body>not a feed</body></html>").is_err());
    }
}
