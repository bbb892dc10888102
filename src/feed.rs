//! RSS and Atom feed fetching and parsing.
//!
//! Feeds come from heterogeneous CMSes, so the parser is deliberately
//! permissive: RSS 2.0 `<item>` and Atom `<entry>` elements are handled in
//! one event loop, the richest body field wins (`content:encoded`, then
//! `content`, then `description`/`summary`), and `dc:creator` or Atom
//! `<author><name>` supplies the author. Pagination dialects append
//! `?paged=N` or `?page=N` for CMSes that archive beyond the first page.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::time::Duration;
use tracing::debug;

use crate::config::FeedConfig;

/// One entry from a feed, body still in raw HTML.
#[derive(Debug, Clone, Default)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub guid: String,
    pub author: Option<String>,
    pub published: Option<NaiveDateTime>,
    /// Raw HTML body; normalization strips it to text.
    pub body_html: String,
    pub categories: Vec<String>,
}

/// Parse feed publication dates across common dialects, dropping any
/// timezone offset to naive UTC.
pub fn parse_feed_date(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S").ok()
}

/// URL for page `page` (1-based) of a feed, per its pagination dialect.
pub fn page_url(feed: &FeedConfig, page: u32) -> String {
    if page <= 1 {
        return feed.url.clone();
    }
    let separator = if feed.url.contains('?') { '&' } else { '?' };
    match feed.pagination.as_str() {
        "paged" => format!("{}{}paged={}", feed.url, separator, page),
        "page" => format!("{}{}page={}", feed.url, separator, page),
        _ => feed.url.clone(),
    }
}

/// Fetch one page of a feed.
pub async fn fetch_page(
    client: &reqwest::Client,
    url: &str,
    timeout_secs: u64,
) -> Result<String> {
    let response = client
        .get(url)
        .timeout(Duration::from_secs(timeout_secs))
        .send()
        .await
        .with_context(|| format!("fetching {url}"))?;

    if !response.status().is_success() {
        anyhow::bail!("feed fetch {} returned {}", url, response.status());
    }

    Ok(response.text().await?)
}

// Body fields by richness; a richer field overwrites a poorer one.
fn body_rank(tag: &str) -> u8 {
    match tag {
        "encoded" => 3,
        "content" => 2,
        "description" | "summary" => 1,
        _ => 0,
    }
}

/// Pull the `href` from an Atom `<link>` element, honoring `rel`.
fn atom_link_href(e: &quick_xml::events::BytesStart<'_>) -> Option<String> {
    let mut href = None;
    let mut rel = None;
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"href" => href = Some(String::from_utf8_lossy(&attr.value).into_owned()),
            b"rel" => rel = Some(String::from_utf8_lossy(&attr.value).into_owned()),
            _ => {}
        }
    }
    match rel.as_deref() {
        None | Some("alternate") => href,
        _ => None,
    }
}

/// Parse an RSS 2.0 or Atom document into items.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items: Vec<FeedItem> = Vec::new();
    let mut current: Option<FeedItem> = None;
    let mut body_quality: u8 = 0;
    let mut in_author = false;
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

                if tag == "item" || tag == "entry" {
                    current = Some(FeedItem::default());
                    body_quality = 0;
                } else if tag == "author" {
                    in_author = true;
                } else if tag == "link" {
                    if let (Some(item), Some(href)) = (current.as_mut(), atom_link_href(&e)) {
                        item.link = href;
                    }
                }

                path.push(tag);
            }
            Ok(Event::Empty(e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if tag == "link" {
                    if let (Some(item), Some(href)) = (current.as_mut(), atom_link_href(&e)) {
                        item.link = href;
                    }
                }
            }
            Ok(Event::End(e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if tag == "item" || tag == "entry" {
                    if let Some(item) = current.take() {
                        if !item.link.is_empty() || !item.guid.is_empty() {
                            items.push(item);
                        }
                    }
                } else if tag == "author" {
                    in_author = false;
                }
                path.pop();
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().unwrap_or_default().into_owned();
                apply_text(&mut current, &path, in_author, &mut body_quality, text);
            }
            Ok(Event::CData(t)) => {
                let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                apply_text(&mut current, &path, in_author, &mut body_quality, text);
            }
            Ok(Event::Eof) => break,
            Err(e) => anyhow::bail!("feed parse error at byte {}: {e}", reader.buffer_position()),
            _ => {}
        }
    }

    debug!(items = items.len(), "parsed feed");
    Ok(items)
}

fn apply_text(
    current: &mut Option<FeedItem>,
    path: &[String],
    in_author: bool,
    body_quality: &mut u8,
    text: String,
) {
    let Some(item) = current.as_mut() else {
        return;
    };
    let Some(tag) = path.last().map(String::as_str) else {
        return;
    };
    if text.is_empty() {
        return;
    }

    match tag {
        "title" => {
            if item.title.is_empty() {
                item.title = text;
            }
        }
        "link" => {
            if item.link.is_empty() {
                item.link = text;
            }
        }
        "guid" | "id" => {
            if item.guid.is_empty() {
                item.guid = text;
            }
        }
        "creator" => item.author = Some(text),
        "name" if in_author => {
            if item.author.is_none() {
                item.author = Some(text);
            }
        }
        "pubDate" | "published" | "updated" | "date" => {
            if item.published.is_none() {
                item.published = parse_feed_date(&text);
            }
        }
        "category" => item.categories.push(text),
        other => {
            let rank = body_rank(other);
            if rank > *body_quality {
                item.body_html = text;
                *body_quality = rank;
            } else if rank == *body_quality && rank > 0 {
                item.body_html.push_str(&text);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Test Feed</title>
    <item>
      <title>First Article</title>
      <link>https://example.org/first</link>
      <guid>https://example.org/first</guid>
      <dc:creator>Alan Woods</dc:creator>
      <pubDate>Mon, 06 Sep 2021 10:30:00 +0000</pubDate>
      <category>Economy</category>
      <category>Theory</category>
      <description>Short summary.</description>
      <content:encoded><![CDATA[<p>Full <b>body</b> text of the first article.</p>]]></content:encoded>
    </item>
    <item>
      <title>Second Article</title>
      <link>https://example.org/second</link>
      <guid>second-guid</guid>
      <description>Only a description here.</description>
    </item>
  </channel>
</rss>"#;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Feed</title>
  <entry>
    <title>Atom Entry</title>
    <link rel="alternate" href="https://example.org/atom-entry"/>
    <id>urn:uuid:1234</id>
    <author><name>Ted Grant</name></author>
    <published>2020-03-15T08:00:00Z</published>
    <summary>Atom summary text.</summary>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss_items() {
        let items = parse_feed(RSS_SAMPLE).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.title, "First Article");
        assert_eq!(first.link, "https://example.org/first");
        assert_eq!(first.author.as_deref(), Some("Alan Woods"));
        assert_eq!(first.categories, vec!["Economy", "Theory"]);
        assert!(first.body_html.contains("Full <b>body</b>"));
        let published = first.published.unwrap();
        assert_eq!(published.format("%Y-%m-%d").to_string(), "2021-09-06");
    }

    #[test]
    fn content_encoded_beats_description() {
        let items = parse_feed(RSS_SAMPLE).unwrap();
        assert!(!items[0].body_html.contains("Short summary"));
        assert_eq!(items[1].body_html, "Only a description here.");
    }

    #[test]
    fn parses_atom_entries() {
        let items = parse_feed(ATOM_SAMPLE).unwrap();
        assert_eq!(items.len(), 1);

        let entry = &items[0];
        assert_eq!(entry.title, "Atom Entry");
        assert_eq!(entry.link, "https://example.org/atom-entry");
        assert_eq!(entry.guid, "urn:uuid:1234");
        assert_eq!(entry.author.as_deref(), Some("Ted Grant"));
        assert_eq!(entry.body_html, "Atom summary text.");
        assert!(entry.published.is_some());
    }

    #[test]
    fn date_dialects() {
        assert!(parse_feed_date("Mon, 06 Sep 2021 10:30:00 +0000").is_some());
        assert!(parse_feed_date("2020-03-15T08:00:00Z").is_some());
        assert!(parse_feed_date("2020-03-15T08:00:00").is_some());
        assert!(parse_feed_date("sometime last week").is_none());
    }

    #[test]
    fn pagination_dialects() {
        let mut feed = FeedConfig {
            name: "t".to_string(),
            url: "https://example.org/feed".to_string(),
            pagination: "paged".to_string(),
            max_pages: 5,
        };
        assert_eq!(page_url(&feed, 1), "https://example.org/feed");
        assert_eq!(page_url(&feed, 3), "https://example.org/feed?paged=3");

        feed.url = "https://example.org/feed?format=rss".to_string();
        feed.pagination = "page".to_string();
        assert_eq!(
            page_url(&feed, 2),
            "https://example.org/feed?format=rss&page=2"
        );

        feed.pagination = "none".to_string();
        assert_eq!(page_url(&feed, 2), feed.url);
    }

    #[test]
    fn malformed_xml_errors() {
        assert!(parse_feed("<rss><item><title>x</titl").is_err());
    }
}
