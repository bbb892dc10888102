//! Ingestion pipeline: feeds → normalized articles → metadata store.
//!
//! Each sync walks the configured feeds page by page, strips the HTML
//! bodies down to paragraph-preserving text, extracts vocabulary terms, and
//! upserts by URL. Re-ingesting an unchanged article (same content hash) is
//! a no-op, so syncs are idempotent; a changed body resets the `indexed`
//! and `is_chunked` flags so the next indexing pass picks it up again.

use anyhow::Result;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::Config;
use crate::feed::{self, FeedItem};
use crate::models::Article;
use crate::store::MetadataStore;
use crate::vocab::Vocabulary;

#[derive(Debug, Default, Clone, Copy)]
pub struct SyncStats {
    pub saved: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Strip HTML down to text, turning block boundaries into paragraph breaks.
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut chars = html.chars();

    while let Some(ch) = chars.next() {
        if ch != '<' {
            out.push(ch);
            continue;
        }

        // Consume the tag.
        let mut tag = String::new();
        for t in chars.by_ref() {
            if t == '>' {
                break;
            }
            tag.push(t);
        }

        let name: String = tag
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match name.as_str() {
            "p" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "li" | "blockquote"
            | "tr" => out.push_str("\n\n"),
            "br" => out.push('\n'),
            // Drop script/style bodies entirely.
            "script" | "style" if !tag.starts_with('/') => {
                let closer = format!("</{name}");
                let mut buffer = String::new();
                while let Some(t) = chars.next() {
                    buffer.push(t);
                    if buffer.to_lowercase().ends_with(&closer) {
                        for t in chars.by_ref() {
                            if t == '>' {
                                break;
                            }
                        }
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    decode_entities(&out)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#8217;", "'")
        .replace("&#8216;", "'")
        .replace("&#8220;", "\u{201c}")
        .replace("&#8221;", "\u{201d}")
        .replace("&#8211;", "\u{2013}")
        .replace("&#8212;", "\u{2014}")
}

/// Normalize whitespace: collapse runs inside paragraphs, preserve `\n\n`
/// paragraph boundaries, drop control characters.
pub fn normalize_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();

    let paragraphs: Vec<String> = cleaned
        .split("\n\n")
        .map(|paragraph| {
            paragraph
                .split_whitespace()
                .collect::<Vec<&str>>()
                .join(" ")
        })
        .filter(|p| !p.is_empty())
        .collect();

    paragraphs.join("\n\n")
}

pub fn content_hash(title: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\x00");
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn article_from_item(
    item: &FeedItem,
    source: &str,
    vocab: &Vocabulary,
    min_content_length: usize,
) -> Option<Article> {
    let content = normalize_text(&strip_html(&item.body_html));
    if content.chars().count() < min_content_length {
        return None;
    }

    let title = normalize_text(&strip_html(&item.title));
    if title.is_empty() || item.link.is_empty() {
        return None;
    }

    let summary: String = content.chars().take(300).collect();
    let word_count = crate::chunking::count_words(&content);
    let terms = vocab.extract_term_list(&title, &content);

    Some(Article {
        id: 0,
        url: item.link.clone(),
        guid: if item.guid.is_empty() {
            item.link.clone()
        } else {
            item.guid.clone()
        },
        title,
        content,
        summary,
        source: source.to_string(),
        author: item.author.clone().filter(|a| !a.trim().is_empty()),
        published_date: item.published,
        fetched_date: Some(Utc::now().naive_utc()),
        word_count,
        is_chunked: false,
        indexed: false,
        tags: item.categories.clone(),
        terms,
    })
}

/// Sync all configured feeds into the metadata store.
pub async fn run_sync(
    config: &Config,
    store: &MetadataStore,
    vocab: &Vocabulary,
) -> Result<SyncStats> {
    let client = reqwest::Client::builder()
        .user_agent(config.ingest.user_agent.clone())
        .build()?;

    let mut stats = SyncStats::default();

    for feed_config in &config.ingest.feeds {
        info!(feed = feed_config.name.as_str(), "syncing feed");
        let mut feed_errors = 0usize;

        'pages: for page in 1..=feed_config.max_pages.max(1) {
            let url = feed::page_url(feed_config, page);
            let body = match feed::fetch_page(&client, &url, config.ingest.fetch_timeout_secs).await
            {
                Ok(body) => body,
                Err(e) => {
                    warn!(feed = feed_config.name.as_str(), page, error = %e, "feed fetch failed");
                    stats.errors += 1;
                    feed_errors += 1;
                    break 'pages;
                }
            };

            let items = match feed::parse_feed(&body) {
                Ok(items) => items,
                Err(e) => {
                    warn!(feed = feed_config.name.as_str(), page, error = %e, "feed parse failed");
                    stats.errors += 1;
                    feed_errors += 1;
                    break 'pages;
                }
            };

            if items.is_empty() {
                break 'pages;
            }

            let mut page_new = 0usize;
            for item in &items {
                let Some(article) =
                    article_from_item(item, &feed_config.name, vocab, config.ingest.min_content_length)
                else {
                    stats.skipped += 1;
                    continue;
                };

                let hash = content_hash(&article.title, &article.content);
                match store.upsert_article(&article, &hash).await {
                    Ok(Some(_id)) => {
                        stats.saved += 1;
                        page_new += 1;
                    }
                    Ok(None) => stats.unchanged += 1,
                    Err(e) => {
                        warn!(url = article.url.as_str(), error = %e, "article upsert failed");
                        stats.errors += 1;
                    }
                }
            }

            // A page with nothing new means the archive walk has caught up.
            if page_new == 0 && page > 1 {
                break 'pages;
            }
        }

        if feed_errors > 0 {
            warn!(
                feed = feed_config.name.as_str(),
                errors = feed_errors,
                "feed finished with errors"
            );
        }
    }

    info!(
        saved = stats.saved,
        unchanged = stats.unchanged,
        skipped = stats.skipped,
        errors = stats.errors,
        "sync complete"
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_to_paragraphs() {
        let html = "<p>First paragraph.</p><p>Second <b>bold</b> paragraph.</p>";
        let text = normalize_text(&strip_html(html));
        assert_eq!(text, "First paragraph.\n\nSecond bold paragraph.");
    }

    #[test]
    fn drops_script_and_style() {
        let html = "<p>Keep this.</p><script>var x = 1;</script><style>.a{}</style><p>And this.</p>";
        let text = normalize_text(&strip_html(html));
        assert!(!text.contains("var x"));
        assert!(!text.contains(".a{}"));
        assert!(text.contains("Keep this."));
        assert!(text.contains("And this."));
    }

    #[test]
    fn decodes_common_entities() {
        let text = strip_html("Marx &amp; Engels &#8212; &quot;theory&quot;");
        assert_eq!(text, "Marx & Engels \u{2014} \"theory\"");
    }

    #[test]
    fn normalize_collapses_whitespace() {
        let text = normalize_text("a   b\t c\n\n\n  d  e");
        assert_eq!(text, "a b c\n\nd e");
    }

    #[test]
    fn hash_is_stable_and_sensitive() {
        let a = content_hash("Title", "Body");
        let b = content_hash("Title", "Body");
        let c = content_hash("Title", "Body changed");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn short_items_are_skipped() {
        let vocab = Vocabulary::empty();
        let item = FeedItem {
            title: "T".to_string(),
            link: "https://example.org/x".to_string(),
            body_html: "<p>too short</p>".to_string(),
            ..Default::default()
        };
        assert!(article_from_item(&item, "src", &vocab, 200).is_none());
    }

    #[test]
    fn builds_article_with_terms_and_counts() {
        let vocab_json = serde_json::json!({
            "terms": { "people": ["Lenin"] }
        });
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.json");
        std::fs::write(&path, vocab_json.to_string()).unwrap();
        let vocab = Vocabulary::load(&path).unwrap();

        let body = format!("<p>{}</p>", "Lenin wrote extensively about imperialism. ".repeat(10));
        let item = FeedItem {
            title: "On Lenin".to_string(),
            link: "https://example.org/lenin".to_string(),
            author: Some("Alan Woods".to_string()),
            body_html: body,
            categories: vec!["Theory".to_string()],
            ..Default::default()
        };

        let article = article_from_item(&item, "IDOM", &vocab, 50).unwrap();
        assert_eq!(article.source, "IDOM");
        assert_eq!(article.terms, vec!["Lenin"]);
        assert_eq!(article.tags, vec!["Theory"]);
        assert!(article.word_count > 40);
        assert_eq!(article.guid, article.url);
    }
}
