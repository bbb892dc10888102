//! Smart excerpt builder.
//!
//! Excerpts are centered on the first matched exact phrase when one exists.
//! Title-weighted indexing means a body can open with copies of the title;
//! a match inside that replica prefix is a poor window, so a later
//! occurrence is preferred when present. Without a phrase match the excerpt
//! is simply the opening of the body.

use crate::rank::whole_word_regex;

const EXCERPT_LENGTH: usize = 200;
const CONTEXT_CHARS: usize = 100;

/// Clamp a byte position to the nearest char boundary at or below it.
fn floor_char_boundary(text: &str, mut pos: usize) -> usize {
    pos = pos.min(text.len());
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Clamp a byte position to the nearest char boundary at or above it.
fn ceil_char_boundary(text: &str, mut pos: usize) -> usize {
    pos = pos.min(text.len());
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

/// Build `(excerpt, matched_phrase)` for one result.
///
/// The window is `CONTEXT_CHARS` bytes either side of the first whole-word
/// match of the first matching phrase, with `…` marking truncation. With no
/// phrase match, the first [`EXCERPT_LENGTH`] characters are returned and
/// `matched_phrase` is `None`.
pub fn smart_excerpt(
    content: &str,
    title: &str,
    exact_phrases: &[String],
) -> (String, Option<String>) {
    if content.is_empty() {
        return (String::new(), None);
    }

    for phrase in exact_phrases {
        let Some(pattern) = whole_word_regex(phrase) else {
            continue;
        };
        let Some(m) = pattern.find(content) else {
            continue;
        };

        let mut pos = m.start();
        let match_len = m.len();

        // When the match falls inside a leading replica of the title,
        // prefer an occurrence in the body proper.
        if !title.is_empty() {
            let content_lower = content.to_lowercase();
            let title_lower = title.to_lowercase();
            if let Some(title_pos) = content_lower.find(&title_lower) {
                let title_end = title_pos + title_lower.len();
                if pos < title_end {
                    let search_from = ceil_char_boundary(content, title_end);
                    if let Some(later) = pattern.find(&content[search_from..]) {
                        pos = search_from + later.start();
                    }
                }
            }
        }

        let start = floor_char_boundary(content, pos.saturating_sub(CONTEXT_CHARS));
        let end = ceil_char_boundary(content, pos + match_len + CONTEXT_CHARS);

        let mut excerpt = content[start..end].trim().to_string();
        if start > 0 {
            excerpt = format!("…{excerpt}");
        }
        if end < content.len() {
            excerpt = format!("{excerpt}…");
        }

        return (excerpt, Some(phrase.clone()));
    }

    // No phrase matched: lead of the body.
    let cut = ceil_char_boundary(content, EXCERPT_LENGTH);
    let mut excerpt = content[..cut].trim().to_string();
    if cut < content.len() {
        excerpt.push('…');
    }
    (excerpt, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrases(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_content() {
        let (excerpt, matched) = smart_excerpt("", "Title", &phrases(&["x"]));
        assert!(excerpt.is_empty());
        assert!(matched.is_none());
    }

    #[test]
    fn no_phrase_returns_lead() {
        let body = "word ".repeat(100);
        let (excerpt, matched) = smart_excerpt(&body, "Title", &[]);
        assert!(matched.is_none());
        assert!(excerpt.ends_with('…'));
        assert!(excerpt.len() <= EXCERPT_LENGTH + '…'.len_utf8());
    }

    #[test]
    fn short_body_has_no_ellipsis() {
        let (excerpt, matched) = smart_excerpt("A short body.", "Title", &[]);
        assert_eq!(excerpt, "A short body.");
        assert!(matched.is_none());
    }

    #[test]
    fn centers_on_phrase() {
        let body = format!(
            "{} the permanent revolution appears here {}",
            "lead ".repeat(60),
            "tail ".repeat(60)
        );
        let (excerpt, matched) = smart_excerpt(&body, "", &phrases(&["permanent revolution"]));
        assert_eq!(matched.as_deref(), Some("permanent revolution"));
        assert!(excerpt.to_lowercase().contains("permanent revolution"));
        assert!(excerpt.starts_with('…'));
        assert!(excerpt.ends_with('…'));
    }

    #[test]
    fn phrase_match_is_whole_word() {
        let body = "the laborious elaborate process continues for a while here";
        let (_, matched) = smart_excerpt(body, "", &phrases(&["labor"]));
        assert!(matched.is_none());
    }

    #[test]
    fn prefers_occurrence_past_title_replica() {
        // Title-weighted body: the title (containing the phrase) repeats at
        // the front, with the real mention much later.
        let title = "On Permanent Revolution";
        let body = format!(
            "On Permanent Revolution {} the theory of permanent revolution holds that…",
            "filler ".repeat(50)
        );
        let (excerpt, matched) = smart_excerpt(&body, title, &phrases(&["permanent revolution"]));
        assert_eq!(matched.as_deref(), Some("permanent revolution"));
        assert!(excerpt.to_lowercase().contains("theory of permanent revolution"));
    }

    #[test]
    fn title_occurrence_still_used_when_body_has_none() {
        let title = "On Permanent Revolution";
        let body = format!("On Permanent Revolution {}", "other text ".repeat(40));
        let (excerpt, matched) = smart_excerpt(&body, title, &phrases(&["permanent revolution"]));
        assert_eq!(matched.as_deref(), Some("permanent revolution"));
        assert!(excerpt.to_lowercase().contains("permanent revolution"));
    }

    #[test]
    fn first_matching_phrase_wins() {
        let body = "alpha beta gamma delta";
        let (_, matched) = smart_excerpt(body, "", &phrases(&["missing", "gamma"]));
        assert_eq!(matched.as_deref(), Some("gamma"));
    }

    #[test]
    fn multibyte_content_is_safe() {
        let body = format!("{}permanent revolution{}", "é".repeat(150), "ü".repeat(150));
        let (excerpt, matched) = smart_excerpt(&body, "", &phrases(&["permanent revolution"]));
        assert_eq!(matched.as_deref(), Some("permanent revolution"));
        assert!(excerpt.contains("permanent revolution"));
    }
}
