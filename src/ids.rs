//! Unit identifiers for the vector index.
//!
//! Every indexed unit is either a whole article or a chunk of one, tagged by
//! a stable string ID:
//!
//! ```text
//! a_12345      non-chunked article 12345
//! c_12345_0    chunk 0 of article 12345
//! ```
//!
//! The prefix makes collisions impossible, the ID is self-describing, and a
//! chunk ID encodes its parent so deduplication never needs a database
//! round-trip. Parsing is strict: anything that is not exactly one of the two
//! forms above is a [`SearchError::MalformedId`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::SearchError;

const ARTICLE_PREFIX: &str = "a_";
const CHUNK_PREFIX: &str = "c_";

/// A parsed indexed-unit identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitId {
    /// A whole article embedded as a single unit.
    Article { article_id: i64 },
    /// One chunk of a long article. `chunk_index` is zero-based.
    Chunk { article_id: i64, chunk_index: i64 },
}

impl UnitId {
    pub fn article(article_id: i64) -> Self {
        UnitId::Article { article_id }
    }

    pub fn chunk(article_id: i64, chunk_index: i64) -> Self {
        UnitId::Chunk {
            article_id,
            chunk_index,
        }
    }

    /// Parent article ID, regardless of variant.
    pub fn article_id(&self) -> i64 {
        match *self {
            UnitId::Article { article_id } => article_id,
            UnitId::Chunk { article_id, .. } => article_id,
        }
    }

    pub fn is_chunk(&self) -> bool {
        matches!(self, UnitId::Chunk { .. })
    }

    /// Chunk index, or 0 for whole articles.
    pub fn chunk_index(&self) -> i64 {
        match *self {
            UnitId::Article { .. } => 0,
            UnitId::Chunk { chunk_index, .. } => chunk_index,
        }
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            UnitId::Article { article_id } => write!(f, "{ARTICLE_PREFIX}{article_id}"),
            UnitId::Chunk {
                article_id,
                chunk_index,
            } => write!(f, "{CHUNK_PREFIX}{article_id}_{chunk_index}"),
        }
    }
}

impl FromStr for UnitId {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix(ARTICLE_PREFIX) {
            let article_id: i64 = rest
                .parse()
                .map_err(|_| SearchError::MalformedId(s.to_string()))?;
            return Ok(UnitId::Article { article_id });
        }

        if let Some(rest) = s.strip_prefix(CHUNK_PREFIX) {
            // Exactly two integers separated by a single underscore.
            let mut parts = rest.split('_');
            let (a, k) = match (parts.next(), parts.next(), parts.next()) {
                (Some(a), Some(k), None) => (a, k),
                _ => return Err(SearchError::MalformedId(s.to_string())),
            };
            let article_id: i64 = a
                .parse()
                .map_err(|_| SearchError::MalformedId(s.to_string()))?;
            let chunk_index: i64 = k
                .parse()
                .map_err(|_| SearchError::MalformedId(s.to_string()))?;
            return Ok(UnitId::Chunk {
                article_id,
                chunk_index,
            });
        }

        Err(SearchError::MalformedId(s.to_string()))
    }
}

/// Group unit IDs by their parent article.
///
/// Used by deduplication: all chunks of one article collapse to a single
/// result downstream.
pub fn group_by_article(ids: &[UnitId]) -> HashMap<i64, Vec<UnitId>> {
    let mut groups: HashMap<i64, Vec<UnitId>> = HashMap::new();
    for id in ids {
        groups.entry(id.article_id()).or_default().push(*id);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_roundtrip() {
        let id = UnitId::article(12345);
        assert_eq!(id.to_string(), "a_12345");
        assert_eq!("a_12345".parse::<UnitId>().unwrap(), id);
    }

    #[test]
    fn chunk_roundtrip() {
        let id = UnitId::chunk(12345, 3);
        assert_eq!(id.to_string(), "c_12345_3");
        assert_eq!("c_12345_3".parse::<UnitId>().unwrap(), id);
    }

    #[test]
    fn article_id_accessor() {
        assert_eq!(UnitId::article(7).article_id(), 7);
        assert_eq!(UnitId::chunk(7, 2).article_id(), 7);
        assert_eq!(UnitId::chunk(7, 2).chunk_index(), 2);
        assert_eq!(UnitId::article(7).chunk_index(), 0);
    }

    #[test]
    fn rejects_unknown_prefix() {
        assert!("x_12".parse::<UnitId>().is_err());
        assert!("12345".parse::<UnitId>().is_err());
        assert!("".parse::<UnitId>().is_err());
    }

    #[test]
    fn rejects_non_integer_suffix() {
        assert!("a_abc".parse::<UnitId>().is_err());
        assert!("a_".parse::<UnitId>().is_err());
        assert!("c_12_x".parse::<UnitId>().is_err());
        assert!("c_x_0".parse::<UnitId>().is_err());
    }

    #[test]
    fn rejects_wrong_chunk_arity() {
        assert!("c_12".parse::<UnitId>().is_err());
        assert!("c_12_0_1".parse::<UnitId>().is_err());
    }

    #[test]
    fn groups_by_parent_article() {
        let ids = vec![
            UnitId::article(100),
            UnitId::chunk(200, 0),
            UnitId::chunk(200, 1),
            UnitId::article(300),
        ];
        let groups = group_by_article(&ids);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[&200].len(), 2);
        assert_eq!(groups[&100], vec![UnitId::article(100)]);
    }
}
