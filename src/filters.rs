//! Attribute filters for search results.
//!
//! Filters arrive from the UI (JSON) or from query syntax (`author:"…"`).
//! On the vector path they are applied in application code against the
//! filter projection; on the database path the same semantics are
//! materialized as parameterized SQL predicates. Date presets are anchored
//! to the current UTC date; custom dates are inclusive ISO days, and an
//! invalid date makes its predicate false rather than erroring the query.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::UnitRow;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Preset: `past_week`, `past_month`, `past_3months`, `past_year`,
    /// `2020s`, `2010s`, `2000s`, `1990s`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<String>,
    /// Inclusive ISO date (`YYYY-MM-DD`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_word_count: Option<i64>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.author.is_none()
            && self.date_range.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.published_year.is_none()
            && self.min_word_count.is_none()
    }

    fn has_date_filter(&self) -> bool {
        self.date_range.as_deref().is_some_and(|d| !d.is_empty())
            || self.start_date.is_some()
            || self.end_date.is_some()
    }
}

/// Escape `LIKE` metacharacters for use with `ESCAPE '\'`.
pub fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Filters compiled for one query: author token regexes are built once and
/// reused across the whole candidate set.
pub struct FilterMatcher {
    filters: SearchFilters,
    author_tokens: Vec<Regex>,
    now: NaiveDateTime,
}

impl FilterMatcher {
    pub fn new(filters: SearchFilters, now: NaiveDateTime) -> Self {
        let author_tokens = filters
            .author
            .as_deref()
            .unwrap_or("")
            .split_whitespace()
            .filter_map(|token| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(token))).ok()
            })
            .collect();

        Self {
            filters,
            author_tokens,
            now,
        }
    }

    pub fn matches(&self, row: &UnitRow) -> bool {
        if let Some(source) = &self.filters.source {
            if &row.source != source {
                return false;
            }
        }

        if !self.author_tokens.is_empty() {
            let Some(author) = row.author.as_deref() else {
                return false;
            };
            if !self.author_tokens.iter().all(|re| re.is_match(author)) {
                return false;
            }
        }

        if let Some(year) = self.filters.published_year {
            if row.published_year != Some(year) {
                return false;
            }
        }

        if let Some(min_words) = self.filters.min_word_count {
            if row.word_count < min_words {
                return false;
            }
        }

        self.matches_date(row)
    }

    fn matches_date(&self, row: &UnitRow) -> bool {
        if !self.filters.has_date_filter() {
            return true;
        }

        let preset = self
            .filters
            .date_range
            .as_deref()
            .unwrap_or("")
            .to_lowercase();

        // Decade presets only need the year.
        if let Some(decade) = decade_bounds(&preset) {
            return match row.published_year {
                Some(year) => year >= decade.0 && year <= decade.1,
                None => false,
            };
        }

        let Some(pub_date) = row.published_date else {
            return false;
        };

        if let Some(days) = preset_age_days(&preset) {
            let cutoff = self.now - Duration::days(days);
            return pub_date >= cutoff;
        }

        // Custom inclusive ISO range. Invalid dates make the predicate false.
        let start = self.filters.start_date.as_deref().map(parse_iso_date);
        let end = self.filters.end_date.as_deref().map(parse_iso_date);

        match (start, end) {
            (Some(None), _) | (_, Some(None)) => false,
            (Some(Some(start)), Some(Some(end))) => {
                pub_date.date() >= start && pub_date.date() <= end
            }
            (Some(Some(start)), None) => pub_date.date() >= start,
            (None, Some(Some(end))) => pub_date.date() <= end,
            (None, None) => true,
        }
    }
}

fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn preset_age_days(preset: &str) -> Option<i64> {
    match preset {
        "past_week" => Some(7),
        "past_month" => Some(30),
        "past_3months" => Some(90),
        "past_year" => Some(365),
        _ => None,
    }
}

fn decade_bounds(preset: &str) -> Option<(i32, i32)> {
    match preset {
        "2020s" => Some((2020, 2029)),
        "2010s" => Some((2010, 2019)),
        "2000s" => Some((2000, 2009)),
        "1990s" => Some((1990, 1999)),
        _ => None,
    }
}

/// Materialize the filters as SQL predicates for the database path.
///
/// Pushes `(condition, bind)` pairs; conditions reference the `articles`
/// alias `a`. All user values are bound, never interpolated.
pub fn push_sql_predicates(
    filters: &SearchFilters,
    now: NaiveDateTime,
    conditions: &mut Vec<String>,
    binds: &mut Vec<String>,
) {
    if let Some(author) = filters.author.as_deref().filter(|a| !a.trim().is_empty()) {
        conditions.push("LOWER(a.author) LIKE ? ESCAPE '\\'".to_string());
        binds.push(format!("%{}%", escape_like(&author.to_lowercase())));
    }

    if let Some(source) = &filters.source {
        conditions.push("a.source = ?".to_string());
        binds.push(source.clone());
    }

    if let Some(year) = filters.published_year {
        conditions.push("CAST(strftime('%Y', a.published_date) AS INTEGER) = ?".to_string());
        binds.push(year.to_string());
    }

    if let Some(min_words) = filters.min_word_count {
        conditions.push("a.word_count >= ?".to_string());
        binds.push(min_words.to_string());
    }

    let preset = filters.date_range.as_deref().unwrap_or("").to_lowercase();
    if let Some(days) = preset_age_days(&preset) {
        let cutoff = (now - Duration::days(days)).date();
        conditions.push("a.published_date >= ?".to_string());
        binds.push(cutoff.format("%Y-%m-%d").to_string());
    } else if let Some((lo, hi)) = decade_bounds(&preset) {
        conditions
            .push("CAST(strftime('%Y', a.published_date) AS INTEGER) BETWEEN ? AND ?".to_string());
        binds.push(lo.to_string());
        binds.push(hi.to_string());
    }

    if let Some(start) = filters.start_date.as_deref() {
        match parse_iso_date(start) {
            Some(date) => {
                conditions.push("a.published_date >= ?".to_string());
                binds.push(date.format("%Y-%m-%d").to_string());
            }
            // Unparseable date: force an empty result for this predicate.
            None => conditions.push("0 = 1".to_string()),
        }
    }
    if let Some(end) = filters.end_date.as_deref() {
        match parse_iso_date(end) {
            Some(date) => {
                // Inclusive end of day.
                conditions.push("a.published_date <= ?".to_string());
                binds.push(format!("{}T23:59:59", date.format("%Y-%m-%d")));
            }
            None => conditions.push("0 = 1".to_string()),
        }
    }
}
