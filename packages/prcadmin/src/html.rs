//! Extraction of division table rows from provider pages.
//!
//! Every page lists the divisions of exactly one level as `<tr>` rows whose
//! class is the level name followed by `tr` (`provincetr`, `citytr`, ...).
//! Header rows (`countyhead`, ...) are ignored.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::Level;

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static ROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<tr\b[^>]*\bclass\s*=\s*["']?(province|city|county|town|village)tr\b[^>]*>(.*?)</tr\s*>"#,
    )
    .expect("valid regex")
});

#[allow(clippy::expect_used)]
static CELL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td\s*>").expect("valid regex"));

#[allow(clippy::expect_used)]
static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']*)["']"#).expect("valid regex")
});

#[allow(clippy::expect_used)]
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

/// One `<td>` of a division row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Visible text, tags stripped, entities decoded, trimmed.
    pub text: String,
    /// Target of the first link in the cell, if it has a non-empty one.
    pub href: Option<String>,
}

/// All division rows of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub level: Level,
    pub rows: Vec<Vec<Cell>>,
}

/// Extract the division table of a page.
///
/// Levels are tried from province down; the first level with any rows wins.
/// Returns `None` when the page has no division rows at all.
pub fn extract_table(html: &str) -> Option<Table> {
    let mut found: Vec<(Level, &str)> = Vec::new();
    for caps in ROW_RE.captures_iter(html) {
        let (Some(class), Some(body)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        if let Some(level) = level_from_class(class.as_str()) {
            found.push((level, body.as_str()));
        }
    }

    let level = Level::ALL
        .into_iter()
        .find(|level| found.iter().any(|(l, _)| l == level))?;

    let rows = found
        .into_iter()
        .filter(|(l, _)| *l == level)
        .map(|(_, body)| extract_cells(body))
        .collect();

    Some(Table { level, rows })
}

fn level_from_class(class: &str) -> Option<Level> {
    Level::ALL
        .into_iter()
        .find(|level| level.as_str().eq_ignore_ascii_case(class))
}

fn extract_cells(row: &str) -> Vec<Cell> {
    CELL_RE
        .captures_iter(row)
        .filter_map(|caps| caps.get(1))
        .map(|inner| {
            let inner = inner.as_str();
            let href = HREF_RE
                .captures(inner)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|h| !h.is_empty());
            Cell {
                text: cell_text(inner),
                href,
            }
        })
        .collect()
}

/// Strip tags and decode the entities the provider uses.
pub fn cell_text(inner: &str) -> String {
    let stripped = TAG_RE.replace_all(inner, "");
    decode_entities(&stripped).trim().to_string()
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
