//! Fetch a year's division table from the provider and write it as a dataset.

use std::collections::{HashSet, VecDeque};
use std::path::Path;

use reqwest::Url;

use crate::config::{validate_year, FetchConfig};
use crate::dataset::{publish, staging_file, write_records, Row};
use crate::error::{DivisionError, Result};
use crate::html::{extract_table, Cell};
use crate::http::{create_client, fetch_page, Fetched};
use crate::normalizer::normalize_records;
use crate::types::{DivisionCode, HierarchyGap, Level, Record, UrbanRuralCode};

/// Counters reported after every page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlProgress {
    pub pages_scanned: usize,
    pub pages_queued: usize,
    pub divisions_saved: usize,
}

/// Records and links found on one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub records: Vec<Record>,
    pub links: Vec<Url>,
}

/// Everything collected for one year.
#[derive(Debug, Clone, Default)]
pub struct Crawl {
    pub records: Vec<Record>,
    pub pages_scanned: usize,
    /// Linked pages the provider answered 404 for.
    pub missing_pages: Vec<String>,
}

/// How to post-process a crawl before writing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Sort and validate the rows before publishing.
    pub normalize: bool,
}

/// Summary of a completed fetch.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub year: u16,
    pub rows: usize,
    pub pages_scanned: usize,
    pub missing_pages: Vec<String>,
    /// Only computed when the rows were normalized.
    pub gaps: Vec<HierarchyGap>,
}

/// Fetch the table for `year` and write it to `output`.
///
/// The staging file is created next to `output` before the crawl starts, so
/// an unwritable destination fails before any request is made. `output` is
/// only replaced once the whole table has been crawled; a failed run leaves
/// it untouched.
pub fn fetch_year(
    config: &FetchConfig,
    year: u16,
    output: &Path,
    options: FetchOptions,
    on_progress: impl FnMut(&CrawlProgress),
) -> Result<FetchReport> {
    validate_year(year)?;
    let mut staged = staging_file(output)?;

    let crawl = crawl_year(config, year, on_progress)?;

    let (records, gaps) = if options.normalize {
        // Rows are numbered as they would appear in the unsorted file.
        let rows = crawl
            .records
            .into_iter()
            .enumerate()
            .map(|(i, record)| Row {
                line: i as u64 + 2,
                record,
            })
            .collect();
        normalize_records(rows)?
    } else {
        (crawl.records, Vec::new())
    };

    write_records(&mut staged, &records)?;
    publish(staged, output)?;
    tracing::info!(
        year,
        rows = records.len(),
        pages = crawl.pages_scanned,
        output = %output.display(),
        "saved division table"
    );

    Ok(FetchReport {
        year,
        rows: records.len(),
        pages_scanned: crawl.pages_scanned,
        missing_pages: crawl.missing_pages,
        gaps,
    })
}

/// Crawl every page of the table for `year`, breadth first.
pub fn crawl_year(
    config: &FetchConfig,
    year: u16,
    mut on_progress: impl FnMut(&CrawlProgress),
) -> Result<Crawl> {
    validate_year(year)?;

    let entry = config.year_url(year);
    let entry_url = parse_url(&entry)?;
    let client = create_client(config)?;

    let mut queue: VecDeque<Url> = VecDeque::from([entry_url.clone()]);
    let mut seen: HashSet<Url> = HashSet::from([entry_url.clone()]);
    let mut crawl = Crawl::default();

    while let Some(url) = queue.pop_front() {
        tracing::debug!(url = %url, "fetching page");
        let body = match fetch_page(&client, url.as_str(), config)? {
            Fetched::Page(body) => body,
            Fetched::NotFound if url == entry_url => {
                return Err(DivisionError::NotFound { year });
            }
            Fetched::NotFound => {
                tracing::warn!(url = %url, "linked page not found, skipping");
                crawl.missing_pages.push(url.to_string());
                continue;
            }
        };

        let page = parse_page(&body, &url)?;
        crawl.pages_scanned += 1;
        crawl.records.extend(page.records);
        for link in page.links {
            if seen.insert(link.clone()) {
                queue.push_back(link);
            }
        }

        on_progress(&CrawlProgress {
            pages_scanned: crawl.pages_scanned,
            pages_queued: queue.len(),
            divisions_saved: crawl.records.len(),
        });
    }

    Ok(crawl)
}

/// Turn one provider page into records and child page links.
pub fn parse_page(html: &str, url: &Url) -> Result<Page> {
    let format_error = |message: String| DivisionError::SourceFormat {
        url: url.to_string(),
        message,
    };

    let table = extract_table(html)
        .ok_or_else(|| format_error("no division rows found".to_string()))?;

    let mut page = Page::default();
    for cells in &table.rows {
        match table.level {
            Level::Province => {
                // Each cell is one province; its code is only in the link.
                for cell in cells {
                    let href = cell.href.as_deref().ok_or_else(|| {
                        format_error(format!("province '{}' has no link", cell.text))
                    })?;
                    let stem = link_stem(href);
                    let code = DivisionCode::from_prefix(stem)
                        .map_err(|e| format_error(e.to_string()))?;
                    page.records.push(Record {
                        code,
                        name: required_name(cell, &format_error)?,
                        urban_rural_code: None,
                    });
                    page.links.push(join(url, href)?);
                }
            }
            Level::City | Level::County | Level::Town => {
                let [code_cell, name_cell] = cells.as_slice() else {
                    return Err(format_error(format!(
                        "{} row has {} cells, expected 2",
                        table.level,
                        cells.len()
                    )));
                };
                let code = DivisionCode::parse(&code_cell.text)
                    .map_err(|e| format_error(e.to_string()))?;
                page.records.push(Record {
                    code,
                    name: required_name(name_cell, &format_error)?,
                    urban_rural_code: None,
                });
                if let Some(href) = &code_cell.href {
                    page.links.push(join(url, href)?);
                }
            }
            Level::Village => {
                let [code_cell, class_cell, name_cell] = cells.as_slice() else {
                    return Err(format_error(format!(
                        "village row has {} cells, expected 3",
                        cells.len()
                    )));
                };
                let code = DivisionCode::parse(&code_cell.text)
                    .map_err(|e| format_error(e.to_string()))?;
                let urban_rural_code = class_cell
                    .text
                    .parse::<UrbanRuralCode>()
                    .map_err(&format_error)?;
                page.records.push(Record {
                    code,
                    name: required_name(name_cell, &format_error)?,
                    urban_rural_code: Some(urban_rural_code),
                });
            }
        }
    }

    Ok(page)
}

fn required_name(cell: &Cell, format_error: &impl Fn(String) -> DivisionError) -> Result<String> {
    if cell.text.is_empty() {
        return Err(format_error("division without name".to_string()));
    }
    Ok(cell.text.clone())
}

/// `"../11/1101.html"` -> `"1101"`.
fn link_stem(href: &str) -> &str {
    let file = href.rsplit('/').next().unwrap_or(href);
    file.split('.').next().unwrap_or(file)
}

fn join(base: &Url, href: &str) -> Result<Url> {
    base.join(href).map_err(|e| DivisionError::InvalidUrl {
        url: href.to_string(),
        message: e.to_string(),
    })
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| DivisionError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })
}
