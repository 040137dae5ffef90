//! Canonical ordering of dataset files.
//!
//! Patches between years are only minimal when both snapshots list their
//! rows in the same order, so normalization must be deterministic: the same
//! rows always produce the same bytes, and normalizing a normalized file is a
//! no-op.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::dataset::{read_dataset, write_dataset, Row};
use crate::error::{DivisionError, Result};
use crate::types::{DivisionCode, HierarchyGap, Record};

/// Outcome of a normalization or check run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub rows: usize,
    pub gaps: Vec<HierarchyGap>,
}

/// Validate uniqueness and sort rows ascending by code.
///
/// Returns the sorted records and the hierarchy gaps found. Gaps are known
/// upstream data issues and do not fail the run.
pub fn normalize_records(rows: Vec<Row>) -> Result<(Vec<Record>, Vec<HierarchyGap>)> {
    let mut first_seen: HashMap<DivisionCode, u64> = HashMap::with_capacity(rows.len());
    for row in &rows {
        if let Some(&first_line) = first_seen.get(&row.record.code) {
            return Err(DivisionError::DuplicateCode {
                code: row.record.code.to_string(),
                first_line,
                line: row.line,
            });
        }
        first_seen.insert(row.record.code.clone(), row.line);
    }

    let mut records: Vec<Record> = rows.into_iter().map(|row| row.record).collect();
    // Codes are unique at this point, so the order is total.
    records.sort_by(|a, b| a.code.cmp(&b.code));

    let gaps = find_gaps(&records);
    Ok((records, gaps))
}

/// Codes whose parent division is missing from the same dataset.
pub fn find_gaps(records: &[Record]) -> Vec<HierarchyGap> {
    let codes: HashSet<&DivisionCode> = records.iter().map(|r| &r.code).collect();
    records
        .iter()
        .filter_map(|r| {
            let parent = r.code.parent()?;
            (!codes.contains(&parent)).then(|| HierarchyGap {
                code: r.code.clone(),
                missing_parent: parent,
            })
        })
        .collect()
}

/// Read `input`, normalize it and write the result to `output`.
///
/// `input` and `output` may be the same path. Nothing is written unless the
/// whole file parses and validates.
pub fn normalize_file(input: &Path, output: &Path) -> Result<NormalizeReport> {
    let rows = read_dataset(input)?;
    let (records, gaps) = normalize_records(rows)?;
    log_gaps(&gaps);

    write_dataset(output, &records)?;
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        rows = records.len(),
        gaps = gaps.len(),
        "normalized dataset"
    );

    Ok(NormalizeReport {
        rows: records.len(),
        gaps,
    })
}

/// Validate a dataset file without writing anything.
pub fn check_file(input: &Path) -> Result<NormalizeReport> {
    let rows = read_dataset(input)?;
    let (records, gaps) = normalize_records(rows)?;
    log_gaps(&gaps);
    Ok(NormalizeReport {
        rows: records.len(),
        gaps,
    })
}

fn log_gaps(gaps: &[HierarchyGap]) {
    for gap in gaps {
        tracing::warn!(
            code = %gap.code,
            missing_parent = %gap.missing_parent,
            "division has no parent in dataset"
        );
    }
}
