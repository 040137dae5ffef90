//! Dataset files: UTF-8 CSV with a fixed `code,name,urban_rural_code` header.
//!
//! Reading reports the file line of every malformed row. Writing is staged
//! in a temp file next to the destination and renamed into place, so a failed
//! run never leaves a partial dataset behind.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::config::CSV_HEADER;
use crate::error::{DivisionError, Result};
use crate::types::{DivisionCode, Level, Record, UrbanRuralCode};

/// A parsed record together with the file line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub line: u64,
    pub record: Record,
}

/// Serialized form of a record.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    code: &'a str,
    name: &'a str,
    urban_rural_code: &'a str,
}

impl<'a> From<&'a Record> for CsvRow<'a> {
    fn from(record: &'a Record) -> Self {
        Self {
            code: record.code.as_str(),
            name: &record.name,
            urban_rural_code: record.urban_rural_code.as_ref().map_or("", UrbanRuralCode::as_str),
        }
    }
}

/// Read a dataset file.
pub fn read_dataset(path: &Path) -> Result<Vec<Row>> {
    let file = File::open(path)?;
    parse_rows(file)
}

/// Parse dataset rows from any reader.
pub fn parse_rows<R: Read>(reader: R) -> Result<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    let mut record = csv::StringRecord::new();
    let mut header_seen = false;

    loop {
        match reader.read_record(&mut record) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => return Err(csv_read_error(e)),
        }
        let line = record.position().map_or(0, csv::Position::line);

        if !header_seen {
            check_header(&record, line)?;
            header_seen = true;
            continue;
        }

        rows.push(Row {
            line,
            record: parse_record(&record, line)?,
        });
    }

    if !header_seen {
        return Err(DivisionError::Parse {
            line: 1,
            message: "missing header row".to_string(),
        });
    }

    Ok(rows)
}

fn check_header(record: &csv::StringRecord, line: u64) -> Result<()> {
    let fields: Vec<&str> = record
        .iter()
        .enumerate()
        .map(|(i, f)| if i == 0 { f.trim_start_matches('\u{feff}') } else { f })
        .collect();

    if fields != CSV_HEADER {
        return Err(DivisionError::Parse {
            line,
            message: format!(
                "expected header '{}', found '{}'",
                CSV_HEADER.join(","),
                fields.join(",")
            ),
        });
    }
    Ok(())
}

fn parse_record(record: &csv::StringRecord, line: u64) -> Result<Record> {
    let parse_error = |message: String| DivisionError::Parse { line, message };

    if record.len() != CSV_HEADER.len() {
        return Err(parse_error(format!(
            "expected {} columns, found {}",
            CSV_HEADER.len(),
            record.len()
        )));
    }

    let code = DivisionCode::parse(&record[0]).map_err(|e| parse_error(e.to_string()))?;

    let name = &record[1];
    if name.trim().is_empty() {
        return Err(parse_error(format!("empty name for code {code}")));
    }

    let urban_rural_code = match &record[2] {
        "" => None,
        value => Some(value.parse::<UrbanRuralCode>().map_err(parse_error)?),
    };

    match (code.level(), urban_rural_code) {
        (Level::Village, None) => {
            return Err(parse_error(format!(
                "village-level code {code} has no urban-rural code"
            )));
        }
        (level, Some(urc)) if level != Level::Village => {
            return Err(parse_error(format!(
                "urban-rural code {urc} on {level}-level code {code}"
            )));
        }
        _ => {}
    }

    Ok(Record {
        code,
        name: name.to_string(),
        urban_rural_code,
    })
}

fn csv_read_error(err: csv::Error) -> DivisionError {
    let line = err.position().map_or(0, csv::Position::line);
    match err.into_kind() {
        csv::ErrorKind::Io(e) => DivisionError::Io(e),
        csv::ErrorKind::Utf8 { err, .. } => DivisionError::Parse {
            line,
            message: format!("invalid UTF-8: {err}"),
        },
        other => DivisionError::Parse {
            line,
            message: format!("{other:?}"),
        },
    }
}

/// Serialize records, header first, to any writer.
pub fn write_records<'a, W, I>(writer: W, records: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a Record>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    writer.write_record(CSV_HEADER)?;
    for record in records {
        writer.serialize(CsvRow::from(record))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a dataset file atomically.
pub fn write_dataset<'a, I>(path: &Path, records: I) -> Result<()>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut staged = staging_file(path)?;
    write_records(&mut staged, records)?;
    publish(staged, path)
}

/// Create a temp file in the directory that will hold `path`.
pub(crate) fn staging_file(path: &Path) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let staged = tempfile::Builder::new()
        .prefix(".prcadmin-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    Ok(staged)
}

/// Flush a staged file to disk and rename it over `path`.
pub(crate) fn publish(staged: NamedTempFile, path: &Path) -> Result<()> {
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| DivisionError::Io(e.error))?;
    tracing::debug!(path = %path.display(), "published");
    Ok(())
}
