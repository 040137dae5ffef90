//! The `patches/` collection: one immutable patch per year transition.
//!
//! `Y.patch` holds the diff from the normalized snapshot of year `Y - 1` to
//! that of year `Y`. Older years are regenerated from the current snapshot
//! by applying patches in reverse, newest first.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::dataset::{publish, staging_file};
use crate::error::{DivisionError, Result};
use crate::patch::{Direction, PatchTool};

/// File name the current snapshot is published under.
pub const CURRENT_FILE_NAME: &str = "current.csv";

/// Extension of patch files.
pub const PATCH_EXTENSION: &str = "patch";

/// A directory of year patches.
#[derive(Debug, Clone)]
pub struct PatchArchive {
    dir: PathBuf,
}

impl PatchArchive {
    /// Open the archive at `dir`. The directory is created on first record.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn patch_path(&self, year: u16) -> PathBuf {
        self.dir.join(format!("{year}.{PATCH_EXTENSION}"))
    }

    /// Years that have a patch, ascending. Files not named `<year>.patch`
    /// are ignored.
    pub fn years(&self) -> Result<Vec<u16>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut years = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PATCH_EXTENSION) {
                continue;
            }
            if let Some(year) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u16>().ok())
            {
                years.push(year);
            }
        }
        years.sort_unstable();
        Ok(years)
    }

    /// Newest year with a patch, which is the year of the current snapshot.
    pub fn latest_year(&self) -> Result<Option<u16>> {
        Ok(self.years()?.last().copied())
    }

    /// Record the transition from `previous` (year `year - 1`) to `current`
    /// (year `year`) as `year.patch`.
    ///
    /// Existing patches are never replaced.
    pub fn record(
        &self,
        tool: &impl PatchTool,
        previous: &Path,
        current: &Path,
        year: u16,
    ) -> Result<PathBuf> {
        let path = self.patch_path(year);
        if path.exists() {
            return Err(DivisionError::PatchExists { year });
        }

        let diff = tool
            .diff(previous, current, CURRENT_FILE_NAME)?
            .ok_or(DivisionError::NoChanges { year })?;

        fs::create_dir_all(&self.dir)?;
        let mut staged = staging_file(&path)?;
        staged.write_all(diff.as_bytes())?;
        staged.as_file().sync_all()?;
        staged.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                DivisionError::PatchExists { year }
            } else {
                DivisionError::Io(e.error)
            }
        })?;

        tracing::info!(year, path = %path.display(), "recorded patch");
        Ok(path)
    }

    /// Regenerate the snapshot of `target_year` from the snapshot of
    /// `current_year` and write it to `output`.
    pub fn restore(
        &self,
        tool: &impl PatchTool,
        current: &Path,
        current_year: u16,
        target_year: u16,
        output: &Path,
    ) -> Result<()> {
        if target_year > current_year {
            return Err(DivisionError::NotFound { year: target_year });
        }

        if target_year == current_year {
            let mut staged = staging_file(output)?;
            let mut source = fs::File::open(current)?;
            std::io::copy(&mut source, &mut staged)?;
            return publish(staged, output);
        }

        // target_year < current_year, so target_year + 1 cannot overflow.
        let oldest = target_year + 1;
        let chain: Vec<u16> = (oldest..=current_year).rev().collect();
        if let Some(&year) = chain.iter().find(|&&y| !self.patch_path(y).is_file()) {
            return Err(DivisionError::MissingPatch { year });
        }

        let stage_parent = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let stage = tempfile::Builder::new()
            .prefix(".prcadmin-restore-")
            .tempdir_in(stage_parent)?;

        let mut source = current.to_path_buf();
        for &year in &chain {
            let destination = if year == oldest {
                output.to_path_buf()
            } else {
                stage.path().join(format!("{}.csv", year - 1))
            };
            tracing::debug!(year, from = %source.display(), to = %destination.display(), "reversing patch");
            tool.apply(&source, &self.patch_path(year), Direction::Reverse, &destination)?;
            source = destination;
        }

        tracing::info!(
            current_year,
            target_year,
            patches = chain.len(),
            output = %output.display(),
            "restored snapshot"
        );
        Ok(())
    }
}
