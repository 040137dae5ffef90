//! Line-level diff and patch, delegated to external tools.
//!
//! Year-over-year patches are plain unified diffs. Computing and applying
//! them is left to the standard `diff` and `patch` programs behind the
//! [`PatchTool`] trait.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Output};

use crate::dataset::{publish, staging_file};
use crate::error::{DivisionError, Result};

/// Direction in which to apply a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Old snapshot to new snapshot.
    Forward,
    /// New snapshot back to old snapshot.
    Reverse,
}

/// Diff/apply capability over files.
pub trait PatchTool {
    /// Unified diff turning `old` into `new`, `None` if they are identical.
    ///
    /// `label` names the file in the diff headers, so patches do not depend
    /// on where the compared files happened to live.
    fn diff(&self, old: &Path, new: &Path, label: &str) -> Result<Option<String>>;

    /// Apply `patch` to `target`, writing the result to `output`.
    ///
    /// `target` is left unchanged. `output` is only replaced if the patch
    /// applies cleanly.
    fn apply(&self, target: &Path, patch: &Path, direction: Direction, output: &Path)
        -> Result<()>;
}

/// [`PatchTool`] backed by the `diff` and `patch` programs.
#[derive(Debug, Clone)]
pub struct DiffUtils {
    diff_program: String,
    patch_program: String,
}

impl Default for DiffUtils {
    fn default() -> Self {
        Self {
            diff_program: "diff".to_string(),
            patch_program: "patch".to_string(),
        }
    }
}

impl DiffUtils {
    /// Use programs other than `diff` and `patch` from `PATH`.
    pub fn with_programs(diff_program: impl Into<String>, patch_program: impl Into<String>) -> Self {
        Self {
            diff_program: diff_program.into(),
            patch_program: patch_program.into(),
        }
    }
}

impl PatchTool for DiffUtils {
    fn diff(&self, old: &Path, new: &Path, label: &str) -> Result<Option<String>> {
        let old_label = format!("a/{label}");
        let new_label = format!("b/{label}");
        let args = [
            OsStr::new("-u"),
            OsStr::new("--label"),
            OsStr::new(&old_label),
            OsStr::new("--label"),
            OsStr::new(&new_label),
            old.as_os_str(),
            new.as_os_str(),
        ];
        let output = run_tool(&self.diff_program, &args)?;

        // diff exits 0 for identical inputs, 1 for differences, 2 on trouble.
        match output.status.code() {
            Some(0) => Ok(None),
            Some(1) => Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned())),
            code => Err(tool_failure(&self.diff_program, code, &output)),
        }
    }

    fn apply(
        &self,
        target: &Path,
        patch: &Path,
        direction: Direction,
        output: &Path,
    ) -> Result<()> {
        let staged = staging_file(output)?;

        let mut args: Vec<&OsStr> = vec![
            OsStr::new("--silent"),
            OsStr::new("--force"),
            OsStr::new("--no-backup-if-mismatch"),
            OsStr::new("--reject-file=-"),
        ];
        if direction == Direction::Reverse {
            args.push(OsStr::new("--reverse"));
        }
        args.extend([
            OsStr::new("--output"),
            staged.path().as_os_str(),
            OsStr::new("--input"),
            patch.as_os_str(),
            target.as_os_str(),
        ]);

        let result = run_tool(&self.patch_program, &args)?;
        if !result.status.success() {
            return Err(tool_failure(&self.patch_program, result.status.code(), &result));
        }

        publish(staged, output)
    }
}

fn run_tool(program: &str, args: &[&OsStr]) -> Result<Output> {
    tracing::debug!(program, args = ?args, "running external tool");

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| DivisionError::PatchTool {
            program: program.to_string(),
            message: format!("failed to execute {program}: {e}"),
            stderr: String::new(),
        })?;

    if !output.stderr.is_empty() {
        tracing::debug!(
            program,
            stderr = %String::from_utf8_lossy(&output.stderr),
            "tool stderr"
        );
    }

    Ok(output)
}

fn tool_failure(program: &str, code: Option<i32>, output: &Output) -> DivisionError {
    let message = match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    };
    // patch reports hunk failures on stdout
    let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if stderr.trim().is_empty() {
        stderr = String::from_utf8_lossy(&output.stdout).into_owned();
    }
    DivisionError::PatchTool {
        program: program.to_string(),
        message,
        stderr,
    }
}
