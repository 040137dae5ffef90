//! Error types for fetching, normalizing and patching division datasets.
//!
//! Every failure is terminal for the invoking run; the CLI reports the
//! message and exits non-zero.

use thiserror::Error;

/// Main error type for the prcadmin library.
#[derive(Debug, Error)]
pub enum DivisionError {
    /// The provider does not publish a table for this year.
    #[error("No division table published for year {year}")]
    NotFound { year: u16 },

    /// Provider response does not have the expected table structure.
    #[error("Unexpected page structure at {url}: {message}")]
    SourceFormat { url: String, message: String },

    /// Malformed row in a dataset file.
    #[error("Parse error at line {line}: {message}")]
    Parse { line: u64, message: String },

    /// Two rows share the same code.
    #[error("Duplicate code {code} at line {line} (first seen at line {first_line})")]
    DuplicateCode {
        code: String,
        first_line: u64,
        line: u64,
    },

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Transient failures persisted past the retry budget.
    #[error("Giving up on {url} after {attempts} attempts: {message}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        message: String,
    },

    /// A link on a provider page could not be resolved.
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// The external diff/patch program failed.
    #[error("{program} failed: {message}{}", if .stderr.is_empty() { String::new() } else { format!("\n{}", .stderr.trim_end()) })]
    PatchTool {
        program: String,
        message: String,
        stderr: String,
    },

    /// Patches are append-only.
    #[error("Patch for year {year} already exists")]
    PatchExists { year: u16 },

    /// A link in the patch chain is missing.
    #[error("Missing patch for year {year}")]
    MissingPatch { year: u16 },

    /// Two snapshots are identical, so there is nothing to record.
    #[error("Snapshots for year {year} and its predecessor are identical")]
    NoChanges { year: u16 },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writer error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type alias for prcadmin operations.
pub type Result<T> = std::result::Result<T, DivisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = DivisionError::NotFound { year: 1900 };
        assert_eq!(err.to_string(), "No division table published for year 1900");
    }

    #[test]
    fn test_parse_display_names_line() {
        let err = DivisionError::Parse {
            line: 3,
            message: "invalid code '110000'".to_string(),
        };
        assert!(err.to_string().contains("line 3"));
        assert!(err.to_string().contains("110000"));
    }

    #[test]
    fn test_duplicate_display() {
        let err = DivisionError::DuplicateCode {
            code: "110101000000".to_string(),
            first_line: 2,
            line: 5,
        };
        assert_eq!(
            err.to_string(),
            "Duplicate code 110101000000 at line 5 (first seen at line 2)"
        );
    }

    #[test]
    fn test_patch_tool_with_stderr() {
        let err = DivisionError::PatchTool {
            program: "patch".to_string(),
            message: "exit code 1".to_string(),
            stderr: "Hunk #1 FAILED\n".to_string(),
        };
        assert_eq!(err.to_string(), "patch failed: exit code 1\nHunk #1 FAILED");
    }

    #[test]
    fn test_patch_tool_without_stderr() {
        let err = DivisionError::PatchTool {
            program: "diff".to_string(),
            message: "not found".to_string(),
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "diff failed: not found");
    }
}
