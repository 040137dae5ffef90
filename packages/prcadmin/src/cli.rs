//! Command-line interface.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::archive::{PatchArchive, CURRENT_FILE_NAME};
use crate::config::FetchConfig;
use crate::error::{DivisionError, Result};
use crate::fetcher::{fetch_year, FetchOptions};
use crate::normalizer::{check_file, normalize_file, NormalizeReport};
use crate::patch::DiffUtils;

/// Fetch, normalize and version the PRC administrative division code tables.
#[derive(Parser)]
#[command(name = "prcadmin")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download the division table of a year to a CSV file.
    Fetch {
        /// Year of the division table.
        #[arg(short, long)]
        year: u16,

        /// CSV file to write.
        #[arg(short, long)]
        file: PathBuf,

        /// Sort and validate the rows before writing.
        #[arg(long)]
        sort: bool,

        /// Override the provider base URL.
        #[arg(long)]
        base_url: Option<String>,

        /// Attempts per page before giving up.
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Sort a dataset file into canonical order.
    Sort {
        /// Input CSV file.
        input: PathBuf,

        /// Output CSV file (may equal the input).
        output: PathBuf,
    },

    /// Validate a dataset file without rewriting it.
    Check {
        /// CSV file to validate.
        input: PathBuf,
    },

    /// Record the patch from the previous year's snapshot to this year's.
    Diff {
        /// Year of the newer snapshot; the patch is named after it.
        #[arg(short, long)]
        year: u16,

        /// Normalized snapshot of the previous year.
        previous: PathBuf,

        /// Normalized snapshot of `year`.
        current: PathBuf,

        /// Patch directory.
        #[arg(long, default_value = "patches")]
        patches: PathBuf,
    },

    /// Regenerate an older year's snapshot from the current one.
    Restore {
        /// Year to regenerate.
        #[arg(short, long)]
        year: u16,

        /// CSV file to write.
        #[arg(short, long)]
        file: PathBuf,

        /// Current snapshot.
        #[arg(long, default_value = CURRENT_FILE_NAME)]
        current: PathBuf,

        /// Patch directory.
        #[arg(long, default_value = "patches")]
        patches: PathBuf,

        /// Year of the current snapshot (default: newest patch year).
        #[arg(long)]
        current_year: Option<u16>,
    },
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            year,
            file,
            sort,
            base_url,
            max_retries,
        } => fetch_command(year, &file, sort, base_url, max_retries),
        Commands::Sort { input, output } => sort_command(&input, &output),
        Commands::Check { input } => check_command(&input),
        Commands::Diff {
            year,
            previous,
            current,
            patches,
        } => diff_command(year, &previous, &current, &patches),
        Commands::Restore {
            year,
            file,
            current,
            patches,
            current_year,
        } => restore_command(year, &file, &current, &patches, current_year),
    }
}

fn fetch_command(
    year: u16,
    file: &Path,
    sort: bool,
    base_url: Option<String>,
    max_retries: Option<u32>,
) -> Result<()> {
    let mut builder = FetchConfig::builder();
    if let Some(url) = base_url {
        builder = builder.base_url(url);
    }
    if let Some(n) = max_retries {
        builder = builder.max_retries(n);
    }
    let config = builder.build();

    println!(
        "{} division table for {}",
        style("Fetching").bold(),
        style(year).cyan()
    );

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = fetch_year(&config, year, file, FetchOptions { normalize: sort }, |p| {
        pb.set_message(format!(
            "Scanned {} pages ({} queued), saved {} divisions",
            p.pages_scanned, p.pages_queued, p.divisions_saved
        ));
    });
    pb.finish_and_clear();
    let report = result?;

    println!("  Rows: {}", report.rows);
    println!("  Pages: {}", report.pages_scanned);
    if !report.missing_pages.is_empty() {
        println!(
            "  Missing pages: {}",
            style(report.missing_pages.len()).yellow().bold()
        );
    }
    if !report.gaps.is_empty() {
        println!(
            "  Hierarchy gaps: {}",
            style(report.gaps.len()).yellow().bold()
        );
    }
    println!();
    println!("{} {}", style("Saved to:").green().bold(), file.display());
    Ok(())
}

fn sort_command(input: &Path, output: &Path) -> Result<()> {
    let report = normalize_file(input, output)?;
    print_report(&report);
    println!("{} {}", style("Saved to:").green().bold(), output.display());
    Ok(())
}

fn check_command(input: &Path) -> Result<()> {
    let report = check_file(input)?;
    print_report(&report);
    println!("{} {}", style("Valid:").green().bold(), input.display());
    Ok(())
}

fn print_report(report: &NormalizeReport) {
    println!("  Rows: {}", report.rows);
    if !report.gaps.is_empty() {
        println!(
            "  Hierarchy gaps: {}",
            style(report.gaps.len()).yellow().bold()
        );
        for gap in &report.gaps {
            println!("    {} (no {})", gap.code, gap.missing_parent);
        }
    }
}

fn diff_command(year: u16, previous: &Path, current: &Path, patches: &Path) -> Result<()> {
    let archive = PatchArchive::open(patches);
    let path = archive.record(&DiffUtils::default(), previous, current, year)?;
    println!("{} {}", style("Recorded:").green().bold(), path.display());
    Ok(())
}

fn restore_command(
    year: u16,
    file: &Path,
    current: &Path,
    patches: &Path,
    current_year: Option<u16>,
) -> Result<()> {
    let archive = PatchArchive::open(patches);
    let current_year = match current_year {
        Some(y) => y,
        None => archive
            .latest_year()?
            .ok_or(DivisionError::MissingPatch {
                year: year.saturating_add(1),
            })?,
    };

    archive.restore(&DiffUtils::default(), current, current_year, year, file)?;
    println!(
        "{} {} {} {}",
        style("Restored").green().bold(),
        style(year).cyan(),
        style("to").green().bold(),
        file.display()
    );
    Ok(())
}
