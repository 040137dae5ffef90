//! prcadmin - administrative division and urban-rural code tables of the PRC.
//!
//! This crate fetches the yearly division code table published by the
//! National Bureau of Statistics, writes it as a CSV dataset, sorts datasets
//! into a canonical order, and keeps older years as a chain of reversible
//! unified-diff patches against the current snapshot.
//!
//! # Example
//!
//! ```
//! use prcadmin::DivisionCode;
//! use prcadmin::types::Level;
//!
//! let code = DivisionCode::parse("110101001001").unwrap();
//! assert_eq!(code.level(), Level::Village);
//! assert_eq!(code.parent().unwrap().as_str(), "110101001000");
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Constants, year validation and fetch settings
//! - [`types`]: Division codes, levels, urban-rural codes, records
//! - [`error`]: Error type and Result alias
//! - [`dataset`]: CSV wire format, atomic writes
//! - [`normalizer`]: Validation and canonical ordering
//! - [`http`]: HTTP client with retries
//! - [`html`]: Row extraction from provider pages
//! - [`fetcher`]: Crawling a year's table
//! - [`patch`]: External diff/patch capability
//! - [`archive`]: Year patch collection
//! - [`cli`]: Command-line interface

pub mod archive;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod fetcher;
pub mod html;
pub mod http;
pub mod normalizer;
pub mod patch;
pub mod types;

pub use archive::PatchArchive;
pub use config::{validate_year, FetchConfig};
pub use dataset::{read_dataset, write_dataset};
pub use error::{DivisionError, Result};
pub use fetcher::{fetch_year, FetchOptions, FetchReport};
pub use normalizer::{check_file, normalize_file, normalize_records, NormalizeReport};
pub use patch::{DiffUtils, Direction, PatchTool};
pub use types::{DivisionCode, HierarchyGap, Record, UrbanRuralCode};
