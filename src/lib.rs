//! # Keepsake - Preservation & Integrity Validation
//!
//! Keepsake moves catalog records into a long-term archive and keeps checking
//! that what was archived is still intact.
//!
//! ## Quick Start
//!
//! ```no_run
//! use keepsake::archive::LocalArchive;
//! use keepsake::catalog::MemoryCatalog;
//! use keepsake::config::KeepsakeConfig;
//! use keepsake::preservation::{PipelineSettings, PreservationMode, PreservationPipeline};
//! use keepsake::transform::MetsTransformer;
//!
//! # fn example() -> keepsake::error::Result<()> {
//! let config = KeepsakeConfig::load(None)?;
//! let catalog = MemoryCatalog::load(&config.catalog_path)?;
//! let mut archive = LocalArchive::open(&config.archive_root, config.checksum_algorithm)?;
//! let transformer = MetsTransformer::new();
//!
//! let result = PreservationPipeline::new(
//!     &catalog,
//!     &mut archive,
//!     &transformer,
//!     PipelineSettings::from(&config),
//! )
//! .preserve_catalog("Conservation", PreservationMode::Full)?;
//!
//! println!("{}", result.report.summary());
//! catalog.save(&config.catalog_path)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`catalog`]: the record store seam, field names and record selections
//! - [`preservation`]: decomposition of records into archival objects and the
//!   preservation pipeline
//! - [`transform`]: catalog XML to METS/PREMIS and schema checks
//! - [`archive`]: packager and archive store seams, WARC packages on disk
//! - [`validation`]: simple and full integrity validation tiers
//! - [`workflow`]: timer threads running steps on an interval
//! - [`integrity`]: checksum computation and identifier matching
//! - [`identity`]: stable and per-run identifiers of a record
//! - [`report`]: per-record outcomes and run summaries
//! - [`config`], [`error`], [`logging`]: ambient plumbing
//!
//! ## Failure Model
//!
//! A run is a loop over records. Errors from one record are written onto that
//! record and counted; the loop continues. Only catalog, configuration and
//! argument errors abort a run (see [`error::KeepsakeError::is_fatal`]).

pub mod archive;
pub mod catalog;
pub mod config;
pub mod error;
pub mod identity;
pub mod integrity;
pub mod logging;
pub mod preservation;
pub mod report;
pub mod transform;
pub mod validation;
pub mod workflow;
