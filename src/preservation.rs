//! Preservation of catalog records into the archive.
//!
//! - [`object`]: archival objects and the master/sub-asset role of a record
//! - [`decompose`]: which objects a record becomes, in which order
//! - [`pipeline`]: the per-catalog run that packages records and uploads the
//!   packages in one batch

pub mod decompose;
pub mod object;
pub mod pipeline;

pub use decompose::{IeStub, ObjectSource, PlannedObject, RecordDecomposer};
pub use object::{ArchivalObject, AssetRole, ObjectKind, Payload};
pub use pipeline::{PipelineSettings, PreservationMode, PreservationPipeline};
