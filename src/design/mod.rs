//! Invocation of the external guide design tools.
//!
//! This module turns a tool call into an external process run and reports
//! what the run produced:
//!
//! - [`fasta`] — Normalisation of raw sequence text into FASTA
//! - [`staging`] — Unique input files in the workspace's staging directory
//! - [`runner`] — The [`CommandExecutor`] seam and its real implementation
//! - [`outputs`] — Snapshot/diff detection of output directories
//! - [`tools`] — The `design_guides` and `design_guides_multiple` actions
//! - [`workspace`] — The working root shared by all of the above

pub mod error;
pub mod fasta;
pub mod outputs;
pub mod runner;
pub mod staging;
pub mod tools;
pub mod workspace;

pub use error::{DesignError, DesignResult};
pub use outputs::{DirectorySnapshot, OutputTracker};
pub use runner::{CommandExecutor, CommandOutput, SystemExecutor};
pub use staging::{InputStaging, StagedInput, StagingPolicy};
pub use tools::{
    BatchDesignRequest, BatchOutcome, DesignOutcome, DesignRequest, DesignTools, EditorSpec,
    OutputDetection, ToolSettings,
};
pub use workspace::Workspace;
