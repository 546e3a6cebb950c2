//! base-editor-design-mcp: MCP server for base editor guide design
//!
//! This library exposes two external guide design tools as MCP tools. It
//! does not design guides itself; it prepares input, runs the tools and
//! reports what they produced.
//!
//! # Architecture
//!
//! - **Input**: Raw sequence text is normalised to FASTA and staged as a file
//! - **Execution**: The tool runs synchronously in a shared working root
//! - **Outputs**: New output directories are found by comparing directory
//!   listings taken before and after the run, or read from the tool's stdout
//!
//! # Modules
//!
//! - [`config`] — Configuration loading and validation
//! - [`design`] — Input staging, process execution and output detection
//! - [`error`] — Configuration error types
//! - [`mcp`] — MCP protocol implementation

pub mod config;
pub mod design;
pub mod error;
pub mod mcp;
