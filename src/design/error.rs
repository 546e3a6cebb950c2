//! Error types for design tool invocations.
//!
//! A non-zero exit from an external tool is deliberately absent here: it is
//! reported as data in the tool response, not raised.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for design operations.
pub type DesignResult<T> = Result<T, DesignError>;

/// Errors that abort a design tool invocation.
#[derive(Debug, Error)]
pub enum DesignError {
    /// The supplied input contained nothing but whitespace.
    #[error("Input is empty: provide a sequence or FASTA text")]
    EmptyInput,

    /// Tool arguments were missing or contradictory.
    #[error("Invalid arguments: {message}")]
    InvalidArguments {
        /// Description of what's wrong.
        message: String,
    },

    /// Failed to create the staging directory or write a staged input file.
    #[error("Failed to stage input file: {path}")]
    Staging {
        /// Path that could not be created or written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Failed to list the working root.
    #[error("Failed to list working root: {path}")]
    Listing {
        /// The working root.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The argument vector had no program to execute.
    #[error("Cannot execute an empty command")]
    EmptyCommand,

    /// The external program could not be started.
    #[error("Failed to start '{program}'")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl DesignError {
    /// Creates an invalid arguments error.
    #[must_use]
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }
}
